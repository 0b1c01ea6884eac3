use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of the facade and of system-level recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Capacity of the error-record ring.
    pub max_error_history: usize,
    /// `max_retries` given to every new error record.
    pub default_max_retries: u32,
    #[serde(rename = "health_check_interval_ms", with = "crate::config::duration_ms")]
    pub health_check_interval: Duration,
    /// Age limit for records listed as issues of failed components.
    #[serde(rename = "issue_window_ms", with = "crate::config::duration_ms")]
    pub issue_window: Duration,
    /// Restarted in order during system-level recovery.
    pub critical_components: Vec<String>,
    #[serde(rename = "restart_settle_ms", with = "crate::config::duration_ms")]
    pub restart_settle: Duration,
    /// Named in the graceful-degradation directive.
    pub degraded_features: Vec<String>,
    pub max_memory_pct: u8,
    pub max_cpu_pct: u8,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_error_history: 1000,
            default_max_retries: 3,
            health_check_interval: Duration::from_secs(30),
            issue_window: Duration::from_secs(300),
            critical_components: vec![
                "core-engine".to_string(),
                "memory-system".to_string(),
                "reasoning-engine".to_string(),
            ],
            restart_settle: Duration::from_secs(2),
            degraded_features: vec![
                "advanced-analytics".to_string(),
                "real-time-sync".to_string(),
                "background-tasks".to_string(),
            ],
            max_memory_pct: 50,
            max_cpu_pct: 70,
        }
    }
}

impl SystemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_error_history(mut self, size: usize) -> Self {
        self.max_error_history = size.max(1);
        self
    }

    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_issue_window(mut self, window: Duration) -> Self {
        self.issue_window = window;
        self
    }

    pub fn with_critical_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_components = components.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle = settle;
        self
    }

    pub fn with_degraded_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.degraded_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resource_ceilings(mut self, max_memory_pct: u8, max_cpu_pct: u8) -> Self {
        self.max_memory_pct = max_memory_pct;
        self.max_cpu_pct = max_cpu_pct;
        self
    }
}
