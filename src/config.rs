//! 配置模块：聚合各子系统配置，支持 YAML/JSON 加载与校验；时长统一以毫秒整数序列化。
//!
//! # Configuration
//!
//! [`ResilienceConfig`] gathers the per-subsystem configs under one document.
//! Every section is optional and falls back to its defaults:
//!
//! ```yaml
//! system:
//!   max_error_history: 500
//!   critical_components: [core-engine]
//! breaker:
//!   failure_threshold: 3
//!   timeout_ms: 30000
//! cache:
//!   max_size: 256
//!   strategy: lru
//!   default_ttl_ms: null
//! balancer:
//!   strategy: least_connections
//! monitor:
//!   sample_interval_ms: 5000
//! ```

use crate::monitor::MonitorConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::routing::LoadBalancerConfig;
use crate::cache::CacheConfig;
use crate::system::SystemConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as integer milliseconds or `null`.
pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub system: SystemConfig,
    pub breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub balancer: LoadBalancerConfig,
    pub monitor: MonitorConfig,
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(Error::configuration_with_context(
                "unsupported configuration file format",
                ErrorContext::new()
                    .with_details(format!(
                        "expected .yaml, .yml or .json, got {}",
                        other.unwrap_or("no extension")
                    ))
                    .with_source(path.display().to_string()),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        positive(self.system.max_error_history as f64, "system.max_error_history")?;
        positive(self.breaker.failure_threshold as f64, "breaker.failure_threshold")?;
        positive(self.breaker.half_open_max_calls as f64, "breaker.half_open_max_calls")?;
        positive(self.cache.max_size as f64, "cache.max_size")?;
        if self.cache.max_growth_size < self.cache.max_size {
            return Err(invalid(
                "cache.max_growth_size",
                "must not be smaller than cache.max_size",
            ));
        }
        if self.cache.sweep_interval.is_zero() {
            return Err(invalid("cache.sweep_interval_ms", "must be greater than zero"));
        }
        if self.balancer.health_check_interval.is_zero() {
            return Err(invalid(
                "balancer.health_check_interval_ms",
                "must be greater than zero",
            ));
        }
        ratio(self.balancer.response_time_smoothing, "balancer.response_time_smoothing")?;
        positive(
            self.balancer.adaptive_connection_scale,
            "balancer.adaptive_connection_scale",
        )?;
        positive(
            self.balancer.adaptive_response_time_scale_ms,
            "balancer.adaptive_response_time_scale_ms",
        )?;

        let t = &self.monitor.thresholds;
        positive(t.response_time_ms, "monitor.thresholds.response_time_ms")?;
        ratio(t.error_rate, "monitor.thresholds.error_rate")?;
        ratio(t.cpu_usage, "monitor.thresholds.cpu_usage")?;
        ratio(t.memory_usage, "monitor.thresholds.memory_usage")?;
        ratio(t.cache_hit_rate, "monitor.thresholds.cache_hit_rate")?;
        ratio(t.cache_strategy_hit_rate, "monitor.thresholds.cache_strategy_hit_rate")?;
        positive(self.monitor.history_size as f64, "monitor.history_size")?;
        if self.monitor.sample_interval.is_zero() {
            return Err(invalid("monitor.sample_interval_ms", "must be greater than zero"));
        }

        if self.system.max_memory_pct > 100 || self.system.max_cpu_pct > 100 {
            return Err(invalid(
                "system.max_memory_pct",
                "resource ceilings are percentages (0-100)",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("resilience_config"),
    )
}

fn positive(value: f64, field: &str) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be greater than zero"))
    }
}

fn ratio(value: f64, field: &str) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be within 0.0..=1.0"))
    }
}
