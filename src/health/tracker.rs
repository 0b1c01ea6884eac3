use crate::classify::Severity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Failed,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: ComponentStatus,
    /// Id of the most recent error record.
    pub last_error: Option<String>,
    pub error_count: u64,
    pub recovery_count: u64,
    #[serde(rename = "uptime_ms", serialize_with = "serialize_uptime")]
    uptime_origin: Instant,
}

fn serialize_uptime<S: serde::Serializer>(origin: &Instant, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(origin.elapsed().as_millis() as u64)
}

impl ComponentHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ComponentStatus::Healthy,
            last_error: None,
            error_count: 0,
            recovery_count: 0,
            uptime_origin: Instant::now(),
        }
    }

    /// Time since registration or the last restart.
    pub fn uptime(&self) -> Duration {
        self.uptime_origin.elapsed()
    }
}

/// Rolling per-component status.
pub struct ComponentHealthTracker {
    components: RwLock<BTreeMap<String, ComponentHealth>>,
}

impl ComponentHealthTracker {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, name: &str) -> Result<()> {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if components.contains_key(name) {
            return Err(Error::DuplicateComponent(name.to_string()));
        }
        components.insert(name.to_string(), ComponentHealth::new(name));
        Ok(())
    }

    /// Critical fails the component, high degrades it; lower severities only count.
    pub fn record_error(&self, name: &str, error_id: &str, severity: Severity) {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(health) = components.get_mut(name) else {
            return;
        };
        health.error_count += 1;
        health.last_error = Some(error_id.to_string());
        match severity {
            Severity::Critical => health.status = ComponentStatus::Failed,
            Severity::High => health.status = ComponentStatus::Degraded,
            Severity::Low | Severity::Medium => {}
        }
    }

    pub fn record_recovery(&self, name: &str) {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(health) = components.get_mut(name) {
            health.status = ComponentStatus::Healthy;
            health.recovery_count += 1;
        }
    }

    /// Restart bookkeeping: healthy again, counters cleared, uptime restarted.
    pub fn reset(&self, name: &str) {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(health) = components.get_mut(name) {
            *health = ComponentHealth::new(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentHealth> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn status(&self, name: &str) -> Option<ComponentStatus> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|h| h.status)
    }

    /// All components, ordered by name.
    pub fn all(&self) -> Vec<ComponentHealth> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl Default for ComponentHealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_drives_status() {
        let tracker = ComponentHealthTracker::new();
        tracker.register("db").unwrap();

        tracker.record_error("db", "e1", Severity::Low);
        tracker.record_error("db", "e2", Severity::Medium);
        assert_eq!(tracker.status("db"), Some(ComponentStatus::Healthy));

        tracker.record_error("db", "e3", Severity::High);
        assert_eq!(tracker.status("db"), Some(ComponentStatus::Degraded));

        // Lower severities never improve a degraded component.
        tracker.record_error("db", "e4", Severity::Low);
        assert_eq!(tracker.status("db"), Some(ComponentStatus::Degraded));

        tracker.record_error("db", "e5", Severity::Critical);
        let health = tracker.get("db").unwrap();
        assert_eq!(health.status, ComponentStatus::Failed);
        assert_eq!(health.error_count, 5);
        assert_eq!(health.last_error.as_deref(), Some("e5"));
    }

    #[test]
    fn test_recovery_and_reset() {
        let tracker = ComponentHealthTracker::new();
        tracker.register("db").unwrap();
        tracker.record_error("db", "e1", Severity::Critical);
        tracker.record_recovery("db");
        let health = tracker.get("db").unwrap();
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.recovery_count, 1);
        assert_eq!(health.error_count, 1);

        tracker.record_error("db", "e2", Severity::Critical);
        tracker.reset("db");
        let health = tracker.get("db").unwrap();
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.error_count, 0);
        assert_eq!(health.recovery_count, 0);
        assert!(health.last_error.is_none());
    }

    #[test]
    fn test_unknown_component_is_ignored() {
        let tracker = ComponentHealthTracker::new();
        tracker.record_error("ghost", "e1", Severity::Critical);
        tracker.record_recovery("ghost");
        assert!(tracker.get("ghost").is_none());
        assert!(tracker.register("a").is_ok());
        assert!(tracker.register("a").is_err());
    }
}
