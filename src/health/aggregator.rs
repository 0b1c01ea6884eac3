use super::tracker::{ComponentHealthTracker, ComponentStatus};
use crate::recovery::{ErrorHistory, ErrorRecord};
use crate::telemetry::{Event, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Derived system verdict; recomputed on demand and never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: OverallStatus,
    pub components: BTreeMap<String, ComponentStatus>,
    /// Recent records of failed components.
    pub issues: Vec<ErrorRecord>,
    pub checked_at: SystemTime,
}

impl SystemHealth {
    pub fn is_healthy(&self) -> bool {
        self.overall == OverallStatus::Healthy
    }
}

pub struct SystemHealthAggregator {
    tracker: Arc<ComponentHealthTracker>,
    history: Arc<Mutex<ErrorHistory>>,
    issue_window: Duration,
    events: Arc<EventBus>,
}

impl SystemHealthAggregator {
    pub fn new(
        tracker: Arc<ComponentHealthTracker>,
        history: Arc<Mutex<ErrorHistory>>,
        issue_window: Duration,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            tracker,
            history,
            issue_window,
            events,
        }
    }

    /// Any failed component makes the system critical; otherwise any degraded one degrades it.
    pub fn recompute(&self) -> SystemHealth {
        let components: BTreeMap<String, ComponentStatus> = self
            .tracker
            .all()
            .into_iter()
            .map(|h| (h.name, h.status))
            .collect();

        let overall = if components.values().any(|s| *s == ComponentStatus::Failed) {
            OverallStatus::Critical
        } else if components.values().any(|s| *s == ComponentStatus::Degraded) {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        };

        let issues = {
            let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            components
                .iter()
                .filter(|(_, s)| **s == ComponentStatus::Failed)
                .flat_map(|(name, _)| history.recent_for(name, self.issue_window))
                .collect()
        };

        SystemHealth {
            overall,
            components,
            issues,
            checked_at: SystemTime::now(),
        }
    }

    /// Recompute and announce on `system.health_check`.
    pub fn check(&self) -> SystemHealth {
        let health = self.recompute();
        match health.overall {
            OverallStatus::Healthy => tracing::debug!("health check: healthy"),
            OverallStatus::Degraded => tracing::warn!(issues = health.issues.len(), "health check: degraded"),
            OverallStatus::Critical => tracing::error!(issues = health.issues.len(), "health check: critical"),
        }
        self.events.publish(Event::HealthCheck(health.clone()));
        health
    }

    /// Run [`check`](Self::check) every `interval` until `token` is cancelled.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        this.check();
                    }
                }
            }
            tracing::debug!("health check timer stopped");
        })
    }
}
