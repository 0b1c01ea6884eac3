use super::config::SystemConfig;
use super::escalation::{self, RestartHandler};
use crate::classify::{ErrorClassifier, ErrorKind, Fault, FaultContext, Severity};
use crate::health::{ComponentHealth, ComponentHealthTracker, SystemHealth, SystemHealthAggregator};
use crate::recovery::{
    ComponentErrorStats, ErrorHistory, ErrorRecord, ErrorStatistics, RecoveryAction,
    RecoveryExecutor, RecoveryStrategy,
};
use crate::resilience::{CircuitBreakerRegistry, CircuitBreakerStatus};
use crate::telemetry::{Event, EventBus};
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What happened to a reported fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "strategy", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered(RecoveryStrategy),
    /// The component's breaker refused the call; no recovery was attempted.
    ShortCircuited,
    Escalated,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub error_id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub attempts: u32,
    pub outcome: RecoveryOutcome,
}

impl RecoveryReport {
    pub fn is_recovered(&self) -> bool {
        matches!(self.outcome, RecoveryOutcome::Recovered(_))
    }
}

pub(super) struct Inner {
    pub(super) config: SystemConfig,
    pub(super) events: Arc<EventBus>,
    pub(super) classifier: ErrorClassifier,
    pub(super) breakers: CircuitBreakerRegistry,
    pub(super) recovery: RecoveryExecutor,
    pub(super) tracker: Arc<ComponentHealthTracker>,
    pub(super) history: Arc<Mutex<ErrorHistory>>,
    pub(super) aggregator: Arc<SystemHealthAggregator>,
    pub(super) restart_handler: Option<Arc<dyn RestartHandler>>,
    pub(super) recovering: AtomicBool,
    pub(super) recovery_task: Mutex<Option<JoinHandle<()>>>,
    pub(super) token: CancellationToken,
    pub(super) tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Entry point collaborators report faults to.
///
/// Cheap to clone; all clones share one instance. Build it with
/// [`ResilienceSystemBuilder`](super::ResilienceSystemBuilder).
#[derive(Clone)]
pub struct ResilienceSystem {
    pub(super) inner: Arc<Inner>,
}

impl ResilienceSystem {
    pub fn builder() -> super::ResilienceSystemBuilder {
        super::ResilienceSystemBuilder::new()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Start the periodic health check. Calling it twice starts a second timer.
    pub fn start(&self) {
        let handle = self.inner.aggregator.spawn_periodic(
            self.inner.config.health_check_interval,
            self.inner.token.child_token(),
        );
        self.track_task(handle);
        tracing::info!(
            interval_ms = self.inner.config.health_check_interval.as_millis() as u64,
            "resilience system started"
        );
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); hand it to other periodic tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    /// Adopt a background task so that [`shutdown`](Self::shutdown) awaits it.
    pub fn track_task(&self, handle: JoinHandle<()>) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    pub fn register_component(&self, name: &str) -> Result<()> {
        self.inner.tracker.register(name)?;
        self.inner.breakers.register(name)?;
        tracing::debug!(component = %name, "component registered");
        Ok(())
    }

    pub fn register_recovery_action(&self, component: &str, kind: ErrorKind, action: RecoveryAction) {
        self.inner.recovery.registry().register(component, kind, action);
    }

    /// Gate check for callers that guard their own operations with the component's breaker.
    pub fn should_allow(&self, component: &str) -> bool {
        self.inner.breakers.should_allow(component)
    }

    pub fn record_outcome(&self, component: &str, success: bool) {
        self.inner.breakers.record_outcome(component, success);
    }

    /// Classify, record, gate, recover and, if recovery fails, escalate.
    pub async fn report_fault(&self, component: &str, fault: &Fault, ctx: FaultContext) -> RecoveryReport {
        let inner = &self.inner;
        let verdict = inner.classifier.classify(fault, &ctx);
        let mut record = ErrorRecord::new(
            component,
            verdict.kind,
            verdict.severity,
            fault.message.clone(),
            ctx,
            inner.config.default_max_retries,
        );

        if !inner.tracker.contains(component) {
            tracing::warn!(component = %component, "fault reported for unregistered component");
        }
        tracing::error!(
            error_id = %record.id,
            component = %component,
            kind = %record.kind,
            severity = %record.severity,
            detail = %record.message,
            "error recorded"
        );
        inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        inner.tracker.record_error(component, &record.id, record.severity);
        inner.events.publish(Event::ErrorRecorded(record.clone()));

        if !inner.breakers.should_allow(component) {
            tracing::warn!(
                error_id = %record.id,
                component = %component,
                "circuit open, recovery skipped"
            );
            if record.severity == Severity::Critical {
                escalation::escalate(inner, &record);
            }
            return report(&record, RecoveryOutcome::ShortCircuited);
        }

        let recovered = inner.recovery.attempt_recovery(&mut record).await;
        {
            let mut history = inner.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.sync_attempts(&record.id, record.recovery_attempts);
            if recovered.is_some() {
                history.mark_recovered(&record.id);
            }
        }

        match recovered {
            Some(strategy) => {
                inner.tracker.record_recovery(component);
                inner.breakers.record_outcome(component, true);
                report(&record, RecoveryOutcome::Recovered(strategy))
            }
            None => {
                inner.breakers.record_outcome(component, false);
                escalation::escalate(inner, &record);
                report(&record, RecoveryOutcome::Escalated)
            }
        }
    }

    /// Like [`report_fault`](Self::report_fault) with a JSON context validated at the boundary.
    pub async fn report_fault_json(
        &self,
        component: &str,
        fault: &Fault,
        ctx: &serde_json::Value,
    ) -> Result<RecoveryReport> {
        let ctx = FaultContext::from_json(ctx)?;
        Ok(self.report_fault(component, fault, ctx).await)
    }

    /// Returns `false` when the fault was not recovered; the caller applies its own fallback.
    pub async fn report_error<E>(&self, component: &str, err: &E, ctx: FaultContext) -> bool
    where
        E: std::error::Error + ?Sized,
    {
        self.report_fault(component, &Fault::from_error(err), ctx)
            .await
            .is_recovered()
    }

    pub fn is_recovering(&self) -> bool {
        self.inner.recovering.load(Ordering::Acquire)
    }

    /// Wait for the most recently triggered system recovery, if any, to finish.
    pub async fn wait_for_system_recovery(&self) {
        let handle = self
            .inner
            .recovery_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "system recovery task failed");
            }
        }
    }

    /// Pure read of the current verdict.
    pub fn health(&self) -> SystemHealth {
        self.inner.aggregator.recompute()
    }

    /// Recompute and publish on `system.health_check`.
    pub fn check_health(&self) -> SystemHealth {
        self.inner.aggregator.check()
    }

    pub fn component_health(&self, name: &str) -> Option<ComponentHealth> {
        self.inner.tracker.get(name)
    }

    pub fn error_statistics(&self) -> ErrorStatistics {
        let mut stats = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .statistics();
        stats.components = self
            .inner
            .tracker
            .all()
            .into_iter()
            .map(|h| ComponentErrorStats {
                component: h.name,
                error_count: h.error_count,
                recovery_count: h.recovery_count,
                status: h.status,
            })
            .collect();
        stats
    }

    pub fn circuit_breaker_status(&self) -> Vec<CircuitBreakerStatus> {
        self.inner.breakers.status()
    }

    /// Cancel every timer and the in-flight system recovery, then wait for them.
    pub async fn shutdown(&self) {
        self.inner.token.cancel();
        let mut handles: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if let Some(h) = self
            .inner
            .recovery_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handles.push(h);
        }
        let count = handles.len();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!(tasks = count, "resilience system shut down");
    }
}

fn report(record: &ErrorRecord, outcome: RecoveryOutcome) -> RecoveryReport {
    RecoveryReport {
        error_id: record.id.clone(),
        kind: record.kind,
        severity: record.severity,
        attempts: record.recovery_attempts,
        outcome,
    }
}
