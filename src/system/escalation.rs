//! Escalation and the single-flight system recovery routine.

use super::core::Inner;
use crate::classify::Severity;
use crate::recovery::ErrorRecord;
use crate::telemetry::Event;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

/// Performs the actual restart of a critical component.
///
/// Without a handler the restart is announced on `component.restart` and the
/// component is assumed to come back after the settle time.
#[async_trait]
pub trait RestartHandler: Send + Sync {
    async fn restart(&self, component: &str) -> anyhow::Result<()>;
}

/// Closure adapter for [`RestartHandler`].
pub struct FnRestartHandler<F> {
    func: F,
}

impl<F, Fut> FnRestartHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> RestartHandler for FnRestartHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn restart(&self, component: &str) -> anyhow::Result<()> {
        (self.func)(component.to_string()).await
    }
}

/// Clears the in-flight flag even if the routine is aborted.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(super) fn escalate(inner: &Arc<Inner>, record: &ErrorRecord) {
    tracing::error!(
        error_id = %record.id,
        component = %record.component,
        severity = %record.severity,
        attempts = record.recovery_attempts,
        "error escalated - recovery failed"
    );
    inner.events.publish(Event::ErrorEscalated(record.clone()));

    if record.severity == Severity::Critical {
        inner.aggregator.check();
        trigger_system_recovery(inner, &record.component);
    }
}

/// Starts system recovery unless one is already running. Returns whether it started.
///
/// `origin` is restarted after the configured critical components when it is
/// not one of them.
pub(super) fn trigger_system_recovery(inner: &Arc<Inner>, origin: &str) -> bool {
    let mut slot = inner
        .recovery_task
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if inner
        .recovering
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::debug!("system recovery already in flight");
        return false;
    }

    let mut sequence = inner.config.critical_components.clone();
    if !sequence.iter().any(|c| c == origin) {
        sequence.push(origin.to_string());
    }

    let task_inner = Arc::clone(inner);
    *slot = Some(tokio::spawn(async move {
        let _guard = InFlight(&task_inner.recovering);
        run_system_recovery(&task_inner, &sequence).await;
    }));
    true
}

async fn run_system_recovery(inner: &Inner, sequence: &[String]) {
    let cfg = &inner.config;
    tracing::warn!("triggering system-level recovery");

    tracing::info!(features = ?cfg.degraded_features, "implementing graceful degradation");
    inner.events.publish(Event::GracefulDegradation {
        disable_features: cfg.degraded_features.clone(),
    });
    inner.events.publish(Event::ReduceResources {
        max_memory_pct: cfg.max_memory_pct,
        max_cpu_pct: cfg.max_cpu_pct,
    });

    for component in sequence {
        if inner.token.is_cancelled() {
            tracing::info!("system recovery interrupted by shutdown");
            return;
        }
        tracing::info!(component = %component, "restarting critical component");
        inner.events.publish(Event::ComponentRestart {
            component: component.clone(),
        });

        if let Some(handler) = &inner.restart_handler {
            if let Err(e) = handler.restart(component).await {
                tracing::error!(component = %component, error = %e, "failed to restart component");
                continue;
            }
        }

        tokio::select! {
            _ = inner.token.cancelled() => {
                tracing::info!("system recovery interrupted by shutdown");
                return;
            }
            _ = tokio::time::sleep(cfg.restart_settle) => {}
        }
        inner.tracker.reset(component);
    }

    tracing::info!("system recovery completed");
    inner.aggregator.check();
}
