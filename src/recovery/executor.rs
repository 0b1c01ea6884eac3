use super::action::RecoveryStrategy;
use super::record::ErrorRecord;
use super::registry::RecoveryRegistry;
use crate::telemetry::{Event, EventBus};
use std::sync::Arc;

/// Runs the registered actions for a record, in priority order, each raced against its timeout.
pub struct RecoveryExecutor {
    registry: Arc<RecoveryRegistry>,
    events: Arc<EventBus>,
}

impl RecoveryExecutor {
    pub fn new(registry: Arc<RecoveryRegistry>, events: Arc<EventBus>) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &Arc<RecoveryRegistry> {
        &self.registry
    }

    /// Returns the strategy that succeeded, or `None` when every permitted attempt failed.
    ///
    /// `record.recovery_attempts` grows by one per attempt whatever its outcome,
    /// and never past `record.max_retries`.
    pub async fn attempt_recovery(&self, record: &mut ErrorRecord) -> Option<RecoveryStrategy> {
        let actions = self.registry.actions_for(&record.component, record.kind);
        if actions.is_empty() {
            tracing::debug!(
                error_id = %record.id,
                component = %record.component,
                kind = %record.kind,
                "no recovery actions registered"
            );
        }

        for action in actions {
            if record.retries_exhausted() {
                break;
            }
            let probe = action.probe();
            let outcome = tokio::time::timeout(action.timeout, probe.attempt()).await;
            record.recovery_attempts += 1;

            match outcome {
                Ok(Ok(true)) => {
                    tracing::info!(
                        error_id = %record.id,
                        component = %record.component,
                        strategy = %action.strategy,
                        attempts = record.recovery_attempts,
                        "recovery succeeded"
                    );
                    self.events.publish(Event::ErrorRecovered {
                        record: record.clone(),
                        strategy: action.strategy,
                    });
                    return Some(action.strategy);
                }
                Ok(Ok(false)) => {
                    tracing::warn!(
                        error_id = %record.id,
                        strategy = %action.strategy,
                        attempt = record.recovery_attempts,
                        "recovery attempt reported failure"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        error_id = %record.id,
                        strategy = %action.strategy,
                        attempt = record.recovery_attempts,
                        error = %e,
                        "recovery attempt errored"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        error_id = %record.id,
                        strategy = %action.strategy,
                        attempt = record.recovery_attempts,
                        timeout_ms = action.timeout.as_millis() as u64,
                        "recovery attempt timed out"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ErrorKind, FaultContext};
    use crate::recovery::RecoveryAction;
    use crate::telemetry::{topics, InMemoryEventSink};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn setup() -> (Arc<RecoveryRegistry>, RecoveryExecutor, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::default());
        let bus = Arc::new(EventBus::new().with_sink(sink.clone()));
        let registry = Arc::new(RecoveryRegistry::new());
        let executor = RecoveryExecutor::new(registry.clone(), bus);
        (registry, executor, sink)
    }

    fn record(max_retries: u32) -> ErrorRecord {
        ErrorRecord::new(
            "svc",
            ErrorKind::Network,
            ErrorKind::Network.base_severity(),
            "connection reset",
            FaultContext::default(),
            max_retries,
        )
    }

    fn counting(calls: Arc<AtomicU32>, result: bool, priority: i32) -> RecoveryAction {
        RecoveryAction::from_fn(RecoveryStrategy::Retry, move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(result)
            }
        })
        .with_priority(priority)
    }

    #[tokio::test]
    async fn test_attempts_are_bounded_by_max_retries() {
        let (registry, executor, sink) = setup();
        let calls = Arc::new(AtomicU32::new(0));
        for p in 0..5 {
            registry.register("svc", ErrorKind::Network, counting(calls.clone(), false, p));
        }
        let mut rec = record(3);
        assert_eq!(executor.attempt_recovery(&mut rec).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(rec.recovery_attempts, 3);
        assert_eq!(sink.count(topics::ERROR_RECOVERED), 0);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let (registry, executor, sink) = setup();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register("svc", ErrorKind::Network, counting(calls.clone(), false, 10));
        registry.register(
            "svc",
            ErrorKind::Network,
            RecoveryAction::from_fn(RecoveryStrategy::Fallback, || async { Ok(true) })
                .with_priority(5),
        );
        registry.register("svc", ErrorKind::Network, counting(calls.clone(), false, 1));

        let mut rec = record(3);
        assert_eq!(
            executor.attempt_recovery(&mut rec).await,
            Some(RecoveryStrategy::Fallback)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rec.recovery_attempts, 2);
        assert_eq!(sink.count(topics::ERROR_RECOVERED), 1);
    }

    #[tokio::test]
    async fn test_timeout_and_error_count_as_failures() {
        let (registry, executor, _) = setup();
        registry.register(
            "svc",
            ErrorKind::Network,
            RecoveryAction::from_fn(RecoveryStrategy::Retry, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(true)
            })
            .with_timeout(Duration::from_millis(20))
            .with_priority(2),
        );
        registry.register(
            "svc",
            ErrorKind::Network,
            RecoveryAction::from_fn(RecoveryStrategy::Restart, || async {
                Err(anyhow::anyhow!("restart failed"))
            })
            .with_priority(1),
        );

        let mut rec = record(5);
        assert_eq!(executor.attempt_recovery(&mut rec).await, None);
        assert_eq!(rec.recovery_attempts, 2);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_nothing() {
        let (registry, executor, _) = setup();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register("svc", ErrorKind::Network, counting(calls.clone(), true, 0));
        let mut rec = record(0);
        assert_eq!(executor.attempt_recovery(&mut rec).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
