use super::config::SystemConfig;
use super::core::{Inner, ResilienceSystem};
use super::escalation::RestartHandler;
use crate::classify::ErrorClassifier;
use crate::config::ResilienceConfig;
use crate::health::{ComponentHealthTracker, SystemHealthAggregator};
use crate::recovery::{ErrorHistory, RecoveryExecutor, RecoveryRegistry};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::telemetry::EventBus;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Builder for [`ResilienceSystem`].
///
/// Every collaborator is explicit: pass the shared [`EventBus`] here and hand
/// the same bus to the cache, balancer and monitor you build alongside.
pub struct ResilienceSystemBuilder {
    config: SystemConfig,
    breaker: CircuitBreakerConfig,
    events: Option<Arc<EventBus>>,
    classifier: Option<ErrorClassifier>,
    restart_handler: Option<Arc<dyn RestartHandler>>,
}

impl ResilienceSystemBuilder {
    pub fn new() -> Self {
        Self {
            config: SystemConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            events: None,
            classifier: None,
            restart_handler: None,
        }
    }

    /// Take the `system` and `breaker` sections of a loaded config.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new()
            .with_system_config(config.system.clone())
            .with_breaker_config(config.breaker.clone())
    }

    pub fn with_system_config(mut self, config: SystemConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Default is a fresh bus with no sinks.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_restart_handler(mut self, handler: Arc<dyn RestartHandler>) -> Self {
        self.restart_handler = Some(handler);
        self
    }

    pub fn build(self) -> ResilienceSystem {
        let events = self.events.unwrap_or_else(|| Arc::new(EventBus::new()));
        let tracker = Arc::new(ComponentHealthTracker::new());
        let history = Arc::new(Mutex::new(ErrorHistory::new(self.config.max_error_history)));
        let aggregator = Arc::new(SystemHealthAggregator::new(
            tracker.clone(),
            history.clone(),
            self.config.issue_window,
            events.clone(),
        ));
        let recovery = RecoveryExecutor::new(Arc::new(RecoveryRegistry::new()), events.clone());
        let breakers = CircuitBreakerRegistry::new(self.breaker, events.clone());

        ResilienceSystem {
            inner: Arc::new(Inner {
                config: self.config,
                events,
                classifier: self.classifier.unwrap_or_default(),
                breakers,
                recovery,
                tracker,
                history,
                aggregator,
                restart_handler: self.restart_handler,
                recovering: AtomicBool::new(false),
                recovery_task: Mutex::new(None),
                token: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Default for ResilienceSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}
