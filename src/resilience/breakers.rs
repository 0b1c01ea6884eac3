//! Per-component breaker set.

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitTransition,
};
use crate::telemetry::{Event, EventBus};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Status row returned by [`CircuitBreakerRegistry::status`].
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStatus {
    pub component: String,
    #[serde(flatten)]
    pub snapshot: CircuitBreakerSnapshot,
}

/// Exactly one [`CircuitBreaker`] per registered component.
///
/// Transitions are announced on the bus after the breaker lock is released.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    events: Arc<EventBus>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn register(&self, component: &str) -> Result<()> {
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if breakers.contains_key(component) {
            return Err(Error::DuplicateComponent(component.to_string()));
        }
        breakers.insert(
            component.to_string(),
            Arc::new(CircuitBreaker::new(self.config.clone())),
        );
        tracing::debug!(component = %component, "circuit breaker registered");
        Ok(())
    }

    pub fn contains(&self, component: &str) -> bool {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(component)
    }

    fn get(&self, component: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component)
            .cloned()
    }

    /// Gate check. Components without a breaker are always allowed.
    pub fn should_allow(&self, component: &str) -> bool {
        let Some(breaker) = self.get(component) else {
            return true;
        };
        let (allowed, transition) = breaker.allow();
        if let Some(t) = transition {
            self.announce(component, &breaker, t);
        }
        allowed
    }

    pub fn record_outcome(&self, component: &str, success: bool) {
        let Some(breaker) = self.get(component) else {
            return;
        };
        if let Some(t) = breaker.record(success) {
            self.announce(component, &breaker, t);
        }
    }

    pub fn snapshot(&self, component: &str) -> Option<CircuitBreakerSnapshot> {
        self.get(component).map(|b| b.snapshot())
    }

    /// Snapshot of every breaker, sorted by component name.
    pub fn status(&self) -> Vec<CircuitBreakerStatus> {
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut rows: Vec<CircuitBreakerStatus> = breakers
            .into_iter()
            .map(|(component, b)| CircuitBreakerStatus {
                component,
                snapshot: b.snapshot(),
            })
            .collect();
        rows.sort_by(|a, b| a.component.cmp(&b.component));
        rows
    }

    fn announce(&self, component: &str, breaker: &CircuitBreaker, transition: CircuitTransition) {
        let event = match transition {
            CircuitTransition::Opened { failure_count } => {
                tracing::warn!(
                    component = %component,
                    failure_count,
                    threshold = breaker.config().failure_threshold,
                    "circuit breaker opened"
                );
                Event::CircuitOpened {
                    component: component.to_string(),
                    failure_count,
                    threshold: breaker.config().failure_threshold,
                }
            }
            CircuitTransition::HalfOpened => {
                tracing::info!(component = %component, "circuit breaker half-open");
                Event::CircuitHalfOpened {
                    component: component.to_string(),
                }
            }
            CircuitTransition::Closed => {
                tracing::info!(component = %component, "circuit breaker closed");
                Event::CircuitClosed {
                    component: component.to_string(),
                }
            }
        };
        self.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use crate::telemetry::{topics, InMemoryEventSink};
    use std::time::Duration;

    fn registry(sink: Arc<InMemoryEventSink>) -> CircuitBreakerRegistry {
        let bus = Arc::new(EventBus::new().with_sink(sink));
        CircuitBreakerRegistry::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(5)
                .with_timeout(Duration::from_millis(40))
                .with_half_open_max_calls(2),
            bus,
        )
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let reg = registry(Arc::new(InMemoryEventSink::default()));
        reg.register("db").unwrap();
        assert!(matches!(
            reg.register("db"),
            Err(Error::DuplicateComponent(name)) if name == "db"
        ));
    }

    #[test]
    fn test_unknown_component_is_allowed() {
        let reg = registry(Arc::new(InMemoryEventSink::default()));
        assert!(reg.should_allow("nobody"));
        reg.record_outcome("nobody", false);
        assert!(reg.status().is_empty());
    }

    #[test]
    fn test_five_failures_block_until_timeout() {
        let sink = Arc::new(InMemoryEventSink::default());
        let reg = registry(sink.clone());
        reg.register("db").unwrap();

        for _ in 0..5 {
            assert!(reg.should_allow("db"));
            reg.record_outcome("db", false);
        }
        assert!(!reg.should_allow("db"));
        assert_eq!(sink.count(topics::CIRCUIT_OPENED), 1);

        std::thread::sleep(Duration::from_millis(60));
        assert!(reg.should_allow("db"));
        reg.record_outcome("db", true);
        assert!(reg.should_allow("db"));
        reg.record_outcome("db", true);

        assert_eq!(
            sink.topics(),
            vec![
                topics::CIRCUIT_OPENED,
                topics::CIRCUIT_HALF_OPENED,
                topics::CIRCUIT_CLOSED
            ]
        );
        let snapshot = reg.snapshot("db").unwrap();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[test]
    fn test_status_is_sorted() {
        let reg = registry(Arc::new(InMemoryEventSink::default()));
        reg.register("b").unwrap();
        reg.register("a").unwrap();
        let names: Vec<_> = reg.status().into_iter().map(|s| s.component).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
