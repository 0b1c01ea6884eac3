//! 遥测与通知总线：按发布顺序同步分发事件，并提供内存、日志等接收端。
//!
//! Telemetry and notification bus.
//!
//! The [`EventBus`] is the single publish point of a resilience instance. Each
//! subsystem receives an `Arc<EventBus>` at construction (no process-wide sink).
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`EventBus`] | Ordered synchronous fan-out plus broadcast subscription |
//! | [`InMemoryEventSink`] | Bounded in-memory sink for tests and diagnostics |
//! | [`TracingEventSink`] | Mirrors events into `tracing` as JSON |
//! | [`init_tracing`] | Installs an `EnvFilter`-driven fmt subscriber |

pub use crate::events::{noop_sink, topics, Event, EventSink, NoopEventSink};

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

const BROADCAST_CAPACITY: usize = 256;

/// Publish point shared by every subsystem of one instance.
///
/// Sinks are invoked synchronously in registration order, so a test asserting on
/// an [`InMemoryEventSink`] sees events exactly in publish order. Async observers
/// can [`subscribe`](EventBus::subscribe) to a broadcast channel instead.
pub struct EventBus {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sinks: RwLock::new(Vec::new()),
            tx,
        }
    }

    pub fn with_sink(self, sink: Arc<dyn EventSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        tracing::debug!(topic = event.topic(), "event published");
        // Snapshot so a sink may register further sinks without deadlocking.
        let sinks: Vec<Arc<dyn EventSink>> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sink in &sinks {
            sink.publish(&event);
        }
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory sink for testing.
pub struct InMemoryEventSink {
    events: RwLock<Vec<Event>>,
    max_events: usize,
}

impl InMemoryEventSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_by_topic(&self, topic: &str) -> Vec<Event> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.topic() == topic)
            .cloned()
            .collect()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Event::topic)
            .collect()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.topic() == topic)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: &Event) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        events.push(event.clone());
        if events.len() > self.max_events {
            events.remove(0);
        }
    }
}

/// Log sink for debugging.
pub struct TracingEventSink {
    prefix: String,
}

impl TracingEventSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for TracingEventSink {
    fn default() -> Self {
        Self::new("[Event]")
    }
}

impl EventSink for TracingEventSink {
    fn publish(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(topic = event.topic(), "{} {}", self.prefix, json),
            Err(e) => tracing::warn!(topic = event.topic(), error = %e, "{} unserializable event", self.prefix),
        }
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restart(component: &str) -> Event {
        Event::ComponentRestart {
            component: component.to_string(),
        }
    }

    #[test]
    fn test_sinks_receive_events_in_publish_order() {
        let sink = Arc::new(InMemoryEventSink::new(10));
        let bus = EventBus::new().with_sink(sink.clone());
        bus.publish(restart("a"));
        bus.publish(Event::ReduceResources {
            max_memory_pct: 50,
            max_cpu_pct: 70,
        });
        bus.publish(restart("b"));

        assert_eq!(
            sink.topics(),
            vec![
                topics::COMPONENT_RESTART,
                topics::REDUCE_RESOURCES,
                topics::COMPONENT_RESTART
            ]
        );
        assert_eq!(sink.count(topics::COMPONENT_RESTART), 2);
        assert_eq!(sink.events_by_topic(topics::COMPONENT_RESTART)[1].component(), Some("b"));
    }

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        sink.publish(&restart("a"));
        sink.publish(&restart("b"));
        sink.publish(&restart("c"));
        let components: Vec<_> = sink
            .events()
            .iter()
            .filter_map(|e| e.component().map(str::to_string))
            .collect();
        assert_eq!(components, vec!["b", "c"]);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(restart("core-engine"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), topics::COMPONENT_RESTART);
    }

    #[test]
    fn test_event_serializes_with_topic_tag() {
        let json = serde_json::to_value(Event::NodeHealthChanged {
            node_id: "n1".into(),
            healthy: false,
        })
        .unwrap();
        assert_eq!(json["topic"], "load_balancer.node_health_changed");
        assert_eq!(json["payload"]["node_id"], "n1");
        assert_eq!(json["payload"]["healthy"], false);
    }
}
