//! 核心通知类型：提供 EventSink trait 与所有对外发布的事件（按主题划分）。
//!
//! Core notification types.
//!
//! Every outbound notification of the resilience core is one [`Event`] variant,
//! addressed by a dotted topic string (see [`topics`]). Delivery goes through an
//! [`EventSink`]; the fan-out bus lives in [`crate::telemetry`].

use crate::classify::Severity;
use crate::health::SystemHealth;
use crate::monitor::TuningDirective;
use crate::recovery::{ErrorRecord, RecoveryStrategy};
use serde::Serialize;
use std::sync::Arc;

/// Topic names, one per [`Event`] variant.
pub mod topics {
    pub const ERROR_RECORDED: &str = "error.recorded";
    pub const ERROR_RECOVERED: &str = "error.recovered";
    pub const ERROR_ESCALATED: &str = "error.escalated";
    pub const CIRCUIT_OPENED: &str = "circuit_breaker.opened";
    pub const CIRCUIT_HALF_OPENED: &str = "circuit_breaker.half_opened";
    pub const CIRCUIT_CLOSED: &str = "circuit_breaker.closed";
    pub const HEALTH_CHECK: &str = "system.health_check";
    pub const GRACEFUL_DEGRADATION: &str = "system.graceful_degradation";
    pub const REDUCE_RESOURCES: &str = "system.reduce_resources";
    pub const COMPONENT_RESTART: &str = "component.restart";
    pub const ALERT_GENERATED: &str = "monitoring.alert_generated";
    pub const NODE_HEALTH_CHANGED: &str = "load_balancer.node_health_changed";
}

/// Outbound notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", content = "payload")]
pub enum Event {
    #[serde(rename = "error.recorded")]
    ErrorRecorded(ErrorRecord),
    #[serde(rename = "error.recovered")]
    ErrorRecovered {
        record: ErrorRecord,
        strategy: RecoveryStrategy,
    },
    #[serde(rename = "error.escalated")]
    ErrorEscalated(ErrorRecord),
    #[serde(rename = "circuit_breaker.opened")]
    CircuitOpened {
        component: String,
        failure_count: u32,
        threshold: u32,
    },
    #[serde(rename = "circuit_breaker.half_opened")]
    CircuitHalfOpened { component: String },
    #[serde(rename = "circuit_breaker.closed")]
    CircuitClosed { component: String },
    #[serde(rename = "system.health_check")]
    HealthCheck(SystemHealth),
    #[serde(rename = "system.graceful_degradation")]
    GracefulDegradation { disable_features: Vec<String> },
    #[serde(rename = "system.reduce_resources")]
    ReduceResources { max_memory_pct: u8, max_cpu_pct: u8 },
    #[serde(rename = "component.restart")]
    ComponentRestart { component: String },
    #[serde(rename = "monitoring.alert_generated")]
    AlertGenerated(TuningDirective),
    #[serde(rename = "load_balancer.node_health_changed")]
    NodeHealthChanged { node_id: String, healthy: bool },
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::ErrorRecorded(_) => topics::ERROR_RECORDED,
            Event::ErrorRecovered { .. } => topics::ERROR_RECOVERED,
            Event::ErrorEscalated(_) => topics::ERROR_ESCALATED,
            Event::CircuitOpened { .. } => topics::CIRCUIT_OPENED,
            Event::CircuitHalfOpened { .. } => topics::CIRCUIT_HALF_OPENED,
            Event::CircuitClosed { .. } => topics::CIRCUIT_CLOSED,
            Event::HealthCheck(_) => topics::HEALTH_CHECK,
            Event::GracefulDegradation { .. } => topics::GRACEFUL_DEGRADATION,
            Event::ReduceResources { .. } => topics::REDUCE_RESOURCES,
            Event::ComponentRestart { .. } => topics::COMPONENT_RESTART,
            Event::AlertGenerated(_) => topics::ALERT_GENERATED,
            Event::NodeHealthChanged { .. } => topics::NODE_HEALTH_CHANGED,
        }
    }

    /// Component the event is about, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            Event::ErrorRecorded(r) | Event::ErrorEscalated(r) => Some(&r.component),
            Event::ErrorRecovered { record, .. } => Some(&record.component),
            Event::CircuitOpened { component, .. }
            | Event::CircuitHalfOpened { component }
            | Event::CircuitClosed { component }
            | Event::ComponentRestart { component } => Some(component),
            _ => None,
        }
    }

    /// Severity carried by error events.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Event::ErrorRecorded(r) | Event::ErrorEscalated(r) => Some(r.severity),
            Event::ErrorRecovered { record, .. } => Some(record.severity),
            _ => None,
        }
    }
}

/// Destination for published events.
///
/// Delivery is synchronous and in publish order; implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &Event);
}

/// Sink that drops everything.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: &Event) {}
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoopEventSink)
}
