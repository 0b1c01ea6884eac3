use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// What a caller supplies to register a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub endpoint: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Live view of one backend node.
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerNode {
    pub id: String,
    pub endpoint: String,
    pub weight: f64,
    pub connections: u64,
    /// Exponentially smoothed, in milliseconds.
    pub avg_response_time_ms: f64,
    pub error_count: u64,
    pub healthy: bool,
    pub last_probe: SystemTime,
}

impl LoadBalancerNode {
    pub(crate) fn from_spec(spec: NodeSpec) -> Self {
        Self {
            id: spec.id,
            endpoint: spec.endpoint,
            weight: spec.weight,
            connections: 0,
            avg_response_time_ms: 0.0,
            error_count: 0,
            healthy: true,
            last_probe: SystemTime::now(),
        }
    }
}

/// Outcome feedback for one node; every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeMetricsUpdate {
    pub response_time_ms: Option<f64>,
    pub connection_delta: Option<i64>,
    pub error_occurred: bool,
}

impl NodeMetricsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_time(mut self, ms: f64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn connections(mut self, delta: i64) -> Self {
        self.connection_delta = Some(delta);
        self
    }

    pub fn error(mut self) -> Self {
        self.error_occurred = true;
        self
    }
}
