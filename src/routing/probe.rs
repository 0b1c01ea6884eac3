use super::node::LoadBalancerNode;
use async_trait::async_trait;

/// Decides whether a node is fit to receive traffic.
///
/// `Err` is treated as unhealthy and also counts as a node error.
#[async_trait]
pub trait NodeHealthProbe: Send + Sync {
    async fn check(&self, node: &LoadBalancerNode) -> anyhow::Result<bool>;
}

/// Healthy iff `error_count < max_errors` and `connections < max_connections`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdProbe {
    pub max_errors: u64,
    pub max_connections: u64,
}

impl Default for ThresholdProbe {
    fn default() -> Self {
        Self {
            max_errors: 5,
            max_connections: 100,
        }
    }
}

impl ThresholdProbe {
    pub fn is_healthy(&self, node: &LoadBalancerNode) -> bool {
        node.error_count < self.max_errors && node.connections < self.max_connections
    }
}

#[async_trait]
impl NodeHealthProbe for ThresholdProbe {
    async fn check(&self, node: &LoadBalancerNode) -> anyhow::Result<bool> {
        Ok(self.is_healthy(node))
    }
}
