//! 负载均衡模块：维护节点集合，按策略为每个请求选择目标节点，并定期探测节点健康。
//!
//! # Load Balancing
//!
//! This module is pure bookkeeping plus a pluggable async health probe: it does
//! not open connections itself. Callers pick a node with
//! [`LoadBalancer::select_node`] and feed outcomes back through
//! [`LoadBalancer::update_node_metrics`].
//!
//! ## Strategies
//!
//! | Strategy | Picks |
//! |----------|-------|
//! | `RoundRobin` | Next healthy node in cyclic order |
//! | `WeightedRoundRobin` | Random healthy node, proportional to weight |
//! | `LeastConnections` | Fewest live connections |
//! | `LeastResponseTime` | Lowest smoothed response time |
//! | `Adaptive` | Lowest `connections/10 + avg_ms/1000 + 1/weight` |
//!
//! Ties go to the node added first.
//!
//! ```rust
//! use adaptive_resilience::routing::{
//!     LoadBalancer, LoadBalancerConfig, LoadBalancingStrategy, NodeMetricsUpdate, NodeSpec,
//! };
//! use adaptive_resilience::telemetry::EventBus;
//! use std::sync::Arc;
//!
//! let lb = LoadBalancer::new(
//!     LoadBalancerConfig::new().with_strategy(LoadBalancingStrategy::LeastConnections),
//!     Arc::new(EventBus::new()),
//! );
//! lb.add_node(NodeSpec::new("a", "http://10.0.0.1:8080")).unwrap();
//! lb.add_node(NodeSpec::new("b", "http://10.0.0.2:8080")).unwrap();
//! lb.update_node_metrics("a", NodeMetricsUpdate::new().connections(3));
//! assert_eq!(lb.select_node().unwrap().id, "b");
//! ```

mod balancer;
mod node;
mod probe;

pub use balancer::{LoadBalancer, LoadBalancerConfig, LoadBalancerStats, LoadBalancingStrategy};
pub use node::{LoadBalancerNode, NodeMetricsUpdate, NodeSpec};
pub use probe::{NodeHealthProbe, ThresholdProbe};
