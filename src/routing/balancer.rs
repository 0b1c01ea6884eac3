//! Node set and per-request selection.

use super::node::{LoadBalancerNode, NodeMetricsUpdate, NodeSpec};
use super::probe::{NodeHealthProbe, ThresholdProbe};
use crate::telemetry::{Event, EventBus};
use crate::{Error, ErrorContext, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    LeastResponseTime,
    #[default]
    Adaptive,
}

impl LoadBalancingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::WeightedRoundRobin => "weighted_round_robin",
            Self::LeastConnections => "least_connections",
            Self::LeastResponseTime => "least_response_time",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub strategy: LoadBalancingStrategy,
    #[serde(rename = "health_check_interval_ms", with = "crate::config::duration_ms")]
    pub health_check_interval: Duration,
    #[serde(rename = "probe_timeout_ms", with = "crate::config::duration_ms")]
    pub probe_timeout: Duration,
    /// Weight of a new response-time sample in the moving average.
    pub response_time_smoothing: f64,
    /// Adaptive score: `connections / connection_scale`.
    pub adaptive_connection_scale: f64,
    /// Adaptive score: `avg_response_time_ms / response_time_scale_ms`.
    pub adaptive_response_time_scale_ms: f64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::Adaptive,
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            response_time_smoothing: 0.2,
            adaptive_connection_scale: 10.0,
            adaptive_response_time_scale_ms: 1000.0,
        }
    }
}

impl LoadBalancerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerStats {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub total_connections: u64,
    /// Mean over healthy nodes; zero when there are none.
    pub average_response_time_ms: f64,
    pub strategy: LoadBalancingStrategy,
}

struct State {
    nodes: Vec<LoadBalancerNode>,
    cursor: usize,
    strategy: LoadBalancingStrategy,
    rng: StdRng,
}

pub struct LoadBalancer {
    config: LoadBalancerConfig,
    probe: Arc<dyn NodeHealthProbe>,
    events: Arc<EventBus>,
    state: Mutex<State>,
}

impl LoadBalancer {
    pub fn new(config: LoadBalancerConfig, events: Arc<EventBus>) -> Self {
        let strategy = config.strategy;
        Self {
            config,
            probe: Arc::new(ThresholdProbe::default()),
            events,
            state: Mutex::new(State {
                nodes: Vec::new(),
                cursor: 0,
                strategy,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    /// Replace the health predicate used by [`run_health_checks`](Self::run_health_checks).
    pub fn with_probe(mut self, probe: Arc<dyn NodeHealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Deterministic weighted selection.
    pub fn with_seed(self, seed: u64) -> Self {
        self.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_node(&self, spec: NodeSpec) -> Result<()> {
        let ctx = || {
            ErrorContext::new()
                .with_source("load_balancer")
                .with_details(format!("node '{}'", spec.id))
        };
        if spec.id.trim().is_empty() {
            return Err(Error::validation_with_context(
                "node id must not be empty",
                ctx().with_field_path("node.id"),
            ));
        }
        if !(spec.weight.is_finite() && spec.weight > 0.0) {
            return Err(Error::validation_with_context(
                format!("node weight must be positive, got {}", spec.weight),
                ctx().with_field_path("node.weight"),
            ));
        }
        if let Err(e) = url::Url::parse(&spec.endpoint) {
            return Err(Error::validation_with_context(
                format!("invalid endpoint '{}': {}", spec.endpoint, e),
                ctx().with_field_path("node.endpoint"),
            ));
        }

        let mut st = self.lock();
        if st.nodes.iter().any(|n| n.id == spec.id) {
            return Err(Error::validation_with_context(
                format!("node '{}' already exists", spec.id),
                ctx().with_field_path("node.id"),
            ));
        }
        tracing::info!(node_id = %spec.id, endpoint = %spec.endpoint, "load balancer node added");
        st.nodes.push(LoadBalancerNode::from_spec(spec));
        Ok(())
    }

    pub fn remove_node(&self, id: &str) -> bool {
        let mut st = self.lock();
        let before = st.nodes.len();
        st.nodes.retain(|n| n.id != id);
        let removed = st.nodes.len() < before;
        if removed {
            tracing::info!(node_id = %id, "load balancer node removed");
        }
        removed
    }

    /// `None` iff no node is healthy.
    pub fn select_node(&self) -> Option<LoadBalancerNode> {
        let mut st = self.lock();
        let healthy: Vec<usize> = st
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.healthy)
            .map(|(i, _)| i)
            .collect();
        if healthy.is_empty() {
            return None;
        }

        let idx = match st.strategy {
            LoadBalancingStrategy::RoundRobin => {
                let i = healthy[st.cursor % healthy.len()];
                st.cursor = st.cursor.wrapping_add(1);
                i
            }
            LoadBalancingStrategy::WeightedRoundRobin => {
                let total: f64 = healthy.iter().map(|&i| st.nodes[i].weight).sum();
                let roll = st.rng.gen::<f64>() * total;
                roulette(&st.nodes, &healthy, roll)
            }
            LoadBalancingStrategy::LeastConnections => {
                first_min(&healthy, |i| st.nodes[i].connections as f64)
            }
            LoadBalancingStrategy::LeastResponseTime => {
                first_min(&healthy, |i| st.nodes[i].avg_response_time_ms)
            }
            LoadBalancingStrategy::Adaptive => {
                first_min(&healthy, |i| self.adaptive_score(&st.nodes[i]))
            }
        };
        Some(st.nodes[idx].clone())
    }

    /// `connections/10 + avg_response_time/1000 + 1/weight` with the default scales.
    pub fn adaptive_score(&self, node: &LoadBalancerNode) -> f64 {
        node.connections as f64 / self.config.adaptive_connection_scale
            + node.avg_response_time_ms / self.config.adaptive_response_time_scale_ms
            + 1.0 / node.weight
    }

    /// Returns `false` for an unknown node.
    pub fn update_node_metrics(&self, id: &str, update: NodeMetricsUpdate) -> bool {
        let alpha = self.config.response_time_smoothing;
        let mut st = self.lock();
        let Some(node) = st.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if let Some(sample) = update.response_time_ms {
            node.avg_response_time_ms = node.avg_response_time_ms * (1.0 - alpha) + sample * alpha;
        }
        if let Some(delta) = update.connection_delta {
            let next = node.connections as i64 + delta;
            node.connections = next.max(0) as u64;
        }
        if update.error_occurred {
            node.error_count += 1;
        }
        true
    }

    /// Probe every node once, each raced against the probe timeout.
    ///
    /// Returns the number of nodes whose health flag flipped.
    pub async fn run_health_checks(&self) -> usize {
        let snapshot: Vec<LoadBalancerNode> = self.lock().nodes.clone();
        let mut verdicts = Vec::with_capacity(snapshot.len());
        for node in &snapshot {
            let verdict = match tokio::time::timeout(self.config.probe_timeout, self.probe.check(node)).await {
                Ok(Ok(healthy)) => Ok(healthy),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "probe timed out after {}ms",
                    self.config.probe_timeout.as_millis()
                )),
            };
            verdicts.push((node.id.clone(), verdict));
        }

        let mut flips = Vec::new();
        {
            let mut st = self.lock();
            for (id, verdict) in verdicts {
                // Node may have been removed while probing.
                let Some(node) = st.nodes.iter_mut().find(|n| n.id == id) else {
                    continue;
                };
                let healthy = match verdict {
                    Ok(healthy) => healthy,
                    Err(reason) => {
                        node.error_count += 1;
                        tracing::warn!(node_id = %id, error = %reason, "node health check failed");
                        false
                    }
                };
                node.last_probe = SystemTime::now();
                if node.healthy != healthy {
                    node.healthy = healthy;
                    flips.push((id, healthy));
                }
            }
        }

        for (node_id, healthy) in &flips {
            tracing::info!(node_id = %node_id, healthy, "node health status changed");
            self.events.publish(Event::NodeHealthChanged {
                node_id: node_id.clone(),
                healthy: *healthy,
            });
        }
        flips.len()
    }

    pub fn spawn_health_checks(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let lb = Arc::clone(self);
        let interval = self.config.health_check_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        lb.run_health_checks().await;
                    }
                }
            }
        })
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.lock().strategy
    }

    pub fn set_strategy(&self, strategy: LoadBalancingStrategy) {
        let mut st = self.lock();
        if st.strategy != strategy {
            tracing::info!(from = %st.strategy, to = %strategy, "load balancing strategy changed");
            st.strategy = strategy;
        }
    }

    pub fn node(&self, id: &str) -> Option<LoadBalancerNode> {
        self.lock().nodes.iter().find(|n| n.id == id).cloned()
    }

    pub fn nodes(&self) -> Vec<LoadBalancerNode> {
        self.lock().nodes.clone()
    }

    pub fn stats(&self) -> LoadBalancerStats {
        let st = self.lock();
        let healthy: Vec<&LoadBalancerNode> = st.nodes.iter().filter(|n| n.healthy).collect();
        let average_response_time_ms = if healthy.is_empty() {
            0.0
        } else {
            healthy.iter().map(|n| n.avg_response_time_ms).sum::<f64>() / healthy.len() as f64
        };
        LoadBalancerStats {
            total_nodes: st.nodes.len(),
            healthy_nodes: healthy.len(),
            total_connections: st.nodes.iter().map(|n| n.connections).sum(),
            average_response_time_ms,
            strategy: st.strategy,
        }
    }
}

/// Index with the smallest key; the earliest wins ties.
fn first_min(indices: &[usize], key: impl Fn(usize) -> f64) -> usize {
    let mut best = indices[0];
    let mut best_key = key(best);
    for &i in &indices[1..] {
        let k = key(i);
        if k < best_key {
            best = i;
            best_key = k;
        }
    }
    best
}

/// Walk `healthy` subtracting weights from `roll`; a roll left over by
/// rounding lands on the last healthy node.
fn roulette(nodes: &[LoadBalancerNode], healthy: &[usize], mut roll: f64) -> usize {
    for &i in healthy {
        roll -= nodes[i].weight;
        if roll <= 0.0 {
            return i;
        }
    }
    healthy[healthy.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{topics, InMemoryEventSink};
    use async_trait::async_trait;

    fn balancer(strategy: LoadBalancingStrategy) -> (LoadBalancer, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::default());
        let bus = Arc::new(EventBus::new().with_sink(sink.clone()));
        let lb = LoadBalancer::new(LoadBalancerConfig::new().with_strategy(strategy), bus);
        (lb, sink)
    }

    fn add(lb: &LoadBalancer, id: &str, weight: f64) {
        lb.add_node(NodeSpec::new(id, format!("http://{}.local:8080", id)).with_weight(weight))
            .unwrap();
    }

    #[test]
    fn test_least_connections_picks_idle_node() {
        let (lb, _) = balancer(LoadBalancingStrategy::LeastConnections);
        add(&lb, "A", 1.0);
        add(&lb, "B", 1.0);
        add(&lb, "C", 1.0);
        lb.update_node_metrics("A", NodeMetricsUpdate::new().connections(2));
        lb.update_node_metrics("C", NodeMetricsUpdate::new().connections(5));
        assert_eq!(lb.select_node().unwrap().id, "B");
    }

    #[test]
    fn test_round_robin_cycles_healthy_nodes() {
        let (lb, _) = balancer(LoadBalancingStrategy::RoundRobin);
        add(&lb, "a", 1.0);
        add(&lb, "b", 1.0);
        add(&lb, "c", 1.0);
        let picks: Vec<_> = (0..4).map(|_| lb.select_node().unwrap().id).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_least_response_time() {
        let (lb, _) = balancer(LoadBalancingStrategy::LeastResponseTime);
        add(&lb, "slow", 1.0);
        add(&lb, "fast", 1.0);
        lb.update_node_metrics("slow", NodeMetricsUpdate::new().response_time(500.0));
        lb.update_node_metrics("fast", NodeMetricsUpdate::new().response_time(50.0));
        assert_eq!(lb.select_node().unwrap().id, "fast");
    }

    #[test]
    fn test_adaptive_balances_load_and_weight() {
        let (lb, _) = balancer(LoadBalancingStrategy::Adaptive);
        add(&lb, "light", 1.0);
        add(&lb, "heavy", 4.0);
        // light: 0 + 0 + 1.0 ; heavy: 0 + 0 + 0.25
        assert_eq!(lb.select_node().unwrap().id, "heavy");
        lb.update_node_metrics("heavy", NodeMetricsUpdate::new().connections(10));
        // heavy: 1.0 + 0.25 = 1.25 > light 1.0
        assert_eq!(lb.select_node().unwrap().id, "light");
    }

    #[test]
    fn test_weighted_selection_follows_weights() {
        let (lb, _) = balancer(LoadBalancingStrategy::WeightedRoundRobin);
        let lb = lb.with_seed(7);
        add(&lb, "big", 9.0);
        add(&lb, "small", 1.0);
        let big = (0..1000)
            .filter(|_| lb.select_node().unwrap().id == "big")
            .count();
        assert!((820..=970).contains(&big), "big picked {} times", big);
    }

    #[test]
    fn test_roulette_overshoot_lands_on_last_healthy_node() {
        let nodes: Vec<LoadBalancerNode> = ["a", "b", "c"]
            .iter()
            .map(|id| {
                LoadBalancerNode::from_spec(
                    NodeSpec::new(*id, format!("http://{}.local", id)).with_weight(1.0),
                )
            })
            .collect();
        let healthy = [0, 2];
        assert_eq!(roulette(&nodes, &healthy, 0.5), 0);
        assert_eq!(roulette(&nodes, &healthy, 1.5), 2);
        assert_eq!(roulette(&nodes, &healthy, 2.0 + 1e-9), 2);
    }

    #[test]
    fn test_ema_and_connection_clamp() {
        let (lb, _) = balancer(LoadBalancingStrategy::Adaptive);
        add(&lb, "a", 1.0);
        lb.update_node_metrics("a", NodeMetricsUpdate::new().response_time(100.0));
        lb.update_node_metrics("a", NodeMetricsUpdate::new().response_time(100.0));
        let node = lb.node("a").unwrap();
        // 0*0.8+100*0.2 = 20 ; 20*0.8+100*0.2 = 36
        assert!((node.avg_response_time_ms - 36.0).abs() < 1e-9);

        lb.update_node_metrics("a", NodeMetricsUpdate::new().connections(3));
        lb.update_node_metrics("a", NodeMetricsUpdate::new().connections(-10).error());
        let node = lb.node("a").unwrap();
        assert_eq!(node.connections, 0);
        assert_eq!(node.error_count, 1);
        assert!(!lb.update_node_metrics("ghost", NodeMetricsUpdate::new().error()));
    }

    #[test]
    fn test_add_node_validation() {
        let (lb, _) = balancer(LoadBalancingStrategy::RoundRobin);
        assert!(lb.add_node(NodeSpec::new("x", "not a url")).is_err());
        assert!(lb
            .add_node(NodeSpec::new("x", "http://x.local").with_weight(0.0))
            .is_err());
        assert!(lb.add_node(NodeSpec::new("", "http://x.local")).is_err());
        add(&lb, "x", 1.0);
        let err = lb.add_node(NodeSpec::new("x", "http://other.local")).unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("node.id")
        );
        assert!(lb.remove_node("x"));
        assert!(!lb.remove_node("x"));
        assert!(lb.select_node().is_none());
    }

    #[tokio::test]
    async fn test_health_probe_flips_are_announced() {
        let (lb, sink) = balancer(LoadBalancingStrategy::RoundRobin);
        add(&lb, "a", 1.0);
        add(&lb, "b", 1.0);
        for _ in 0..5 {
            lb.update_node_metrics("a", NodeMetricsUpdate::new().error());
        }
        assert_eq!(lb.run_health_checks().await, 1);
        assert_eq!(sink.count(topics::NODE_HEALTH_CHANGED), 1);
        assert_eq!(lb.select_node().unwrap().id, "b");
        assert_eq!(lb.select_node().unwrap().id, "b");

        // No change, no announcement.
        assert_eq!(lb.run_health_checks().await, 0);
        assert_eq!(sink.count(topics::NODE_HEALTH_CHANGED), 1);

        let stats = lb.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.healthy_nodes, 1);
    }

    struct HangingProbe;

    #[async_trait]
    impl NodeHealthProbe for HangingProbe {
        async fn check(&self, _node: &LoadBalancerNode) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_marks_node_unhealthy() {
        let sink = Arc::new(InMemoryEventSink::default());
        let bus = Arc::new(EventBus::new().with_sink(sink.clone()));
        let lb = LoadBalancer::new(
            LoadBalancerConfig::new().with_probe_timeout(Duration::from_millis(20)),
            bus,
        )
        .with_probe(Arc::new(HangingProbe));
        add(&lb, "a", 1.0);
        assert_eq!(lb.run_health_checks().await, 1);
        let node = lb.node("a").unwrap();
        assert!(!node.healthy);
        assert_eq!(node.error_count, 1);
        assert!(lb.select_node().is_none());
        assert_eq!(sink.count(topics::NODE_HEALTH_CHANGED), 1);
    }
}
