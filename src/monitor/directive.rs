//! Tuning directives and the owners that apply them.

use crate::cache::{EvictionStrategy, IntelligentCache};
use crate::pool::ResourcePoolManager;
use crate::routing::{LoadBalancer, LoadBalancingStrategy};
use crate::telemetry::{Event, EventSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Which threshold was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breach {
    SlowResponse,
    HighErrorRate,
    HighCpu,
    HighMemory,
    LowCacheHitRate,
}

impl Breach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlowResponse => "slow_response",
            Self::HighErrorRate => "high_error_rate",
            Self::HighCpu => "high_cpu",
            Self::HighMemory => "high_memory",
            Self::LowCacheHitRate => "low_cache_hit_rate",
        }
    }
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete remediation named by a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mitigation {
    IncreaseCacheSize,
    OptimizeQueries,
    ScaleResources,
    EnableCircuitBreaker,
    FallbackMode,
    HealthCheck,
    ReduceBackgroundTasks,
    OptimizeAlgorithms,
    ScaleHorizontally,
    ClearCache,
    GarbageCollection,
    MemoryLeakCheck,
    AdjustCacheStrategy,
}

/// Published on `monitoring.alert_generated`. The monitor never applies it itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningDirective {
    pub breach: Breach,
    pub observed: f64,
    pub threshold: f64,
    pub mitigations: Vec<Mitigation>,
}

impl TuningDirective {
    pub fn calls_for(&self, mitigation: Mitigation) -> bool {
        self.mitigations.contains(&mitigation)
    }
}

/// Owner of a tunable structure.
pub trait TuningTarget: Send + Sync {
    fn apply_directive(&self, directive: &TuningDirective);
}

impl<T> TuningTarget for IntelligentCache<T>
where
    T: Clone + Serialize + Send + 'static,
{
    fn apply_directive(&self, directive: &TuningDirective) {
        if directive.calls_for(Mitigation::ClearCache) {
            self.clear();
            tracing::info!(breach = %directive.breach, "cache cleared");
        }
        if directive.calls_for(Mitigation::IncreaseCacheSize) {
            let current = self.max_size();
            let target = current.saturating_mul(2).min(self.max_growth_size());
            if target > current {
                self.resize(target);
            }
        }
        if directive.calls_for(Mitigation::AdjustCacheStrategy) {
            self.set_strategy(EvictionStrategy::Adaptive);
        }
    }
}

impl TuningTarget for LoadBalancer {
    fn apply_directive(&self, directive: &TuningDirective) {
        if directive.breach == Breach::SlowResponse {
            self.set_strategy(LoadBalancingStrategy::LeastResponseTime);
        }
    }
}

impl<T> TuningTarget for ResourcePoolManager<T>
where
    T: Send + Sync + 'static,
{
    fn apply_directive(&self, directive: &TuningDirective) {
        if directive.calls_for(Mitigation::ScaleResources) {
            self.expand_all();
        }
    }
}

/// Event sink forwarding every directive to its registered targets, in order.
pub struct DirectiveDispatcher {
    targets: RwLock<Vec<Arc<dyn TuningTarget>>>,
}

impl DirectiveDispatcher {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(Vec::new()),
        }
    }

    pub fn with_target(self, target: Arc<dyn TuningTarget>) -> Self {
        self.add_target(target);
        self
    }

    pub fn add_target(&self, target: Arc<dyn TuningTarget>) {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target);
    }

    pub fn target_count(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn dispatch(&self, directive: &TuningDirective) {
        let targets: Vec<Arc<dyn TuningTarget>> = self
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for target in targets {
            target.apply_directive(directive);
        }
    }
}

impl Default for DirectiveDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for DirectiveDispatcher {
    fn publish(&self, event: &Event) {
        if let Event::AlertGenerated(directive) = event {
            self.dispatch(directive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::routing::LoadBalancerConfig;
    use crate::telemetry::EventBus;

    fn directive(breach: Breach, mitigations: Vec<Mitigation>) -> TuningDirective {
        TuningDirective {
            breach,
            observed: 0.0,
            threshold: 0.0,
            mitigations,
        }
    }

    #[test]
    fn test_cache_growth_is_capped() {
        let cache: IntelligentCache<u32> = IntelligentCache::new(
            CacheConfig::new()
                .with_max_size(10)
                .with_max_growth_size(30)
                .with_strategy(EvictionStrategy::Lru),
        );
        let grow = directive(Breach::SlowResponse, vec![Mitigation::IncreaseCacheSize]);
        cache.apply_directive(&grow);
        assert_eq!(cache.max_size(), 20);
        cache.apply_directive(&grow);
        assert_eq!(cache.max_size(), 30);
        cache.apply_directive(&grow);
        assert_eq!(cache.max_size(), 30);

        cache.apply_directive(&directive(
            Breach::LowCacheHitRate,
            vec![Mitigation::AdjustCacheStrategy],
        ));
        assert_eq!(cache.strategy(), EvictionStrategy::Adaptive);
    }

    #[test]
    fn test_dispatcher_ignores_other_events() {
        let cache: Arc<IntelligentCache<u32>> = Arc::new(IntelligentCache::default());
        cache.set("k", 1);
        let dispatcher = DirectiveDispatcher::new().with_target(cache.clone());
        dispatcher.publish(&Event::ComponentRestart {
            component: "x".into(),
        });
        assert_eq!(cache.len(), 1);
        dispatcher.publish(&Event::AlertGenerated(directive(
            Breach::HighMemory,
            vec![Mitigation::ClearCache],
        )));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_balancer_switches_on_slow_response_only() {
        let lb = LoadBalancer::new(LoadBalancerConfig::default(), Arc::new(EventBus::new()));
        lb.apply_directive(&directive(Breach::HighCpu, vec![]));
        assert_eq!(lb.strategy(), LoadBalancingStrategy::Adaptive);
        lb.apply_directive(&directive(Breach::SlowResponse, vec![]));
        assert_eq!(lb.strategy(), LoadBalancingStrategy::LeastResponseTime);
    }
}
