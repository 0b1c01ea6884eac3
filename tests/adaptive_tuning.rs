use adaptive_resilience::cache::{CacheConfig, EvictionStrategy, IntelligentCache};
use adaptive_resilience::monitor::{
    Breach, DirectiveDispatcher, MetricsUpdate, Mitigation, MonitorConfig, PerformanceMonitor,
};
use adaptive_resilience::pool::{FnFactory, ResourcePoolManager};
use adaptive_resilience::routing::{
    LoadBalancer, LoadBalancerConfig, LoadBalancingStrategy, NodeMetricsUpdate, NodeSpec,
};
use adaptive_resilience::telemetry::{topics, EventBus, InMemoryEventSink};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Rig {
    monitor: Arc<PerformanceMonitor>,
    cache: Arc<IntelligentCache<String>>,
    balancer: Arc<LoadBalancer>,
    pools: Arc<ResourcePoolManager<u32>>,
    sink: Arc<InMemoryEventSink>,
}

fn rig() -> Rig {
    let cache = Arc::new(IntelligentCache::new(
        CacheConfig::new()
            .with_max_size(10)
            .with_max_growth_size(40)
            .with_strategy(EvictionStrategy::Lru),
    ));
    let pools: Arc<ResourcePoolManager<u32>> = Arc::new(ResourcePoolManager::new());
    pools
        .create_pool("workers", 2, Arc::new(FnFactory::new(|| async { Ok::<_, anyhow::Error>(1u32) })))
        .unwrap();

    let sink = Arc::new(InMemoryEventSink::default());
    let bus = Arc::new(EventBus::new().with_sink(sink.clone()));
    let balancer = Arc::new(
        LoadBalancer::new(LoadBalancerConfig::default(), bus.clone()).with_seed(7),
    );
    let dispatcher = DirectiveDispatcher::new()
        .with_target(cache.clone())
        .with_target(balancer.clone())
        .with_target(pools.clone());
    bus.add_sink(Arc::new(dispatcher));

    let monitor = Arc::new(PerformanceMonitor::new(MonitorConfig::default(), bus));
    Rig {
        monitor,
        cache,
        balancer,
        pools,
        sink,
    }
}

#[tokio::test]
async fn slow_responses_grow_cache_scale_pools_and_switch_balancer() {
    let rig = rig();
    let directives = rig
        .monitor
        .update_metrics(MetricsUpdate::new().response_time_ms(1800.0));

    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].breach, Breach::SlowResponse);
    assert!(directives[0].calls_for(Mitigation::ScaleResources));
    assert_eq!(rig.sink.count(topics::ALERT_GENERATED), 1);

    assert_eq!(rig.cache.max_size(), 20);
    assert_eq!(rig.balancer.strategy(), LoadBalancingStrategy::LeastResponseTime);
    assert_eq!(rig.pools.pool_stats("workers").unwrap().max_size, 4);

    // Growth stops at the configured ceilings.
    rig.monitor.update_metrics(MetricsUpdate::new());
    rig.monitor.update_metrics(MetricsUpdate::new());
    assert_eq!(rig.cache.max_size(), 40);
    assert_eq!(rig.pools.pool_stats("workers").unwrap().max_size, 4);
}

#[tokio::test]
async fn memory_pressure_clears_cache_and_low_hit_rate_switches_strategy() {
    let rig = rig();
    rig.cache.set("a", "1".to_string());
    rig.cache.set("b", "2".to_string());

    rig.monitor
        .update_metrics(MetricsUpdate::new().memory_usage(0.92));
    assert!(rig.cache.is_empty());
    assert_eq!(rig.cache.max_size(), 10);

    let directives = rig.monitor.update_metrics(
        MetricsUpdate::new()
            .memory_usage(0.3)
            .cache_hit_rate(0.35),
    );
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].breach, Breach::LowCacheHitRate);
    assert_eq!(rig.cache.strategy(), EvictionStrategy::Adaptive);
    assert_eq!(rig.cache.max_size(), 20);
    assert_eq!(rig.balancer.strategy(), LoadBalancingStrategy::Adaptive);
}

#[tokio::test]
async fn sampling_reads_registered_sources() {
    let rig = rig();
    rig.balancer
        .add_node(NodeSpec::new("a", "http://10.0.0.1:8080"))
        .unwrap();
    rig.balancer
        .update_node_metrics("a", NodeMetricsUpdate::new().connections(3).response_time(100.0));

    rig.cache.set("k", "v".to_string());
    rig.cache.get("k");
    rig.cache.get("k");
    rig.cache.get("k");

    rig.monitor.add_source(rig.cache.clone());
    rig.monitor.add_source(rig.balancer.clone());

    let directives = rig.monitor.sample();
    assert!(directives.is_empty());
    let current = rig.monitor.current();
    assert_eq!(current.active_connections, 3);
    assert!(current.cache_hit_rate >= 0.7);
    assert!(current.response_time_ms > 0.0);

    let sampler = Arc::new(PerformanceMonitor::new(
        MonitorConfig::new().with_sample_interval(Duration::from_millis(10)),
        Arc::new(EventBus::new()),
    ));
    sampler.add_source(rig.balancer.clone());
    let token = CancellationToken::new();
    let handle = sampler.spawn_sampling(token.clone());
    tokio::time::sleep(Duration::from_millis(35)).await;
    token.cancel();
    handle.await.unwrap();
    assert!(sampler.history_len() >= 1);
    assert_eq!(sampler.current().active_connections, 3);
}

#[tokio::test]
async fn report_carries_recommendations() {
    let rig = rig();
    rig.monitor.update_metrics(
        MetricsUpdate::new()
            .response_time_ms(1500.0)
            .error_rate(0.2)
            .cache_hit_rate(0.6),
    );
    let report = rig.monitor.report();
    assert_eq!(report.samples, 1);
    assert_eq!(
        report.recommendations,
        vec![
            "Consider scaling resources or optimizing queries".to_string(),
            "Optimize caching strategy or increase cache size".to_string(),
            "Investigate error sources and implement circuit breakers".to_string(),
        ]
    );
}
