//! 性能监控模块：采样运行指标、对照阈值检测越界，并发布调优指令供缓存、负载均衡与资源池应用。
//!
//! # Performance Monitoring
//!
//! The monitor only *issues* [`TuningDirective`]s (topic
//! `monitoring.alert_generated`); it never resizes anything itself. Owners of
//! tunable structures implement [`TuningTarget`] and are reached through a
//! [`DirectiveDispatcher`] registered as a sink on the event bus.
//!
//! | Breach | Default threshold | Mitigations |
//! |--------|-------------------|-------------|
//! | Slow response | > 1000 ms | grow cache, optimize queries, scale resources |
//! | High error rate | > 5% | circuit breaker, fallback mode, health check |
//! | High CPU | > 80% | reduce background tasks, optimize algorithms, scale out |
//! | High memory | > 85% | clear cache, GC, leak check |
//! | Low cache hit rate | < 70% | grow cache (+ adaptive strategy below 50%) |
//!
//! ```rust
//! use adaptive_resilience::monitor::{MetricsUpdate, MonitorConfig, PerformanceMonitor};
//! use adaptive_resilience::telemetry::EventBus;
//! use std::sync::Arc;
//!
//! let monitor = PerformanceMonitor::new(MonitorConfig::default(), Arc::new(EventBus::new()));
//! let directives = monitor.update_metrics(MetricsUpdate::new().memory_usage(0.95));
//! assert_eq!(directives.len(), 1);
//! ```

mod directive;
mod performance;
mod snapshot;

pub use directive::{Breach, DirectiveDispatcher, Mitigation, TuningDirective, TuningTarget};
pub use performance::{
    MonitorConfig, PerformanceMonitor, PerformanceReport, Thresholds, Trends,
};
pub use snapshot::{MetricsSource, MetricsUpdate, PerformanceSnapshot};
