//! # adaptive-resilience
//!
//! 单进程弹性与自适应性能核心：故障分类、熔断、有界恢复、健康聚合，以及根据实时性能信号调优缓存、负载均衡与资源池。
//!
//! Resilience and adaptive-performance core for a single process.
//!
//! ## Overview
//!
//! Collaborators report failing operations to a [`ResilienceSystem`]. Each
//! fault is classified into an [`ErrorKind`](classify::ErrorKind) and
//! [`Severity`](classify::Severity), gated by the component's circuit breaker,
//! handed to the registered recovery actions and, when recovery fails,
//! escalated. Critical escalations trigger one system-level recovery at a time.
//!
//! Independently, a [`PerformanceMonitor`](monitor::PerformanceMonitor)
//! samples metrics, detects threshold breaches and publishes tuning directives
//! that the owners of an [`IntelligentCache`](cache::IntelligentCache), a
//! [`LoadBalancer`](routing::LoadBalancer) or a
//! [`ResourcePoolManager`](pool::ResourcePoolManager) apply.
//!
//! ## Core Principles
//!
//! - **Explicit instances**: no process-wide singletons; every subsystem gets
//!   its collaborators (notably the shared [`EventBus`](telemetry::EventBus)) at construction
//! - **Ordered notifications**: events reach sinks synchronously in publish order
//! - **Bounded everything**: error history, metric history, cache, pools and retries
//! - **Stoppable timers**: every periodic task is tied to a cancellation token
//!   and awaited on shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adaptive_resilience::classify::{Fault, FaultContext};
//! use adaptive_resilience::telemetry::{EventBus, TracingEventSink};
//! use adaptive_resilience::ResilienceSystem;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> adaptive_resilience::Result<()> {
//!     adaptive_resilience::telemetry::init_tracing("info");
//!     let bus = Arc::new(EventBus::new().with_sink(Arc::new(TracingEventSink::default())));
//!     let system = ResilienceSystem::builder().with_event_bus(bus).build();
//!     system.register_component("memory-system")?;
//!     system.start();
//!
//!     let recovered = system
//!         .report_fault("memory-system", &Fault::new("heap exhausted"), FaultContext::new())
//!         .await
//!         .is_recovered();
//!     if !recovered {
//!         // apply the caller's own fallback
//!     }
//!
//!     system.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`classify`] | Fault kind and severity assessment |
//! | [`resilience`] | Circuit breaker state machine and per-component registry |
//! | [`recovery`] | Recovery actions, executor and error history |
//! | [`health`] | Component health tracking and system verdict |
//! | [`system`] | Facade: reporting, escalation, system recovery, shutdown |
//! | [`cache`] | Intelligent cache with LRU / LFU / TTL / Adaptive eviction |
//! | [`routing`] | Load balancer, selection strategies and node probes |
//! | [`pool`] | Bounded resource pools |
//! | [`monitor`] | Performance monitor and tuning directives |
//! | [`telemetry`] | Event bus, sinks and tracing setup |
//! | [`config`] | Aggregate YAML/JSON configuration |

pub mod cache;
pub mod classify;
pub mod config;
pub mod events;
pub mod health;
pub mod monitor;
pub mod pool;
pub mod recovery;
pub mod resilience;
pub mod routing;
pub mod system;
pub mod telemetry;

// Re-export main types for convenience
pub use config::ResilienceConfig;
pub use system::{RecoveryOutcome, RecoveryReport, ResilienceSystem, ResilienceSystemBuilder};
pub use telemetry::{Event, EventBus, EventSink};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
