//! 系统门面模块：组件注册、故障上报、恢复编排、错误升级与系统级恢复，以及后台任务的统一关停。
//!
//! # Resilience System
//!
//! [`ResilienceSystem`] wires the classifier, the per-component circuit
//! breakers, the recovery executor and the health tracker into one control
//! flow:
//!
//! ```text
//! report_fault ─▶ classify ─▶ record ─▶ breaker gate ─▶ recovery actions
//!                                            │                 │
//!                                     short-circuit      recovered / escalate
//!                                                                  │
//!                                                   critical ─▶ system recovery
//! ```
//!
//! System recovery is single-flight: concurrent critical escalations coalesce
//! into one routine that announces graceful degradation and resource
//! ceilings, then restarts each critical component in turn and finally the
//! component whose fault triggered it.
//!
//! ```rust,no_run
//! use adaptive_resilience::classify::{ErrorKind, Fault, FaultContext};
//! use adaptive_resilience::recovery::{RecoveryAction, RecoveryStrategy};
//! use adaptive_resilience::system::ResilienceSystem;
//!
//! # async fn run() -> adaptive_resilience::Result<()> {
//! let system = ResilienceSystem::builder().build();
//! system.register_component("cache-svc")?;
//! system.register_recovery_action(
//!     "cache-svc",
//!     ErrorKind::Timeout,
//!     RecoveryAction::from_fn(RecoveryStrategy::Retry, || async { Ok(true) }).with_priority(10),
//! );
//! system.start();
//!
//! let report = system
//!     .report_fault("cache-svc", &Fault::new("request timed out"), FaultContext::new())
//!     .await;
//! assert!(report.is_recovered());
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod core;
mod escalation;

pub use builder::ResilienceSystemBuilder;
pub use config::SystemConfig;
pub use self::core::{RecoveryOutcome, RecoveryReport, ResilienceSystem};
pub use escalation::{FnRestartHandler, RestartHandler};
