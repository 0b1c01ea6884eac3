//! 熔断模块：为每个已注册组件提供 CLOSED/OPEN/HALF_OPEN 三态熔断器。
//!
//! # Circuit Breaking
//!
//! One breaker per registered component gates recovery work for that component.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Three-state breaker with decaying failure counter |
//! | [`breakers`] | Per-component registry that announces state transitions |
//!
//! ## States
//!
//! - **Closed**: calls pass; each success decays the failure counter by one
//! - **Open**: calls are refused until the timeout has passed since the last failure
//! - **Half-Open**: a bounded number of trial calls decide whether to close again
//!
//! ```rust
//! use adaptive_resilience::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//!
//! if breaker.allow_request() {
//!     // Make the call...
//!     breaker.record_success();
//! }
//! ```

pub mod breakers;
pub mod circuit_breaker;

pub use breakers::{CircuitBreakerRegistry, CircuitBreakerStatus};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState, CircuitTransition,
};
