//! Recovery actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Tag describing what a recovery action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Fallback,
    Restart,
    Isolate,
    GracefulDegradation,
    CircuitBreaker,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Fallback => "fallback",
            Self::Restart => "restart",
            Self::Isolate => "isolate",
            Self::GracefulDegradation => "graceful_degradation",
            Self::CircuitBreaker => "circuit_breaker",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executable part of a recovery action.
///
/// `Ok(true)` means recovered. `Ok(false)` and `Err(_)` both count as a failed attempt.
#[async_trait]
pub trait RecoveryProbe: Send + Sync {
    async fn attempt(&self) -> anyhow::Result<bool>;
}

/// Adapter turning an async closure into a [`RecoveryProbe`].
pub struct FnProbe<F> {
    func: F,
}

impl<F, Fut> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> RecoveryProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn attempt(&self) -> anyhow::Result<bool> {
        (self.func)().await
    }
}

/// A registered recovery step. Immutable once registered.
#[derive(Clone)]
pub struct RecoveryAction {
    pub strategy: RecoveryStrategy,
    pub timeout: Duration,
    pub priority: i32,
    pub description: String,
    probe: Arc<dyn RecoveryProbe>,
}

impl RecoveryAction {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new<P: RecoveryProbe + 'static>(strategy: RecoveryStrategy, probe: P) -> Self {
        Self {
            strategy,
            timeout: Self::DEFAULT_TIMEOUT,
            priority: 0,
            description: strategy.as_str().to_string(),
            probe: Arc::new(probe),
        }
    }

    pub fn from_fn<F, Fut>(strategy: RecoveryStrategy, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::new(strategy, FnProbe::new(func))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn probe(&self) -> Arc<dyn RecoveryProbe> {
        self.probe.clone()
    }
}

impl fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .field("priority", &self.priority)
            .field("description", &self.description)
            .finish()
    }
}
