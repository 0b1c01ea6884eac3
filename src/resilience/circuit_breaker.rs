use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// A state change produced by [`CircuitBreaker::allow`] or [`CircuitBreaker::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    Opened { failure_count: u32 },
    HalfOpened,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_max_calls: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(rename = "timeout_ms", with = "crate::config::duration_ms")]
    pub timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set how long the breaker stays open after the last failure
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of trial calls (and required successes) while half-open
    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls.max(1);
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    success_count: u32,
    half_open_calls: u32,
}

/// Three-state circuit breaker.
///
/// - Closed: failures accumulate; each success decays the counter by one
/// - Open: every call is refused until `timeout` has passed since the last failure
/// - Half-open: up to `half_open_max_calls` trial calls; that many successes close it,
///   any failure reopens it
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                success_count: 0,
                half_open_calls: 0,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gate check. Returns whether the call may proceed, plus any transition it caused.
    pub fn allow(&self) -> (bool, Option<CircuitTransition>) {
        let mut st = self.lock();
        let mut transition = None;

        if st.state == CircuitState::Open {
            let cooled = st
                .last_failure
                .map_or(true, |at| at.elapsed() >= self.cfg.timeout);
            if !cooled {
                return (false, None);
            }
            st.state = CircuitState::HalfOpen;
            st.success_count = 0;
            st.half_open_calls = 0;
            transition = Some(CircuitTransition::HalfOpened);
        }

        match st.state {
            CircuitState::Closed => (true, transition),
            CircuitState::HalfOpen => {
                if st.half_open_calls < self.cfg.half_open_max_calls {
                    st.half_open_calls += 1;
                    (true, transition)
                } else {
                    (false, transition)
                }
            }
            CircuitState::Open => (false, transition),
        }
    }

    /// Feed the outcome of a call back into the state machine.
    pub fn record(&self, success: bool) -> Option<CircuitTransition> {
        let mut st = self.lock();
        match (st.state, success) {
            (CircuitState::Closed, true) => {
                st.failure_count = st.failure_count.saturating_sub(1);
                None
            }
            (CircuitState::Closed, false) => {
                st.failure_count = st.failure_count.saturating_add(1);
                st.last_failure = Some(Instant::now());
                if st.failure_count >= self.cfg.failure_threshold {
                    st.state = CircuitState::Open;
                    Some(CircuitTransition::Opened {
                        failure_count: st.failure_count,
                    })
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, true) => {
                st.success_count += 1;
                if st.success_count >= self.cfg.half_open_max_calls {
                    st.state = CircuitState::Closed;
                    st.failure_count = 0;
                    st.success_count = 0;
                    st.half_open_calls = 0;
                    Some(CircuitTransition::Closed)
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, false) => {
                st.failure_count = st.failure_count.saturating_add(1);
                st.last_failure = Some(Instant::now());
                st.state = CircuitState::Open;
                st.success_count = 0;
                st.half_open_calls = 0;
                Some(CircuitTransition::Opened {
                    failure_count: st.failure_count,
                })
            }
            // Late outcome of a call admitted before the breaker opened.
            (CircuitState::Open, true) => None,
            (CircuitState::Open, false) => {
                st.failure_count = st.failure_count.saturating_add(1);
                st.last_failure = Some(Instant::now());
                None
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Check if a request is allowed, discarding transition details
    pub fn allow_request(&self) -> bool {
        self.allow().0
    }

    /// Record a success
    pub fn record_success(&self) -> Option<CircuitTransition> {
        self.record(true)
    }

    /// Record a failure
    pub fn record_failure(&self) -> Option<CircuitTransition> {
        self.record(false)
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = at.elapsed();
                if elapsed < self.cfg.timeout {
                    Some((self.cfg.timeout - elapsed).as_millis() as u64)
                } else {
                    Some(0)
                }
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            timeout_ms: self.cfg.timeout.as_millis() as u64,
            failure_count: st.failure_count,
            success_count: st.success_count,
            half_open_max_calls: self.cfg.half_open_max_calls,
            open_remaining_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn breaker(threshold: u32, timeout_ms: u64, half_open: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_half_open_max_calls(half_open),
        )
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_max_calls, 3);
    }

    #[test]
    fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        assert!(cb.allow_request());
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.open_remaining_ms.is_none());
    }

    #[test]
    fn test_success_decays_failures_by_one() {
        let cb = breaker(5, 1000, 3);
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.snapshot().failure_count, 3);
        cb.record_success();
        assert_eq!(cb.snapshot().failure_count, 2);
        cb.record_success();
        cb.record_success();
        cb.record_success();
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[test]
    fn test_opens_at_threshold_and_refuses_until_timeout() {
        let cb = breaker(5, 80, 3);
        for _ in 0..4 {
            assert_eq!(cb.record_failure(), None);
        }
        assert!(cb.allow_request());
        assert_eq!(
            cb.record_failure(),
            Some(CircuitTransition::Opened { failure_count: 5 })
        );
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.allow(), (false, None));
        assert!(cb.snapshot().open_remaining_ms.is_some());

        thread::sleep(Duration::from_millis(100));
        assert_eq!(cb.allow(), (true, Some(CircuitTransition::HalfOpened)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_successes_close_and_reset() {
        let cb = breaker(2, 20, 3);
        cb.record_failure();
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));

        for i in 0..3 {
            assert!(cb.allow_request(), "trial call {} should be admitted", i);
        }
        // Budget of trial calls is exhausted until outcomes arrive.
        assert!(!cb.allow_request());

        assert_eq!(cb.record_success(), None);
        assert_eq!(cb.record_success(), None);
        assert_eq!(cb.record_success(), Some(CircuitTransition::Closed));
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 20, 3);
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));
        assert!(cb.allow_request());
        cb.record_success();
        assert!(matches!(
            cb.record_failure(),
            Some(CircuitTransition::Opened { .. })
        ));
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.success_count, 0);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_circuit_breaker_thread_safe() {
        use std::sync::Arc;

        let cb = Arc::new(breaker(100, 1000, 3));
        let mut handles = vec![];
        for _ in 0..10 {
            let cb_clone = Arc::clone(&cb);
            handles.push(thread::spawn(move || {
                for _ in 0..5 {
                    cb_clone.record_failure();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.snapshot().failure_count, 50);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
