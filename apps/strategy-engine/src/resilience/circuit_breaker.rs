//! Circuit breaker wrapping every call to the upstream broker API.
//!
//! Prevents hammering a failing brokerage: after enough consecutive
//! failures the circuit opens and calls fail fast until a recovery
//! window has passed.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures >= threshold)
//! OPEN → HALF_OPEN (recovery timeout elapsed; observed lazily on read)
//! HALF_OPEN → CLOSED (probe call succeeds; failure counter resets)
//! HALF_OPEN → OPEN (probe call fails; recovery timer restarts)
//! ```
//!
//! There is no background timer: the OPEN → HALF_OPEN transition happens
//! on the next state observation after the timeout. The breaker records
//! outcomes and never retries; retry policy belongs to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// The next call probes the upstream.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time to stay open before probing again.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Error from a breaker-wrapped call.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the wrapped call was never made.
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Breaker name.
        name: String,
    },

    /// The wrapped call ran and failed; the failure has been recorded.
    #[error(transparent)]
    Inner(E),
}

/// Mutable breaker state behind one lock.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Consecutive failures while closed.
    failure_count: u32,
    /// Successes since the last reset (for observability).
    success_count: u64,
    /// When the circuit last opened.
    last_failure: Option<Instant>,
}

/// Circuit breaker for upstream broker calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Service name for logging.
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    state_transitions: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Get the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state, applying the lazy OPEN → HALF_OPEN
    /// transition when the recovery timeout has elapsed.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.check_recovery();
        self.inner.read().state
    }

    /// Check if a call is permitted right now.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Run a unit of work through the breaker, recording its outcome.
    ///
    /// # Errors
    ///
    /// [`CircuitBreakerError::Open`] when the circuit rejects the call
    /// without executing it; [`CircuitBreakerError::Inner`] when the
    /// wrapped future fails.
    pub async fn call<T, E, F>(&self, work: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.is_call_permitted() {
            return Err(CircuitBreakerError::Open {
                name: self.name.clone(),
            });
        }

        match work.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.write();
        inner.success_count += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Closed);
                inner.failure_count = 0;
                inner.last_failure = None;
            }
            CircuitState::Open => {
                // Calls should have been rejected while open.
                tracing::warn!(name = %self.name, "Success recorded while circuit is OPEN");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.write();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // The probe failed; recovery timer restarts from now.
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {
                tracing::warn!(name = %self.name, "Failure recorded while circuit is OPEN");
            }
        }
    }

    /// Apply the lazy OPEN → HALF_OPEN transition.
    fn check_recovery(&self) {
        let needs_probe = {
            let inner = self.inner.read();
            inner.state == CircuitState::Open
                && inner
                    .last_failure
                    .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout)
        };

        if needs_probe {
            let mut inner = self.inner.write();
            // Re-check under the write lock.
            if inner.state == CircuitState::Open
                && inner
                    .last_failure
                    .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout)
            {
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.state_transitions.fetch_add(1, Ordering::Relaxed);

        match to {
            CircuitState::Open => tracing::warn!(
                name = %self.name,
                from = %from,
                to = %to,
                failures = inner.failure_count,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen | CircuitState::Closed => tracing::info!(
                name = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker transitioned"
            ),
        }
    }

    /// Force the circuit open (for testing or emergency stop).
    pub fn force_open(&self) {
        let mut inner = self.inner.write();
        inner.last_failure = Some(Instant::now());
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Force the circuit closed (for testing or manual recovery).
    pub fn force_close(&self) {
        let mut inner = self.inner.write();
        inner.failure_count = 0;
        inner.last_failure = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Snapshot of the breaker's counters.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state();
        let inner = self.inner.read();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state,
            failure_count: inner.failure_count,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
        }
    }
}

/// Observability snapshot of a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Current consecutive-failure count.
    pub failure_count: u32,
    /// Total calls recorded.
    pub total_calls: u64,
    /// Total failures recorded.
    pub total_failures: u64,
    /// Number of state transitions.
    pub state_transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
        }
    }

    #[derive(Debug, PartialEq)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn initial_state_is_closed() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_call_permitted());
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", quick_config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_call_permitted());
    }

    #[test]
    fn success_resets_the_consecutive_count() {
        let breaker = CircuitBreaker::new("test", quick_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        // Never three in a row.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_calling() {
        let breaker = CircuitBreaker::new("test", quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        let invocations = AtomicU32::new(0);
        let result: Result<(), _> = breaker
            .call(async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TestError>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn half_open_after_recovery_timeout_then_closes_on_success() {
        let breaker = CircuitBreaker::new("test", quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.is_call_permitted());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().failure_count, 0);
    }

    #[test]
    fn half_open_failure_reopens_and_restarts_timer() {
        let breaker = CircuitBreaker::new("test", quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // The timer restarted; still open right after the probe failure.
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn call_records_success_and_failure() {
        let breaker = CircuitBreaker::new("test", quick_config());

        let ok: Result<u32, _> = breaker.call(async { Ok::<u32, TestError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32, _> = breaker.call(async { Err::<u32, _>(TestError) }).await;
        assert!(matches!(err, Err(CircuitBreakerError::Inner(TestError))));

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.total_failures, 1);
    }

    #[test]
    fn force_open_and_close() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn transitions_are_counted() {
        let breaker = CircuitBreaker::new("test", quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        let _ = breaker.state();
        breaker.record_success();

        // CLOSED → OPEN → HALF_OPEN → CLOSED.
        assert_eq!(breaker.metrics().state_transitions, 3);
    }
}
