//! # Circuit Breaker Implementation
//!
//! Per-backend health gate following the classic three-state pattern:
//! Closed (normal operation), Open (failing fast), and Half-Open (testing
//! recovery). The orchestrator asks `allow` before each backend call and
//! reports the outcome with `record_success` / `record_failure` exactly
//! once per attempt; the call itself stays outside the breaker because a
//! response that fails semantic validation must count as a failure even
//! though the transport succeeded.

use crate::resilience::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited probe calls allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Default to the safest state
            _ => CircuitState::Open,
        }
    }
}

/// Read-only copy of a breaker's state and lifetime counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// Seconds until an open circuit will probe again; zero otherwise.
    pub retry_after_secs: u64,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
}

#[derive(Debug, Default)]
struct BreakerInner {
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_probes: u32,
    opened_at: Option<Instant>,
    opened_at_utc: Option<DateTime<Utc>>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejected: u64,
}

/// Core circuit breaker with atomic state management.
///
/// The state byte is atomic for cheap reads; every transition happens under
/// the inner mutex so two concurrent failures cannot race past the
/// threshold.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            backend = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            timeout_seconds = config.timeout.as_secs(),
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Should a call be attempted right now?
    ///
    /// Open circuits auto-transition to half-open once the timeout has
    /// elapsed; half-open circuits admit a bounded number of probes.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed_timeout = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed_timeout {
                    self.transition_to_half_open(&mut inner);
                    inner.half_open_probes += 1;
                    true
                } else {
                    inner.total_rejected += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes < self.config.success_threshold {
                    inner.half_open_probes += 1;
                    true
                } else {
                    inner.total_rejected += 1;
                    false
                }
            }
        }
    }

    /// Non-consuming preview of [`allow`](Self::allow), used for
    /// routing-time filtering. Spending the half-open probe budget (and the
    /// open→half-open transition) is deferred to the call-time `allow`.
    pub fn would_allow(&self) -> bool {
        let inner = self.inner.lock();
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => inner
                .opened_at
                .map(|t| t.elapsed() >= self.config.timeout)
                .unwrap_or(true),
            CircuitState::HalfOpen => inner.half_open_probes < self.config.success_threshold,
        }
    }

    /// Time until an open circuit will admit a probe. `None` unless open.
    pub fn retry_after(&self) -> Option<Duration> {
        if self.state() != CircuitState::Open {
            return None;
        }
        let inner = self.inner.lock();
        inner
            .opened_at
            .map(|t| self.config.timeout.saturating_sub(t.elapsed()))
    }

    /// Record a successful call. Must be paired 1:1 with an allowed attempt.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_successes += 1;
        inner.consecutive_failures = 0;

        match self.state() {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                debug!(
                    backend = %self.name,
                    successes = inner.half_open_successes,
                    threshold = self.config.success_threshold,
                    "🟢 Half-open probe succeeded"
                );
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition_to_closed(&mut inner);
                }
            }
            CircuitState::Closed => {}
            CircuitState::Open => {
                // Late success after the circuit opened; counters updated above.
                warn!(backend = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed call (transport error, timeout, or validation
    /// failure). Must be paired 1:1 with an allowed attempt.
    pub fn record_failure(&self, reason: &str) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_failures += 1;
        inner.consecutive_failures += 1;

        warn!(
            backend = %self.name,
            reason = %reason,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            "🔴 Backend call failed"
        );

        match self.state() {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure during recovery testing reopens immediately.
                self.transition_to_open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    /// Force closed and zero counters. Administrative override.
    pub fn reset(&self) {
        info!(backend = %self.name, "🚨 Circuit breaker manually reset");
        let mut inner = self.inner.lock();
        self.transition_to_closed(&mut inner);
    }

    /// Force the circuit open. Administrative override.
    pub fn force_open(&self) {
        warn!(backend = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.transition_to_open(&mut inner);
    }

    /// Read-only copy of the current state and counters.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let state = self.state();
        let retry_after_secs = match (state, inner.opened_at) {
            (CircuitState::Open, Some(t)) => {
                self.config.timeout.saturating_sub(t.elapsed()).as_secs()
            }
            _ => 0,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            opened_at: inner.opened_at_utc,
            retry_after_secs,
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejected: inner.total_rejected,
        }
    }

    fn transition_to_closed(&self, inner: &mut BreakerInner) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.half_open_probes = 0;
        inner.opened_at = None;
        inner.opened_at_utc = None;

        info!(
            backend = %self.name,
            total_calls = inner.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self, inner: &mut BreakerInner) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        inner.opened_at = Some(Instant::now());
        inner.opened_at_utc = Some(Utc::now());
        inner.half_open_successes = 0;
        inner.half_open_probes = 0;

        error!(
            backend = %self.name,
            consecutive_failures = inner.consecutive_failures,
            timeout_seconds = self.config.timeout.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self, inner: &mut BreakerInner) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        inner.half_open_successes = 0;
        inner.half_open_probes = 0;

        info!(
            backend = %self.name,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failures: u32, successes: u32, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn starts_closed_and_allows() {
        let circuit = CircuitBreaker::new("test".to_string(), config(3, 2, 100));
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.allow());
    }

    #[test]
    fn opens_exactly_at_failure_threshold() {
        let circuit = CircuitBreaker::new("test".to_string(), config(3, 2, 60_000));

        circuit.record_failure("boom");
        circuit.record_failure("boom");
        assert_eq!(circuit.state(), CircuitState::Closed);

        circuit.record_failure("boom");
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.allow());
        assert!(circuit.retry_after().unwrap() > Duration::ZERO);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new("test".to_string(), config(2, 2, 60_000));

        circuit.record_failure("boom");
        circuit.record_success();
        circuit.record_failure("boom");
        // Never two consecutive, so still closed.
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn open_transitions_to_half_open_only_after_timeout() {
        let circuit = CircuitBreaker::new("test".to_string(), config(1, 1, 40));

        circuit.record_failure("boom");
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.allow(), "must not probe before timeout");

        std::thread::sleep(Duration::from_millis(50));
        assert!(circuit.allow(), "timeout elapsed, probe allowed");
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens_regardless_of_prior_successes() {
        let circuit = CircuitBreaker::new("test".to_string(), config(1, 3, 10));

        circuit.record_failure("boom");
        std::thread::sleep(Duration::from_millis(20));
        assert!(circuit.allow());

        circuit.record_success();
        circuit.record_success();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        circuit.record_failure("boom again");
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.allow(), "timer reset on reopen");
    }

    #[test]
    fn closes_after_success_threshold_in_half_open() {
        let circuit = CircuitBreaker::new("test".to_string(), config(1, 2, 10));

        circuit.record_failure("boom");
        std::thread::sleep(Duration::from_millis(20));

        assert!(circuit.allow());
        circuit.record_success();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        assert!(circuit.allow());
        circuit.record_success();
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_budget_is_bounded() {
        let circuit = CircuitBreaker::new("test".to_string(), config(1, 2, 10));

        circuit.record_failure("boom");
        std::thread::sleep(Duration::from_millis(20));

        assert!(circuit.allow()); // first probe (also triggers half-open)
        assert!(circuit.allow()); // second probe
        assert!(!circuit.allow(), "probe budget exhausted");

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.state, CircuitState::HalfOpen);
        assert!(snapshot.total_rejected >= 1);
    }

    #[test]
    fn reset_forces_closed_and_zeroes_counters() {
        let circuit = CircuitBreaker::new("test".to_string(), config(1, 1, 60_000));

        circuit.record_failure("boom");
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.reset();
        assert_eq!(circuit.state(), CircuitState::Closed);
        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.opened_at.is_none());
        assert!(circuit.allow());
    }

    #[test]
    fn snapshot_reports_lifetime_totals() {
        let circuit = CircuitBreaker::new("test".to_string(), config(5, 2, 60_000));

        circuit.record_success();
        circuit.record_failure("boom");
        circuit.record_success();

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.total_successes, 2);
        assert_eq!(snapshot.total_failures, 1);
    }
}
