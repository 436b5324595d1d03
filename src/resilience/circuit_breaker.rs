//! Circuit breaker pattern implementation for webhook destinations.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::SystemTime;

use super::config::CircuitBreakerConfig;

/// Current time in milliseconds since the Unix epoch
pub(crate) fn current_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow through normally
    Closed = 0,
    /// Circuit is open, requests are rejected
    Open = 1,
    /// Circuit is half-open, allowing test requests
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Per-destination fault isolator.
///
/// Opens after `failure_threshold` consecutive failures, or once the
/// failure rate over the calls observed since the circuit last closed
/// reaches `failure_rate_threshold` percent (evaluated only after at
/// least `failure_threshold` calls). After `wait_duration` it probes
/// half-open; `success_threshold` consecutive successes close it again
/// and any failure reopens it.
pub struct CircuitBreaker {
    /// Current state (0=Closed, 1=Open, 2=HalfOpen)
    state: AtomicU8,
    /// Consecutive failure count
    failure_count: AtomicU32,
    /// Consecutive success count (in half-open state)
    success_count: AtomicU32,
    /// Calls observed since the circuit last closed
    total_calls: AtomicU32,
    /// Failures observed since the circuit last closed
    total_failures: AtomicU32,
    /// Timestamp of last state change (ms since epoch)
    last_state_change: AtomicI64,
    /// Configuration
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            total_calls: AtomicU32::new(0),
            total_failures: AtomicU32::new(0),
            last_state_change: AtomicI64::new(current_time_ms()),
            config,
        }
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        self.check_state_transition();
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Check if a call should be allowed
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true, // Allow test requests
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let state = CircuitState::from(self.state.load(Ordering::Acquire));

        match state {
            CircuitState::Closed => {
                self.total_calls.fetch_add(1, Ordering::AcqRel);
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let success_count = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if success_count >= self.config.success_threshold {
                    self.transition_to(CircuitState::Closed);
                    tracing::info!("Circuit breaker closed after successful recovery");
                }
            }
            CircuitState::Open => {
                // Shouldn't happen, but ignore
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let state = CircuitState::from(self.state.load(Ordering::Acquire));

        match state {
            CircuitState::Closed => {
                let calls = self.total_calls.fetch_add(1, Ordering::AcqRel) + 1;
                let failures = self.total_failures.fetch_add(1, Ordering::AcqRel) + 1;
                let consecutive = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

                let rate = failures as f64 * 100.0 / calls as f64;
                let rate_tripped = calls >= self.config.failure_threshold
                    && rate >= self.config.failure_rate_threshold;

                if consecutive >= self.config.failure_threshold || rate_tripped {
                    self.transition_to(CircuitState::Open);
                    tracing::warn!(
                        consecutive_failures = consecutive,
                        failure_rate = rate,
                        "Circuit breaker opened due to failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state reopens the circuit
                self.transition_to(CircuitState::Open);
                tracing::warn!("Circuit breaker reopened after failure in half-open state");
            }
            CircuitState::Open => {
                // Already open, just update timestamp
                self.last_state_change
                    .store(current_time_ms(), Ordering::Release);
            }
        }
    }

    /// Check if we should transition from Open to HalfOpen
    fn check_state_transition(&self) {
        let state = CircuitState::from(self.state.load(Ordering::Acquire));

        if state == CircuitState::Open {
            let last_change = self.last_state_change.load(Ordering::Acquire);
            let elapsed = current_time_ms() - last_change;

            if elapsed >= self.config.wait_duration_ms as i64 {
                if self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.success_count.store(0, Ordering::Release);
                    self.last_state_change
                        .store(current_time_ms(), Ordering::Release);
                    tracing::info!("Circuit breaker transitioning to half-open state");
                }
            }
        }
    }

    /// Transition to a new state
    fn transition_to(&self, new_state: CircuitState) {
        self.state.store(new_state as u8, Ordering::Release);
        self.last_state_change
            .store(current_time_ms(), Ordering::Release);

        match new_state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
                self.success_count.store(0, Ordering::Release);
                self.total_calls.store(0, Ordering::Release);
                self.total_failures.store(0, Ordering::Release);
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                self.success_count.store(0, Ordering::Release);
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(failure_threshold: u32, success_threshold: u32, wait_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold,
            failure_rate_threshold: 100.0,
            wait_duration_ms: wait_ms,
            success_threshold,
        }
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_on_consecutive_failures() {
        let cb = CircuitBreaker::new(config(3, 2, 1000));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 3,
            failure_rate_threshold: 90.0,
            wait_duration_ms: 1000,
            success_threshold: 2,
        });

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_on_failure_rate() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 4,
            failure_rate_threshold: 50.0,
            wait_duration_ms: 1000,
            success_threshold: 2,
        });

        // fail, success, fail, success, fail: 60% failure rate over 5 calls
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_transition_after_wait() {
        let cb = CircuitBreaker::new(config(1, 2, 50));

        cb.record_failure();
        let raw = CircuitState::from(cb.state.load(Ordering::Acquire));
        assert_eq!(raw, CircuitState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_closes_after_successes_in_half_open() {
        let cb = CircuitBreaker::new(config(1, 2, 10));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        let _ = cb.state(); // Trigger transition to half-open

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_reopens_on_half_open_failure() {
        let cb = CircuitBreaker::new(config(1, 2, 10));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        let raw = CircuitState::from(cb.state.load(Ordering::Acquire));
        assert_eq!(raw, CircuitState::Open);
    }
}
