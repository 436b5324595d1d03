//! Token-bucket rate limiter for outbound calls to a destination.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use super::circuit_breaker::current_time_ms;
use super::config::RateLimiterConfig;

/// Interval between permit polls while waiting
const PERMIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Token bucket bounding call frequency to one destination.
///
/// `limit_for_period` tokens are replenished over each `refresh_period`.
/// Uses atomic operations for lock-free concurrent access.
#[derive(Debug)]
pub struct RateLimiter {
    /// Current number of tokens
    tokens: AtomicU32,
    /// Last refill timestamp (Unix milliseconds)
    last_refill: AtomicI64,
    /// Maximum bucket capacity
    capacity: u32,
    /// Refresh period over which `capacity` tokens are replenished
    refresh_period_ms: u64,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            tokens: AtomicU32::new(config.limit_for_period),
            last_refill: AtomicI64::new(current_time_ms()),
            capacity: config.limit_for_period.max(1),
            refresh_period_ms: config.refresh_period_ms.max(1),
        }
    }

    /// Try to consume one permit without waiting.
    /// Returns true if a permit was available.
    pub fn try_acquire(&self) -> bool {
        let now = current_time_ms();
        let last = self.last_refill.load(Ordering::Relaxed);
        let elapsed_ms = (now - last).max(0) as u64;

        // Tokens replenished over the elapsed fraction of the period
        let tokens_to_add =
            (elapsed_ms.saturating_mul(self.capacity as u64) / self.refresh_period_ms) as u32;

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            let refilled = current.saturating_add(tokens_to_add).min(self.capacity);

            if refilled == 0 {
                return false;
            }

            let new_value = refilled - 1;

            if self
                .tokens
                .compare_exchange_weak(current, new_value, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                if tokens_to_add > 0 {
                    self.last_refill.store(now, Ordering::Relaxed);
                }
                return true;
            }
            // CAS failed, retry
        }
    }

    /// Acquire one permit, waiting up to `max_wait`.
    /// Returns false if no permit became available within the bound.
    pub async fn acquire(&self, max_wait: Duration) -> bool {
        if self.try_acquire() {
            return true;
        }

        let deadline = Instant::now() + max_wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(PERMIT_POLL_INTERVAL.min(deadline - now)).await;
            if self.try_acquire() {
                return true;
            }
        }
    }

    /// Get the current number of available permits
    pub fn available(&self) -> u32 {
        let now = current_time_ms();
        let last = self.last_refill.load(Ordering::Relaxed);
        let elapsed_ms = (now - last).max(0) as u64;
        let tokens_to_add =
            (elapsed_ms.saturating_mul(self.capacity as u64) / self.refresh_period_ms) as u32;
        let current = self.tokens.load(Ordering::Relaxed);
        current.saturating_add(tokens_to_add).min(self.capacity)
    }
}
