//! Lazily-created per-destination resilience instances.

use std::sync::Arc;

use dashmap::DashMap;

use super::bulkhead::Bulkhead;
use super::circuit_breaker::CircuitBreaker;
use super::config::{BulkheadConfig, CircuitBreakerConfig, RateLimiterConfig};
use super::rate_limiter::RateLimiter;

/// Shared rate limiter / bulkhead / circuit breaker instances, keyed by
/// resource id (`platform:resource_key`).
///
/// Instances are created on first use with that destination's resolved
/// config and reused across all concurrent dispatches; they are never
/// torn down mid-process.
#[derive(Default)]
pub struct ResilienceRegistry {
    rate_limiters: DashMap<String, Arc<RateLimiter>>,
    bulkheads: DashMap<String, Arc<Bulkhead>>,
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl ResilienceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_limiter(&self, resource_id: &str, config: &RateLimiterConfig) -> Arc<RateLimiter> {
        if let Some(existing) = self.rate_limiters.get(resource_id) {
            return Arc::clone(&existing);
        }
        Arc::clone(
            self.rate_limiters
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(config)))
                .value(),
        )
    }

    pub fn bulkhead(&self, resource_id: &str, config: &BulkheadConfig) -> Arc<Bulkhead> {
        if let Some(existing) = self.bulkheads.get(resource_id) {
            return Arc::clone(&existing);
        }
        Arc::clone(
            self.bulkheads
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(Bulkhead::new(config)))
                .value(),
        )
    }

    pub fn circuit_breaker(
        &self,
        resource_id: &str,
        config: &CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.get(resource_id) {
            return Arc::clone(&existing);
        }
        Arc::clone(
            self.circuit_breakers
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(config.clone())))
                .value(),
        )
    }
}
