//! Resilience primitives guarding outbound webhook calls.
//!
//! Per-destination instances (rate limiter, bulkhead, circuit breaker)
//! are shared across concurrent dispatches via [`ResilienceRegistry`];
//! effective settings come from [`ConfigResolver`].

pub mod backoff;
mod bulkhead;
mod circuit_breaker;
mod config;
mod rate_limiter;
mod registry;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{
    BulkheadConfig, BulkheadOverride, CircuitBreakerConfig, CircuitBreakerOverride, ConfigResolver,
    RateLimiterConfig, RateLimiterOverride, ResilienceConfig, ResilienceOverride, RetryConfig,
    RetryOverride, TimeoutConfig, TimeoutOverride,
};
pub use rate_limiter::RateLimiter;
pub use registry::ResilienceRegistry;
