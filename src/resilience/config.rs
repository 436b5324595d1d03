//! Per-destination resilience configuration and override resolution.
//!
//! A single global [`ResilienceConfig`] always exists; destinations may
//! register sparse overrides whose present fields win field-by-field.
//! Resolution is memoized per destination and never fails: unknown
//! destinations inherit the global config by identity (`Arc::ptr_eq`
//! detects "no customization").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Resolved sub-configs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Exponential growth factor, >= 1.0
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor in [0, 1]
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout_ms")]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_limit_for_period")]
    pub limit_for_period: u32,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
    /// Maximum time to wait for a permit
    #[serde(default = "default_permit_timeout_ms")]
    pub timeout_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Consecutive failures before opening
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Failure rate percentage in (0, 100] that opens the circuit once
    /// at least `failure_threshold` calls have been observed
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// Time to stay open before probing half-open
    #[serde(default = "default_wait_duration_ms")]
    pub wait_duration_ms: u64,
    /// Successes in half-open before closing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

/// Effective resilience settings for one destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub timeout: TimeoutConfig,
    pub rate_limiter: RateLimiterConfig,
    pub bulkhead: BulkheadConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_true() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter_factor() -> f64 {
    0.1
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_limit_for_period() -> u32 {
    50
}
fn default_refresh_period_ms() -> u64 {
    1_000
}
fn default_permit_timeout_ms() -> u64 {
    100
}
fn default_max_concurrent_calls() -> usize {
    10
}
fn default_max_wait_ms() -> u64 {
    200
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_failure_rate_threshold() -> f64 {
    50.0
}
fn default_wait_duration_ms() -> u64 {
    30_000
}
fn default_success_threshold() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: default_timeout_ms(),
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit_for_period: default_limit_for_period(),
            refresh_period_ms: default_refresh_period_ms(),
            timeout_duration_ms: default_permit_timeout_ms(),
        }
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent_calls: default_max_concurrent_calls(),
            max_wait_duration_ms: default_max_wait_ms(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            failure_rate_threshold: default_failure_rate_threshold(),
            wait_duration_ms: default_wait_duration_ms(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            timeout: TimeoutConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            bulkhead: BulkheadConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl TimeoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl RateLimiterConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_duration_ms)
    }
}

impl BulkheadConfig {
    pub fn max_wait_duration(&self) -> Duration {
        Duration::from_millis(self.max_wait_duration_ms)
    }
}

impl CircuitBreakerConfig {
    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_duration_ms)
    }
}

// ============================================================================
// Sparse overrides
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverride {
    pub enabled: Option<bool>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub jitter_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutOverride {
    pub enabled: Option<bool>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterOverride {
    pub enabled: Option<bool>,
    pub limit_for_period: Option<u32>,
    pub refresh_period_ms: Option<u64>,
    pub timeout_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadOverride {
    pub enabled: Option<bool>,
    pub max_concurrent_calls: Option<usize>,
    pub max_wait_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerOverride {
    pub enabled: Option<bool>,
    pub failure_threshold: Option<u32>,
    pub failure_rate_threshold: Option<f64>,
    pub wait_duration_ms: Option<u64>,
    pub success_threshold: Option<u32>,
}

/// Sparse per-destination override; any absent field inherits the global
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceOverride {
    pub retry: Option<RetryOverride>,
    pub timeout: Option<TimeoutOverride>,
    pub rate_limiter: Option<RateLimiterOverride>,
    pub bulkhead: Option<BulkheadOverride>,
    pub circuit_breaker: Option<CircuitBreakerOverride>,
}

impl ResilienceOverride {
    /// Merge this override onto a global config, present fields winning
    fn merge_onto(&self, global: &ResilienceConfig) -> ResilienceConfig {
        let mut merged = global.clone();

        if let Some(retry) = &self.retry {
            let base = &mut merged.retry;
            base.enabled = retry.enabled.unwrap_or(base.enabled);
            base.max_attempts = retry.max_attempts.unwrap_or(base.max_attempts);
            base.initial_delay_ms = retry.initial_delay_ms.unwrap_or(base.initial_delay_ms);
            base.max_delay_ms = retry.max_delay_ms.unwrap_or(base.max_delay_ms);
            base.multiplier = retry.multiplier.unwrap_or(base.multiplier);
            base.jitter_factor = retry.jitter_factor.unwrap_or(base.jitter_factor);
        }

        if let Some(timeout) = &self.timeout {
            let base = &mut merged.timeout;
            base.enabled = timeout.enabled.unwrap_or(base.enabled);
            base.duration_ms = timeout.duration_ms.unwrap_or(base.duration_ms);
        }

        if let Some(rate_limiter) = &self.rate_limiter {
            let base = &mut merged.rate_limiter;
            base.enabled = rate_limiter.enabled.unwrap_or(base.enabled);
            base.limit_for_period = rate_limiter.limit_for_period.unwrap_or(base.limit_for_period);
            base.refresh_period_ms = rate_limiter
                .refresh_period_ms
                .unwrap_or(base.refresh_period_ms);
            base.timeout_duration_ms = rate_limiter
                .timeout_duration_ms
                .unwrap_or(base.timeout_duration_ms);
        }

        if let Some(bulkhead) = &self.bulkhead {
            let base = &mut merged.bulkhead;
            base.enabled = bulkhead.enabled.unwrap_or(base.enabled);
            base.max_concurrent_calls = bulkhead
                .max_concurrent_calls
                .unwrap_or(base.max_concurrent_calls);
            base.max_wait_duration_ms = bulkhead
                .max_wait_duration_ms
                .unwrap_or(base.max_wait_duration_ms);
        }

        if let Some(circuit_breaker) = &self.circuit_breaker {
            let base = &mut merged.circuit_breaker;
            base.enabled = circuit_breaker.enabled.unwrap_or(base.enabled);
            base.failure_threshold = circuit_breaker
                .failure_threshold
                .unwrap_or(base.failure_threshold);
            base.failure_rate_threshold = circuit_breaker
                .failure_rate_threshold
                .unwrap_or(base.failure_rate_threshold);
            base.wait_duration_ms = circuit_breaker
                .wait_duration_ms
                .unwrap_or(base.wait_duration_ms);
            base.success_threshold = circuit_breaker
                .success_threshold
                .unwrap_or(base.success_threshold);
        }

        merged
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves effective resilience settings per destination.
///
/// Overrides are fixed at construction; merged results are memoized per
/// resource id after the first lookup.
pub struct ConfigResolver {
    global: Arc<ResilienceConfig>,
    overrides: HashMap<String, ResilienceOverride>,
    cache: DashMap<String, Arc<ResilienceConfig>>,
}

impl ConfigResolver {
    pub fn new(global: ResilienceConfig, overrides: HashMap<String, ResilienceOverride>) -> Self {
        Self {
            global: Arc::new(global),
            overrides,
            cache: DashMap::new(),
        }
    }

    /// The global defaults
    pub fn global(&self) -> Arc<ResilienceConfig> {
        Arc::clone(&self.global)
    }

    /// Resolve the effective config for a destination.
    ///
    /// Destinations without an override get the global `Arc` itself, so
    /// `Arc::ptr_eq` against [`ConfigResolver::global`] detects inherited
    /// settings.
    pub fn resolve(&self, platform: &str, resource_key: &str) -> Arc<ResilienceConfig> {
        let key = format!("{platform}:{resource_key}");

        if let Some(cached) = self.cache.get(&key) {
            return Arc::clone(&cached);
        }

        let resolved = match self.overrides.get(&key) {
            Some(dest_override) => Arc::new(dest_override.merge_onto(&self.global)),
            None => Arc::clone(&self.global),
        };

        self.cache.insert(key, Arc::clone(&resolved));
        resolved
    }
}
