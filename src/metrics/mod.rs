//! Prometheus metrics for the webhook delivery pipeline.
//!
//! Covers dispatch attempts and outcomes, retries, circuit breaker skips,
//! dead-letter volume by failure reason, remote rate-limit signals, and
//! reprocessing outcomes. Metric updates are best-effort and must never
//! influence dispatch results.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Physical send attempts issued, labelled by platform
    pub static ref DISPATCH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_attempts_total", METRIC_PREFIX),
        "Total physical send attempts",
        &["platform"]
    ).unwrap();

    /// Successful deliveries
    pub static ref DISPATCH_SUCCESS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_success_total", METRIC_PREFIX),
        "Total successful deliveries",
        &["platform"]
    ).unwrap();

    /// Terminal delivery failures (dead-lettered)
    pub static ref DISPATCH_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_failed_total", METRIC_PREFIX),
        "Total terminal delivery failures",
        &["platform"]
    ).unwrap();

    /// Dispatches skipped because the circuit breaker was open
    pub static ref DISPATCH_SKIPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_skipped_total", METRIC_PREFIX),
        "Total dispatches skipped due to an open circuit",
        &["platform"]
    ).unwrap();

    /// Retry attempts scheduled after a retryable failure
    pub static ref DISPATCH_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dispatch_retries_total", METRIC_PREFIX),
        "Total retry attempts scheduled"
    ).unwrap();

    /// Remote rate-limit signals reported by destinations
    pub static ref REMOTE_RATE_LIMIT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_remote_rate_limit_total", METRIC_PREFIX),
        "Total remote rate-limit signals observed"
    ).unwrap();

    // ============================================================================
    // Dead-Letter Metrics
    // ============================================================================

    /// Dead letters recorded, labelled by failure reason
    pub static ref DEAD_LETTERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dead_letters_total", METRIC_PREFIX),
        "Total dead letters recorded",
        &["reason"]
    ).unwrap();

    /// Dead-letter entries evicted from the bounded store
    pub static ref DEAD_LETTERS_EVICTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dead_letters_evicted_total", METRIC_PREFIX),
        "Total dead-letter entries evicted due to capacity"
    ).unwrap();

    /// Current number of stored dead-letter entries
    pub static ref DEAD_LETTERS_STORED: IntGauge = register_int_gauge!(
        format!("{}_dead_letters_stored", METRIC_PREFIX),
        "Current number of stored dead-letter entries"
    ).unwrap();

    // ============================================================================
    // Reprocessing Metrics
    // ============================================================================

    /// Reprocessing outcomes, labelled resolved/rescheduled/abandoned
    pub static ref REPROCESS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_reprocess_total", METRIC_PREFIX),
        "Total dead-letter reprocessing outcomes",
        &["outcome"]
    ).unwrap();

    /// Stale PROCESSING entries recovered back to PENDING
    pub static ref REPROCESS_RECOVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reprocess_recovered_total", METRIC_PREFIX),
        "Total stale in-flight entries recovered to pending"
    ).unwrap();
}

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
