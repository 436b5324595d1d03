use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::notification::Notification;

/// Why a delivery ended in the dead-letter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    MaxRetriesExceeded,
    NonRetryableError,
    CircuitOpen,
    RateLimited,
    BulkheadFull,
    Exception,
    FormatterNotFound,
    PayloadCreationFailed,
    SenderNotFound,
}

impl FailureReason {
    /// Stable label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            FailureReason::NonRetryableError => "NON_RETRYABLE_ERROR",
            FailureReason::CircuitOpen => "CIRCUIT_OPEN",
            FailureReason::RateLimited => "RATE_LIMITED",
            FailureReason::BulkheadFull => "BULKHEAD_FULL",
            FailureReason::Exception => "EXCEPTION",
            FailureReason::FormatterNotFound => "FORMATTER_NOT_FOUND",
            FailureReason::PayloadCreationFailed => "PAYLOAD_CREATION_FAILED",
            FailureReason::SenderNotFound => "SENDER_NOT_FOUND",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a delivery that could not be completed.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The original notification, shared rather than copied
    pub notification: Arc<Notification>,
    pub platform: String,
    pub resource_key: String,
    pub endpoint_url: String,
    /// The payload that was (or would have been) sent; `Value::Null`
    /// when payload construction itself failed
    pub payload: Value,
    pub failure_reason: FailureReason,
    pub error_message: Option<String>,
    /// Number of physical sends issued before giving up
    pub attempt_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle status of a stored dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterStatus {
    /// Waiting for reprocessing
    Pending,
    /// Claimed by a reprocessor
    Processing,
    /// Reprocessing delivered successfully
    Resolved,
    /// Retries exhausted, no further attempts
    Abandoned,
}

/// Mutable store-owned wrapper around a dead letter.
#[derive(Debug, Clone)]
pub struct StoredDeadLetter {
    pub id: Uuid,
    pub dead_letter: DeadLetter,
    pub status: DeadLetterStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDeadLetter {
    pub(crate) fn new(dead_letter: DeadLetter, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dead_letter,
            status: DeadLetterStatus::Pending,
            retry_count: 0,
            max_retries,
            next_retry_at: Some(now),
            last_error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether another reprocessing attempt is permitted
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Whether this entry is due for reprocessing
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeadLetterStatus::Pending
            && self.next_retry_at.map(|at| at <= now).unwrap_or(true)
    }
}

/// Configuration for the dead-letter store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Bound on stored entries; overflow triggers eviction
    pub max_entries: usize,
    /// Reprocessing attempts granted to each entry
    pub max_retries: u32,
    /// Entries stuck in PROCESSING longer than this are treated as
    /// abandoned-by-crash and reverted to PENDING
    pub processing_staleness_seconds: u64,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_retries: 5,
            processing_staleness_seconds: 300,
        }
    }
}
