use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::types::{DeadLetter, DeadLetterStatus, StoredDeadLetter};

#[derive(Error, Debug)]
pub enum StoreError {
    /// The bounded store is full and holds nothing evictable
    #[error("Dead-letter store at capacity with no evictable entry")]
    CapacityExhausted,
}

/// Result of attempting to claim an entry for reprocessing.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Entry transitioned PENDING -> PROCESSING; snapshot returned
    Claimed(StoredDeadLetter),
    /// Entry was pending but out of retries; transitioned to ABANDONED
    Abandoned,
    /// Entry is processing, resolved, or already abandoned
    NotEligible,
    /// No entry with that id
    NotFound,
}

/// Durable record of failed deliveries with a retry state machine.
///
/// Implementations must be safe under concurrent callers; status
/// transitions are read-modify-write atomic per entry so two
/// reprocessors cannot race the same entry into inconsistent states.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persist a new dead letter in status PENDING, due immediately.
    /// Returns the generated entry id.
    async fn save(&self, dead_letter: DeadLetter) -> Result<Uuid, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Option<StoredDeadLetter>;

    async fn find_by_status(&self, status: DeadLetterStatus) -> Vec<StoredDeadLetter>;

    /// Up to `limit` entries due for reprocessing: PENDING entries whose
    /// `next_retry_at` is unset or elapsed, plus stale PROCESSING entries
    /// reverted to PENDING (crash recovery).
    async fn find_ready_for_reprocess(&self, limit: usize) -> Vec<StoredDeadLetter>;

    /// Atomically claim a pending entry for reprocessing.
    async fn claim(&self, id: Uuid) -> ClaimOutcome;

    /// Set the status of an entry; returns false when the id is unknown
    async fn update_status(&self, id: Uuid, status: DeadLetterStatus) -> bool;

    /// Record the result of a failed reprocessing attempt
    async fn update_retry_info(
        &self,
        id: Uuid,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
        last_error_message: Option<String>,
    ) -> bool;

    async fn delete(&self, id: Uuid) -> bool;

    /// Remove entries created before the cutoff; returns how many
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize;

    async fn count_by_status(&self, status: DeadLetterStatus) -> usize;
}
