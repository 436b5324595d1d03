//! Bounded in-memory dead-letter store backed by DashMap.
//!
//! Reference implementation; persistent backends plug in behind the
//! [`DeadLetterStore`] trait. Per-entry atomicity comes from the DashMap
//! entry lock: every read-modify-write holds the entry's shard guard.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::metrics::{DEAD_LETTERS_EVICTED_TOTAL, DEAD_LETTERS_STORED, REPROCESS_RECOVERED_TOTAL};

use super::store::{ClaimOutcome, DeadLetterStore, StoreError};
use super::types::{DeadLetter, DeadLetterConfig, DeadLetterStatus, StoredDeadLetter};

pub struct MemoryDeadLetterStore {
    entries: DashMap<Uuid, StoredDeadLetter>,
    config: DeadLetterConfig,
}

impl MemoryDeadLetterStore {
    pub fn new(config: DeadLetterConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Pick the eviction victim: oldest RESOLVED, else oldest ABANDONED,
    /// else oldest of any status.
    fn eviction_candidate(&self) -> Option<Uuid> {
        let mut oldest_resolved: Option<(Uuid, DateTime<Utc>)> = None;
        let mut oldest_abandoned: Option<(Uuid, DateTime<Utc>)> = None;
        let mut oldest_any: Option<(Uuid, DateTime<Utc>)> = None;

        for entry in self.entries.iter() {
            let candidate = (*entry.key(), entry.created_at);
            let slot = match entry.status {
                DeadLetterStatus::Resolved => &mut oldest_resolved,
                DeadLetterStatus::Abandoned => &mut oldest_abandoned,
                _ => &mut oldest_any,
            };
            if slot.map(|(_, at)| candidate.1 < at).unwrap_or(true) {
                *slot = Some(candidate);
            }
            if oldest_any.map(|(_, at)| candidate.1 < at).unwrap_or(true) {
                oldest_any = Some(candidate);
            }
        }

        oldest_resolved
            .or(oldest_abandoned)
            .or(oldest_any)
            .map(|(id, _)| id)
    }

    fn evict_until_capacity(&self) -> Result<(), StoreError> {
        while self.entries.len() >= self.config.max_entries.max(1) {
            let victim = self
                .eviction_candidate()
                .ok_or(StoreError::CapacityExhausted)?;
            if self.entries.remove(&victim).is_some() {
                DEAD_LETTERS_EVICTED_TOTAL.inc();
                tracing::warn!(
                    evicted_id = %victim,
                    max_entries = self.config.max_entries,
                    "Evicted dead-letter entry from full store"
                );
            }
        }
        Ok(())
    }

    fn staleness_window(&self) -> Duration {
        Duration::seconds(self.config.processing_staleness_seconds as i64)
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn save(&self, dead_letter: DeadLetter) -> Result<Uuid, StoreError> {
        self.evict_until_capacity()?;

        let stored = StoredDeadLetter::new(dead_letter, self.config.max_retries);
        let id = stored.id;

        tracing::info!(
            id = %id,
            platform = %stored.dead_letter.platform,
            resource_key = %stored.dead_letter.resource_key,
            reason = %stored.dead_letter.failure_reason,
            "Dead letter stored"
        );

        self.entries.insert(id, stored);
        DEAD_LETTERS_STORED.set(self.entries.len() as i64);
        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> Option<StoredDeadLetter> {
        self.entries.get(&id).map(|entry| entry.clone())
    }

    async fn find_by_status(&self, status: DeadLetterStatus) -> Vec<StoredDeadLetter> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.clone())
            .collect()
    }

    async fn find_ready_for_reprocess(&self, limit: usize) -> Vec<StoredDeadLetter> {
        let now = Utc::now();
        let stale_cutoff = now - self.staleness_window();

        // Collect ids first to avoid holding shard locks while mutating
        let candidate_ids: Vec<Uuid> = self.entries.iter().map(|entry| *entry.key()).collect();

        let mut ready = Vec::new();
        for id in candidate_ids {
            if let Some(mut entry) = self.entries.get_mut(&id) {
                if entry.status == DeadLetterStatus::Processing && entry.updated_at < stale_cutoff {
                    // Abandoned-by-crash: make it eligible again
                    entry.status = DeadLetterStatus::Pending;
                    entry.updated_at = now;
                    REPROCESS_RECOVERED_TOTAL.inc();
                    tracing::warn!(
                        id = %id,
                        "Recovered stale in-flight dead letter to pending"
                    );
                }
                if entry.is_due(now) {
                    ready.push(entry.clone());
                }
            }
        }

        ready.sort_by_key(|entry| entry.updated_at);
        ready.truncate(limit);
        ready
    }

    async fn claim(&self, id: Uuid) -> ClaimOutcome {
        let mut entry = match self.entries.get_mut(&id) {
            Some(entry) => entry,
            None => return ClaimOutcome::NotFound,
        };

        match entry.status {
            DeadLetterStatus::Pending => {
                entry.updated_at = Utc::now();
                if entry.can_retry() {
                    entry.status = DeadLetterStatus::Processing;
                    ClaimOutcome::Claimed(entry.clone())
                } else {
                    entry.status = DeadLetterStatus::Abandoned;
                    ClaimOutcome::Abandoned
                }
            }
            DeadLetterStatus::Processing
            | DeadLetterStatus::Resolved
            | DeadLetterStatus::Abandoned => ClaimOutcome::NotEligible,
        }
    }

    async fn update_status(&self, id: Uuid, status: DeadLetterStatus) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.status = status;
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    async fn update_retry_info(
        &self,
        id: Uuid,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
        last_error_message: Option<String>,
    ) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.retry_count = retry_count;
                entry.next_retry_at = next_retry_at;
                entry.last_error_message = last_error_message;
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    async fn delete(&self, id: Uuid) -> bool {
        let removed = self.entries.remove(&id).is_some();
        DEAD_LETTERS_STORED.set(self.entries.len() as i64);
        removed
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at >= cutoff);
        let removed = before - self.entries.len();
        DEAD_LETTERS_STORED.set(self.entries.len() as i64);
        removed
    }

    async fn count_by_status(&self, status: DeadLetterStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }
}
