use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::dispatch::NotificationPublisher;
use crate::metrics::REPROCESS_TOTAL;
use crate::resilience::backoff;
use crate::routing::DeliveryTarget;

use super::store::{ClaimOutcome, DeadLetterStore};
use super::types::{DeadLetterStatus, StoredDeadLetter};

/// Reprocessing schedule, independent of the dispatch retry settings.
/// Delays between reprocessing attempts are minutes, not milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReprocessConfig {
    pub initial_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
    /// Entries picked up per sweep
    pub batch_limit: usize,
    /// Interval of the background sweep task
    pub sweep_interval_seconds: u64,
}

impl Default for ReprocessConfig {
    fn default() -> Self {
        Self {
            initial_delay_seconds: 60,
            max_delay_seconds: 3_600,
            multiplier: 2.0,
            jitter_factor: 0.1,
            batch_limit: 50,
            sweep_interval_seconds: 60,
        }
    }
}

impl ReprocessConfig {
    pub fn initial_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.initial_delay_seconds)
    }
    pub fn max_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_delay_seconds)
    }
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Result of reprocessing one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprocessOutcome {
    /// Redelivery succeeded, entry resolved
    Resolved,
    /// Redelivery failed, another attempt scheduled
    Rescheduled,
    /// Redelivery failed and retries are now exhausted
    Exhausted,
    /// Entry was already out of retries when claimed
    Abandoned,
    /// Entry missing or not in a claimable state
    Skipped,
}

impl ReprocessOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ReprocessOutcome::Resolved => "resolved",
            ReprocessOutcome::Rescheduled => "rescheduled",
            ReprocessOutcome::Exhausted => "exhausted",
            ReprocessOutcome::Abandoned => "abandoned",
            ReprocessOutcome::Skipped => "skipped",
        }
    }
}

/// Tally of one reprocessing sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprocessSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drives stored dead letters back through the publish path.
///
/// Each entry is claimed atomically (PENDING -> PROCESSING) so concurrent
/// sweeps cannot double-deliver. After the publish attempt the entry
/// always leaves PROCESSING: resolved on success, rescheduled or
/// abandoned on failure. A crashed sweep leaves entries in PROCESSING;
/// the store's staleness sweep reverts those to PENDING.
pub struct DeadLetterReprocessor {
    store: Arc<dyn DeadLetterStore>,
    publisher: Arc<dyn NotificationPublisher>,
    config: ReprocessConfig,
}

impl DeadLetterReprocessor {
    pub fn new(
        store: Arc<dyn DeadLetterStore>,
        publisher: Arc<dyn NotificationPublisher>,
        config: ReprocessConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Reprocess every due entry, up to the configured batch limit.
    #[tracing::instrument(name = "reprocessor.sweep", skip(self))]
    pub async fn reprocess_pending(&self) -> ReprocessSummary {
        let due = self
            .store
            .find_ready_for_reprocess(self.config.batch_limit)
            .await;

        let mut summary = ReprocessSummary::default();
        for entry in due {
            match self.reprocess_by_id(entry.id).await {
                ReprocessOutcome::Resolved => summary.succeeded += 1,
                ReprocessOutcome::Rescheduled | ReprocessOutcome::Exhausted => summary.failed += 1,
                ReprocessOutcome::Abandoned | ReprocessOutcome::Skipped => summary.skipped += 1,
            }
        }

        if summary != ReprocessSummary::default() {
            tracing::info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Dead-letter sweep complete"
            );
        }
        summary
    }

    /// Claim and reprocess a single entry.
    pub async fn reprocess_by_id(&self, id: Uuid) -> ReprocessOutcome {
        let entry = match self.store.claim(id).await {
            ClaimOutcome::Claimed(entry) => entry,
            ClaimOutcome::Abandoned => {
                tracing::warn!(entry_id = %id, "Entry out of retries, abandoned");
                return self.finish(ReprocessOutcome::Abandoned);
            }
            ClaimOutcome::NotEligible => return self.finish(ReprocessOutcome::Skipped),
            ClaimOutcome::NotFound => {
                tracing::debug!(entry_id = %id, "Entry vanished before claim");
                return self.finish(ReprocessOutcome::Skipped);
            }
        };

        let target = DeliveryTarget {
            platform: entry.dead_letter.platform.clone(),
            resource_key: entry.dead_letter.resource_key.clone(),
            endpoint_url: entry.dead_letter.endpoint_url.clone(),
        };

        tracing::info!(
            entry_id = %entry.id,
            notification_id = %entry.dead_letter.notification.id,
            platform = %target.platform,
            resource_key = %target.resource_key,
            retry_count = entry.retry_count,
            "Reprocessing dead letter"
        );

        let outcome = self
            .publisher
            .publish_to_target(&entry.dead_letter.notification, &target)
            .await;

        match outcome {
            crate::dispatch::DispatchOutcome::Delivered { .. } => {
                self.store.update_status(entry.id, DeadLetterStatus::Resolved).await;
                self.finish(ReprocessOutcome::Resolved)
            }
            crate::dispatch::DispatchOutcome::Skipped => {
                // Circuit still open for the destination; count as a
                // failed attempt so the entry backs off rather than
                // hammering the next sweep
                self.record_failure(&entry, Some("circuit open".to_string())).await
            }
            crate::dispatch::DispatchOutcome::DeadLettered { reason, .. } => {
                self.record_failure(&entry, Some(reason.as_str().to_string())).await
            }
        }
    }

    /// Record a failed attempt: bump the retry count, schedule the next
    /// attempt or abandon when exhausted.
    async fn record_failure(
        &self,
        entry: &StoredDeadLetter,
        error_message: Option<String>,
    ) -> ReprocessOutcome {
        let retry_count = entry.retry_count + 1;

        if retry_count >= entry.max_retries {
            self.store
                .update_retry_info(entry.id, retry_count, None, error_message)
                .await;
            self.store
                .update_status(entry.id, DeadLetterStatus::Abandoned)
                .await;
            tracing::warn!(entry_id = %entry.id, retry_count, "Dead letter exhausted, abandoned");
            return self.finish(ReprocessOutcome::Exhausted);
        }

        let delay = backoff::calculate_delay(
            entry.retry_count,
            self.config.initial_delay(),
            self.config.multiplier,
            self.config.max_delay(),
            self.config.jitter_factor,
        );
        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));

        self.store
            .update_retry_info(entry.id, retry_count, Some(next_retry_at), error_message)
            .await;
        self.store
            .update_status(entry.id, DeadLetterStatus::Pending)
            .await;

        tracing::debug!(
            entry_id = %entry.id,
            retry_count,
            next_retry_at = %next_retry_at,
            "Dead letter rescheduled"
        );
        self.finish(ReprocessOutcome::Rescheduled)
    }

    fn finish(&self, outcome: ReprocessOutcome) -> ReprocessOutcome {
        REPROCESS_TOTAL.with_label_values(&[outcome.as_str()]).inc();
        outcome
    }
}
