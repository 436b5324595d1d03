use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::deadletter::DeadLetterReprocessor;

/// Background task sweeping the dead-letter store on a fixed interval.
pub struct ReprocessTask {
    reprocessor: Arc<DeadLetterReprocessor>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ReprocessTask {
    pub fn new(
        reprocessor: Arc<DeadLetterReprocessor>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            reprocessor,
            interval,
            shutdown,
        }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(mut self) {
        let mut sweep_timer = tokio::time::interval(self.interval);

        // Skip immediate first tick
        sweep_timer.tick().await;

        tracing::info!(
            sweep_interval_secs = self.interval.as_secs(),
            "Dead-letter reprocess task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Reprocess task received shutdown signal");
                    break;
                }
                _ = sweep_timer.tick() => {
                    self.reprocessor.reprocess_pending().await;
                }
            }
        }

        tracing::info!("Dead-letter reprocess task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadletter::{
        DeadLetter, DeadLetterConfig, DeadLetterStatus, DeadLetterStore, FailureReason,
        MemoryDeadLetterStore, ReprocessConfig,
    };
    use crate::dispatch::{DispatchOutcome, NotificationPublisher, PublishReport};
    use crate::notification::Notification;
    use crate::routing::DeliveryTarget;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;

    struct AlwaysDelivers;

    #[async_trait]
    impl NotificationPublisher for AlwaysDelivers {
        async fn publish(&self, _notification: &Arc<Notification>) -> PublishReport {
            PublishReport::default()
        }

        async fn publish_to_target(
            &self,
            _notification: &Arc<Notification>,
            _target: &DeliveryTarget,
        ) -> DispatchOutcome {
            DispatchOutcome::Delivered { attempts: 1 }
        }
    }

    fn dead_letter() -> DeadLetter {
        DeadLetter {
            notification: Arc::new(
                Notification::builder("invoice.paid", "billing").build().unwrap(),
            ),
            platform: "slack".into(),
            resource_key: "ops".into(),
            endpoint_url: "https://hooks.example.com/slack/ops".into(),
            payload: Value::Null,
            failure_reason: FailureReason::MaxRetriesExceeded,
            error_message: None,
            attempt_count: 3,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_task_shuts_down_on_signal() {
        let store = Arc::new(MemoryDeadLetterStore::new(DeadLetterConfig::default()));
        let reprocessor = Arc::new(DeadLetterReprocessor::new(
            store as Arc<dyn DeadLetterStore>,
            Arc::new(AlwaysDelivers),
            ReprocessConfig::default(),
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = ReprocessTask::new(reprocessor, Duration::from_secs(60), shutdown_rx);
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_task_sweeps_due_entries() {
        let store = Arc::new(MemoryDeadLetterStore::new(DeadLetterConfig::default()));
        let id = store.save(dead_letter()).await.unwrap();
        let reprocessor = Arc::new(DeadLetterReprocessor::new(
            store.clone() as Arc<dyn DeadLetterStore>,
            Arc::new(AlwaysDelivers),
            ReprocessConfig::default(),
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = ReprocessTask::new(reprocessor, Duration::from_millis(20), shutdown_rx);
        let handle = tokio::spawn(task.run());

        // Poll until the sweep resolves the entry
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(stored) = store.find_by_id(id).await {
                if stored.status == DeadLetterStatus::Resolved {
                    break;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "entry never resolved");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }
}
