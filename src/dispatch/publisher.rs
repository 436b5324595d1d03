use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use crate::deadletter::FailureReason;
use crate::notification::Notification;
use crate::outbound::{FormatterRegistry, SenderRegistry};
use crate::routing::{DeliveryTarget, RoutingResolver};

use super::dispatcher::{DispatchOutcome, Dispatcher};

/// Aggregate result of publishing one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Targets the routing layer resolved
    pub targets: usize,
    pub delivered: usize,
    /// Calls skipped by an open circuit
    pub skipped: usize,
    pub dead_lettered: usize,
    /// Reason label of the first terminal failure, when any
    pub first_error: Option<String>,
}

impl PublishReport {
    /// Every resolved target was delivered (an empty target list counts
    /// as success, skips and dead letters do not)
    pub fn is_success(&self) -> bool {
        self.dead_lettered == 0 && self.skipped == 0
    }
}

/// Entry point for pushing a notification through routing, formatting,
/// and guarded dispatch.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Fan a notification out to every routed target
    async fn publish(&self, notification: &Arc<Notification>) -> PublishReport;

    /// Deliver to one already-resolved target, re-running formatting.
    /// Used by dead-letter reprocessing.
    async fn publish_to_target(
        &self,
        notification: &Arc<Notification>,
        target: &DeliveryTarget,
    ) -> DispatchOutcome;
}

/// Production publisher wiring the routing resolver, the outbound
/// registries, and the dispatcher together.
///
/// Missing collaborators never abort the fan-out: an unregistered sender
/// or formatter for one target becomes a dead letter for that target
/// while the remaining targets proceed.
pub struct WebhookPublisher {
    routing: Arc<RoutingResolver>,
    senders: Arc<SenderRegistry>,
    formatters: Arc<FormatterRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl WebhookPublisher {
    pub fn new(
        routing: Arc<RoutingResolver>,
        senders: Arc<SenderRegistry>,
        formatters: Arc<FormatterRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            routing,
            senders,
            formatters,
            dispatcher,
        }
    }
}

#[async_trait]
impl NotificationPublisher for WebhookPublisher {
    #[tracing::instrument(
        name = "publisher.publish",
        skip(self, notification),
        fields(
            notification_id = %notification.id,
            type_id = %notification.type_id,
            category = %notification.category
        )
    )]
    async fn publish(&self, notification: &Arc<Notification>) -> PublishReport {
        let targets = self
            .routing
            .resolve(&notification.type_id, &notification.category);

        let mut report = PublishReport {
            targets: targets.len(),
            ..Default::default()
        };

        if targets.is_empty() {
            tracing::debug!("No routing targets, nothing to deliver");
            return report;
        }

        // Targets are independent destinations; deliver in parallel
        let outcomes = join_all(
            targets
                .iter()
                .map(|target| self.publish_to_target(notification, target)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Delivered { .. } => report.delivered += 1,
                DispatchOutcome::Skipped => report.skipped += 1,
                DispatchOutcome::DeadLettered { reason, .. } => {
                    report.dead_lettered += 1;
                    if report.first_error.is_none() {
                        report.first_error = Some(reason.as_str().to_string());
                    }
                }
            }
        }

        tracing::info!(
            targets = report.targets,
            delivered = report.delivered,
            skipped = report.skipped,
            dead_lettered = report.dead_lettered,
            "Publish complete"
        );
        report
    }

    async fn publish_to_target(
        &self,
        notification: &Arc<Notification>,
        target: &DeliveryTarget,
    ) -> DispatchOutcome {
        let sender = match self.senders.get(&target.platform) {
            Some(sender) => sender,
            None => {
                tracing::error!(platform = %target.platform, "No sender registered");
                return self
                    .dispatcher
                    .record_dead_letter(
                        notification,
                        target,
                        Value::Null,
                        FailureReason::SenderNotFound,
                        Some(format!("no sender for platform '{}'", target.platform)),
                        0,
                    )
                    .await;
            }
        };

        let formatter = match self
            .formatters
            .get(&target.platform, &notification.type_id)
        {
            Some(formatter) => formatter,
            None => {
                tracing::error!(
                    platform = %target.platform,
                    type_id = %notification.type_id,
                    "No formatter registered"
                );
                return self
                    .dispatcher
                    .record_dead_letter(
                        notification,
                        target,
                        Value::Null,
                        FailureReason::FormatterNotFound,
                        Some(format!(
                            "no formatter for platform '{}' and type '{}'",
                            target.platform, notification.type_id
                        )),
                        0,
                    )
                    .await;
            }
        };

        let payload = match formatter.format(notification) {
            Some(payload) => payload,
            None => {
                tracing::error!(
                    platform = %target.platform,
                    type_id = %notification.type_id,
                    "Formatter produced no payload"
                );
                return self
                    .dispatcher
                    .record_dead_letter(
                        notification,
                        target,
                        Value::Null,
                        FailureReason::PayloadCreationFailed,
                        Some("formatter produced no payload".to_string()),
                        0,
                    )
                    .await;
            }
        };

        self.dispatcher
            .dispatch(notification, target, sender, payload)
            .await
    }
}
