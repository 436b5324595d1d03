//! End-to-end tests wiring the publisher, dispatcher, dead-letter store,
//! and reprocessor together with scripted senders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use webhook_relay_service::deadletter::{
    DeadLetterConfig, DeadLetterReprocessor, DeadLetterStatus, DeadLetterStore, FailureReason,
    MemoryDeadLetterStore, ReprocessConfig, ReprocessOutcome,
};
use webhook_relay_service::dispatch::{
    Dispatcher, NotificationPublisher, WebhookPublisher,
};
use webhook_relay_service::notification::Notification;
use webhook_relay_service::outbound::{
    Formatter, FormatterRegistry, SendOutcome, Sender, SenderRegistry,
};
use webhook_relay_service::resilience::{
    ConfigResolver, ResilienceConfig, ResilienceRegistry,
};
use webhook_relay_service::routing::{
    EndpointRegistry, MappingRule, RoutingResolver, RoutingRules,
};

/// Sender that fails a configurable number of times before succeeding,
/// with a switch to force permanent failure.
struct FlakySender {
    calls: AtomicUsize,
    failures_before_success: usize,
    broken: AtomicBool,
}

impl FlakySender {
    fn new(failures_before_success: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures_before_success,
            broken: AtomicBool::new(false),
        })
    }

    fn broken() -> Arc<Self> {
        let sender = Self::new(0);
        sender.broken.store(true, Ordering::SeqCst);
        sender
    }

    fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sender for FlakySender {
    fn platform(&self) -> &str {
        "slack"
    }

    async fn send(&self, _endpoint_url: &str, _payload: &Value) -> anyhow::Result<SendOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Ok(SendOutcome::failure("503 Service Unavailable", true));
        }
        if call < self.failures_before_success {
            return Ok(SendOutcome::failure("503 Service Unavailable", true));
        }
        Ok(SendOutcome::success(200))
    }
}

struct PassthroughFormatter;

impl Formatter for PassthroughFormatter {
    fn platform(&self) -> &str {
        "slack"
    }

    fn format(&self, notification: &Notification) -> Option<Value> {
        Some(json!({
            "type": notification.type_id,
            "context": notification.context,
        }))
    }
}

struct Pipeline {
    publisher: Arc<WebhookPublisher>,
    store: Arc<MemoryDeadLetterStore>,
}

fn pipeline(sender: Arc<FlakySender>, resilience: ResilienceConfig) -> Pipeline {
    let mut rules = RoutingRules::default();
    rules
        .by_category
        .insert("billing".into(), vec![MappingRule::new("slack", "ops")]);

    let mut endpoints = EndpointRegistry::new();
    endpoints.register("slack", "ops", "https://hooks.example.com/slack/ops");

    let mut senders = SenderRegistry::new();
    senders.register(sender);
    let mut formatters = FormatterRegistry::new();
    formatters.register(Arc::new(PassthroughFormatter));

    let store = Arc::new(MemoryDeadLetterStore::new(DeadLetterConfig::default()));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(ConfigResolver::new(resilience, HashMap::new())),
        Arc::new(ResilienceRegistry::new()),
        store.clone() as Arc<dyn DeadLetterStore>,
    ));
    let publisher = Arc::new(WebhookPublisher::new(
        Arc::new(RoutingResolver::new(rules, endpoints)),
        Arc::new(senders),
        Arc::new(formatters),
        dispatcher,
    ));

    Pipeline { publisher, store }
}

fn fast_retry() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config.retry.jitter_factor = 0.0;
    config
}

fn notification() -> Arc<Notification> {
    Arc::new(
        Notification::builder("invoice.paid", "billing")
            .context(json!({"invoice_id": "inv-42"}))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_retries_recover_transient_failures_without_dead_letters() {
    let sender = FlakySender::new(2);
    let pipeline = pipeline(sender.clone(), fast_retry());

    let report = pipeline.publisher.publish(&notification()).await;

    assert_eq!(report.targets, 1);
    assert_eq!(report.delivered, 1);
    assert!(report.is_success());
    assert_eq!(sender.calls(), 3);
    assert_eq!(
        pipeline.store.count_by_status(DeadLetterStatus::Pending).await,
        0
    );
}

#[tokio::test]
async fn test_retry_disabled_dead_letters_after_single_attempt() {
    let mut config = fast_retry();
    config.retry.enabled = false;

    let sender = FlakySender::broken();
    let pipeline = pipeline(sender.clone(), config);

    let report = pipeline.publisher.publish(&notification()).await;

    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.first_error.as_deref(), Some("MAX_RETRIES_EXCEEDED"));
    assert_eq!(sender.calls(), 1);

    let pending = pipeline.store.find_by_status(DeadLetterStatus::Pending).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].dead_letter.attempt_count, 1);
    assert_eq!(
        pending[0].dead_letter.failure_reason,
        FailureReason::MaxRetriesExceeded
    );
    // The formatted payload is captured for later inspection
    assert_eq!(pending[0].dead_letter.payload["type"], "invoice.paid");
}

#[tokio::test]
async fn test_reprocessor_recovers_dead_letter_once_destination_heals() {
    let mut config = fast_retry();
    config.retry.enabled = false;
    config.circuit_breaker.enabled = false;

    let sender = FlakySender::broken();
    let pipeline = pipeline(sender.clone(), config);

    let report = pipeline.publisher.publish(&notification()).await;
    assert_eq!(report.dead_lettered, 1);

    let reprocessor = DeadLetterReprocessor::new(
        pipeline.store.clone() as Arc<dyn DeadLetterStore>,
        pipeline.publisher.clone() as Arc<dyn NotificationPublisher>,
        ReprocessConfig::default(),
    );

    // First sweep still fails; the entry is rescheduled into the future
    let summary = reprocessor.reprocess_pending().await;
    assert_eq!(summary.failed, 1);
    let entry = &pipeline.store.find_by_status(DeadLetterStatus::Pending).await[0];
    assert_eq!(entry.retry_count, 1);
    assert!(entry.next_retry_at.unwrap() > chrono::Utc::now());

    // A rescheduled entry is not due, so the next sweep skips it
    assert_eq!(
        reprocessor.reprocess_pending().await,
        Default::default()
    );

    // Destination heals; force the entry due and reprocess directly
    sender.repair();
    let id = entry.id;
    pipeline.store.update_retry_info(id, 1, Some(chrono::Utc::now()), None).await;

    assert_eq!(reprocessor.reprocess_by_id(id).await, ReprocessOutcome::Resolved);
    assert_eq!(
        pipeline.store.find_by_id(id).await.unwrap().status,
        DeadLetterStatus::Resolved
    );
}

#[tokio::test]
async fn test_open_circuit_suppresses_sends_until_wait_elapses() {
    let mut config = fast_retry();
    config.retry.enabled = false;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.wait_duration_ms = 50;
    config.circuit_breaker.success_threshold = 1;

    let sender = FlakySender::broken();
    let pipeline = pipeline(sender.clone(), config);

    // Two failures trip the breaker
    pipeline.publisher.publish(&notification()).await;
    pipeline.publisher.publish(&notification()).await;
    assert_eq!(sender.calls(), 2);

    // Open circuit: skipped, no send, no new dead letter
    let skipped = pipeline.publisher.publish(&notification()).await;
    assert_eq!(skipped.skipped, 1);
    assert_eq!(sender.calls(), 2);
    assert_eq!(
        pipeline.store.count_by_status(DeadLetterStatus::Pending).await,
        2
    );

    // After the wait window a half-open probe goes through and closes it
    sender.repair();
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    let probe = pipeline.publisher.publish(&notification()).await;
    assert_eq!(probe.delivered, 1);
    assert_eq!(sender.calls(), 3);
}
