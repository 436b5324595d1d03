use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::deadletter::{DeadLetter, DeadLetterSink, DeadLetterStore, FailureReason};
use crate::metrics::{
    DEAD_LETTERS_TOTAL, DISPATCH_ATTEMPTS_TOTAL, DISPATCH_FAILED_TOTAL, DISPATCH_RETRIES_TOTAL,
    DISPATCH_SKIPPED_TOTAL, DISPATCH_SUCCESS_TOTAL, REMOTE_RATE_LIMIT_TOTAL,
};
use crate::notification::Notification;
use crate::outbound::{SendOutcome, Sender};
use crate::resilience::{backoff, ConfigResolver, ResilienceRegistry, TimeoutConfig};
use crate::routing::DeliveryTarget;

/// Observer of destination-signaled rate limiting, consumed by an
/// external adaptive throttler. Must not block or fail.
pub trait RemoteRateLimitObserver: Send + Sync {
    fn on_remote_rate_limit(&self, target: &DeliveryTarget, retry_after: Option<Duration>);
}

/// Result of one guarded dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The destination accepted the payload
    Delivered { attempts: u32 },
    /// Circuit was open; the call was skipped without a dead letter
    Skipped,
    /// Terminal failure captured in the dead-letter store
    DeadLettered { reason: FailureReason, attempts: u32 },
}

/// Orchestrates admission control, fault isolation, retry, and timeout
/// around a single delivery attempt.
///
/// Steps short-circuit to a dead-letter outcome on rejection, except an
/// open circuit which is skipped silently (the destination is already
/// known-bad; recording a dead letter per skipped call would amplify the
/// dead-letter volume). `dispatch` never returns an error: unexpected
/// sender faults become `EXCEPTION` dead letters.
pub struct Dispatcher {
    config_resolver: Arc<ConfigResolver>,
    registry: Arc<ResilienceRegistry>,
    store: Arc<dyn DeadLetterStore>,
    sinks: Vec<Arc<dyn DeadLetterSink>>,
    rate_limit_observer: Option<Arc<dyn RemoteRateLimitObserver>>,
}

impl Dispatcher {
    pub fn new(
        config_resolver: Arc<ConfigResolver>,
        registry: Arc<ResilienceRegistry>,
        store: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            config_resolver,
            registry,
            store,
            sinks: Vec::new(),
            rate_limit_observer: None,
        }
    }

    /// Add a best-effort dead-letter sink
    pub fn add_sink(&mut self, sink: Arc<dyn DeadLetterSink>) {
        self.sinks.push(sink);
    }

    /// Set the remote rate-limit observer
    pub fn set_rate_limit_observer(&mut self, observer: Arc<dyn RemoteRateLimitObserver>) {
        self.rate_limit_observer = Some(observer);
    }

    /// Execute one guarded delivery to a target.
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, notification, target, sender, payload),
        fields(
            notification_id = %notification.id,
            type_id = %notification.type_id,
            platform = %target.platform,
            resource_key = %target.resource_key
        )
    )]
    pub async fn dispatch(
        &self,
        notification: &Arc<Notification>,
        target: &DeliveryTarget,
        sender: Arc<dyn Sender>,
        payload: Value,
    ) -> DispatchOutcome {
        let config = self
            .config_resolver
            .resolve(&target.platform, &target.resource_key);
        let resource_id = target.resource_id();

        // Step 1: rate limiter admission
        if config.rate_limiter.enabled {
            let limiter = self
                .registry
                .rate_limiter(&resource_id, &config.rate_limiter);
            if !limiter.acquire(config.rate_limiter.timeout_duration()).await {
                tracing::warn!("Rate limiter denied permit");
                return self
                    .record_dead_letter(
                        notification,
                        target,
                        payload,
                        FailureReason::RateLimited,
                        Some("local rate limit permit not acquired".to_string()),
                        0,
                    )
                    .await;
            }
        }

        // Step 2: bulkhead slot, released on every exit path when the
        // owned permit drops
        let _permit = if config.bulkhead.enabled {
            let bulkhead = self.registry.bulkhead(&resource_id, &config.bulkhead);
            match bulkhead.acquire(config.bulkhead.max_wait_duration()).await {
                Some(permit) => Some(permit),
                None => {
                    tracing::warn!("Bulkhead full");
                    return self
                        .record_dead_letter(
                            notification,
                            target,
                            payload,
                            FailureReason::BulkheadFull,
                            Some("bulkhead concurrency slot not acquired".to_string()),
                            0,
                        )
                        .await;
                }
            }
        } else {
            None
        };

        // Step 3: circuit breaker permission
        let breaker = if config.circuit_breaker.enabled {
            Some(
                self.registry
                    .circuit_breaker(&resource_id, &config.circuit_breaker),
            )
        } else {
            None
        };
        if let Some(cb) = &breaker {
            if !cb.allow_request() {
                DISPATCH_SKIPPED_TOTAL
                    .with_label_values(&[&target.platform])
                    .inc();
                tracing::debug!("Circuit open, delivery skipped");
                return DispatchOutcome::Skipped;
            }
        }

        // Steps 4-5: guarded send with retry
        let max_attempts = if config.retry.enabled {
            config.retry.max_attempts.max(1)
        } else {
            1
        };
        let mut attempts: u32 = 0;

        let last_outcome = loop {
            attempts += 1;
            DISPATCH_ATTEMPTS_TOTAL
                .with_label_values(&[&target.platform])
                .inc();

            let outcome = match self
                .guarded_send(sender.as_ref(), &target.endpoint_url, &payload, &config.timeout)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    if let Some(cb) = &breaker {
                        cb.record_failure();
                    }
                    tracing::error!(error = %error, "Unexpected sender fault");
                    return self
                        .record_dead_letter(
                            notification,
                            target,
                            payload,
                            FailureReason::Exception,
                            Some(error.to_string()),
                            1,
                        )
                        .await;
                }
            };

            if outcome.success {
                if let Some(cb) = &breaker {
                    cb.record_success();
                }
                DISPATCH_SUCCESS_TOTAL
                    .with_label_values(&[&target.platform])
                    .inc();
                tracing::debug!(attempts = attempts, "Delivery succeeded");
                return DispatchOutcome::Delivered { attempts };
            }

            if !config.retry.enabled || !outcome.retryable || attempts >= max_attempts {
                break outcome;
            }

            let delay = backoff::calculate_delay(
                attempts - 1,
                config.retry.initial_delay(),
                config.retry.multiplier,
                config.retry.max_delay(),
                config.retry.jitter_factor,
            );
            DISPATCH_RETRIES_TOTAL.inc();
            tracing::debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = outcome.error_message.as_deref().unwrap_or(""),
                "Retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
        };

        // Step 6: terminal failure handling
        if let Some(cb) = &breaker {
            cb.record_failure();
        }

        if last_outcome.rate_limited {
            REMOTE_RATE_LIMIT_TOTAL.inc();
            if let Some(observer) = &self.rate_limit_observer {
                observer.on_remote_rate_limit(target, last_outcome.retry_after);
            }
        }

        let reason = if last_outcome.retryable {
            FailureReason::MaxRetriesExceeded
        } else {
            FailureReason::NonRetryableError
        };

        self.record_dead_letter(
            notification,
            target,
            payload,
            reason,
            last_outcome.error_message,
            attempts,
        )
        .await
    }

    /// One timeout-guarded physical send. Deadline expiry drops the
    /// in-flight future and counts as a retryable failure.
    async fn guarded_send(
        &self,
        sender: &dyn Sender,
        endpoint_url: &str,
        payload: &Value,
        timeout: &TimeoutConfig,
    ) -> anyhow::Result<SendOutcome> {
        if !timeout.enabled {
            return sender.send(endpoint_url, payload).await;
        }

        match tokio::time::timeout(timeout.duration(), sender.send(endpoint_url, payload)).await {
            Ok(result) => result,
            Err(_) => Ok(SendOutcome::failure(
                format!("send timed out after {}ms", timeout.duration_ms),
                true,
            )),
        }
    }

    /// Record a terminal failure: persist the dead letter, fan out to
    /// sinks, update metrics. Store and sink failures are isolated and
    /// logged; they never change the returned outcome.
    pub(crate) async fn record_dead_letter(
        &self,
        notification: &Arc<Notification>,
        target: &DeliveryTarget,
        payload: Value,
        reason: FailureReason,
        error_message: Option<String>,
        attempt_count: u32,
    ) -> DispatchOutcome {
        DISPATCH_FAILED_TOTAL
            .with_label_values(&[&target.platform])
            .inc();
        DEAD_LETTERS_TOTAL.with_label_values(&[reason.as_str()]).inc();

        let dead_letter = DeadLetter {
            notification: Arc::clone(notification),
            platform: target.platform.clone(),
            resource_key: target.resource_key.clone(),
            endpoint_url: target.endpoint_url.clone(),
            payload,
            failure_reason: reason,
            error_message,
            attempt_count,
            timestamp: Utc::now(),
        };

        if let Err(error) = self.store.save(dead_letter.clone()).await {
            tracing::error!(
                error = %error,
                reason = %reason,
                "Failed to persist dead letter"
            );
        }

        for sink in &self.sinks {
            if let Err(error) = sink.handle(&dead_letter).await {
                tracing::warn!(error = %error, "Dead-letter sink failed");
            }
        }

        DispatchOutcome::DeadLettered {
            reason,
            attempts: attempt_count,
        }
    }
}
