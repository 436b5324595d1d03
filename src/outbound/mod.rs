//! Outbound collaborator interfaces: senders and payload formatters.
//!
//! One sender per platform performs the actual webhook transport; one
//! formatter per (platform, type) pair, with a platform-wide fallback,
//! turns a notification into the platform's wire payload. Both are
//! registered once at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::notification::Notification;

/// Outcome of a single physical send attempt.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    /// Whether the failure is worth retrying
    pub retryable: bool,
    /// Destination signaled external rate limiting
    pub rate_limited: bool,
    /// Destination-suggested wait before retrying
    pub retry_after: Option<Duration>,
}

impl SendOutcome {
    pub fn success(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            retryable,
            ..Default::default()
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            retryable: true,
            rate_limited: true,
            retry_after,
            ..Default::default()
        }
    }
}

/// Transport that delivers a payload to a webhook endpoint.
///
/// Expected failures (HTTP errors, destination throttling) are encoded in
/// the returned [`SendOutcome`]; `Err` is reserved for unexpected
/// transport-layer faults and is converted by the dispatcher into an
/// exception dead letter.
#[async_trait]
pub trait Sender: Send + Sync {
    fn platform(&self) -> &str;

    async fn send(&self, endpoint_url: &str, payload: &Value) -> anyhow::Result<SendOutcome>;
}

/// Transforms a notification into a platform-specific wire payload.
///
/// Registered either for a (platform, type_id) pair or platform-wide.
/// Returning `None` means the payload could not be constructed.
pub trait Formatter: Send + Sync {
    fn platform(&self) -> &str;

    /// Type id this formatter is specialized for; `None` makes it the
    /// platform-wide fallback
    fn type_id(&self) -> Option<&str> {
        None
    }

    fn format(&self, notification: &Notification) -> Option<Value>;
}

/// Platform-string -> sender registry, built once at startup.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn Sender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sender: Arc<dyn Sender>) {
        self.senders.insert(sender.platform().to_string(), sender);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn Sender>> {
        self.senders.get(platform).cloned()
    }
}

/// Formatter registry with (platform, type) lookup and platform fallback.
#[derive(Default)]
pub struct FormatterRegistry {
    by_platform_and_type: HashMap<(String, String), Arc<dyn Formatter>>,
    by_platform: HashMap<String, Arc<dyn Formatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, formatter: Arc<dyn Formatter>) {
        let platform = formatter.platform().to_string();
        match formatter.type_id() {
            Some(type_id) => {
                self.by_platform_and_type
                    .insert((platform, type_id.to_string()), formatter);
            }
            None => {
                self.by_platform.insert(platform, formatter);
            }
        }
    }

    /// Resolve by (platform, type_id), falling back to platform-only
    pub fn get(&self, platform: &str, type_id: &str) -> Option<Arc<dyn Formatter>> {
        self.by_platform_and_type
            .get(&(platform.to_string(), type_id.to_string()))
            .or_else(|| self.by_platform.get(platform))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticFormatter {
        platform: &'static str,
        type_id: Option<&'static str>,
        tag: &'static str,
    }

    impl Formatter for StaticFormatter {
        fn platform(&self) -> &str {
            self.platform
        }
        fn type_id(&self) -> Option<&str> {
            self.type_id
        }
        fn format(&self, _notification: &Notification) -> Option<Value> {
            Some(json!({"formatter": self.tag}))
        }
    }

    #[test]
    fn test_formatter_type_lookup_with_platform_fallback() {
        let mut registry = FormatterRegistry::new();
        registry.register(Arc::new(StaticFormatter {
            platform: "slack",
            type_id: Some("invoice.paid"),
            tag: "specialized",
        }));
        registry.register(Arc::new(StaticFormatter {
            platform: "slack",
            type_id: None,
            tag: "fallback",
        }));

        let notification = Notification::builder("invoice.paid", "billing").build().unwrap();

        let specialized = registry.get("slack", "invoice.paid").unwrap();
        assert_eq!(
            specialized.format(&notification).unwrap()["formatter"],
            "specialized"
        );

        let fallback = registry.get("slack", "user.created").unwrap();
        assert_eq!(fallback.format(&notification).unwrap()["formatter"], "fallback");

        assert!(registry.get("teams", "invoice.paid").is_none());
    }

    #[test]
    fn test_send_outcome_constructors() {
        assert!(SendOutcome::success(200).success);

        let failure = SendOutcome::failure("boom", true);
        assert!(!failure.success);
        assert!(failure.retryable);

        let limited = SendOutcome::rate_limited("429", Some(Duration::from_secs(3)));
        assert!(limited.rate_limited);
        assert!(limited.retryable);
        assert_eq!(limited.retry_after, Some(Duration::from_secs(3)));
    }
}
