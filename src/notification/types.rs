use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;

/// Structured notification routed to webhook destinations.
///
/// Immutable after construction; downstream records (including dead
/// letters) hold it behind an `Arc` rather than copying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier for this notification
    pub id: Uuid,
    /// Identity of the event kind (e.g., "order.created")
    pub type_id: String,
    /// Coarse grouping used by routing fallback (e.g., "billing")
    pub category: String,
    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
    /// Opaque caller-defined payload
    pub context: Value,
    /// Insertion-ordered metadata
    pub metadata: Map<String, Value>,
}

impl Notification {
    /// Create a builder for a notification of the given type and category
    pub fn builder(type_id: impl Into<String>, category: impl Into<String>) -> NotificationBuilder {
        NotificationBuilder::new(type_id, category)
    }

    /// Read-only view of the metadata map
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Builder for creating notifications
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    type_id: String,
    category: String,
    occurred_at: Option<DateTime<Utc>>,
    context: Value,
    metadata: Map<String, Value>,
}

impl NotificationBuilder {
    pub fn new(type_id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            category: category.into(),
            occurred_at: None,
            context: Value::Null,
            metadata: Map::new(),
        }
    }

    /// Set the opaque context payload
    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Set the context from a serializable value
    pub fn context_from<T: Serialize>(mut self, context: &T) -> Result<Self, serde_json::Error> {
        self.context = serde_json::to_value(context)?;
        Ok(self)
    }

    /// Override the occurrence timestamp (defaults to now)
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Append a metadata entry; insertion order is preserved
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the notification, validating identity fields
    pub fn build(self) -> Result<Notification, AppError> {
        if self.type_id.trim().is_empty() {
            return Err(AppError::Validation("type_id must not be blank".into()));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::Validation("category must not be blank".into()));
        }

        Ok(Notification {
            id: Uuid::new_v4(),
            type_id: self.type_id,
            category: self.category,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            context: self.context,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let before = Utc::now();
        let notification = Notification::builder("invoice.paid", "billing")
            .context(json!({"invoice_id": "inv-42"}))
            .metadata("tenant", "acme")
            .metadata("region", "eu-west-1")
            .build()
            .unwrap();

        assert_eq!(notification.type_id, "invoice.paid");
        assert_eq!(notification.category, "billing");
        assert!(notification.occurred_at >= before);

        let keys: Vec<&String> = notification.metadata().keys().collect();
        assert_eq!(keys, vec!["tenant", "region"]);
    }

    #[test]
    fn test_blank_identity_rejected() {
        assert!(Notification::builder("", "billing").build().is_err());
        assert!(Notification::builder("invoice.paid", "  ").build().is_err());
    }

    #[test]
    fn test_explicit_occurred_at() {
        let ts = Utc::now() - chrono::Duration::hours(1);
        let notification = Notification::builder("a", "b")
            .occurred_at(ts)
            .build()
            .unwrap();
        assert_eq!(notification.occurred_at, ts);
    }
}
