//! Guarded dispatch pipeline: publish orchestration and the
//! resilience-wrapped delivery path.

mod dispatcher;
mod publisher;

pub use dispatcher::{DispatchOutcome, Dispatcher, RemoteRateLimitObserver};
pub use publisher::{NotificationPublisher, PublishReport, WebhookPublisher};
