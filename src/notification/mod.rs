//! Notification domain model.

mod types;

pub use types::{Notification, NotificationBuilder};
