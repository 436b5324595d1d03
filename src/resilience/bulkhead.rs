//! Bounded concurrency limiter for a single destination.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::BulkheadConfig;

/// Bulkhead preventing one destination from consuming all dispatch
/// capacity.
///
/// Permits are owned values; dropping the permit releases the slot on
/// every exit path.
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_concurrent_calls: usize,
}

impl Bulkhead {
    pub fn new(config: &BulkheadConfig) -> Self {
        let max = config.max_concurrent_calls.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max_concurrent_calls: max,
        }
    }

    /// Acquire a concurrency slot, waiting up to `max_wait`.
    /// Returns `None` when the bulkhead stayed full for the whole wait.
    pub async fn acquire(&self, max_wait: std::time::Duration) -> Option<OwnedSemaphorePermit> {
        match tokio::time::timeout(max_wait, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Some(permit),
            // Semaphore is never closed; treat a closed error like a full bulkhead
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Number of currently free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured concurrency bound
    pub fn capacity(&self) -> usize {
        self.max_concurrent_calls
    }
}
