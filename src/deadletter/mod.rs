//! Dead-letter subsystem: durable capture and reprocessing of terminal
//! delivery failures.
//!
//! Deliveries that ultimately fail are recorded as [`DeadLetter`]s, stored
//! as [`StoredDeadLetter`] entries with a retry state machine, and driven
//! back through the publish path by the [`DeadLetterReprocessor`] on an
//! independent backoff schedule.

mod memory;
mod reprocessor;
mod sink;
mod store;
mod types;

pub use memory::MemoryDeadLetterStore;
pub use reprocessor::{DeadLetterReprocessor, ReprocessConfig, ReprocessOutcome, ReprocessSummary};
pub use sink::DeadLetterSink;
pub use store::{ClaimOutcome, DeadLetterStore, StoreError};
pub use types::{
    DeadLetter, DeadLetterConfig, DeadLetterStatus, FailureReason, StoredDeadLetter,
};
