//! Background tasks.

mod reprocess;

pub use reprocess::ReprocessTask;
