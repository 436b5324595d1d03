use async_trait::async_trait;

use super::types::DeadLetter;

/// Best-effort observer of finalized dead letters.
///
/// Sinks run after the store has persisted the record; a sink failure is
/// logged and isolated, it never affects the dispatch outcome or the
/// store's own bookkeeping.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn handle(&self, dead_letter: &DeadLetter) -> anyhow::Result<()>;
}
