use async_trait::async_trait;
use flog_core::Batch;

use crate::error::ExportOutcome;

/// A pluggable export backend. One `Sink` is owned exclusively by one
/// `BatchProcessor`; `export` is called once per flushed batch and must
/// classify any failure as retryable or permanent, since the caller's retry
/// loop has no other way to tell them apart.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn export(&self, batch: &Batch) -> ExportOutcome;

    /// A stable identity string for logging and metrics (the configured
    /// endpoint, or a fixed label for sinks with no network destination).
    fn endpoint(&self) -> &str;
}
