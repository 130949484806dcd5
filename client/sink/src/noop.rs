use async_trait::async_trait;
use flog_core::Batch;

use crate::error::ExportOutcome;
use crate::sink::Sink;

/// Discards every batch. Used for benchmarking the pipeline up to (but not
/// including) real network I/O, and as the default in unit tests.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl Sink for NoopSink {
    async fn export(&self, _batch: &Batch) -> ExportOutcome {
        ExportOutcome::Ok
    }

    fn endpoint(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flog_core::{LabelSet, Timestamp};

    #[tokio::test]
    async fn always_reports_ok() {
        let mut batch = Batch::new(0, "id".to_string());
        batch.add(&LabelSet::new(), Timestamp::from_nanos(1), b"line".to_vec());
        assert!(NoopSink.export(&batch).await.is_ok());
    }
}
