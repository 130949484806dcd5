use std::sync::Arc;

use flog_core::LogEntry;

use crate::batch_processor::BatchProcessor;
use crate::error::PipelineError;

/// Thin façade over one [`BatchProcessor`], giving callers a sink-variant-
/// independent interface plus a stable identity string for logging and
/// metrics.
#[derive(Clone)]
pub struct OutputClient {
    processor: Arc<BatchProcessor>,
    endpoint: String,
}

impl OutputClient {
    pub fn new(processor: Arc<BatchProcessor>, endpoint: impl Into<String>) -> Self {
        Self {
            processor,
            endpoint: endpoint.into(),
        }
    }

    pub async fn handle(&self, entry: LogEntry) -> Result<(), PipelineError> {
        self.processor.enqueue(entry).await
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn stop(&self) {
        self.processor.stop();
    }

    pub async fn stop_wait(&self) {
        self.processor.stop_wait().await;
    }
}
