use thiserror::Error;

/// Failure reasons a sink can hand back from `export`. Classification into
/// `Retryable` vs `Permanent` happens at the call site in each sink impl,
/// not here — this type just carries the message.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend rejected the batch: {0}")]
    Rejected(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// The result of one `Sink::export` call.
#[derive(Debug)]
pub enum ExportOutcome {
    Ok,
    Retryable(SinkError),
    Permanent(SinkError),
}

impl ExportOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExportOutcome::Ok)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExportOutcome::Retryable(_))
    }
}
