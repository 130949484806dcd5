use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch processor is stopped")]
    Stopped,
}
