use flog_pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("shoot delivery failed: {0}")]
    Shoot(#[source] PipelineError),

    #[error("seed delivery failed: {0}")]
    Seed(#[source] PipelineError),

    #[error("shoot delivery failed: {shoot}; seed delivery failed: {seed}")]
    Both {
        shoot: PipelineError,
        seed: PipelineError,
    },

    #[error("failed to decode tenant spec: {0}")]
    Decode(String),

    #[error("timed out waiting for cluster cache to sync")]
    CacheSyncTimeout,

    #[error("failed to build tenant client: {0}")]
    Build(String),
}
