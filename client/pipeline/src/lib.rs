//! Durable buffering, accumulation, retry and throttling between the
//! enqueue API and a pluggable [`flog_sink::Sink`].

mod batch_processor;
mod error;
mod output_client;
mod throttle;

pub use batch_processor::{BatchProcessor, DEFAULT_ID_LABEL_NAME};
pub use error::PipelineError;
pub use output_client::OutputClient;
pub use throttle::Throttle;
