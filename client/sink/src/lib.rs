//! Pluggable export backends for flushed batches.
//!
//! Every concrete sink implements the same [`Sink`] trait so a
//! `BatchProcessor` can be built against whichever one a tenant's
//! configuration names, without caring which.

mod error;
mod noop;
mod otlp_grpc;
mod otlp_http;
mod sink;
mod stdout;

pub use error::{ExportOutcome, SinkError};
pub use noop::NoopSink;
pub use otlp_grpc::OtlpGrpcSink;
pub use otlp_http::OtlpHttpSink;
pub use sink::Sink;
pub use stdout::StdoutSink;
