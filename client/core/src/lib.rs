//! Shared data model, cluster-state policy and validated configuration for the
//! fleet log router.
//!
//! This crate has no I/O and no async runtime dependency: it is the part of
//! the routing core that every other crate (`flog-queue`, `flog-sink`,
//! `flog-pipeline`, `flog-routing`) builds on.

pub mod batch;
pub mod config;
pub mod label;
pub mod state;
pub mod timestamp;

pub use batch::{Batch, Stream};
pub use label::LabelSet;
pub use state::{ClusterState, StatePolicy};
pub use timestamp::Timestamp;

/// A single ingested log line, immutable from the moment it is created until
/// it is either exported or irrecoverably dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub labels: LabelSet,
    pub line: Vec<u8>,
}

impl LogEntry {
    pub fn new(timestamp: Timestamp, labels: LabelSet, line: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            labels,
            line: line.into(),
        }
    }
}
