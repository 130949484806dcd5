//! The on-disk FIFO a `BatchProcessor` drains into batches.
//!
//! Entries are appended to fixed-row segment files (`segment-NNNNNN.dat`)
//! under a queue directory; a sibling `cursor` file tracks how far the
//! single reader has progressed so a restart resumes without replaying
//! already-delivered rows. See [`DurableQueue`] for the concurrency and
//! durability model.

mod cursor;
mod entry;
mod error;
mod queue;
mod segment;

pub use entry::QueueEntry;
pub use error::QueueError;
pub use queue::{DurableQueue, PopOutcome};
