//! Dead Letter Queue for failed batches and files.
//!
//! Rejected batches and unreadable files are recorded as NDJSON to a
//! configurable storage location for later inspection and replay.
//!
//! # Components
//!
//! - [`DeadLetterQueue`] - buffers failures and writes them to storage
//! - [`FailureTracker`] - counts failures and enforces `max_failures`

mod queue;
mod tracker;
mod types;

pub use queue::DeadLetterQueue;
pub use tracker::FailureTracker;
pub use types::{FailedBatch, FailureStats};
