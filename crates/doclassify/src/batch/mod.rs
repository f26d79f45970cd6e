//! Batch orchestration: rounds of documents through the worker pool.

pub mod record;
pub mod runner;
pub mod stats;

pub use record::{BatchItemError, ProcessingBatch};
pub use runner::{BatchRunner, BatchSummary};
pub use stats::{format_duration, RoundStats};
