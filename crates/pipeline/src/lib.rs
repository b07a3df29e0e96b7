//! Run loop for the utxo-oracle system.
//!
//! This crate handles:
//! - Pulling blocks from a source behind a bounded queue
//! - Parallel decoding and per-block estimation
//! - Height ordering, smoothing and consensus
//! - Run bounds and cancellation
//! - The serialized result record

pub mod bounds;
pub mod cancel;
pub mod pipeline;
pub mod report;

pub use bounds::RunBounds;
pub use cancel::CancelToken;
pub use pipeline::{Pipeline, RunOutput, RunSummary, StopReason};
pub use report::ResultRecord;
