//! Error types for the utxo-oracle system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the utxo-oracle system.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed block payload.
    #[error("Decode error at height {height}: {reason}")]
    Decode { height: u64, reason: String },

    /// Block source failure (missing file, unreadable payload, lost connection).
    #[error("Block source error: {0}")]
    Source(String),

    /// Block source yielded a height that does not strictly increase.
    #[error("Block source out of order: height {found} after {previous}")]
    OutOfOrder { previous: u64, found: u64 },

    /// Data error (invalid or inconsistent data).
    #[error("Data error: {0}")]
    Data(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a decode error for the block at `height`.
    pub fn decode(height: u64, reason: impl Into<String>) -> Self {
        Error::Decode {
            height,
            reason: reason.into(),
        }
    }

    /// Create a block source error.
    pub fn source(msg: impl Into<String>) -> Self {
        Error::Source(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Whether this error only affects a single block.
    ///
    /// Block-local errors are skipped by the pipeline; everything else aborts the run.
    pub fn is_block_local(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}
