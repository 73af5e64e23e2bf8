//! Error types for step store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not complete the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read asked for a version past the end of the log.
    #[error("version {requested} is beyond current version {current}")]
    OutOfRangeVersion {
        /// The requested version.
        requested: u64,
        /// The document's current version.
        current: u64,
    },

    /// Steps and origin ids do not line up.
    #[error("invalid batch: {steps} steps but {origins} origin ids")]
    InvalidBatch {
        /// Number of steps.
        steps: usize,
        /// Number of origin ids.
        origins: usize,
    },

    /// A persisted log could not be decoded.
    #[error("log corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process")]
    Locked,
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if the failure is a storage fault rather than bad input.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_)
                | StoreError::Io(_)
                | StoreError::Corrupted(_)
                | StoreError::Locked
        )
    }
}
