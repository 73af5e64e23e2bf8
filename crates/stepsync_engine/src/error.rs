//! Error types for the sync engine.

use stepsync_protocol::{ProtocolError, TransformError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// None of these end the session: the scheduler logs them and the next
/// cycle starts again from the last confirmed state.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A fetch, push or reset did not answer within the request timeout.
    #[error("operation timed out")]
    Timeout,

    /// Malformed or inconsistent response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server rejected the request.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Error message from the body.
        message: String,
    },

    /// The server's history is shorter than our confirmed version.
    #[error("version {requested} is beyond server version {current}")]
    OutOfRangeVersion {
        /// Version we asked for.
        requested: u64,
        /// Version the server reported.
        current: u64,
    },

    /// The server's store failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A remote step could not be merged into local state.
    #[error("edit could not be merged: {}", .0.message)]
    Transform(#[from] TransformError),

    /// Another cycle is already running for this document.
    #[error("sync cycle already in progress")]
    CycleInProgress,

    /// The session was closed.
    #[error("session closed")]
    Closed,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::StorageUnavailable(_) => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad url").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::StorageUnavailable("disk".into()).is_retryable());
        assert!(SyncError::Server {
            status: 500,
            message: "oops".into()
        }
        .is_retryable());
        assert!(!SyncError::Server {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!SyncError::Closed.is_retryable());
    }

    #[test]
    fn transform_failure_message() {
        let err: SyncError = TransformError::new("position out of range").into();
        assert_eq!(err.to_string(), "edit could not be merged: position out of range");
    }
}
