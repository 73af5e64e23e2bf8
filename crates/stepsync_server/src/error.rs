//! Error types for the sync server.

use stepsync_protocol::{ErrorCode, ErrorResponse, ProtocolError};
use stepsync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client asked for steps past the end of the log.
    #[error("version {requested} is beyond current version {current}")]
    OutOfRangeVersion {
        /// Requested version.
        requested: u64,
        /// Current version of the document.
        current: u64,
    },

    /// A push exceeded the configured batch or body size.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unknown route.
    #[error("not found: {0}")]
    NotFound(String),

    /// Known route, unsupported method.
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        /// Method used.
        method: &'static str,
        /// Path requested.
        path: String,
    },

    /// The step store failed; the request may be retried.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::OutOfRangeVersion { .. }
                | ServerError::PayloadTooLarge(_)
                | ServerError::NotFound(_)
                | ServerError::MethodNotAllowed { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::StorageUnavailable(_) | ServerError::Internal(_)
        )
    }

    /// Wire classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ServerError::OutOfRangeVersion { .. } => ErrorCode::OutOfRangeVersion,
            ServerError::PayloadTooLarge(_) => ErrorCode::PayloadTooLarge,
            ServerError::NotFound(_) => ErrorCode::NotFound,
            ServerError::MethodNotAllowed { .. } => ErrorCode::MethodNotAllowed,
            ServerError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            ServerError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        self.code().status()
    }

    /// Error body sent to the client.
    pub fn to_response(&self) -> ErrorResponse {
        let body = ErrorResponse::new(self.code(), self.to_string());
        match self {
            ServerError::OutOfRangeVersion { current, .. } => body.with_version(*current),
            _ => body,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OutOfRangeVersion { requested, current } => {
                ServerError::OutOfRangeVersion { requested, current }
            }
            StoreError::InvalidBatch { .. } => ServerError::InvalidRequest(err.to_string()),
            other => ServerError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}
