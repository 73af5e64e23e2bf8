//! Server configuration.

use stepsync_protocol::RESET_MESSAGE;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of steps accepted in one push.
    pub max_push_batch: usize,
    /// Maximum request body size in bytes.
    pub max_request_bytes: usize,
    /// Message returned by a successful reset.
    pub reset_message: String,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_push_batch: 100,
            max_request_bytes: 1024 * 1024,
            reset_message: RESET_MESSAGE.to_string(),
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    /// Sets the reset confirmation message.
    pub fn with_reset_message(mut self, message: impl Into<String>) -> Self {
        self.reset_message = message.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
