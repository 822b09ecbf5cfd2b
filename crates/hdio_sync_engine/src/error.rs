//! Error types for the sync engine.

use hdio_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network error or non-success HTTP response.
    #[error("transport error: {message}")]
    Transport {
        /// Server-provided message, HTTP status text, or network error.
        message: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
    },

    /// The client was built without complete credentials.
    #[error("client is not initialized")]
    NotInitialized,

    /// The client was closed.
    #[error("client closed")]
    ClientClosed,

    /// Session acquisition failed; every waiter sees the same failure.
    #[error("session acquisition failed: {0}")]
    SessionFailed(String),

    /// Resolution or packaging failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A worker message could not be decoded.
    #[error("invalid worker message: {0}")]
    InvalidMessage(String),

    /// The worker has shut down.
    #[error("worker stopped")]
    WorkerStopped,
}

impl SyncError {
    /// Creates a transport error for a non-success response.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Creates a transport error for a request that got no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Returns true if the error is a lifecycle error: the client is closed
    /// or was never initialized.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, SyncError::NotInitialized | SyncError::ClientClosed)
    }
}
