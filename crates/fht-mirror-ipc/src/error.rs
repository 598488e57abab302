//! Error types for fht IPC operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when communicating with fht-compositor
#[derive(Debug, Error)]
pub enum IpcError {
    /// The socket environment variable is not set (or is empty)
    ///
    /// This is the normal state when the compositor is not running.
    #[error("{var} environment variable not set - is fht-compositor running?")]
    Unavailable { var: String },

    /// Failed to create or connect the socket
    #[error("Failed to connect to fht socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write or flush a request line
    #[error("Failed to send request to fht: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to read a line from the socket
    #[error("Failed to receive from fht: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Failed to serialize a request to JSON
    #[error("Failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to parse a response line as JSON
    #[error("Failed to deserialize response: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// An event line did not have the expected shape
    #[error("Malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// The remote side closed the connection
    #[error("Connection to fht closed")]
    ConnectionClosed,
}

impl IpcError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Whether this error only means the compositor is not running
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
