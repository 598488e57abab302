//! One-shot command client
//!
//! Each command opens its own connection, independent of the event stream.
//! Failures are returned to the caller, who is expected to log them and carry
//! on.

use serde_json::Value;
use tracing::debug;

use crate::codec::Request;
use crate::transport::{call, Endpoint};
use crate::IpcError;

/// Sends requests to the compositor and returns the reply
#[derive(Debug, Clone, Default)]
pub struct CommandClient {
    endpoint: Endpoint,
}

impl CommandClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send `request` and wait for its single reply line
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Unavailable` when no endpoint is configured, and the
    /// connection or I/O variants when the round trip fails.
    pub async fn send(&self, request: &Request) -> Result<Value, IpcError> {
        debug!(endpoint = %self.endpoint, "Sending command");
        call(&self.endpoint, request).await
    }

    /// Focus the workspace with the given id
    pub async fn focus_workspace(&self, workspace_id: u64) -> Result<Value, IpcError> {
        self.send(&Request::focus_workspace(workspace_id)).await
    }
}
