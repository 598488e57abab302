//! Unix socket transport
//!
//! Handles endpoint discovery, connection setup and newline-delimited I/O.
//! The background event stream and one-shot command calls each open their
//! own [`Connection`].

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;

use crate::codec::{decode_response, encode_request, Request};
use crate::IpcError;

/// Environment variable fht-compositor exports with its IPC socket path
pub const DEFAULT_SOCKET_ENV: &str = "FHTC_SOCKET_PATH";

/// Where to find the compositor socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Read the path from the named environment variable at connect time
    Env(String),
    /// Use this path directly
    Path(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Env(DEFAULT_SOCKET_ENV.to_string())
    }
}

impl Endpoint {
    /// Resolve the socket path
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Unavailable` if the environment variable is unset or
    /// empty. Whether the path exists is only checked when connecting.
    pub fn resolve(&self) -> Result<PathBuf, IpcError> {
        match self {
            Endpoint::Path(path) => Ok(path.clone()),
            Endpoint::Env(var) => std::env::var_os(var)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| IpcError::Unavailable { var: var.clone() }),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Env(var) => write!(f, "${var}"),
            Endpoint::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Discover the socket path from `$FHTC_SOCKET_PATH`
pub fn get_socket_path() -> Result<PathBuf, IpcError> {
    Endpoint::default().resolve()
}

/// An open, line-oriented connection to the compositor
#[derive(Debug)]
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    socket_path: PathBuf,
}

impl Connection {
    /// Resolve `endpoint` and connect to it
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Unavailable` if no endpoint is configured and
    /// `IpcError::ConnectionFailed` if the socket cannot be connected.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, IpcError> {
        let socket_path = endpoint.resolve()?;

        let socket = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| IpcError::ConnectionFailed {
                path: socket_path.clone(),
                source: e,
            })?;

        debug!("Connected to fht socket at {}", socket_path.display());

        // Owned halves: the event stream keeps the reader for the lifetime of
        // the connection, and the writer must stay open alongside it.
        let (read_half, write_half) = socket.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Write `line` followed by a newline, then flush
    pub async fn write_line(&mut self, line: &str) -> Result<(), IpcError> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(IpcError::SendFailed)?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(IpcError::SendFailed)?;
        self.writer.flush().await.map_err(IpcError::SendFailed)
    }

    /// Encode and write a request
    pub async fn send(&mut self, request: &Request) -> Result<(), IpcError> {
        let line = encode_request(request)?;
        debug!(request = %line, "Sending request");
        self.write_line(&line).await
    }

    /// Read one line, without its line terminator
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` at end of stream and
    /// `IpcError::ReceiveFailed` on an I/O error.
    pub async fn read_line(&mut self) -> Result<String, IpcError> {
        let mut line = String::new();
        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(IpcError::ReceiveFailed)?;

        if bytes_read == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    /// Buffered reader, for the event loop
    pub(crate) fn reader_mut(&mut self) -> &mut BufReader<OwnedReadHalf> {
        &mut self.reader
    }
}

/// Send one request on a fresh connection and read exactly one reply line
///
/// The connection is closed when this returns.
pub async fn call(endpoint: &Endpoint, request: &Request) -> Result<Value, IpcError> {
    let mut connection = Connection::connect(endpoint).await?;
    connection.send(request).await?;
    let line = connection.read_line().await?;
    debug!(response = %line, "Received response");
    decode_response(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    // Tests touching FHTC_SOCKET_PATH must not run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_socket_not_set_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(DEFAULT_SOCKET_ENV).ok();

        env::remove_var(DEFAULT_SOCKET_ENV);
        let result = get_socket_path();

        if let Some(val) = original {
            env::set_var(DEFAULT_SOCKET_ENV, val);
        }

        let err = result.unwrap_err();
        assert!(err.is_unavailable(), "Expected Unavailable, got: {:?}", err);
        assert!(
            err.to_string().contains(DEFAULT_SOCKET_ENV),
            "Error message should mention the variable: {}",
            err
        );
    }

    #[test]
    fn test_empty_socket_env_is_unavailable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(DEFAULT_SOCKET_ENV).ok();

        env::set_var(DEFAULT_SOCKET_ENV, "");
        let result = get_socket_path();

        match original {
            Some(val) => env::set_var(DEFAULT_SOCKET_ENV, val),
            None => env::remove_var(DEFAULT_SOCKET_ENV),
        }

        assert!(matches!(result, Err(IpcError::Unavailable { .. })));
    }

    #[test]
    fn test_socket_env_is_read() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let original = env::var(DEFAULT_SOCKET_ENV).ok();

        env::set_var(DEFAULT_SOCKET_ENV, "/run/user/1000/fht.sock");
        let result = get_socket_path();

        match original {
            Some(val) => env::set_var(DEFAULT_SOCKET_ENV, val),
            None => env::remove_var(DEFAULT_SOCKET_ENV),
        }

        assert_eq!(result.unwrap(), PathBuf::from("/run/user/1000/fht.sock"));
    }

    #[test]
    fn test_custom_env_endpoint() {
        let var = "FHT_MIRROR_TEST_CUSTOM_ENDPOINT";
        env::set_var(var, "/tmp/custom.sock");
        let endpoint = Endpoint::Env(var.to_string());
        assert_eq!(endpoint.resolve().unwrap(), PathBuf::from("/tmp/custom.sock"));
        env::remove_var(var);
        assert!(endpoint.resolve().unwrap_err().is_unavailable());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::default().to_string(), "$FHTC_SOCKET_PATH");
        assert_eq!(
            Endpoint::Path(PathBuf::from("/tmp/fht.sock")).to_string(),
            "/tmp/fht.sock"
        );
    }

    #[tokio::test]
    async fn test_connect_to_non_socket_fails() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let socket_path = temp_dir.path().join("fht.sock");
        std::fs::write(&socket_path, "").expect("Failed to create dummy file");

        let err = Connection::connect(&Endpoint::Path(socket_path.clone()))
            .await
            .unwrap_err();

        match &err {
            IpcError::ConnectionFailed { path, .. } => assert_eq!(path, &socket_path),
            other => panic!("Expected ConnectionFailed, got: {:?}", other),
        }
        assert!(err.to_string().contains("Failed to connect"));
    }

    #[tokio::test]
    async fn test_connect_to_missing_path_fails() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing.sock");
        let result = Connection::connect(&Endpoint::Path(missing)).await;
        assert!(matches!(result, Err(IpcError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_line_io_and_end_of_stream() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("fht.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(b"pong\r\n").await.unwrap();
            line
            // write half dropped here: client sees end of stream
        });

        let mut connection = Connection::connect(&Endpoint::Path(socket_path.clone()))
            .await
            .unwrap();
        assert_eq!(connection.socket_path(), socket_path.as_path());

        connection.write_line("ping").await.unwrap();
        assert_eq!(connection.read_line().await.unwrap(), "pong");
        assert_eq!(server.await.unwrap(), "ping\n");
        assert!(matches!(
            connection.read_line().await,
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("fht.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(b"{\"Ok\":null}\n").await.unwrap();
            line
        });

        let response = call(&Endpoint::Path(socket_path), &Request::focus_workspace(2))
            .await
            .unwrap();

        assert_eq!(response, serde_json::json!({ "Ok": null }));
        assert_eq!(
            server.await.unwrap(),
            "{\"action\":{\"focus-workspace\":{\"workspace-id\":2}}}\n"
        );
    }

    #[tokio::test]
    async fn test_call_without_reply_is_connection_closed() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("fht.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            // Close without answering
        });

        let result = call(&Endpoint::Path(socket_path), &Request::focus_workspace(1)).await;
        server.await.unwrap();
        assert!(matches!(result, Err(IpcError::ConnectionClosed)));
    }
}
