//! Event stream dispatcher
//!
//! Runs the receive loop of the background connection:
//!
//! ```text
//! Idle -> Connecting -> Subscribed -> Receiving -> Closed | Failed | Stopped
//! ```
//!
//! For every line: decode, apply to the [`StateStore`] under its lock, release
//! the lock, then notify matching subscribers. The loop is strictly
//! sequential; line N+1 is not read before every subscriber of line N has
//! returned.
//!
//! ## Protocol
//!
//! 1. Connect to `$FHTC_SOCKET_PATH` (a connection of its own)
//! 2. Send `"subscribe"` + newline
//! 3. Receive events immediately; fht sends no acknowledgement
//!
//! A dropped connection is not re-established.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::codec::{decode_event, RawEvent, Request};
use crate::registry::SubscriptionRegistry;
use crate::store::StateStore;
use crate::transport::{Connection, Endpoint};
use crate::types::Event;
use crate::IpcError;

/// Delay applied after each processed line, bounding CPU use under event storms
pub const DEFAULT_PACING: Duration = Duration::from_millis(1);

/// Lifecycle of the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Not started
    Idle,
    /// Resolving the endpoint and connecting
    Connecting,
    /// Subscription request sent
    Subscribed,
    /// Reading events
    Receiving,
    /// The compositor closed the stream
    Closed,
    /// Connecting, subscribing or reading failed
    Failed,
    /// Shut down on request
    Stopped,
}

impl DispatcherState {
    /// The loop has exited and will not run again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed | Self::Stopped)
    }
}

/// Applies incoming events to the store and fans them out to subscribers
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<StateStore>,
    registry: Arc<SubscriptionRegistry>,
    state: watch::Sender<DispatcherState>,
    pacing: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<StateStore>,
        registry: Arc<SubscriptionRegistry>,
        pacing: Duration,
    ) -> Self {
        let (state, _) = watch::channel(DispatcherState::Idle);
        Self {
            store,
            registry,
            state,
            pacing,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: DispatcherState) {
        debug!(?state, "Dispatcher state changed");
        self.state.send_replace(state);
    }

    /// Connect, subscribe, and receive until the stream ends
    ///
    /// Returns `Ok(())` when the compositor closes the stream or `shutdown`
    /// completes. Connection and read failures end the loop with an error;
    /// nothing is retried.
    pub async fn run<S>(&self, endpoint: &Endpoint, shutdown: S) -> Result<(), IpcError>
    where
        S: Future,
    {
        self.set_state(DispatcherState::Connecting);

        let mut connection = match Connection::connect(endpoint).await {
            Ok(connection) => connection,
            Err(e) => {
                if e.is_unavailable() {
                    warn!("fht is not running, fht IPC will not be available: {}", e);
                } else {
                    error!("fht IPC failed to start: {}", e);
                }
                self.set_state(DispatcherState::Failed);
                return Err(e);
            }
        };

        info!("fht IPC starting on {}", connection.socket_path().display());

        if let Err(e) = connection.send(&Request::Subscribe).await {
            error!("fht IPC failed to start event stream: {}", e);
            self.set_state(DispatcherState::Failed);
            return Err(e);
        }

        self.set_state(DispatcherState::Subscribed);
        info!("fht IPC subscription sent, listening for events");

        self.receive(connection.reader_mut(), shutdown).await
    }

    /// Receive loop over any line source
    pub async fn receive<R, S>(&self, mut reader: R, shutdown: S) -> Result<(), IpcError>
    where
        R: AsyncBufRead + Unpin,
        S: Future,
    {
        self.set_state(DispatcherState::Receiving);
        tokio::pin!(shutdown);

        let mut buf = Vec::new();
        loop {
            buf.clear();

            // Raw bytes: a line that is not UTF-8 is skipped like any other
            // malformed line instead of failing the stream
            let read = tokio::select! {
                _ = &mut shutdown => {
                    info!("fht IPC shutting down");
                    self.set_state(DispatcherState::Stopped);
                    return Ok(());
                }
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!("fht IPC event stream closed");
                    self.set_state(DispatcherState::Closed);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    error!("fht IPC event stream error: {}", e);
                    self.set_state(DispatcherState::Failed);
                    return Err(IpcError::ReceiveFailed(e));
                }
            }

            match std::str::from_utf8(&buf) {
                Ok(line) => {
                    self.process_line(line.trim_end());
                }
                Err(e) => {
                    warn!("Failed to parse IPC message: invalid UTF-8, reason: {}", e);
                }
            }

            if !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
        }
    }

    /// Decode, apply and dispatch a single line
    ///
    /// Returns `false` if the line was rejected. A rejected line changes
    /// nothing and notifies nobody.
    pub fn process_line(&self, line: &str) -> bool {
        debug!("fht IPC received {}", line);

        let decoded =
            decode_event(line).and_then(|raw| Event::from_raw(&raw).map(|event| (raw, event)));
        let (raw, event) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Failed to parse IPC message: {}, reason: {}", line, e);
                return false;
            }
        };

        self.store.apply(event);
        self.notify(&raw);
        true
    }

    /// Invoke subscribers of `event` in registration order
    ///
    /// Must run without the store lock held.
    fn notify(&self, event: &RawEvent) {
        for subscriber in self.registry.subscribers_for(&event.name) {
            subscriber.on_event(event);
        }
    }
}
