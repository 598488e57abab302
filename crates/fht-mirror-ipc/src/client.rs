//! Shared client handle
//!
//! One [`IpcClient`] per application, passed around by `Arc`. It owns the
//! mirror, the subscriber registry and the background event task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::CommandClient;
use crate::dispatcher::{Dispatcher, DispatcherState, DEFAULT_PACING};
use crate::registry::{Subscriber, SubscriptionRegistry};
use crate::store::{Mirror, StateStore};
use crate::transport::Endpoint;
use crate::{IpcError, Request};

/// Settings for an [`IpcClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Socket used by both the event stream and commands
    pub endpoint: Endpoint,
    /// Delay after each processed event line
    pub pacing: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            pacing: DEFAULT_PACING,
        }
    }
}

/// Mirror of fht-compositor workspace and window state
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fht_mirror_ipc::{ClientOptions, IpcClient, RawEvent, Subscriber};
///
/// # async fn example() {
/// let client = Arc::new(IpcClient::new(ClientOptions::default()));
///
/// let on_change: Subscriber = Arc::new(|event: &RawEvent| {
///     println!("{} changed", event.name);
/// });
/// client.register_for_event("workspace-changed", &on_change);
/// client.start();
///
/// let focused = client.with_state_lock(|mirror| mirror.focused_workspace().map(|ws| ws.id));
/// # }
/// ```
#[derive(Debug)]
pub struct IpcClient {
    dispatcher: Arc<Dispatcher>,
    commands: CommandClient,
    started: AtomicBool,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<Result<(), IpcError>>>>,
}

impl IpcClient {
    pub fn new(options: ClientOptions) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::new(StateStore::new()),
            Arc::new(SubscriptionRegistry::new()),
            options.pacing,
        );

        Self {
            dispatcher: Arc::new(dispatcher),
            commands: CommandClient::new(options.endpoint),
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.commands.endpoint()
    }

    /// Spawn the background event loop
    ///
    /// Only the first call spawns; it returns `true`. Later calls return
    /// `false` and do nothing, even after the loop has ended.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("fht IPC already started");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        *self.shutdown.lock() = Some(shutdown_tx);

        let dispatcher = Arc::clone(&self.dispatcher);
        let endpoint = self.commands.endpoint().clone();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                // A dropped sender also means shut down
                let _ = shutdown_rx.await;
            };
            dispatcher.run(&endpoint, shutdown).await
        });

        *self.task.lock() = Some(handle);
        true
    }

    /// Ask the event loop to stop. It ends in [`DispatcherState::Stopped`].
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the event loop to exit and return its final state
    ///
    /// Never returns if [`start`](Self::start) was not called.
    pub async fn stopped(&self) -> DispatcherState {
        let mut state = self.dispatcher.watch_state();
        // Copied out so the `Ref` guard is released before `state` drops
        let final_state = match state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.dispatcher.state(),
        };
        final_state
    }

    /// Wait for the event loop task and return how it ended
    ///
    /// Returns `Ok(())` if the loop was never started or was already joined.
    pub async fn join(&self) -> Result<(), IpcError> {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                debug!("fht IPC task did not complete: {}", e);
                Ok(())
            }),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.dispatcher.watch_state()
    }

    /// Notify `subscriber` of every event named `event`
    pub fn register_for_event(&self, event: impl Into<String>, subscriber: &Subscriber) {
        self.dispatcher.registry().register(event, subscriber);
    }

    /// Remove every registration of `subscriber`, returning how many were removed
    pub fn unregister_all(&self, subscriber: &Subscriber) -> usize {
        self.dispatcher.registry().unregister(subscriber)
    }

    /// Read the mirror under its lock
    pub fn with_state_lock<R>(&self, f: impl FnOnce(&Mirror) -> R) -> R {
        self.dispatcher.store().with_lock(f)
    }

    /// Clone of the current mirror
    pub fn snapshot(&self) -> Mirror {
        self.dispatcher.store().snapshot()
    }

    /// Send a request on its own connection and return the reply
    pub async fn send_command(&self, request: &Request) -> Result<Value, IpcError> {
        self.commands.send(request).await
    }

    pub async fn focus_workspace(&self, workspace_id: u64) -> Result<Value, IpcError> {
        self.commands.focus_workspace(workspace_id).await
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
