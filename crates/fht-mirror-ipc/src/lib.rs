//! fht-compositor IPC client
//!
//! Keeps an in-memory mirror of the compositor's workspaces and windows up to
//! date from its event stream, and sends commands over the same socket.
//!
//! ## Components
//!
//! - [`codec`]: newline-delimited JSON requests, events and replies
//! - [`transport`]: endpoint discovery and line I/O over a Unix socket
//! - [`types`]: mirrored data and typed events
//! - [`store`]: the lock-guarded mirror
//! - [`registry`]: per-event subscribers
//! - [`dispatcher`]: the background receive loop
//! - [`command`]: one-shot request/response calls
//! - [`client`]: the [`IpcClient`] tying it together
//!
//! ## Locking
//!
//! The store and the registry each have their own mutex and are never held
//! together. Every event is applied under the store lock, the lock is
//! released, and only then are subscribers looked up and notified.

pub mod client;
pub mod codec;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod store;
pub mod transport;
pub mod types;

pub use client::{ClientOptions, IpcClient};
pub use codec::{RawEvent, Request};
pub use command::CommandClient;
pub use dispatcher::{Dispatcher, DispatcherState, DEFAULT_PACING};
pub use error::IpcError;
pub use registry::{
    ChannelHandler, EventHandler, EventReceiver, Subscriber, SubscriptionRegistry,
    DEFAULT_CHANNEL_BUFFER,
};
pub use store::{Mirror, StateStore};
pub use transport::{get_socket_path, Endpoint, DEFAULT_SOCKET_ENV};
pub use types::{names, Event, Window, Workspace};
