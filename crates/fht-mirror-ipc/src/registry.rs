//! Subscriber registration
//!
//! Subscribers register interest by event name. The registry has its own lock,
//! distinct from the [`StateStore`](crate::StateStore) lock. The dispatcher
//! releases the store lock before it reads the registry, and it clones the
//! matching handlers before invoking them. A callback is therefore free to
//! read the store or to register and unregister subscribers.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::codec::RawEvent;

/// Default channel buffer size for [`ChannelHandler`]
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Receives notifications for the events it registered for
///
/// Called synchronously on the dispatcher task, after the event has been
/// applied to the mirror. Keep it short: the next event is not read until
/// every matching subscriber has returned.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &RawEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&RawEvent) + Send + Sync,
{
    fn on_event(&self, event: &RawEvent) {
        self(event)
    }
}

/// Shared handle identifying a subscriber
pub type Subscriber = Arc<dyn EventHandler>;

fn same_subscriber(a: &Subscriber, b: &Subscriber) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Registry mapping event names to subscribers, in registration order
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<Vec<(String, Subscriber)>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("entries", &entries.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for events named `event`
    ///
    /// Registering the same subscriber for the same name twice delivers the
    /// event twice.
    pub fn register(&self, event: impl Into<String>, subscriber: &Subscriber) {
        let event = event.into();
        trace!(event = %event, "Registering subscriber");
        self.entries.lock().push((event, Arc::clone(subscriber)));
    }

    /// Remove every entry belonging to `subscriber`
    ///
    /// Returns the number of entries removed. A notification already in
    /// flight when this is called may still reach the subscriber once.
    pub fn unregister(&self, subscriber: &Subscriber) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(_, registered)| !same_subscriber(registered, subscriber));
        before - entries.len()
    }

    /// Subscribers registered for `event`, in registration order
    pub fn subscribers_for(&self, event: &str) -> Vec<Subscriber> {
        self.entries.lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect()
    }

    /// Number of (event, subscriber) entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subscriber forwarding events into a bounded tokio channel
///
/// Uses `try_send`, so a slow consumer never stalls the dispatcher. Events
/// that do not fit in the buffer are dropped.
#[derive(Debug)]
pub struct ChannelHandler {
    sender: mpsc::Sender<RawEvent>,
}

/// Receiver half paired with a [`ChannelHandler`]
pub type EventReceiver = mpsc::Receiver<RawEvent>;

impl ChannelHandler {
    /// Create a handler and the receiver its events arrive on
    ///
    /// A `buffer_size` of zero is raised to one.
    pub fn new(buffer_size: usize) -> (Subscriber, EventReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        (Arc::new(Self { sender }), receiver)
    }
}

impl EventHandler for ChannelHandler {
    fn on_event(&self, event: &RawEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(event = %event.name, "Subscriber channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                trace!(event = %event.name, "Subscriber channel closed");
            }
        }
    }
}
