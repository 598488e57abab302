//! Following the event stream until it ends or the user interrupts

use std::future::Future;

use fht_mirror_ipc::{DispatcherState, EventReceiver, IpcClient, RawEvent};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Why [`follow`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEnd {
    Interrupted,
    /// The event loop ended; every event it delivered has been handled
    Stopped(DispatcherState),
}

/// Hand each received event to `on_event` until `interrupt` completes or the
/// client's event loop ends
///
/// Events already buffered when the loop ends are still delivered: the
/// registry keeps the channel open, so the stream itself never finishes.
pub async fn follow<S, F>(
    client: &IpcClient,
    events: EventReceiver,
    interrupt: S,
    mut on_event: F,
) -> FollowEnd
where
    S: Future,
    F: FnMut(RawEvent),
{
    tokio::pin!(interrupt);
    let mut stream = ReceiverStream::new(events);

    loop {
        tokio::select! {
            biased;

            _ = &mut interrupt => return FollowEnd::Interrupted,
            event = stream.next() => match event {
                Some(event) => on_event(event),
                None => return FollowEnd::Stopped(client.state()),
            },
            state = client.stopped() => return FollowEnd::Stopped(state),
        }
    }
}
