//! Broadcast event bus for engine events.
//!
//! Built on `tokio::sync::broadcast`: every subscriber sees every event
//! published after it subscribed. Publishing with no subscribers is a no-op,
//! and there is no replay for subscribers that were not listening.

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::domain::EngineEvent;

/// Default channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Single-producer/multi-consumer bus shared by the stream endpoint and the
/// webhook dispatcher
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receiver for every future event
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: EngineEvent) {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            subject_id = %event.subject_id,
            "Publishing event"
        );
        let _ = self.sender.send(event);
    }

    /// Stream of future events about one request.
    ///
    /// A consumer that falls behind skips the events it missed.
    /// The returned stream owns its subject and receiver, so it may outlive
    /// both `self` and the caller's borrow.
    pub fn stream_for<T: Into<String>>(
        &self,
        subject_id: T,
    ) -> impl Stream<Item = EngineEvent> + Send + 'static + use<T> {
        let subject_id: String = subject_id.into();
        let receiver = self.subscribe();
        BroadcastStream::new(receiver).filter_map(move |item| {
            let event = match item {
                Ok(event) if event.subject_id == subject_id => Some(event),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(subject_id = %subject_id, skipped, "Event stream consumer lagged");
                    None
                }
            };
            futures::future::ready(event)
        })
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
