//! Event Bus - pub/sub channel for queue events
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers with minimal latency. The queue emits, consumers (loggers,
//! tests, callers) subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::QueueEvent;

/// Default channel capacity (events)
///
/// An item's lifecycle emits at most a handful of events, so this buffers
/// bursts of thousands of short-lived tasks.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central event bus for queue activity streaming
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// This is fire-and-forget: with no subscribers the event is dropped,
    /// and a full channel drops the oldest events.
    pub fn emit(&self, event: QueueEvent) {
        debug!(
            event_type = event.event_type(),
            id = %event.task_id(),
            seq = event.seq(),
            "EventBus::emit"
        );
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscribing are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
