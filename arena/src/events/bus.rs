//! Event bus for match orchestration
//!
//! Pub/sub over a Tokio broadcast channel with append-through to the durable
//! event log. Publishing succeeds with zero subscribers; a log append
//! failure is an error so the caller's delivery layer can retry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::log::SharedEventSink;
use super::types::MatchEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("failed to persist event: {0}")]
    PersistFailed(String),
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast fan-out and optional log persistence
pub struct EventBus {
    sender: broadcast::Sender<MatchEvent>,
    sink: Option<SharedEventSink>,
}

impl EventBus {
    /// Create a bus without persistence
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, sink: None }
    }

    /// Create a bus that appends every published event to a log
    pub fn with_sink(sink: SharedEventSink) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            sink: Some(sink),
        }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to the log and all subscribers
    pub fn publish(&self, event: MatchEvent) -> EventBusResult<()> {
        let event_type = event.event_type();

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&event) {
                warn!(event_type, "failed to persist event: {}", e);
                return Err(EventBusError::PersistFailed(e.to_string()));
            }
        }

        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "event published"),
            // No receivers is fine; the event is already in the log.
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
        Ok(())
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.sender.subscribe()
    }

    /// Number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
