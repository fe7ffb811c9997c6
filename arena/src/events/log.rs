//! Append-only event log port
//!
//! The durable log is a collaborator: production binds it to a partitioned
//! store, tests and the local driver use the in-memory implementation.

use std::sync::{Arc, RwLock};

use super::types::MatchEvent;

/// Error type for event log operations
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("append failed: {0}")]
    AppendFailed(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result type for event log operations
pub type EventLogResult<T> = Result<T, EventLogError>;

/// Shared reference to an event sink
pub type SharedEventSink = Arc<dyn EventSink>;

/// Append-only sink for match events
pub trait EventSink: Send + Sync {
    /// Append one event; the log never reorders or drops accepted events
    fn append(&self, event: &MatchEvent) -> EventLogResult<()>;
}

/// In-memory append-only log, readable for replay
#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<MatchEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this log
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Copy of every appended event, in arrival order
    pub fn snapshot(&self) -> Vec<MatchEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of appended events
    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for InMemoryEventLog {
    fn append(&self, event: &MatchEvent) -> EventLogResult<()> {
        let mut events = self.events.write().map_err(|_| EventLogError::LockPoisoned)?;
        events.push(event.clone());
        Ok(())
    }
}
