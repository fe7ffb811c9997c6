//! Event stream for match orchestration
//!
//! One event per state transition, published on a broadcast bus and appended
//! to a durable log. Events are a projection of live match state consumed by
//! the history projector; they are never a second source of truth for play.

pub mod bus;
pub mod log;
pub mod types;
pub mod validator;

pub use bus::{EventBus, EventBusError, EventBusResult, SharedEventBus};
pub use log::{EventLogError, EventLogResult, EventSink, InMemoryEventLog, SharedEventSink};
pub use types::{EventId, EventPayload, MatchEvent, ParticipantSeat};
pub use validator::{validate, ValidatedEvent, ValidationError, ValidationResult};
