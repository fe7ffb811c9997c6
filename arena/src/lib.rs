//! Match orchestration engine for multi-round spot-the-human matches
//!
//! A fixed roster of participants (some human, some automated) answer a
//! shared prompt each round, then vote on which identity is human; scores
//! accrue across rounds. The crate provides:
//!
//! - A pure domain model of matches, rounds, participants, and identities
//! - An in-process state machine over an injected repository
//! - A distributed coordinator driving the same rules through a shared
//!   store and an at-least-once response queue, with no central lock
//! - A typed, structurally validated event stream
//! - A history projector building a queryable read-model that converges
//!   under duplicate and out-of-order delivery
//!
//! Text generation, client transport, the durable store, and the queue are
//! capability ports; in-memory implementations back tests and the
//! `simulate` driver binary.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod events;
pub mod generation;
pub mod projector;
pub mod transport;

// Re-export the domain model
pub use domain::{
    Identity, Match, MatchId, MatchStatus, Participant, ParticipantId, ParticipantKind,
    Personality, Round, RoundPhase,
};

// Re-export configuration
pub use config::{MatchConfig, MatchTemplate};

// Re-export the in-process engine
pub use engine::{EngineError, EngineResult, InMemoryMatchRepository, MatchEngine, MatchRepository};

// Re-export the distributed coordinator
pub use coordinator::{
    CoordinatorError, CoordinatorResult, InMemoryMatchStore, InMemoryResponseQueue,
    MatchCoordinator, MatchStore, ResponseQueue, ResponseRequest, ResponseWorker,
};

// Re-export the event stream
pub use events::{
    validate, EventBus, EventPayload, EventSink, InMemoryEventLog, MatchEvent, SharedEventBus,
    ValidatedEvent, ValidationError,
};

// Re-export the projector
pub use projector::{HistoryProjector, MatchHistoryRecord, RoundHistory};

// Re-export the ports
pub use generation::{fallback_response, CannedGenerator, GenerationContext, GenerationPort};
pub use transport::{ClientTransport, NoopTransport};
