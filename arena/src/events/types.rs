//! Event envelope and payload types
//!
//! A closed, tagged union over the event types emitted by the engine and the
//! coordinator. Serialized form carries `event_type` as the tag and the
//! variant fields under `data`, flattened into the envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Identity, MatchId, Participant, ParticipantId, ParticipantKind, Personality};

/// Unique identifier for events
pub type EventId = String;

/// One seat as carried on `match.started`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSeat {
    pub participant_id: ParticipantId,
    pub identity: Identity,
    pub kind: ParticipantKind,
    pub display_label: String,
    pub personality: Option<Personality>,
}

impl From<&Participant> for ParticipantSeat {
    fn from(p: &Participant) -> Self {
        Self {
            participant_id: p.id.clone(),
            identity: p.identity,
            kind: p.kind,
            display_label: p.display_label.clone(),
            personality: p.personality,
        }
    }
}

/// Payload for each event type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum EventPayload {
    /// Roster locked and round 1 opened
    #[serde(rename = "match.started")]
    MatchStarted {
        participants: Vec<ParticipantSeat>,
        human_participants: Vec<Identity>,
        robot_participants: Vec<Identity>,
        total_rounds: u32,
        created_at: DateTime<Utc>,
    },

    /// A round opened for responses
    #[serde(rename = "round.started")]
    RoundStarted { round: u32, prompt: String },

    /// A human response landed
    #[serde(rename = "response.submitted")]
    ResponseSubmitted {
        round: u32,
        participant_id: ParticipantId,
        identity: Identity,
        text: String,
    },

    /// An automated response landed
    #[serde(rename = "response.generated")]
    ResponseGenerated {
        round: u32,
        participant_id: ParticipantId,
        identity: Identity,
        personality: Personality,
        text: String,
        /// Whether the canned fallback was used instead of the port
        fallback: bool,
    },

    /// All responses in; the round flipped to voting
    #[serde(rename = "voting.started")]
    VotingStarted { round: u32 },

    /// One vote landed. Carries its round explicitly so late delivery
    /// cannot mis-attribute it to a newer round.
    #[serde(rename = "vote.submitted")]
    VoteSubmitted {
        round: u32,
        voter: Identity,
        guess: Identity,
    },

    /// All votes in; the round was scored and closed
    #[serde(rename = "round.completed")]
    RoundCompleted {
        round: u32,
        scores: BTreeMap<Identity, u32>,
    },

    /// The final round completed
    #[serde(rename = "match.completed")]
    MatchCompleted {
        final_scores: BTreeMap<Identity, u32>,
        completed_at: DateTime<Utc>,
        duration_seconds: i64,
    },
}

impl EventPayload {
    /// The wire name of this event type
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::MatchStarted { .. } => "match.started",
            EventPayload::RoundStarted { .. } => "round.started",
            EventPayload::ResponseSubmitted { .. } => "response.submitted",
            EventPayload::ResponseGenerated { .. } => "response.generated",
            EventPayload::VotingStarted { .. } => "voting.started",
            EventPayload::VoteSubmitted { .. } => "vote.submitted",
            EventPayload::RoundCompleted { .. } => "round.completed",
            EventPayload::MatchCompleted { .. } => "match.completed",
        }
    }

    /// The round this event addresses, if round-scoped
    pub fn round(&self) -> Option<u32> {
        match self {
            EventPayload::RoundStarted { round, .. }
            | EventPayload::ResponseSubmitted { round, .. }
            | EventPayload::ResponseGenerated { round, .. }
            | EventPayload::VotingStarted { round }
            | EventPayload::VoteSubmitted { round, .. }
            | EventPayload::RoundCompleted { round, .. } => Some(*round),
            _ => None,
        }
    }
}

/// Event envelope: one per state transition, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Unique event identifier
    pub event_id: EventId,

    /// Match this event belongs to
    pub match_id: MatchId,

    /// When the transition happened (ordering key; arrival order may differ)
    pub timestamp: DateTime<Utc>,

    /// Typed payload, tagged by `event_type`
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl MatchEvent {
    /// Wrap a payload in a fresh envelope stamped now
    pub fn new(match_id: impl Into<MatchId>, payload: EventPayload) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            match_id: match_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The wire name of this event's type
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}
