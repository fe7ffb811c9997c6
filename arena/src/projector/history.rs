//! Read-model types for match history

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Identity, MatchId, ParticipantId};
use crate::events::ParticipantSeat;

/// Projected lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    InProgress,
    Completed,
}

/// One projected response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub identity: Identity,
    pub text: String,
    /// Set for automated responses
    pub generated: bool,
}

/// One projected round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundHistory {
    /// 1-based round number
    pub number: u32,

    /// Prompt, or "Unknown" while only later events for this round have
    /// arrived
    pub prompt: String,

    /// Responses keyed by participant id; last write wins
    pub responses: BTreeMap<ParticipantId, ResponseEntry>,

    /// Votes: voter -> guess
    pub votes: BTreeMap<Identity, Identity>,

    /// Scores, present once the round completed
    pub scores: BTreeMap<Identity, u32>,
}

impl RoundHistory {
    /// A round as first seen through its `round.started` event
    pub fn started(number: u32, prompt: impl Into<String>) -> Self {
        Self {
            number,
            prompt: prompt.into(),
            responses: BTreeMap::new(),
            votes: BTreeMap::new(),
            scores: BTreeMap::new(),
        }
    }

    /// Backfill for a round only known from later events that outran its
    /// `round.started`
    pub fn placeholder(number: u32) -> Self {
        Self::started(number, "Unknown")
    }

    /// Whether this round is still a backfilled placeholder
    pub fn is_placeholder(&self) -> bool {
        self.prompt == "Unknown"
    }
}

/// Projected history of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistoryRecord {
    pub match_id: MatchId,
    pub status: HistoryStatus,
    pub created_at: DateTime<Utc>,

    /// Roster as announced by `match.started`
    pub participants: Vec<ParticipantSeat>,
    pub human_participants: Vec<Identity>,
    pub total_rounds: u32,

    pub rounds: Vec<RoundHistory>,

    /// Final totals, set by `match.completed`
    pub final_scores: Option<BTreeMap<Identity, u32>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl MatchHistoryRecord {
    /// A record as created by `match.started`
    pub fn new(
        match_id: MatchId,
        created_at: DateTime<Utc>,
        participants: Vec<ParticipantSeat>,
        human_participants: Vec<Identity>,
        total_rounds: u32,
    ) -> Self {
        Self {
            match_id,
            status: HistoryStatus::InProgress,
            created_at,
            participants,
            human_participants,
            total_rounds,
            rounds: Vec::new(),
            final_scores: None,
            completed_at: None,
            duration_seconds: None,
        }
    }

    /// The round at `number`, backfilling placeholders for any gap so
    /// out-of-order arrivals always have somewhere to land
    pub fn round_at_mut(&mut self, number: u32) -> &mut RoundHistory {
        let index = number as usize - 1;
        while self.rounds.len() <= index {
            let missing = self.rounds.len() as u32 + 1;
            self.rounds.push(RoundHistory::placeholder(missing));
        }
        &mut self.rounds[index]
    }
}
