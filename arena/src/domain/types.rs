//! Core types for match state
//!
//! A match is a fixed roster of participants (some human, some automated)
//! playing a fixed number of rounds. Each round collects one response per
//! identity, then one vote per identity, then scores. These types carry the
//! full rules for phase transitions; persistence and scheduling live in the
//! engine and coordinator modules.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::roster::Personality;
use super::scoring;

/// Unique identifier for matches
pub type MatchId = String;

/// Unique identifier for participants
pub type ParticipantId = String;

/// Error type for domain rule violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("round {0} is not accepting responses")]
    RoundNotResponding(u32),

    #[error("round {0} is not accepting votes")]
    RoundNotVoting(u32),

    #[error("identity {0} is not part of this match")]
    UnknownIdentity(Identity),

    #[error("match has no active round")]
    NoActiveRound,
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Anonymized seat label, one symbol from an ordered alphabet sized to the
/// match (`A`, `B`, ...). Assigned once and never reassigned mid-match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Identity(char);

impl Identity {
    /// Largest supported roster
    pub const MAX_SEATS: usize = 26;

    /// The first `n` symbols of the identity alphabet
    pub fn alphabet(n: usize) -> Vec<Identity> {
        ('A'..='Z').take(n.min(Self::MAX_SEATS)).map(Identity).collect()
    }

    /// The underlying symbol
    pub fn letter(&self) -> char {
        self.0
    }

    /// Zero-based position in the alphabet
    pub fn index(&self) -> usize {
        (self.0 as u8 - b'A') as usize
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a seat is held by a person or an automated player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Human,
    Automated,
}

impl std::fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantKind::Human => write!(f, "human"),
            ParticipantKind::Automated => write!(f, "automated"),
        }
    }
}

/// One seat in a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique participant identifier
    pub id: ParticipantId,

    /// Seat label for the life of the match
    pub identity: Identity,

    /// Human or automated
    pub kind: ParticipantKind,

    /// Label shown in transcripts ("Player A", ...)
    pub display_label: String,

    /// Stable external-session binding (connection or user id); humans only
    pub external_ref: Option<String>,

    /// Assigned personality; automated seats only
    pub personality: Option<Personality>,
}

impl Participant {
    /// Create a human participant bound to an external session
    pub fn human(identity: Identity, external_ref: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity,
            kind: ParticipantKind::Human,
            display_label: format!("Player {}", identity),
            external_ref: Some(external_ref.into()),
            personality: None,
        }
    }

    /// Create an automated participant with a personality
    pub fn automated(identity: Identity, personality: Personality) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity,
            kind: ParticipantKind::Automated,
            display_label: format!("Player {}", identity),
            external_ref: None,
            personality: Some(personality),
        }
    }

    /// Whether this seat is held by a person
    pub fn is_human(&self) -> bool {
        self.kind == ParticipantKind::Human
    }
}

/// Sub-state of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Collecting one response per identity
    Responding,
    /// Collecting one vote per identity
    Voting,
    /// Scored and closed
    Complete,
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundPhase::Responding => write!(f, "responding"),
            RoundPhase::Voting => write!(f, "voting"),
            RoundPhase::Complete => write!(f, "complete"),
        }
    }
}

/// One prompt/response/vote/score cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// 1-based round number
    pub number: u32,

    /// Shared prompt every identity answers
    pub prompt: String,

    /// Submitted responses, one per identity
    pub responses: BTreeMap<Identity, String>,

    /// Votes: voter -> guessed human identity
    pub votes: BTreeMap<Identity, Identity>,

    /// Per-identity score for this round (set when the round completes)
    pub scores: BTreeMap<Identity, u32>,

    /// Current phase
    pub phase: RoundPhase,

    /// When the round opened
    pub started_at: DateTime<Utc>,

    /// When the round completed
    pub ended_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Open a new round in the responding phase
    pub fn new(number: u32, prompt: impl Into<String>) -> Self {
        Self {
            number,
            prompt: prompt.into(),
            responses: BTreeMap::new(),
            votes: BTreeMap::new(),
            scores: BTreeMap::new(),
            phase: RoundPhase::Responding,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether every seat has responded
    pub fn all_responses_in(&self, total_participants: usize) -> bool {
        self.responses.len() == total_participants
    }

    /// Whether every seat has voted
    pub fn all_votes_in(&self, total_participants: usize) -> bool {
        self.votes.len() == total_participants
    }
}

/// Lifecycle state of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Roster still forming
    Waiting,
    /// Current round collecting responses
    RoundActive,
    /// Current round collecting votes
    RoundVoting,
    /// All rounds played
    Completed,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Waiting => write!(f, "waiting"),
            MatchStatus::RoundActive => write!(f, "round_active"),
            MatchStatus::RoundVoting => write!(f, "round_voting"),
            MatchStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Result of recording one vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// More votes outstanding
    Pending,
    /// Round scored and closed; another round remains
    RoundComplete,
    /// Round scored and closed; it was the last round
    MatchComplete,
}

/// A full match: roster, rounds, and lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    /// Unique match identifier
    pub id: MatchId,

    /// Lifecycle state
    pub status: MatchStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Roster size this match was created for
    pub total_participants: usize,

    /// Human seats; the rest are auto-filled with automated players
    pub human_quota: usize,

    /// Rounds to play before completion
    pub total_rounds: u32,

    /// 1-based number of the round in play (0 while waiting)
    pub current_round: u32,

    /// The roster, in seating order
    pub participants: Vec<Participant>,

    /// Played and in-play rounds, append-only
    pub rounds: Vec<Round>,

    /// Per-identity totals, set once on completion
    pub final_scores: Option<BTreeMap<Identity, u32>>,
}

impl Match {
    /// Create a match waiting for its roster
    pub fn new(
        id: impl Into<MatchId>,
        total_participants: usize,
        human_quota: usize,
        total_rounds: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: MatchStatus::Waiting,
            created_at: now,
            updated_at: now,
            total_participants,
            human_quota,
            total_rounds,
            current_round: 0,
            participants: Vec::new(),
            rounds: Vec::new(),
            final_scores: None,
        }
    }

    /// Touch the match to record a mutation
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether every seat is taken
    pub fn is_roster_full(&self) -> bool {
        self.participants.len() == self.total_participants
    }

    /// Number of human seats filled
    pub fn human_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_human()).count()
    }

    /// Identities not yet assigned to a seat
    pub fn unused_identities(&self) -> Vec<Identity> {
        let taken: BTreeSet<Identity> =
            self.participants.iter().map(|p| p.identity).collect();
        Identity::alphabet(self.total_participants)
            .into_iter()
            .filter(|i| !taken.contains(i))
            .collect()
    }

    /// Identities of the human seats
    pub fn human_identities(&self) -> BTreeSet<Identity> {
        self.participants
            .iter()
            .filter(|p| p.is_human())
            .map(|p| p.identity)
            .collect()
    }

    /// All automated seats, in seating order
    pub fn automated_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.is_human())
    }

    /// Look up a participant by identity
    pub fn participant(&self, identity: Identity) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identity == identity)
    }

    /// Look up a human participant by external-session binding
    pub fn participant_by_external_ref(&self, external_ref: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.external_ref.as_deref() == Some(external_ref))
    }

    /// The round currently in play
    pub fn round_in_play(&self) -> Option<&Round> {
        if self.current_round == 0 {
            return None;
        }
        self.rounds.get(self.current_round as usize - 1)
    }

    /// Mutable access to the round currently in play
    pub fn round_in_play_mut(&mut self) -> Option<&mut Round> {
        if self.current_round == 0 {
            return None;
        }
        self.rounds.get_mut(self.current_round as usize - 1)
    }

    /// Seat a human participant on an unused identity
    pub fn seat_human(&mut self, identity: Identity, external_ref: impl Into<String>) -> &Participant {
        self.participants.push(Participant::human(identity, external_ref));
        self.touch();
        self.participants.last().expect("just seated")
    }

    /// Seat an automated participant on an unused identity
    pub fn seat_automated(&mut self, identity: Identity, personality: Personality) -> &Participant {
        self.participants
            .push(Participant::automated(identity, personality));
        self.touch();
        self.participants.last().expect("just seated")
    }

    /// Open round 1 and move to active play
    pub fn begin(&mut self, prompt: impl Into<String>) -> &Round {
        self.status = MatchStatus::RoundActive;
        self.current_round = 1;
        self.rounds.push(Round::new(1, prompt));
        self.touch();
        self.rounds.last().expect("round just opened")
    }

    /// Record one identity's response for the round in play.
    ///
    /// Resubmission while the round is still responding is an idempotent
    /// overwrite. Returns true iff this write brought the response count to
    /// the roster size, flipping the round to voting.
    pub fn record_response(
        &mut self,
        identity: Identity,
        text: impl Into<String>,
    ) -> DomainResult<bool> {
        if self.participant(identity).is_none() {
            return Err(DomainError::UnknownIdentity(identity));
        }
        let total = self.total_participants;
        let round = self.round_in_play_mut().ok_or(DomainError::NoActiveRound)?;
        if round.phase != RoundPhase::Responding {
            return Err(DomainError::RoundNotResponding(round.number));
        }

        round.responses.insert(identity, text.into());
        let all_in = round.all_responses_in(total);
        if all_in {
            round.phase = RoundPhase::Voting;
            self.status = MatchStatus::RoundVoting;
        }
        self.touch();
        Ok(all_in)
    }

    /// Record one identity's vote for the round in play.
    ///
    /// Self-votes are stored like any other vote; they simply never score.
    /// The last vote scores the round and either leaves the match ready for
    /// the next round or completes it.
    pub fn record_vote(&mut self, voter: Identity, guess: Identity) -> DomainResult<VoteOutcome> {
        if self.participant(voter).is_none() {
            return Err(DomainError::UnknownIdentity(voter));
        }
        if self.participant(guess).is_none() {
            return Err(DomainError::UnknownIdentity(guess));
        }
        let total = self.total_participants;
        let round = self.round_in_play_mut().ok_or(DomainError::NoActiveRound)?;
        if round.phase != RoundPhase::Voting {
            return Err(DomainError::RoundNotVoting(round.number));
        }

        round.votes.insert(voter, guess);
        if !round.all_votes_in(total) {
            self.touch();
            return Ok(VoteOutcome::Pending);
        }

        self.score_round_in_play()?;
        let outcome = if self.current_round < self.total_rounds {
            VoteOutcome::RoundComplete
        } else {
            self.finalize();
            VoteOutcome::MatchComplete
        };
        self.touch();
        Ok(outcome)
    }

    /// Score and close the round in play once every vote is present.
    ///
    /// Idempotent on the phase: the distributed adapter calls this after
    /// winning the phase compare-and-swap, where `Complete` is already set.
    pub fn score_round_in_play(&mut self) -> DomainResult<()> {
        let humans = self.human_identities();
        let round = self.round_in_play_mut().ok_or(DomainError::NoActiveRound)?;
        round.scores = scoring::score_round(&round.votes, &humans);
        round.phase = RoundPhase::Complete;
        round.ended_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Open the next round after the previous one completed
    pub fn start_next_round(&mut self, prompt: impl Into<String>) -> &Round {
        self.current_round += 1;
        self.rounds.push(Round::new(self.current_round, prompt));
        self.status = MatchStatus::RoundActive;
        self.touch();
        self.rounds.last().expect("round just opened")
    }

    /// Sum per-round scores into final totals and complete the match
    pub fn finalize(&mut self) {
        let identities: Vec<Identity> =
            self.participants.iter().map(|p| p.identity).collect();
        self.final_scores = Some(scoring::final_scores(&self.rounds, &identities));
        self.status = MatchStatus::Completed;
    }

    /// Structural invariants that must hold at every persisted state.
    ///
    /// A violation here is unreachable through the guarded operations; if
    /// one is observed the match is unsalvageable (the process is not).
    /// Roster size is bounded, not exact: `remove_participant` may legally
    /// leave seats empty mid-match.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.participants.len() > self.total_participants {
            return Err(format!(
                "roster has {} seats, expected at most {}",
                self.participants.len(),
                self.total_participants
            ));
        }
        let identities: BTreeSet<Identity> =
            self.participants.iter().map(|p| p.identity).collect();
        if identities.len() != self.participants.len() {
            return Err("duplicate identity assignment".to_string());
        }
        let alphabet: BTreeSet<Identity> =
            Identity::alphabet(self.total_participants).into_iter().collect();
        if !identities.is_subset(&alphabet) {
            return Err("identity outside the match alphabet".to_string());
        }
        match self.status {
            MatchStatus::RoundActive | MatchStatus::RoundVoting => {
                if self.rounds.len() != self.current_round as usize {
                    return Err(format!(
                        "{} rounds recorded for current round {}",
                        self.rounds.len(),
                        self.current_round
                    ));
                }
            }
            MatchStatus::Completed => {
                if self.rounds.len() != self.total_rounds as usize {
                    return Err(format!(
                        "completed with {} of {} rounds",
                        self.rounds.len(),
                        self.total_rounds
                    ));
                }
            }
            MatchStatus::Waiting => {}
        }
        Ok(())
    }
}
