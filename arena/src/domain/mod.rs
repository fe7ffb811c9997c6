//! Domain model for spot-the-human matches
//!
//! Pure data and invariants: no I/O, no clocks beyond timestamping,
//! shared by the in-process engine and the distributed coordinator.

pub mod roster;
pub mod scoring;
pub mod types;

pub use roster::{prompt_for_round, Personality, DEFAULT_PROMPTS};
pub use scoring::{final_scores, score_round};
pub use types::{
    DomainError, DomainResult, Identity, Match, MatchId, MatchStatus, Participant, ParticipantId,
    ParticipantKind, Round, RoundPhase, VoteOutcome,
};
