//! Integration tests for the in-process match flow
//!
//! Exercises the full scenario surface: roster auto-fill, round phase
//! boundaries, scoring, and completion, with events captured on the log.

use std::collections::BTreeSet;

use arena::config::MatchConfig;
use arena::domain::{Identity, MatchStatus, RoundPhase};
use arena::engine::{EngineError, InMemoryMatchRepository, MatchEngine};
use arena::events::{EventBus, InMemoryEventLog};

fn engine_with_log() -> (MatchEngine, std::sync::Arc<InMemoryEventLog>) {
    let log = InMemoryEventLog::new().shared();
    let events = EventBus::with_sink(log.clone()).shared();
    let engine = MatchEngine::new(
        InMemoryMatchRepository::new().shared(),
        events,
        MatchConfig::immediate(),
    );
    (engine, log)
}

/// Two humans join, the roster auto-fills, the match starts with a prompt
#[tokio::test]
async fn test_two_humans_autofill_and_start() {
    let (engine, _log) = engine_with_log();
    engine.create_match("m-1").unwrap();

    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();

    let record = engine.get_match("m-1").unwrap();
    assert_eq!(record.participants.len(), 4);
    assert_eq!(record.human_count(), 2);

    let round = engine.start_match("m-1").await.unwrap();
    assert_eq!(round.number, 1);
    assert!(!round.prompt.is_empty());

    let record = engine.get_match("m-1").unwrap();
    assert_eq!(record.status, MatchStatus::RoundActive);
    assert_eq!(record.current_round, 1);
}

/// Identity assignment is gap-free and duplicate-free for a started match
#[tokio::test]
async fn test_identity_assignment_unique() {
    let (engine, _log) = engine_with_log();
    engine.create_match("m-1").unwrap();
    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();
    engine.start_match("m-1").await.unwrap();

    let record = engine.get_match("m-1").unwrap();
    let identities: BTreeSet<Identity> =
        record.participants.iter().map(|p| p.identity).collect();
    assert_eq!(identities.len(), record.total_participants);
    assert_eq!(
        identities,
        Identity::alphabet(4).into_iter().collect::<BTreeSet<_>>()
    );
}

/// Three of four responses leave the round responding; the fourth flips it
#[tokio::test]
async fn test_response_boundary() {
    let (engine, _log) = engine_with_log();
    engine.create_match("m-1").unwrap();
    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();
    engine.start_match("m-1").await.unwrap();

    let record = engine.get_match("m-1").unwrap();
    let ids: Vec<Identity> = record.participants.iter().map(|p| p.identity).collect();

    for id in &ids[..3] {
        assert!(!engine.submit_response("m-1", *id, "answer").await.unwrap());
        let record = engine.get_match("m-1").unwrap();
        assert_eq!(record.round_in_play().unwrap().phase, RoundPhase::Responding);
    }

    assert!(engine.submit_response("m-1", ids[3], "answer").await.unwrap());
    let record = engine.get_match("m-1").unwrap();
    assert_eq!(record.round_in_play().unwrap().phase, RoundPhase::Voting);
    assert_eq!(record.status, MatchStatus::RoundVoting);
}

/// Every correct guess scores one point per round
#[tokio::test]
async fn test_everyone_votes_human_scores_one_each() {
    let (engine, _log) = engine_with_log();
    engine.create_match("m-1").unwrap();
    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();
    engine.start_match("m-1").await.unwrap();

    let record = engine.get_match("m-1").unwrap();
    let ids: Vec<Identity> = record.participants.iter().map(|p| p.identity).collect();
    let human = *record.human_identities().iter().next().unwrap();

    for id in &ids {
        engine.submit_response("m-1", *id, "answer").await.unwrap();
    }
    for id in &ids {
        engine.submit_vote("m-1", *id, human).await.unwrap();
    }

    let record = engine.get_match("m-1").unwrap();
    for id in &ids {
        assert_eq!(record.rounds[0].scores[id], 1);
    }
}

/// A full five-round match completes with the summation invariant intact
#[tokio::test]
async fn test_full_match_completes_with_consistent_totals() {
    let (engine, log) = engine_with_log();
    engine.create_match("m-1").unwrap();
    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();
    engine.start_match("m-1").await.unwrap();

    let record = engine.get_match("m-1").unwrap();
    let humans: Vec<Identity> = record.human_identities().into_iter().collect();
    let ids: Vec<Identity> = record.participants.iter().map(|p| p.identity).collect();

    for round in 1..=5u32 {
        for p in record.participants.iter().filter(|p| p.is_human()) {
            engine
                .submit_response("m-1", p.identity, format!("round {}", round))
                .await
                .unwrap();
        }
        assert!(engine.collect_automated_responses("m-1").await.unwrap());

        // Humans guess each other, automated seats guess the first human.
        engine.submit_vote("m-1", humans[0], humans[1]).await.unwrap();
        engine.submit_vote("m-1", humans[1], humans[0]).await.unwrap();
        for p in record.participants.iter().filter(|p| !p.is_human()) {
            engine.submit_vote("m-1", p.identity, humans[0]).await.unwrap();
        }
    }

    let record = engine.get_match("m-1").unwrap();
    assert_eq!(record.status, MatchStatus::Completed);
    assert_eq!(record.rounds.len(), 5);
    assert!(record
        .rounds
        .iter()
        .all(|r| r.phase == RoundPhase::Complete));

    let finals = record.final_scores.as_ref().unwrap();
    for id in &ids {
        let summed: u32 = record.rounds.iter().map(|r| r.scores[id]).sum();
        assert_eq!(finals[id], summed);
    }
    // Everyone guessed a human every round.
    for id in &ids {
        assert_eq!(finals[id], 5);
    }

    // One event per transition landed on the log.
    let events = log.snapshot();
    let count = |t: &str| events.iter().filter(|e| e.event_type() == t).count();
    assert_eq!(count("match.started"), 1);
    assert_eq!(count("round.started"), 5);
    assert_eq!(count("voting.started"), 5);
    assert_eq!(count("round.completed"), 5);
    assert_eq!(count("match.completed"), 1);
    assert_eq!(count("response.submitted"), 10);
    assert_eq!(count("response.generated"), 10);
    assert_eq!(count("vote.submitted"), 20);
}

/// Replaying a response or vote write leaves the round unchanged
#[tokio::test]
async fn test_idempotent_rewrites() {
    let (engine, _log) = engine_with_log();
    engine.create_match("m-1").unwrap();
    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();
    engine.start_match("m-1").await.unwrap();

    let record = engine.get_match("m-1").unwrap();
    let ids: Vec<Identity> = record.participants.iter().map(|p| p.identity).collect();

    engine.submit_response("m-1", ids[0], "same").await.unwrap();
    let once = engine.get_match("m-1").unwrap();
    engine.submit_response("m-1", ids[0], "same").await.unwrap();
    let twice = engine.get_match("m-1").unwrap();

    assert_eq!(
        once.round_in_play().unwrap().responses,
        twice.round_in_play().unwrap().responses
    );
}

/// Precondition violations surface as typed errors
#[tokio::test]
async fn test_typed_precondition_errors() {
    let (engine, _log) = engine_with_log();

    assert!(matches!(
        engine.get_match("missing").unwrap_err(),
        EngineError::NotFound(_)
    ));

    engine.create_match("m-1").unwrap();
    assert!(matches!(
        engine.start_match("m-1").await.unwrap_err(),
        EngineError::RosterIncomplete { .. }
    ));

    engine.add_participant("m-1", "conn-1").await.unwrap();
    engine.add_participant("m-1", "conn-2").await.unwrap();
    engine.start_match("m-1").await.unwrap();
    assert!(matches!(
        engine.start_match("m-1").await.unwrap_err(),
        EngineError::AlreadyStarted
    ));

    let record = engine.get_match("m-1").unwrap();
    let id = record.participants[0].identity;
    assert!(matches!(
        engine.submit_vote("m-1", id, id).await.unwrap_err(),
        EngineError::RoundNotVoting(1)
    ));
}
