//! Match state machine: the in-process authority
//!
//! Every operation loads one match record, applies the domain rules, and
//! persists the result before publishing events and pushing snapshots.
//! Precondition violations are synchronous typed errors, never retried here;
//! the message-handling layer decides whether to surface or retry.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, error, info};

use crate::config::MatchConfig;
use crate::domain::{
    prompt_for_round, DomainError, Identity, Match, MatchId, MatchStatus, Participant,
    Personality, Round, RoundPhase, VoteOutcome,
};
use crate::events::{EventPayload, MatchEvent, ParticipantSeat, SharedEventBus};
use crate::generation::{generate_with_fallback, GenerationContext, GenerationPort};
use crate::transport::{push_best_effort, ClientTransport, NoopTransport};

use super::repository::{RepoError, SharedMatchRepository};

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("match not found: {0}")]
    NotFound(MatchId),

    #[error("match already exists: {0}")]
    AlreadyExists(MatchId),

    #[error("match roster is full")]
    MatchFull,

    #[error("match already started")]
    AlreadyStarted,

    #[error("match has not started")]
    NotStarted,

    #[error("roster incomplete: {have} of {need} seats filled")]
    RosterIncomplete { have: usize, need: usize },

    #[error("round {0} is not accepting responses")]
    RoundNotResponding(u32),

    #[error("round {0} is not accepting votes")]
    RoundNotVoting(u32),

    #[error("identity {0} is not part of this match")]
    UnknownIdentity(Identity),

    #[error("repository error: {0}")]
    Repository(#[from] RepoError),

    #[error("match {match_id} violated an invariant: {detail}")]
    Invariant { match_id: MatchId, detail: String },
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::RoundNotResponding(n) => EngineError::RoundNotResponding(n),
            DomainError::RoundNotVoting(n) => EngineError::RoundNotVoting(n),
            DomainError::UnknownIdentity(id) => EngineError::UnknownIdentity(id),
            DomainError::NoActiveRound => EngineError::NotStarted,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// The in-process match authority
pub struct MatchEngine {
    repo: SharedMatchRepository,
    events: SharedEventBus,
    transport: Arc<dyn ClientTransport>,
    generation: Option<Arc<dyn GenerationPort>>,
    config: MatchConfig,
}

impl MatchEngine {
    /// Create an engine over a repository and event bus
    pub fn new(repo: SharedMatchRepository, events: SharedEventBus, config: MatchConfig) -> Self {
        Self {
            repo,
            events,
            transport: Arc::new(NoopTransport),
            generation: None,
            config,
        }
    }

    /// Set the client transport
    pub fn with_transport(mut self, transport: Arc<dyn ClientTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Set the generation port used by the direct-call adapter
    pub fn with_generation(mut self, generation: Arc<dyn GenerationPort>) -> Self {
        self.generation = Some(generation);
        self
    }

    fn load(&self, match_id: &str) -> EngineResult<Match> {
        self.repo
            .get(match_id)?
            .ok_or_else(|| EngineError::NotFound(match_id.to_string()))
    }

    /// Persist after checking invariants; an invariant violation is fatal to
    /// this match only: the record is discarded and the error surfaced.
    fn store(&self, record: &Match) -> EngineResult<()> {
        if let Err(detail) = record.check_invariants() {
            error!(match_id = %record.id, detail = %detail, "invariant violated, discarding match");
            self.repo.delete(&record.id)?;
            return Err(EngineError::Invariant {
                match_id: record.id.clone(),
                detail,
            });
        }
        Ok(self.repo.put(record)?)
    }

    // =========================================================================
    // Roster formation
    // =========================================================================

    /// Create a match in the waiting state
    pub fn create_match(&self, match_id: impl Into<MatchId>) -> EngineResult<Match> {
        let match_id = match_id.into();
        if self.repo.get(&match_id)?.is_some() {
            return Err(EngineError::AlreadyExists(match_id));
        }

        let t = &self.config.template;
        let record = Match::new(
            match_id.clone(),
            t.total_participants,
            t.human_quota,
            t.total_rounds,
        );
        self.repo.put(&record)?;

        info!(match_id = %match_id, template = %t.name, "match created");
        Ok(record)
    }

    /// Seat a human participant on a uniformly random unused identity.
    ///
    /// Re-joining with an already-bound external ref returns the existing
    /// seat. Reaching the human quota auto-fills the remaining seats with
    /// automated participants, personalities drawn round-robin from the pool.
    pub async fn add_participant(
        &self,
        match_id: &str,
        external_ref: &str,
    ) -> EngineResult<(Participant, Identity)> {
        let mut record = self.load(match_id)?;

        if let Some(existing) = record.participant_by_external_ref(external_ref) {
            debug!(match_id, external_ref, identity = %existing.identity, "already seated");
            return Ok((existing.clone(), existing.identity));
        }
        if record.status != MatchStatus::Waiting {
            return Err(EngineError::AlreadyStarted);
        }
        if record.is_roster_full() {
            return Err(EngineError::MatchFull);
        }

        let unused = record.unused_identities();
        let identity = *unused
            .choose(&mut rand::thread_rng())
            .expect("roster not full");
        let participant = record.seat_human(identity, external_ref).clone();

        if record.human_count() == record.human_quota {
            self.fill_automated_seats(&mut record);
        }

        self.store(&record)?;
        push_best_effort(self.transport.as_ref(), &record).await;

        info!(match_id, identity = %identity, "human participant seated");
        Ok((participant, identity))
    }

    /// Fill every remaining seat with an automated participant
    fn fill_automated_seats(&self, record: &mut Match) {
        let mut automated_index = record.participants.len() - record.human_count();
        for identity in record.unused_identities() {
            let personality = Personality::for_seat(automated_index);
            record.seat_automated(identity, personality);
            debug!(
                match_id = %record.id,
                identity = %identity,
                personality = %personality,
                "automated participant seated"
            );
            automated_index += 1;
        }
    }

    /// Remove a human participant by external-session binding.
    ///
    /// A match with no humans left is discarded entirely; automated-only
    /// matches are not kept alive.
    pub fn remove_participant(&self, external_ref: &str) -> EngineResult<()> {
        let record = self
            .repo
            .list()?
            .into_iter()
            .find(|m| m.participant_by_external_ref(external_ref).is_some())
            .ok_or_else(|| EngineError::NotFound(external_ref.to_string()))?;

        let mut record = record;
        record
            .participants
            .retain(|p| p.external_ref.as_deref() != Some(external_ref));
        record.touch();

        if record.human_count() == 0 {
            info!(match_id = %record.id, "last human left, discarding match");
            self.repo.delete(&record.id)?;
            return Ok(());
        }

        self.repo.put(&record)?;
        info!(match_id = %record.id, external_ref, "participant removed");
        Ok(())
    }

    // =========================================================================
    // Round lifecycle
    // =========================================================================

    /// Lock the roster and open round 1
    pub async fn start_match(&self, match_id: &str) -> EngineResult<Round> {
        let mut record = self.load(match_id)?;

        if record.status != MatchStatus::Waiting {
            return Err(EngineError::AlreadyStarted);
        }
        if !record.is_roster_full() {
            return Err(EngineError::RosterIncomplete {
                have: record.participants.len(),
                need: record.total_participants,
            });
        }

        let prompt = prompt_for_round(&self.config.prompts, 1);
        let round = record.begin(prompt).clone();
        self.store(&record)?;

        let _ = self.events.publish(MatchEvent::new(
            match_id,
            EventPayload::MatchStarted {
                participants: record.participants.iter().map(ParticipantSeat::from).collect(),
                human_participants: record.human_identities().into_iter().collect(),
                robot_participants: record
                    .automated_participants()
                    .map(|p| p.identity)
                    .collect(),
                total_rounds: record.total_rounds,
                created_at: record.created_at,
            },
        ));
        let _ = self.events.publish(MatchEvent::new(
            match_id,
            EventPayload::RoundStarted {
                round: round.number,
                prompt: round.prompt.clone(),
            },
        ));
        push_best_effort(self.transport.as_ref(), &record).await;

        info!(match_id, "match started, round 1 open");
        Ok(round)
    }

    /// Record one response; returns true iff this write completed the
    /// collection and flipped the round to voting.
    pub async fn submit_response(
        &self,
        match_id: &str,
        identity: Identity,
        text: impl Into<String>,
    ) -> EngineResult<bool> {
        let mut record = self.load(match_id)?;
        let all_collected = record.record_response(identity, text)?;
        let round = record.round_in_play().expect("round in play").clone();
        self.store(&record)?;

        let participant = record.participant(identity).expect("identity validated");
        let event = match participant.personality {
            Some(personality) => EventPayload::ResponseGenerated {
                round: round.number,
                participant_id: participant.id.clone(),
                identity,
                personality,
                text: round.responses[&identity].clone(),
                fallback: false,
            },
            None => EventPayload::ResponseSubmitted {
                round: round.number,
                participant_id: participant.id.clone(),
                identity,
                text: round.responses[&identity].clone(),
            },
        };
        let _ = self.events.publish(MatchEvent::new(match_id, event));

        if all_collected {
            let _ = self.events.publish(MatchEvent::new(
                match_id,
                EventPayload::VotingStarted {
                    round: round.number,
                },
            ));
            info!(match_id, round = round.number, "all responses in, voting open");
        }
        push_best_effort(self.transport.as_ref(), &record).await;
        Ok(all_collected)
    }

    /// Record one vote; the last vote scores the round and either opens the
    /// next round or completes the match. Returns true iff this vote closed
    /// the round.
    pub async fn submit_vote(
        &self,
        match_id: &str,
        voter: Identity,
        guess: Identity,
    ) -> EngineResult<bool> {
        let mut record = self.load(match_id)?;
        let voted_round = record.current_round;
        let outcome = record.record_vote(voter, guess)?;

        let _ = self.events.publish(MatchEvent::new(
            match_id,
            EventPayload::VoteSubmitted {
                round: voted_round,
                voter,
                guess,
            },
        ));

        match outcome {
            VoteOutcome::Pending => {
                self.store(&record)?;
                push_best_effort(self.transport.as_ref(), &record).await;
                Ok(false)
            }
            VoteOutcome::RoundComplete => {
                let scores = record.rounds[voted_round as usize - 1].scores.clone();
                let _ = self.events.publish(MatchEvent::new(
                    match_id,
                    EventPayload::RoundCompleted {
                        round: voted_round,
                        scores,
                    },
                ));

                let prompt = prompt_for_round(&self.config.prompts, voted_round + 1);
                let next = record.start_next_round(prompt);
                let _ = self.events.publish(MatchEvent::new(
                    match_id,
                    EventPayload::RoundStarted {
                        round: next.number,
                        prompt: next.prompt.clone(),
                    },
                ));
                self.store(&record)?;
                push_best_effort(self.transport.as_ref(), &record).await;

                info!(match_id, round = voted_round, "round complete, next round open");
                Ok(true)
            }
            VoteOutcome::MatchComplete => {
                let scores = record.rounds[voted_round as usize - 1].scores.clone();
                let _ = self.events.publish(MatchEvent::new(
                    match_id,
                    EventPayload::RoundCompleted {
                        round: voted_round,
                        scores,
                    },
                ));

                let completed_at = record.updated_at;
                let _ = self.events.publish(MatchEvent::new(
                    match_id,
                    EventPayload::MatchCompleted {
                        final_scores: record
                            .final_scores
                            .clone()
                            .expect("finalized match carries totals"),
                        completed_at,
                        duration_seconds: (completed_at - record.created_at).num_seconds(),
                    },
                ));
                self.store(&record)?;
                push_best_effort(self.transport.as_ref(), &record).await;

                info!(match_id, "match complete");
                Ok(true)
            }
        }
    }

    // =========================================================================
    // Direct-call generation adapter
    // =========================================================================

    /// Generate and submit a response for every automated seat still missing
    /// one, falling back to the canned response when the port fails or times
    /// out. Returns true iff the round finished collecting.
    pub async fn collect_automated_responses(&self, match_id: &str) -> EngineResult<bool> {
        let record = self.load(match_id)?;
        let round = match record.round_in_play() {
            Some(r) if r.phase == RoundPhase::Responding => r.clone(),
            // Collection already finished; a duplicate call is a no-op.
            Some(_) => return Ok(true),
            None => return Err(EngineError::NotStarted),
        };

        let pending: Vec<(Identity, Personality)> = record
            .automated_participants()
            .filter(|p| !round.responses.contains_key(&p.identity))
            .map(|p| (p.identity, p.personality.expect("automated seat")))
            .collect();

        let context = GenerationContext {
            round: round.number,
            total_rounds: record.total_rounds,
            prior_responses: round.responses.values().cloned().collect(),
        };

        let mut all_collected = false;
        for (identity, personality) in pending {
            let (text, fallback) = generate_with_fallback(
                self.generation.as_deref(),
                self.config.generation_timeout,
                personality,
                &round.prompt,
                &context,
            )
            .await;
            let mut record = self.load(match_id)?;
            all_collected = record.record_response(identity, text.clone())?;
            self.store(&record)?;

            let participant = record.participant(identity).expect("identity validated");
            let _ = self.events.publish(MatchEvent::new(
                match_id,
                EventPayload::ResponseGenerated {
                    round: round.number,
                    participant_id: participant.id.clone(),
                    identity,
                    personality,
                    text,
                    fallback,
                },
            ));

            if all_collected {
                let _ = self.events.publish(MatchEvent::new(
                    match_id,
                    EventPayload::VotingStarted {
                        round: round.number,
                    },
                ));
                push_best_effort(self.transport.as_ref(), &record).await;
            }
        }
        Ok(all_collected)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Fetch one match
    pub fn get_match(&self, match_id: &str) -> EngineResult<Match> {
        self.load(match_id)
    }

    /// All matches, newest first
    pub fn list_matches(&self) -> EngineResult<Vec<Match>> {
        Ok(self.repo.list()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::repository::InMemoryMatchRepository;
    use crate::events::EventBus;

    fn engine() -> MatchEngine {
        MatchEngine::new(
            InMemoryMatchRepository::new().shared(),
            EventBus::new().shared(),
            MatchConfig::immediate(),
        )
    }

    async fn started_match(engine: &MatchEngine) -> Vec<Identity> {
        engine.create_match("m-1").unwrap();
        engine.add_participant("m-1", "conn-1").await.unwrap();
        engine.add_participant("m-1", "conn-2").await.unwrap();
        engine.start_match("m-1").await.unwrap();
        let record = engine.get_match("m-1").unwrap();
        record.participants.iter().map(|p| p.identity).collect()
    }

    #[tokio::test]
    async fn test_roster_autofills_at_human_quota() {
        let engine = engine();
        engine.create_match("m-1").unwrap();

        engine.add_participant("m-1", "conn-1").await.unwrap();
        let record = engine.get_match("m-1").unwrap();
        assert_eq!(record.participants.len(), 1);

        engine.add_participant("m-1", "conn-2").await.unwrap();
        let record = engine.get_match("m-1").unwrap();
        assert!(record.is_roster_full());
        assert_eq!(record.human_count(), 2);

        let personalities: Vec<_> = record
            .automated_participants()
            .map(|p| p.personality.unwrap())
            .collect();
        assert_eq!(personalities.len(), 2);
        assert_ne!(personalities[0], personalities[1]);
    }

    #[tokio::test]
    async fn test_add_rejected_when_full_or_started() {
        let engine = engine();
        engine.create_match("m-1").unwrap();
        engine.add_participant("m-1", "conn-1").await.unwrap();
        engine.add_participant("m-1", "conn-2").await.unwrap();

        let err = engine.add_participant("m-1", "conn-3").await.unwrap_err();
        assert!(matches!(err, EngineError::MatchFull));

        engine.start_match("m-1").await.unwrap();
        let err = engine.add_participant("m-1", "conn-4").await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_start_requires_full_roster() {
        let engine = engine();
        engine.create_match("m-1").unwrap();
        engine.add_participant("m-1", "conn-1").await.unwrap();

        let err = engine.start_match("m-1").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::RosterIncomplete { have: 1, need: 4 }
        ));
    }

    #[tokio::test]
    async fn test_start_opens_round_one_with_prompt() {
        let engine = engine();
        let _ = started_match(&engine).await;

        let record = engine.get_match("m-1").unwrap();
        assert_eq!(record.status, MatchStatus::RoundActive);
        assert_eq!(record.current_round, 1);
        assert!(!record.round_in_play().unwrap().prompt.is_empty());
    }

    #[tokio::test]
    async fn test_response_count_boundary() {
        let engine = engine();
        let ids = started_match(&engine).await;

        assert!(!engine.submit_response("m-1", ids[0], "a").await.unwrap());
        assert!(!engine.submit_response("m-1", ids[1], "b").await.unwrap());
        assert!(!engine.submit_response("m-1", ids[2], "c").await.unwrap());
        assert!(engine.submit_response("m-1", ids[3], "d").await.unwrap());

        let err = engine.submit_response("m-1", ids[0], "late").await.unwrap_err();
        assert!(matches!(err, EngineError::RoundNotResponding(1)));
    }

    #[tokio::test]
    async fn test_vote_before_voting_rejected() {
        let engine = engine();
        let ids = started_match(&engine).await;

        let err = engine.submit_vote("m-1", ids[0], ids[1]).await.unwrap_err();
        assert!(matches!(err, EngineError::RoundNotVoting(1)));
    }

    #[tokio::test]
    async fn test_automated_collection_uses_fallback_without_port() {
        let engine = engine();
        let _ = started_match(&engine).await;
        let record = engine.get_match("m-1").unwrap();

        for p in record.participants.iter().filter(|p| p.is_human()) {
            engine
                .submit_response("m-1", p.identity, "human words")
                .await
                .unwrap();
        }

        let all = engine.collect_automated_responses("m-1").await.unwrap();
        assert!(all);

        let record = engine.get_match("m-1").unwrap();
        assert_eq!(record.status, MatchStatus::RoundVoting);
        assert_eq!(record.round_in_play().unwrap().responses.len(), 4);
    }

    #[tokio::test]
    async fn test_full_match_final_score_invariant() {
        let engine = engine();
        let ids = started_match(&engine).await;
        let record = engine.get_match("m-1").unwrap();
        let human = *record.human_identities().iter().next().unwrap();

        for _round in 1..=5 {
            for id in &ids {
                engine.submit_response("m-1", *id, "text").await.unwrap();
            }
            for id in &ids {
                engine.submit_vote("m-1", *id, human).await.unwrap();
            }
        }

        let record = engine.get_match("m-1").unwrap();
        assert_eq!(record.status, MatchStatus::Completed);
        assert_eq!(record.rounds.len(), 5);

        let finals = record.final_scores.as_ref().unwrap();
        for id in &ids {
            let summed: u32 = record.rounds.iter().map(|r| r.scores[id]).sum();
            assert_eq!(finals[id], summed);
            assert_eq!(summed, 5);
        }
    }

    #[tokio::test]
    async fn test_remove_last_human_discards_match() {
        let engine = engine();
        let _ = started_match(&engine).await;

        engine.remove_participant("conn-1").unwrap();
        assert!(engine.get_match("m-1").is_ok());

        engine.remove_participant("conn-2").unwrap();
        let err = engine.get_match("m-1").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_identity_set_is_complete_and_unique() {
        let engine = engine();
        let ids = started_match(&engine).await;

        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
        assert_eq!(sorted, Identity::alphabet(4));
    }
}
