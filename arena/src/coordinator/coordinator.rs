//! Coordinator front-end for the distributed deployment
//!
//! Handles the synchronous side of play (roster formation, human responses,
//! votes) against the shared store, fanning automated work out through the
//! queue. Vote collection mirrors the response protocol: merge one key,
//! re-read, and let a compare-and-swap elect the single writer that closes
//! the round.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::domain::{
    prompt_for_round, Identity, Match, MatchId, MatchStatus, Participant, Personality, Round,
    RoundPhase,
};
use crate::events::{EventPayload, MatchEvent, ParticipantSeat, SharedEventBus};
use crate::transport::{push_best_effort, ClientTransport, NoopTransport};

use super::queue::{QueueError, ResponseRequest, SharedResponseQueue};
use super::store::{SharedMatchStore, StoreError};
use super::worker::try_open_voting;

/// Error type for coordinator operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
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

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Front-end for match play over a shared store and response queue
pub struct MatchCoordinator {
    store: SharedMatchStore,
    queue: SharedResponseQueue,
    events: SharedEventBus,
    transport: Arc<dyn ClientTransport>,
    config: MatchConfig,
}

impl MatchCoordinator {
    /// Create a coordinator over the shared infrastructure
    pub fn new(
        store: SharedMatchStore,
        queue: SharedResponseQueue,
        events: SharedEventBus,
        config: MatchConfig,
    ) -> Self {
        Self {
            store,
            queue,
            events,
            transport: Arc::new(NoopTransport),
            config,
        }
    }

    /// Set the client transport
    pub fn with_transport(mut self, transport: Arc<dyn ClientTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    async fn load(&self, match_id: &str) -> CoordinatorResult<Match> {
        self.store
            .get(match_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(match_id.to_string()))
    }

    // =========================================================================
    // Roster formation
    // =========================================================================

    /// Create a match in the waiting state
    pub async fn create_match(&self, match_id: impl Into<MatchId>) -> CoordinatorResult<Match> {
        let match_id = match_id.into();
        if self.store.get(&match_id).await?.is_some() {
            return Err(CoordinatorError::AlreadyExists(match_id));
        }

        let t = &self.config.template;
        let record = Match::new(
            match_id.clone(),
            t.total_participants,
            t.human_quota,
            t.total_rounds,
        );
        self.store.put(&record).await?;

        info!(match_id = %match_id, template = %t.name, "match created");
        Ok(record)
    }

    /// Seat a human participant; reaching the human quota auto-fills the
    /// remaining seats with automated participants.
    ///
    /// Roster formation runs before any concurrent workers exist, so the
    /// full-record put here is not exposed to the merge/CAS races of play.
    pub async fn add_participant(
        &self,
        match_id: &str,
        external_ref: &str,
    ) -> CoordinatorResult<(Participant, Identity)> {
        let mut record = self.load(match_id).await?;

        if let Some(existing) = record.participant_by_external_ref(external_ref) {
            debug!(match_id, external_ref, identity = %existing.identity, "already seated");
            return Ok((existing.clone(), existing.identity));
        }
        if record.status != MatchStatus::Waiting {
            return Err(CoordinatorError::AlreadyStarted);
        }
        if record.is_roster_full() {
            return Err(CoordinatorError::MatchFull);
        }

        let unused = record.unused_identities();
        let identity = *unused
            .choose(&mut rand::thread_rng())
            .expect("roster not full");
        let participant = record.seat_human(identity, external_ref).clone();

        if record.human_count() == record.human_quota {
            let mut automated_index = record.participants.len() - record.human_count();
            for identity in record.unused_identities() {
                record.seat_automated(identity, Personality::for_seat(automated_index));
                automated_index += 1;
            }
        }

        self.store.put(&record).await?;
        push_best_effort(self.transport.as_ref(), &record).await;

        info!(match_id, identity = %identity, "human participant seated");
        Ok((participant, identity))
    }

    /// Lock the roster and open round 1
    pub async fn start_match(&self, match_id: &str) -> CoordinatorResult<Round> {
        let mut record = self.load(match_id).await?;

        if record.status != MatchStatus::Waiting {
            return Err(CoordinatorError::AlreadyStarted);
        }
        if !record.is_roster_full() {
            return Err(CoordinatorError::RosterIncomplete {
                have: record.participants.len(),
                need: record.total_participants,
            });
        }

        let prompt = prompt_for_round(&self.config.prompts, 1);
        let round = record.begin(prompt).clone();
        self.store.put(&record).await?;

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

    // =========================================================================
    // Response collection
    // =========================================================================

    /// Record a human response: merge the key, fan out one request per
    /// automated seat still missing a response, then run the completeness
    /// check. Returns true iff the collection is complete after this write.
    pub async fn submit_response(
        &self,
        match_id: &str,
        identity: Identity,
        text: impl Into<String>,
    ) -> CoordinatorResult<bool> {
        let record = self.load(match_id).await?;
        let participant = record
            .participant(identity)
            .ok_or(CoordinatorError::UnknownIdentity(identity))?;
        let participant_id = participant.id.clone();
        let personality = participant.personality;
        let round_number = record.current_round;
        let round = record
            .round_in_play()
            .ok_or(CoordinatorError::NotStarted)?;
        if round.phase != RoundPhase::Responding {
            return Err(CoordinatorError::RoundNotResponding(round.number));
        }

        let text = text.into();
        let merged = self
            .store
            .merge_response(match_id, round_number, identity, text.clone())
            .await?;
        if !merged {
            // Lost the race against the phase flip between read and write.
            return Err(CoordinatorError::RoundNotResponding(round_number));
        }

        let event = match personality {
            Some(personality) => EventPayload::ResponseGenerated {
                round: round_number,
                participant_id,
                identity,
                personality,
                text,
                fallback: false,
            },
            None => EventPayload::ResponseSubmitted {
                round: round_number,
                participant_id,
                identity,
                text,
            },
        };
        let _ = self.events.publish(MatchEvent::new(match_id, event));

        // Fan out to automated seats that have not responded yet.
        let record = self.load(match_id).await?;
        let round = record
            .rounds
            .get(round_number as usize - 1)
            .expect("round exists");
        for p in record.automated_participants() {
            if !round.responses.contains_key(&p.identity) {
                self.queue
                    .enqueue(ResponseRequest {
                        match_id: match_id.to_string(),
                        round: round_number,
                        identity: p.identity,
                    })
                    .await?;
            }
        }
        let all_collected = round.all_responses_in(record.total_participants);

        try_open_voting(&self.store, &self.events, match_id, round_number).await?;
        push_best_effort(self.transport.as_ref(), &record).await;
        Ok(all_collected)
    }

    // =========================================================================
    // Vote collection
    // =========================================================================

    /// Record one vote; symmetric to response collection. The writer whose
    /// compare-and-swap closes the round also scores it and opens the next
    /// round or completes the match. Returns true iff every vote is in
    /// after this write.
    pub async fn submit_vote(
        &self,
        match_id: &str,
        voter: Identity,
        guess: Identity,
    ) -> CoordinatorResult<bool> {
        let record = self.load(match_id).await?;
        if record.participant(voter).is_none() {
            return Err(CoordinatorError::UnknownIdentity(voter));
        }
        if record.participant(guess).is_none() {
            return Err(CoordinatorError::UnknownIdentity(guess));
        }
        let round_number = record.current_round;
        let round = record
            .round_in_play()
            .ok_or(CoordinatorError::NotStarted)?;
        if round.phase != RoundPhase::Voting {
            return Err(CoordinatorError::RoundNotVoting(round.number));
        }

        let merged = self
            .store
            .merge_vote(match_id, round_number, voter, guess)
            .await?;
        if !merged {
            return Err(CoordinatorError::RoundNotVoting(round_number));
        }

        let _ = self.events.publish(MatchEvent::new(
            match_id,
            EventPayload::VoteSubmitted {
                round: round_number,
                voter,
                guess,
            },
        ));

        let record = self.load(match_id).await?;
        let round = record
            .rounds
            .get(round_number as usize - 1)
            .expect("round exists");
        let all_collected = round.all_votes_in(record.total_participants);

        if all_collected {
            self.try_close_voting(match_id, round_number).await?;
        }
        push_best_effort(self.transport.as_ref(), &record).await;
        Ok(all_collected)
    }

    /// Conditional `voting -> complete` transition. The CAS winner owns the
    /// follow-on writes: scoring the round, then opening the next round or
    /// completing the match. By then no concurrent merge can touch the
    /// record (responses need a round that does not exist yet, votes are
    /// rejected by the completed phase), so the winner's put is safe.
    async fn try_close_voting(&self, match_id: &str, round_number: u32) -> CoordinatorResult<bool> {
        let won = self
            .store
            .cas_phase(
                match_id,
                round_number,
                RoundPhase::Voting,
                RoundPhase::Complete,
            )
            .await?;
        if !won {
            return Ok(false);
        }

        let mut record = self.load(match_id).await?;
        record
            .score_round_in_play()
            .map_err(|_| CoordinatorError::NotStarted)?;

        let scores = record.rounds[round_number as usize - 1].scores.clone();
        let _ = self.events.publish(MatchEvent::new(
            match_id,
            EventPayload::RoundCompleted {
                round: round_number,
                scores,
            },
        ));

        if record.current_round < record.total_rounds {
            let prompt = prompt_for_round(&self.config.prompts, round_number + 1);
            let next = record.start_next_round(prompt);
            let _ = self.events.publish(MatchEvent::new(
                match_id,
                EventPayload::RoundStarted {
                    round: next.number,
                    prompt: next.prompt.clone(),
                },
            ));
            self.store.put(&record).await?;
            info!(match_id, round = round_number, "round complete, next round open");
        } else {
            record.finalize();
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
            self.store.put(&record).await?;
            info!(match_id, "match complete");
        }

        push_best_effort(self.transport.as_ref(), &record).await;
        Ok(true)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Fetch one match
    pub async fn get_match(&self, match_id: &str) -> CoordinatorResult<Match> {
        self.load(match_id).await
    }
}
