//! Response worker: one queue delivery, end to end
//!
//! Workers are independent, retryable invocations. A delivery may be a
//! duplicate, arrive after its round closed, or race other workers on the
//! same round; every path below is safe to re-run because the response
//! write is a map-key merge and the phase transition is conditioned.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::MatchConfig;
use crate::domain::{MatchStatus, RoundPhase};
use crate::events::{EventPayload, MatchEvent, SharedEventBus};
use crate::generation::{generate_with_fallback, GenerationContext, GenerationPort};

use super::coordinator::CoordinatorResult;
use super::queue::ResponseRequest;
use super::store::{SharedMatchStore, StoreResult};

/// Worker processing automated response requests
pub struct ResponseWorker {
    store: SharedMatchStore,
    events: SharedEventBus,
    generation: Option<Arc<dyn GenerationPort>>,
    config: MatchConfig,
}

impl ResponseWorker {
    /// Create a worker over the shared store and event bus
    pub fn new(store: SharedMatchStore, events: SharedEventBus, config: MatchConfig) -> Self {
        Self {
            store,
            events,
            generation: None,
            config,
        }
    }

    /// Set the generation port
    pub fn with_generation(mut self, generation: Arc<dyn GenerationPort>) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Create a shared reference to this worker
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Handle one delivery.
    ///
    /// Returns Ok for every stale, duplicate, or unknown-match delivery so
    /// the delivery layer acknowledges it; only infrastructure failures
    /// propagate, which makes the whole message retryable.
    pub async fn handle(&self, request: &ResponseRequest) -> CoordinatorResult<()> {
        let Some(record) = self.store.get(&request.match_id).await? else {
            warn!(match_id = %request.match_id, "request for unknown match, dropping");
            return Ok(());
        };
        let Some(participant) = record.participant(request.identity) else {
            warn!(
                match_id = %request.match_id,
                identity = %request.identity,
                "request for unknown identity, dropping"
            );
            return Ok(());
        };
        let Some(personality) = participant.personality else {
            warn!(identity = %request.identity, "request for a human seat, dropping");
            return Ok(());
        };
        let participant_id = participant.id.clone();

        // Fixed per-identity stagger bounds concurrent generation calls.
        // A scheduling policy only; correctness never depends on it.
        let seat = record
            .automated_participants()
            .position(|p| p.identity == request.identity)
            .unwrap_or(0);
        let delay = self.config.stagger_step * seat as u32;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // Re-read: the round may have moved on while we slept.
        let Some(record) = self.store.get(&request.match_id).await? else {
            return Ok(());
        };
        let Some(round) = record
            .rounds
            .get(request.round.saturating_sub(1) as usize)
            .filter(|_| request.round > 0)
        else {
            warn!(
                match_id = %request.match_id,
                round = request.round,
                "request addresses a round that does not exist, dropping"
            );
            return Ok(());
        };
        if round.phase != RoundPhase::Responding {
            debug!(
                match_id = %request.match_id,
                round = request.round,
                phase = %round.phase,
                "round no longer collecting responses, dropping"
            );
            return Ok(());
        }

        // A redelivery may find the key already written; skip regeneration
        // but still run the completeness check, in case the earlier attempt
        // died between its write and its transition.
        if !round.responses.contains_key(&request.identity) {
            let context = GenerationContext {
                round: round.number,
                total_rounds: record.total_rounds,
                prior_responses: round.responses.values().cloned().collect(),
            };
            let (text, fallback) = generate_with_fallback(
                self.generation.as_deref(),
                self.config.generation_timeout,
                personality,
                &round.prompt,
                &context,
            )
            .await;

            let merged = self
                .store
                .merge_response(&request.match_id, request.round, request.identity, text.clone())
                .await?;
            if !merged {
                debug!(
                    match_id = %request.match_id,
                    identity = %request.identity,
                    "round closed while generating, dropping"
                );
                return Ok(());
            }

            let _ = self.events.publish(MatchEvent::new(
                request.match_id.clone(),
                EventPayload::ResponseGenerated {
                    round: request.round,
                    participant_id,
                    identity: request.identity,
                    personality,
                    text,
                    fallback,
                },
            ));
        }

        try_open_voting(&self.store, &self.events, &request.match_id, request.round).await?;
        Ok(())
    }

    /// Consume deliveries until the queue closes. Failed deliveries are
    /// logged; a real delivery layer would redrive them.
    pub async fn run(&self, mut receiver: mpsc::UnboundedReceiver<ResponseRequest>) {
        info!("response worker started");
        while let Some(request) = receiver.recv().await {
            if let Err(e) = self.handle(&request).await {
                error!(
                    match_id = %request.match_id,
                    identity = %request.identity,
                    "delivery failed: {}",
                    e
                );
            }
        }
        info!("response worker stopped");
    }
}

/// Completeness check plus the conditional `responding -> voting`
/// transition. Many callers may observe completeness concurrently; the
/// compare-and-swap lets exactly one of them perform the flip.
pub(crate) async fn try_open_voting(
    store: &SharedMatchStore,
    events: &SharedEventBus,
    match_id: &str,
    round_number: u32,
) -> StoreResult<bool> {
    let Some(record) = store.get(match_id).await? else {
        return Ok(false);
    };
    let Some(round) = record.rounds.get(round_number as usize - 1) else {
        return Ok(false);
    };
    if round.phase != RoundPhase::Responding
        || !round.all_responses_in(record.total_participants)
    {
        return Ok(false);
    }

    let won = store
        .cas_phase(
            match_id,
            round_number,
            RoundPhase::Responding,
            RoundPhase::Voting,
        )
        .await?;
    if won {
        store.set_status(match_id, MatchStatus::RoundVoting).await?;
        let _ = events.publish(MatchEvent::new(
            match_id,
            EventPayload::VotingStarted {
                round: round_number,
            },
        ));
        info!(match_id, round = round_number, "all responses in, voting open");
    }
    Ok(won)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::store::{InMemoryMatchStore, MatchStore};
    use crate::domain::{Identity, Match, Personality};
    use crate::events::EventBus;

    async fn seeded() -> (Arc<InMemoryMatchStore>, SharedEventBus, Vec<Identity>) {
        let store = InMemoryMatchStore::new().shared();
        let mut m = Match::new("m-1", 4, 2, 5);
        let ids = Identity::alphabet(4);
        m.seat_human(ids[0], "conn-1");
        m.seat_human(ids[1], "conn-2");
        m.seat_automated(ids[2], Personality::Analyst);
        m.seat_automated(ids[3], Personality::Comedian);
        m.begin("prompt");
        store.put(&m).await.unwrap();
        (store, EventBus::new().shared(), ids)
    }

    fn request(identity: Identity) -> ResponseRequest {
        ResponseRequest {
            match_id: "m-1".to_string(),
            round: 1,
            identity,
        }
    }

    #[tokio::test]
    async fn test_worker_writes_fallback_response() {
        let (store, events, ids) = seeded().await;
        let worker = ResponseWorker::new(store.clone(), events, MatchConfig::immediate());

        worker.handle(&request(ids[2])).await.unwrap();

        let record = store.get("m-1").await.unwrap().unwrap();
        assert!(record.rounds[0].responses.contains_key(&ids[2]));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_noop() {
        let (store, events, ids) = seeded().await;
        let worker = ResponseWorker::new(store.clone(), events, MatchConfig::immediate());

        worker.handle(&request(ids[2])).await.unwrap();
        let first = store.get("m-1").await.unwrap().unwrap();
        worker.handle(&request(ids[2])).await.unwrap();
        let second = store.get("m-1").await.unwrap().unwrap();

        assert_eq!(
            first.rounds[0].responses[&ids[2]],
            second.rounds[0].responses[&ids[2]]
        );
        assert_eq!(second.rounds[0].responses.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_match_is_dropped_not_fatal() {
        let (store, events, ids) = seeded().await;
        let worker = ResponseWorker::new(store, events, MatchConfig::immediate());

        let stray = ResponseRequest {
            match_id: "no-such-match".to_string(),
            round: 1,
            identity: ids[2],
        };
        worker.handle(&stray).await.unwrap();
    }

    #[tokio::test]
    async fn test_last_response_opens_voting_once() {
        let (store, events, ids) = seeded().await;
        let worker = ResponseWorker::new(store.clone(), events.clone(), MatchConfig::immediate());

        store
            .merge_response("m-1", 1, ids[0], "h1".to_string())
            .await
            .unwrap();
        store
            .merge_response("m-1", 1, ids[1], "h2".to_string())
            .await
            .unwrap();

        worker.handle(&request(ids[2])).await.unwrap();
        let record = store.get("m-1").await.unwrap().unwrap();
        assert_eq!(record.rounds[0].phase, RoundPhase::Responding);

        worker.handle(&request(ids[3])).await.unwrap();
        let record = store.get("m-1").await.unwrap().unwrap();
        assert_eq!(record.rounds[0].phase, RoundPhase::Voting);
        assert_eq!(record.status, MatchStatus::RoundVoting);
    }
}
