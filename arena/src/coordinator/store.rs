//! Durable store port for the distributed coordinator
//!
//! The store is strongly consistent on a single key but has concurrent
//! writers, so the port exposes exactly the mutations the protocol needs:
//! full-record put (creation and CAS-winner follow-ups only), field-level
//! single-key merges into the response/vote maps, a scalar status update,
//! and a compare-and-swap on one round's phase. Blind full-record
//! overwrites from concurrent writers are what this interface exists to
//! prevent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Identity, Match, MatchId, MatchStatus, RoundPhase};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("match not found: {0}")]
    NotFound(MatchId),

    #[error("match {match_id} has no round {round}")]
    RoundOutOfRange { match_id: MatchId, round: u32 },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a match store
pub type SharedMatchStore = Arc<dyn MatchStore>;

/// Keyed match storage with field-level conditional updates
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get(&self, match_id: &str) -> StoreResult<Option<Match>>;

    /// Full-record write. Reserved for match creation, roster formation,
    /// and the winner of a phase compare-and-swap.
    async fn put(&self, record: &Match) -> StoreResult<()>;

    async fn delete(&self, match_id: &str) -> StoreResult<()>;

    /// Merge one response key into the addressed round's map. Returns false
    /// without writing when the round has already left the responding
    /// phase, so late or duplicate deliveries cannot corrupt a closed round.
    async fn merge_response(
        &self,
        match_id: &str,
        round: u32,
        identity: Identity,
        text: String,
    ) -> StoreResult<bool>;

    /// Merge one vote key into the addressed round's map. Returns false
    /// without writing when the round is not in the voting phase.
    async fn merge_vote(
        &self,
        match_id: &str,
        round: u32,
        voter: Identity,
        guess: Identity,
    ) -> StoreResult<bool>;

    /// Compare-and-swap the addressed round's phase. Returns true iff this
    /// call performed the swap; a false return is the harmless loss of a
    /// transition race, not an error.
    async fn cas_phase(
        &self,
        match_id: &str,
        round: u32,
        expected: RoundPhase,
        next: RoundPhase,
    ) -> StoreResult<bool>;

    /// Scalar update of the match status field
    async fn set_status(&self, match_id: &str, status: MatchStatus) -> StoreResult<()>;
}

/// In-memory store with per-key atomic operations, for tests and local runs
#[derive(Default)]
pub struct InMemoryMatchStore {
    matches: Mutex<HashMap<MatchId, Match>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn round_mut<'m>(
    record: &'m mut Match,
    match_id: &str,
    round: u32,
) -> StoreResult<&'m mut crate::domain::Round> {
    if round == 0 {
        return Err(StoreError::RoundOutOfRange {
            match_id: match_id.to_string(),
            round,
        });
    }
    record
        .rounds
        .get_mut(round as usize - 1)
        .ok_or_else(|| StoreError::RoundOutOfRange {
            match_id: match_id.to_string(),
            round,
        })
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn get(&self, match_id: &str) -> StoreResult<Option<Match>> {
        let matches = self.matches.lock().await;
        Ok(matches.get(match_id).cloned())
    }

    async fn put(&self, record: &Match) -> StoreResult<()> {
        let mut matches = self.matches.lock().await;
        matches.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, match_id: &str) -> StoreResult<()> {
        let mut matches = self.matches.lock().await;
        matches.remove(match_id);
        Ok(())
    }

    async fn merge_response(
        &self,
        match_id: &str,
        round: u32,
        identity: Identity,
        text: String,
    ) -> StoreResult<bool> {
        let mut matches = self.matches.lock().await;
        let record = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::NotFound(match_id.to_string()))?;
        let target = round_mut(record, match_id, round)?;

        if target.phase != RoundPhase::Responding {
            return Ok(false);
        }
        target.responses.insert(identity, text);
        record.touch();
        Ok(true)
    }

    async fn merge_vote(
        &self,
        match_id: &str,
        round: u32,
        voter: Identity,
        guess: Identity,
    ) -> StoreResult<bool> {
        let mut matches = self.matches.lock().await;
        let record = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::NotFound(match_id.to_string()))?;
        let target = round_mut(record, match_id, round)?;

        if target.phase != RoundPhase::Voting {
            return Ok(false);
        }
        target.votes.insert(voter, guess);
        record.touch();
        Ok(true)
    }

    async fn cas_phase(
        &self,
        match_id: &str,
        round: u32,
        expected: RoundPhase,
        next: RoundPhase,
    ) -> StoreResult<bool> {
        let mut matches = self.matches.lock().await;
        let record = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::NotFound(match_id.to_string()))?;
        let target = round_mut(record, match_id, round)?;

        if target.phase != expected {
            return Ok(false);
        }
        target.phase = next;
        record.touch();
        Ok(true)
    }

    async fn set_status(&self, match_id: &str, status: MatchStatus) -> StoreResult<()> {
        let mut matches = self.matches.lock().await;
        let record = matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::NotFound(match_id.to_string()))?;
        record.status = status;
        record.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Personality;

    async fn seeded_store() -> (InMemoryMatchStore, Vec<Identity>) {
        let store = InMemoryMatchStore::new();
        let mut m = Match::new("m-1", 4, 2, 5);
        let ids = Identity::alphabet(4);
        m.seat_human(ids[0], "conn-1");
        m.seat_human(ids[1], "conn-2");
        m.seat_automated(ids[2], Personality::Analyst);
        m.seat_automated(ids[3], Personality::Comedian);
        m.begin("prompt");
        store.put(&m).await.unwrap();
        (store, ids)
    }

    #[tokio::test]
    async fn test_merge_response_is_key_level() {
        let (store, ids) = seeded_store().await;

        assert!(store
            .merge_response("m-1", 1, ids[0], "a".to_string())
            .await
            .unwrap());
        assert!(store
            .merge_response("m-1", 1, ids[1], "b".to_string())
            .await
            .unwrap());

        let record = store.get("m-1").await.unwrap().unwrap();
        assert_eq!(record.rounds[0].responses.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_rejected_after_phase_flip() {
        let (store, ids) = seeded_store().await;

        assert!(store
            .cas_phase("m-1", 1, RoundPhase::Responding, RoundPhase::Voting)
            .await
            .unwrap());
        assert!(!store
            .merge_response("m-1", 1, ids[0], "late".to_string())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cas_fires_exactly_once() {
        let (store, _) = seeded_store().await;

        assert!(store
            .cas_phase("m-1", 1, RoundPhase::Responding, RoundPhase::Voting)
            .await
            .unwrap());
        assert!(!store
            .cas_phase("m-1", 1, RoundPhase::Responding, RoundPhase::Voting)
            .await
            .unwrap());

        let record = store.get("m-1").await.unwrap().unwrap();
        assert_eq!(record.rounds[0].phase, RoundPhase::Voting);
    }

    #[tokio::test]
    async fn test_round_out_of_range_is_typed() {
        let (store, ids) = seeded_store().await;
        let err = store
            .merge_response("m-1", 7, ids[0], "x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RoundOutOfRange { round: 7, .. }));
    }
}
