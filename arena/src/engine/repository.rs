//! Repository port for match records
//!
//! Replaces a global in-memory match registry with an explicit get/put/delete
//! interface: tests and single-node deployments bind the in-memory map,
//! production binds a durable store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::{Match, MatchId};

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("lock poisoned")]
    LockPoisoned,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Shared reference to a match repository
pub type SharedMatchRepository = Arc<dyn MatchRepository>;

/// Keyed storage for match records
pub trait MatchRepository: Send + Sync {
    fn get(&self, id: &str) -> RepoResult<Option<Match>>;
    fn put(&self, record: &Match) -> RepoResult<()>;
    fn delete(&self, id: &str) -> RepoResult<()>;
    fn list(&self) -> RepoResult<Vec<Match>>;
}

/// In-memory repository backed by a map
#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: RwLock<HashMap<MatchId, Match>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this repository
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl MatchRepository for InMemoryMatchRepository {
    fn get(&self, id: &str) -> RepoResult<Option<Match>> {
        let matches = self.matches.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(matches.get(id).cloned())
    }

    fn put(&self, record: &Match) -> RepoResult<()> {
        let mut matches = self.matches.write().map_err(|_| RepoError::LockPoisoned)?;
        matches.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> RepoResult<()> {
        let mut matches = self.matches.write().map_err(|_| RepoError::LockPoisoned)?;
        matches.remove(id);
        Ok(())
    }

    fn list(&self) -> RepoResult<Vec<Match>> {
        let matches = self.matches.read().map_err(|_| RepoError::LockPoisoned)?;
        let mut all: Vec<Match> = matches.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
