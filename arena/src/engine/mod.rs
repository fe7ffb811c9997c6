//! In-process match authority
//!
//! The single-process variant of the orchestration rules: one mutable match
//! record per call, persisted through an injected repository. The
//! distributed variant in `coordinator` drives the same domain rules through
//! a shared store and a worker queue.

pub mod machine;
pub mod repository;

pub use machine::{EngineError, EngineResult, MatchEngine};
pub use repository::{
    InMemoryMatchRepository, MatchRepository, RepoError, RepoResult, SharedMatchRepository,
};
