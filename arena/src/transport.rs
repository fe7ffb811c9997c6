//! Client transport port: fire-and-forget push of match snapshots.
//!
//! Delivery failure to one client must never fail the state transition that
//! produced the snapshot, so implementations report errors and callers only
//! log them.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::Match;

/// Push port toward connected clients
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Push the full match snapshot after a transition
    async fn push_snapshot(&self, snapshot: &Match) -> anyhow::Result<()>;
}

/// Transport that drops every push, for headless deployments and tests
pub struct NoopTransport;

#[async_trait]
impl ClientTransport for NoopTransport {
    async fn push_snapshot(&self, _snapshot: &Match) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Push a snapshot, swallowing (and logging) any delivery failure
pub async fn push_best_effort(transport: &dyn ClientTransport, snapshot: &Match) {
    if let Err(e) = transport.push_snapshot(snapshot).await {
        warn!(match_id = %snapshot.id, "snapshot push failed: {}", e);
    }
}
