//! Response-request queue port
//!
//! The queue is a collaborator with at-least-once delivery: messages may be
//! duplicated and arrive in any order. Workers must therefore treat every
//! delivery as possibly-redundant; nothing here deduplicates.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{Identity, MatchId};

/// One unit of automated-response work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRequest {
    /// Match to respond in
    pub match_id: MatchId,
    /// 1-based round the request was issued for
    pub round: u32,
    /// Automated seat that should respond
    pub identity: Identity,
}

/// Error type for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Shared reference to a response queue
pub type SharedResponseQueue = Arc<dyn ResponseQueue>;

/// Enqueue side of the response-request queue
#[async_trait]
pub trait ResponseQueue: Send + Sync {
    async fn enqueue(&self, request: ResponseRequest) -> QueueResult<()>;
}

/// In-memory queue on an unbounded channel, for tests and local runs
pub struct InMemoryResponseQueue {
    sender: mpsc::UnboundedSender<ResponseRequest>,
}

impl InMemoryResponseQueue {
    /// Create the queue and its single consumer end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResponseRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Create a shared reference to this queue
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ResponseQueue for InMemoryResponseQueue {
    async fn enqueue(&self, request: ResponseRequest) -> QueueResult<()> {
        self.sender
            .send(request)
            .map_err(|e| QueueError::EnqueueFailed(e.to_string()))
    }
}
