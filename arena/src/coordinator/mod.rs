//! Distributed response coordination
//!
//! The same domain rules as the in-process engine, driven against a shared
//! durable store with concurrent writers and a message queue with
//! at-least-once, possibly duplicate, possibly reordered delivery. There is
//! no lock: correctness rests on field-level merge writes plus a
//! compare-and-swap on the round phase, the only mutation that can
//! double-fire.

pub mod coordinator;
pub mod queue;
pub mod store;
pub mod worker;

pub use coordinator::{CoordinatorError, CoordinatorResult, MatchCoordinator};
pub use queue::{
    InMemoryResponseQueue, QueueError, QueueResult, ResponseQueue, ResponseRequest,
    SharedResponseQueue,
};
pub use store::{InMemoryMatchStore, MatchStore, SharedMatchStore, StoreError, StoreResult};
pub use worker::ResponseWorker;
