//! History projection from the event stream
//!
//! The projector owns its read-model exclusively and tolerates everything
//! the event log is allowed to do: duplicates, out-of-order arrival, and
//! events for matches it has never heard of. Projection converges; it is
//! never real-time-ordered.

pub mod history;
pub mod projector;

pub use history::{HistoryStatus, MatchHistoryRecord, ResponseEntry, RoundHistory};
pub use projector::{HistoryProjector, SharedHistoryProjector};
