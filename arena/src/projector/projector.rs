//! Event consumer building the match history read-model
//!
//! Applies events in arrival order with per-field idempotent upserts, so any
//! arrival order of the same event set converges to the same records. A bad
//! or early event is logged and dropped; the projector never fails on one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::MatchId;
use crate::events::{
    validate, EventPayload, MatchEvent, ValidatedEvent,
};

use super::history::{HistoryStatus, MatchHistoryRecord, ResponseEntry};

/// Shared reference to a projector behind its single-writer lock
pub type SharedHistoryProjector = Arc<RwLock<HistoryProjector>>;

/// Builder of the per-match history read-model
#[derive(Default)]
pub struct HistoryProjector {
    records: HashMap<MatchId, MatchHistoryRecord>,
}

impl HistoryProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this projector
    pub fn shared(self) -> SharedHistoryProjector {
        Arc::new(RwLock::new(self))
    }

    /// Apply one event. Reapplying any event is idempotent; events for
    /// unknown matches are dropped with a log line.
    pub fn apply(&mut self, event: &MatchEvent) {
        let match_id = event.match_id.clone();

        if let EventPayload::MatchStarted {
            participants,
            human_participants,
            total_rounds,
            created_at,
            ..
        } = &event.payload
        {
            // Idempotent overwrite, preserving rounds already projected from
            // events that arrived before the start did.
            let rounds = self
                .records
                .remove(&match_id)
                .map(|r| r.rounds)
                .unwrap_or_default();
            let mut record = MatchHistoryRecord::new(
                match_id.clone(),
                *created_at,
                participants.clone(),
                human_participants.clone(),
                *total_rounds,
            );
            record.rounds = rounds;
            self.records.insert(match_id, record);
            return;
        }

        let Some(record) = self.records.get_mut(&match_id) else {
            warn!(
                match_id = %match_id,
                event_type = event.event_type(),
                "event for unknown match, dropping"
            );
            return;
        };

        match &event.payload {
            EventPayload::MatchStarted { .. } => unreachable!("handled above"),

            EventPayload::RoundStarted { round, prompt } => {
                // Overwrite-in-place by index: a placeholder (or a
                // duplicate) converges to the real prompt while keeping
                // responses and votes that arrived first.
                let target = record.round_at_mut(*round);
                target.prompt = prompt.clone();
                debug!(match_id = %match_id, round, "round projected");
            }

            EventPayload::ResponseSubmitted {
                round,
                participant_id,
                identity,
                text,
            } => {
                record.round_at_mut(*round).responses.insert(
                    participant_id.clone(),
                    ResponseEntry {
                        identity: *identity,
                        text: text.clone(),
                        generated: false,
                    },
                );
            }

            EventPayload::ResponseGenerated {
                round,
                participant_id,
                identity,
                text,
                ..
            } => {
                record.round_at_mut(*round).responses.insert(
                    participant_id.clone(),
                    ResponseEntry {
                        identity: *identity,
                        text: text.clone(),
                        generated: true,
                    },
                );
            }

            EventPayload::VotingStarted { .. } => {
                // Projected state does not track live phases.
            }

            EventPayload::VoteSubmitted {
                round,
                voter,
                guess,
            } => {
                record.round_at_mut(*round).votes.insert(*voter, *guess);
            }

            EventPayload::RoundCompleted { round, scores } => {
                record.round_at_mut(*round).scores = scores.clone();
            }

            EventPayload::MatchCompleted {
                final_scores,
                completed_at,
                duration_seconds,
            } => {
                record.status = HistoryStatus::Completed;
                record.final_scores = Some(final_scores.clone());
                record.completed_at = Some(*completed_at);
                record.duration_seconds = Some(*duration_seconds);
            }
        }
    }

    /// Validate and apply a raw envelope. Malformed envelopes and unknown
    /// event types are logged and dropped.
    pub fn apply_raw(&mut self, raw: &Value) {
        match validate(raw) {
            Ok(ValidatedEvent::Known(event)) => self.apply(&event),
            Ok(ValidatedEvent::Unknown { event_type }) => {
                debug!(event_type = %event_type, "unknown event type, not projected");
            }
            Err(e) => {
                warn!("malformed event dropped: {}", e);
            }
        }
    }

    /// Apply a slice of events in order, as read back from the log
    pub fn replay(&mut self, events: &[MatchEvent]) {
        for event in events {
            self.apply(event);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// History for one match
    pub fn get(&self, match_id: &str) -> Option<&MatchHistoryRecord> {
        self.records.get(match_id)
    }

    /// All projected matches, newest first
    pub fn list_all(&self) -> Vec<&MatchHistoryRecord> {
        let mut all: Vec<&MatchHistoryRecord> = self.records.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Completed matches only, newest first
    pub fn list_completed(&self) -> Vec<&MatchHistoryRecord> {
        self.list_all()
            .into_iter()
            .filter(|r| r.status == HistoryStatus::Completed)
            .collect()
    }

    /// Number of projected matches
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identity;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn started_event(match_id: &str) -> MatchEvent {
        MatchEvent::new(
            match_id,
            EventPayload::MatchStarted {
                participants: Vec::new(),
                human_participants: vec![Identity::alphabet(4)[0]],
                robot_participants: vec![Identity::alphabet(4)[2], Identity::alphabet(4)[3]],
                total_rounds: 5,
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_match_started_creates_record() {
        let mut projector = HistoryProjector::new();
        projector.apply(&started_event("m-1"));

        let record = projector.get("m-1").unwrap();
        assert_eq!(record.status, HistoryStatus::InProgress);
        assert!(record.rounds.is_empty());
    }

    #[test]
    fn test_unknown_match_dropped() {
        let mut projector = HistoryProjector::new();
        projector.apply(&MatchEvent::new(
            "never-started",
            EventPayload::VotingStarted { round: 1 },
        ));
        assert!(projector.is_empty());
    }

    #[test]
    fn test_response_before_round_started_backfills() {
        let mut projector = HistoryProjector::new();
        projector.apply(&started_event("m-1"));

        projector.apply(&MatchEvent::new(
            "m-1",
            EventPayload::ResponseSubmitted {
                round: 1,
                participant_id: "p-1".to_string(),
                identity: Identity::alphabet(4)[0],
                text: "early".to_string(),
            },
        ));

        let record = projector.get("m-1").unwrap();
        assert!(record.rounds[0].is_placeholder());
        assert_eq!(record.rounds[0].responses.len(), 1);

        // The late round.started converges the placeholder.
        projector.apply(&MatchEvent::new(
            "m-1",
            EventPayload::RoundStarted {
                round: 1,
                prompt: "real prompt".to_string(),
            },
        ));
        let record = projector.get("m-1").unwrap();
        assert_eq!(record.rounds[0].prompt, "real prompt");
        assert_eq!(record.rounds[0].responses.len(), 1);
    }

    #[test]
    fn test_duplicate_response_last_write_wins() {
        let mut projector = HistoryProjector::new();
        projector.apply(&started_event("m-1"));

        for text in ["first", "second"] {
            projector.apply(&MatchEvent::new(
                "m-1",
                EventPayload::ResponseGenerated {
                    round: 1,
                    participant_id: "p-3".to_string(),
                    identity: Identity::alphabet(4)[2],
                    personality: crate::domain::Personality::Analyst,
                    text: text.to_string(),
                    fallback: true,
                },
            ));
        }

        let record = projector.get("m-1").unwrap();
        assert_eq!(record.rounds[0].responses.len(), 1);
        assert_eq!(record.rounds[0].responses["p-3"].text, "second");
        assert!(record.rounds[0].responses["p-3"].generated);
    }

    #[test]
    fn test_completion_sets_result() {
        let mut projector = HistoryProjector::new();
        projector.apply(&started_event("m-1"));

        let finals: BTreeMap<Identity, u32> =
            [(Identity::alphabet(4)[0], 5)].into_iter().collect();
        projector.apply(&MatchEvent::new(
            "m-1",
            EventPayload::MatchCompleted {
                final_scores: finals.clone(),
                completed_at: Utc::now(),
                duration_seconds: 300,
            },
        ));

        let record = projector.get("m-1").unwrap();
        assert_eq!(record.status, HistoryStatus::Completed);
        assert_eq!(record.final_scores.as_ref().unwrap(), &finals);
        assert_eq!(projector.list_completed().len(), 1);
    }

    #[test]
    fn test_apply_raw_survives_garbage() {
        let mut projector = HistoryProjector::new();
        projector.apply_raw(&json!("not an event"));
        projector.apply_raw(&json!({ "event_type": "vote.submitted" }));
        projector.apply_raw(&json!({
            "event_id": "e-1",
            "event_type": "spectator.joined",
            "match_id": "m-1",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": {}
        }));
        assert!(projector.is_empty());
    }

    #[test]
    fn test_list_all_sorted_newest_first() {
        let mut projector = HistoryProjector::new();
        let mut first = started_event("m-old");
        if let EventPayload::MatchStarted { created_at, .. } = &mut first.payload {
            *created_at = Utc::now() - chrono::Duration::hours(1);
        }
        projector.apply(&first);
        projector.apply(&started_event("m-new"));

        let all = projector.list_all();
        assert_eq!(all[0].match_id, "m-new");
        assert_eq!(all[1].match_id, "m-old");
    }
}
