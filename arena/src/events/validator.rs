//! Structural validation for raw event envelopes
//!
//! Validation is structural only: it rejects malformed envelopes but never
//! second-guesses values the state machine already accepted. Unknown event
//! types pass validation (forward compatibility) and are left unprojected.

use serde_json::Value;

use super::types::MatchEvent;

/// Error type for event validation
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("envelope field missing or not a string: {0}")]
    BadEnvelopeField(&'static str),

    #[error("envelope timestamp is not RFC 3339: {0}")]
    BadTimestamp(String),

    #[error("{event_type} data is not a JSON object")]
    DataNotAnObject { event_type: String },

    #[error("{event_type} requires data field {field}")]
    MissingDataField {
        event_type: String,
        field: &'static str,
    },

    #[error("envelope failed to decode: {0}")]
    Malformed(String),
}

/// Result type for event validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Outcome of validating a raw envelope
#[derive(Debug)]
pub enum ValidatedEvent {
    /// A known event type, fully decoded
    Known(Box<MatchEvent>),
    /// A structurally sound envelope of a type this build does not know;
    /// accepted but not projected
    Unknown { event_type: String },
}

/// Required `data` fields per known event type
fn required_fields(event_type: &str) -> Option<&'static [&'static str]> {
    match event_type {
        "match.started" => Some(&[
            "participants",
            "human_participants",
            "robot_participants",
            "created_at",
        ]),
        "round.started" => Some(&["round", "prompt"]),
        "response.submitted" => Some(&["round", "participant_id", "identity", "text"]),
        "response.generated" => {
            Some(&["round", "participant_id", "identity", "personality", "text"])
        }
        "voting.started" => Some(&["round"]),
        "vote.submitted" => Some(&["round", "voter", "guess"]),
        "round.completed" => Some(&["round", "scores"]),
        "match.completed" => Some(&["final_scores", "completed_at"]),
        _ => None,
    }
}

fn envelope_string<'v>(
    obj: &'v serde_json::Map<String, Value>,
    field: &'static str,
) -> ValidationResult<&'v str> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or(ValidationError::BadEnvelopeField(field))
}

/// Validate a raw JSON envelope against the closed event schema.
///
/// Returns the decoded event for known types and `Unknown` for forward
/// compatibility; every error names the first structural defect found.
pub fn validate(raw: &Value) -> ValidationResult<ValidatedEvent> {
    let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    envelope_string(obj, "event_id")?;
    envelope_string(obj, "match_id")?;
    let event_type = envelope_string(obj, "event_type")?.to_string();

    let timestamp = envelope_string(obj, "timestamp")?;
    if chrono::DateTime::parse_from_rfc3339(timestamp).is_err() {
        return Err(ValidationError::BadTimestamp(timestamp.to_string()));
    }

    let Some(fields) = required_fields(&event_type) else {
        return Ok(ValidatedEvent::Unknown { event_type });
    };

    let data = obj
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| ValidationError::DataNotAnObject {
            event_type: event_type.clone(),
        })?;

    for field in fields {
        if !data.contains_key(*field) {
            return Err(ValidationError::MissingDataField {
                event_type,
                field,
            });
        }
    }

    let event: MatchEvent = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    Ok(ValidatedEvent::Known(Box::new(event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identity;
    use crate::events::types::EventPayload;
    use serde_json::json;

    fn valid_raw() -> Value {
        let event = MatchEvent::new(
            "m-1",
            EventPayload::VoteSubmitted {
                round: 1,
                voter: Identity::alphabet(2)[0],
                guess: Identity::alphabet(2)[1],
            },
        );
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn test_valid_event_decodes() {
        match validate(&valid_raw()).unwrap() {
            ValidatedEvent::Known(event) => {
                assert_eq!(event.event_type(), "vote.submitted");
            }
            other => panic!("expected known event, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_envelope_field_rejected() {
        let mut raw = valid_raw();
        raw.as_object_mut().unwrap().remove("match_id");
        assert!(matches!(
            validate(&raw),
            Err(ValidationError::BadEnvelopeField("match_id"))
        ));
    }

    #[test]
    fn test_missing_data_field_rejected() {
        let mut raw = valid_raw();
        raw["data"].as_object_mut().unwrap().remove("guess");
        assert!(matches!(
            validate(&raw),
            Err(ValidationError::MissingDataField { field: "guess", .. })
        ));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let mut raw = valid_raw();
        raw["timestamp"] = json!("yesterday-ish");
        assert!(matches!(validate(&raw), Err(ValidationError::BadTimestamp(_))));
    }

    #[test]
    fn test_unknown_type_passes() {
        let raw = json!({
            "event_id": "e-1",
            "event_type": "spectator.joined",
            "match_id": "m-1",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": { "whatever": true }
        });
        match validate(&raw).unwrap() {
            ValidatedEvent::Unknown { event_type } => {
                assert_eq!(event_type, "spectator.joined");
            }
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            validate(&json!("not an event")),
            Err(ValidationError::NotAnObject)
        ));
    }
}
