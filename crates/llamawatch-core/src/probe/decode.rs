//! Decoding of inference server responses.
//!
//! Upstream bodies are read as untyped JSON and fields are extracted one by
//! one, so a missing or retyped field only loses that field.

use serde_json::Value;
use tracing::debug;

/// Fields salvaged from a `/health` body. Absent means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthFields {
    pub model_loaded: Option<bool>,
    pub active_slots: Option<u64>,
    pub total_slots: Option<u64>,
}

/// Slot counts from a `/slots` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCounts {
    pub active: u64,
    pub total: u64,
}

/// Maps a `/health` status string to model-loaded state.
///
/// "no slot available" means the model is up but every slot is busy.
fn model_loaded_from_status(status: &str) -> Option<bool> {
    match status.trim().to_ascii_lowercase().as_str() {
        "ok" | "no slot available" => Some(true),
        "error" | "loading model" => Some(false),
        _ => None,
    }
}

/// Decodes a successful `/health` response body.
pub fn decode_health(body: &[u8]) -> HealthFields {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "health body is not JSON");
            return HealthFields::default();
        }
    };
    let Some(object) = value.as_object() else {
        debug!("health body is not a JSON object");
        return HealthFields::default();
    };

    let model_loaded = object
        .get("status")
        .and_then(Value::as_str)
        .and_then(model_loaded_from_status);
    let processing = object.get("slots_processing").and_then(Value::as_u64);
    let idle = object.get("slots_idle").and_then(Value::as_u64);

    HealthFields {
        model_loaded,
        active_slots: processing,
        total_slots: processing
            .zip(idle)
            .and_then(|(p, i)| p.checked_add(i)),
    }
}

/// Decodes a successful `/slots` response body.
///
/// Returns `None` unless the body is a JSON array. Entries without an
/// `is_processing` flag fall back to a numeric `state` (non-zero = busy).
pub fn decode_slots(body: &[u8]) -> Option<SlotCounts> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "slots body is not JSON");
            return None;
        }
    };
    let Value::Array(entries) = value else {
        debug!("slots body is not a JSON array");
        return None;
    };

    let active = entries.iter().filter(|entry| is_processing(entry)).count() as u64;
    Some(SlotCounts {
        active,
        total: entries.len() as u64,
    })
}

fn is_processing(entry: &Value) -> bool {
    match entry.get("is_processing") {
        Some(flag) => flag.as_bool() == Some(true),
        None => entry
            .get("state")
            .and_then(Value::as_u64)
            .is_some_and(|state| state != 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_ok() {
        let fields = decode_health(br#"{"status":"ok"}"#);
        assert_eq!(fields.model_loaded, Some(true));
        assert_eq!(fields.active_slots, None);
        assert_eq!(fields.total_slots, None);
    }

    #[test]
    fn test_health_status_error() {
        assert_eq!(decode_health(br#"{"status":"error"}"#).model_loaded, Some(false));
        assert_eq!(
            decode_health(br#"{"status":"loading model"}"#).model_loaded,
            Some(false)
        );
    }

    #[test]
    fn test_health_status_missing_or_unknown() {
        assert_eq!(decode_health(br#"{}"#).model_loaded, None);
        assert_eq!(decode_health(br#"{"status":"warming"}"#).model_loaded, None);
        assert_eq!(decode_health(br#"{"status":1}"#).model_loaded, None);
    }

    #[test]
    fn test_health_slot_counts() {
        let fields =
            decode_health(br#"{"status":"no slot available","slots_idle":0,"slots_processing":4}"#);
        assert_eq!(fields.model_loaded, Some(true));
        assert_eq!(fields.active_slots, Some(4));
        assert_eq!(fields.total_slots, Some(4));
    }

    #[test]
    fn test_health_partial_decode_keeps_good_fields() {
        let fields =
            decode_health(br#"{"status":"ok","slots_idle":"three","slots_processing":1}"#);
        assert_eq!(fields.model_loaded, Some(true));
        assert_eq!(fields.active_slots, Some(1));
        assert_eq!(fields.total_slots, None);

        let fields = decode_health(br#"{"status":["ok"],"slots_processing":2}"#);
        assert_eq!(fields.model_loaded, None);
        assert_eq!(fields.active_slots, Some(2));
    }

    #[test]
    fn test_health_slot_total_overflow_is_unknown() {
        let fields = decode_health(
            br#"{"status":"ok","slots_processing":18446744073709551615,"slots_idle":1}"#,
        );
        assert_eq!(fields.model_loaded, Some(true));
        assert_eq!(fields.active_slots, Some(u64::MAX));
        assert_eq!(fields.total_slots, None);
    }

    #[test]
    fn test_health_not_json() {
        assert_eq!(decode_health(b"OK"), HealthFields::default());
        assert_eq!(decode_health(b"[1,2]"), HealthFields::default());
        assert_eq!(decode_health(b""), HealthFields::default());
    }

    #[test]
    fn test_slots_count_processing() {
        let counts = decode_slots(
            br#"[{"is_processing":true},{"is_processing":false},{"is_processing":true}]"#,
        )
        .unwrap();
        assert_eq!(counts, SlotCounts { active: 2, total: 3 });
    }

    #[test]
    fn test_slots_legacy_state_field() {
        let counts =
            decode_slots(br#"[{"id":0,"state":1},{"id":1,"state":0},{"id":2}]"#).unwrap();
        assert_eq!(counts, SlotCounts { active: 1, total: 3 });
    }

    #[test]
    fn test_slots_malformed_entries_are_idle() {
        let counts =
            decode_slots(br#"[{"is_processing":"yes"},42,null,{"is_processing":true}]"#).unwrap();
        assert_eq!(counts, SlotCounts { active: 1, total: 4 });
    }

    #[test]
    fn test_slots_not_array() {
        assert_eq!(decode_slots(br#"{"error":"not supported"}"#), None);
        assert_eq!(decode_slots(b"<html>404</html>"), None);
        assert_eq!(decode_slots(br#"[]"#), Some(SlotCounts { active: 0, total: 0 }));
    }
}
