//! Detection Records
//!
//! Narrowing of a generic [`Event`] into the fields the access log stores.

use chrono::{FixedOffset, SecondsFormat, Utc};
use serde::Serialize;

use super::decoder::Event;

/// Value of the `type` field marking a persistence-worthy event
pub const DETECTION_TYPE: &str = "detection";

/// Name the detector reports for faces it could not match
pub const UNKNOWN_NAME: &str = "Unknown";

const DEFAULT_ROLE: &str = "unknown";

/// A recognized-person sighting, ready to be written to the access log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub name: String,
    pub authorized: bool,
    pub confidence: f64,
    pub role: String,
    /// ISO-8601 timestamp as reported by the detector, or the time of decoding
    pub timestamp: String,
}

impl DetectionRecord {
    /// Extract a detection record from an event.
    ///
    /// Returns `None` unless `type == "detection"` and the nested `data`
    /// object names a known person (non-empty and not `"Unknown"`).
    /// A missing timestamp is filled with the current time at `offset`.
    pub fn from_event(event: &Event, offset: FixedOffset) -> Option<Self> {
        if event.get("type").and_then(|v| v.as_str()) != Some(DETECTION_TYPE) {
            return None;
        }

        let data = event.get("data")?.as_object()?;

        let name = data.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        if name.is_empty() || name == UNKNOWN_NAME {
            return None;
        }

        let authorized = data
            .get("authorized")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let confidence = data
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let role = match data.get("role").and_then(|v| v.as_str()) {
            Some(role) if !role.is_empty() => role.to_string(),
            _ => DEFAULT_ROLE.to_string(),
        };

        let timestamp = match data.get("timestamp").and_then(|v| v.as_str()) {
            Some(ts) if !ts.is_empty() => ts.to_string(),
            _ => Utc::now()
                .with_timezone(&offset)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
        };

        Some(Self {
            name: name.to_string(),
            authorized,
            confidence,
            role,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> Event {
        value.as_object().cloned().unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_detection_from_full_event() {
        let e = event(json!({
            "type": "detection",
            "data": {
                "name": "Alice",
                "authorized": true,
                "confidence": 0.97,
                "role": "staff",
                "timestamp": "2024-05-01T08:30:00+07:00"
            }
        }));

        let record = DetectionRecord::from_event(&e, utc()).unwrap();
        assert_eq!(record.name, "Alice");
        assert!(record.authorized);
        assert_eq!(record.confidence, 0.97);
        assert_eq!(record.role, "staff");
        assert_eq!(record.timestamp, "2024-05-01T08:30:00+07:00");
    }

    #[test]
    fn test_detection_defaults() {
        let e = event(json!({"type": "detection", "data": {"name": "Bob", "timestamp": ""}}));
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();

        let record = DetectionRecord::from_event(&e, offset).unwrap();
        assert!(!record.authorized);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.role, "unknown");
        assert!(record.timestamp.ends_with("+07:00"));
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }

    #[test]
    fn test_unknown_and_empty_names_are_skipped() {
        let unknown = event(json!({"type": "detection", "data": {"name": "Unknown", "authorized": false}}));
        assert!(DetectionRecord::from_event(&unknown, utc()).is_none());

        let empty = event(json!({"type": "detection", "data": {"name": ""}}));
        assert!(DetectionRecord::from_event(&empty, utc()).is_none());

        let missing = event(json!({"type": "detection", "data": {}}));
        assert!(DetectionRecord::from_event(&missing, utc()).is_none());
    }

    #[test]
    fn test_other_event_types_are_skipped() {
        let status = event(json!({"type": "status", "data": {"name": "Alice"}}));
        assert!(DetectionRecord::from_event(&status, utc()).is_none());

        let untyped = event(json!({"data": {"name": "Alice"}}));
        assert!(DetectionRecord::from_event(&untyped, utc()).is_none());

        let flat = event(json!({"type": "detection", "data": "Alice"}));
        assert!(DetectionRecord::from_event(&flat, utc()).is_none());
    }
}
