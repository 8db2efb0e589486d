//! Camera detection records as returned by the parking backend.
//!
//! A [`Detection`] is produced by the backend's ingestion scheduler and is
//! read-only here. Only `id`, `numberplate` and `processing_status` drive
//! reconciliation; everything else rides along untouched in `extra` so the
//! operator console sees exactly what the backend sent.

use serde::{Deserialize, Deserializer, Serialize};

/// Processing status of a detection on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Waiting for the operator to pick a vehicle (body) type at entry.
    PendingVehicleType,
    /// Waiting for the operator to confirm the exit.
    PendingExit,
    /// Handled; no longer part of any pending queue.
    Processed,
    /// Anything the backend sends that this crate does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::PendingVehicleType => write!(f, "pending_vehicle_type"),
            ProcessingStatus::PendingExit => write!(f, "pending_exit"),
            ProcessingStatus::Processed => write!(f, "processed"),
            ProcessingStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single plate-read event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Backend row identifier. Queue deduplication keys on this.
    pub id: i64,

    /// Normalized plate text. `null` reads as empty.
    #[serde(default, deserialize_with = "nullable_string")]
    pub numberplate: String,

    /// Plate text as read by the camera.
    #[serde(default, deserialize_with = "nullable_string")]
    pub originalplate: String,

    #[serde(default)]
    pub detection_timestamp: Option<String>,

    #[serde(default)]
    pub gate_id: Option<i64>,

    /// Backend sends this as either a JSON string or a number.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub global_confidence: Option<f64>,

    /// `null` and unrecognised values both map to [`ProcessingStatus::Unknown`].
    #[serde(default, deserialize_with = "nullable_status")]
    pub processing_status: ProcessingStatus,

    /// Passthrough fields (speed, lane, make/model/color, image paths,
    /// vehicle, active passage, ...). Not interpreted.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Detection {
    /// Plate text for display, preferring the normalized form.
    pub fn plate(&self) -> &str {
        if self.numberplate.is_empty() {
            &self.originalplate
        } else {
            &self.numberplate
        }
    }

    /// Look up a passthrough field by name.
    pub fn extra_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_status<'de, D>(deserializer: D) -> Result<ProcessingStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ProcessingStatus>::deserialize(deserializer)?.unwrap_or_default())
}

/// Minimal detection for tests and demos.
///
/// Fills only the fields reconciliation looks at.
pub fn detection_stub(id: i64, plate: &str, status: ProcessingStatus) -> Detection {
    Detection {
        id,
        numberplate: plate.to_string(),
        originalplate: plate.to_string(),
        detection_timestamp: None,
        gate_id: None,
        global_confidence: None,
        processing_status: status,
        extra: serde_json::Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_confidence_and_keeps_passthrough() {
        let raw = r#"{
            "id": 101,
            "numberplate": "T123ABC",
            "originalplate": "T 123 ABC",
            "detection_timestamp": "2025-01-14 08:12:03",
            "gate_id": 2,
            "global_confidence": "87.5",
            "processing_status": "pending_vehicle_type",
            "speed": "12",
            "lane_id": 1,
            "make_str": "Toyota"
        }"#;
        let d: Detection = serde_json::from_str(raw).unwrap();
        assert_eq!(d.id, 101);
        assert_eq!(d.global_confidence, Some(87.5));
        assert_eq!(d.processing_status, ProcessingStatus::PendingVehicleType);
        assert_eq!(d.extra_field("make_str"), Some(&serde_json::json!("Toyota")));
        assert_eq!(d.extra_field("lane_id"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn numeric_confidence_and_null_status() {
        let raw = r#"{"id": 7, "numberplate": "X1", "global_confidence": 91, "processing_status": null}"#;
        let d: Detection = serde_json::from_str(raw).unwrap();
        assert_eq!(d.global_confidence, Some(91.0));
        assert_eq!(d.processing_status, ProcessingStatus::Unknown);
        assert!(d.gate_id.is_none());
    }

    #[test]
    fn unknown_status_does_not_fail() {
        let raw = r#"{"id": 8, "numberplate": "X2", "processing_status": "awaiting_payment"}"#;
        let d: Detection = serde_json::from_str(raw).unwrap();
        assert_eq!(d.processing_status, ProcessingStatus::Unknown);
    }

    #[test]
    fn garbage_confidence_is_none() {
        let raw = r#"{"id": 9, "numberplate": "X3", "global_confidence": "n/a"}"#;
        let d: Detection = serde_json::from_str(raw).unwrap();
        assert!(d.global_confidence.is_none());
    }

    #[test]
    fn plate_falls_back_to_original() {
        let mut d = detection_stub(1, "", ProcessingStatus::PendingExit);
        d.originalplate = "ABC 123".to_string();
        assert_eq!(d.plate(), "ABC 123");
    }
}
