//! Queue identities, backend envelopes and the caller-facing queue snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::detection::{Detection, ProcessingStatus};

/// Which pending queue a poller watches.
///
/// Both queues run the same reconciliation logic with fully separate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueKind {
    /// Entry detections waiting for a vehicle type.
    VehicleType,
    /// Exit detections waiting for confirmation.
    Exit,
}

impl QueueKind {
    pub const ALL: [QueueKind; 2] = [QueueKind::VehicleType, QueueKind::Exit];

    /// Backend path of the pending queue, relative to the API base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            QueueKind::VehicleType => "/camera-detection/logs/pending-vehicle-type",
            QueueKind::Exit => "/camera-detection/logs/pending-exit",
        }
    }

    /// Status the backend assigns to entries of this queue.
    pub fn expected_status(self) -> ProcessingStatus {
        match self {
            QueueKind::VehicleType => ProcessingStatus::PendingVehicleType,
            QueueKind::Exit => ProcessingStatus::PendingExit,
        }
    }

    /// URL slug used by the operator API.
    pub fn slug(self) -> &'static str {
        match self {
            QueueKind::VehicleType => "vehicle-type",
            QueueKind::Exit => "exit",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

impl std::str::FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle-type" | "vehicle_type" => Ok(QueueKind::VehicleType),
            "exit" => Ok(QueueKind::Exit),
            other => Err(format!("unknown queue '{other}' (expected 'vehicle-type' or 'exit')")),
        }
    }
}

/// Current polling cadence label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PollingSpeed {
    /// Recent activity.
    Fast,
    /// Peak hours, or adaptive mode off.
    #[default]
    Normal,
    /// Quiet hours.
    Slow,
}

impl std::fmt::Display for PollingSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollingSpeed::Fast => write!(f, "fast"),
            PollingSpeed::Normal => write!(f, "normal"),
            PollingSpeed::Slow => write!(f, "slow"),
        }
    }
}

/// What a caller sees of one poller.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub kind: QueueKind,
    /// Last successfully fetched queue, oldest first.
    pub pending_detections: Vec<Detection>,
    /// Detection currently surfaced to the operator.
    pub latest_detection: Option<Detection>,
    /// A fetch is in flight.
    pub loading: bool,
    /// Last fetch failure; cleared by the next successful fetch.
    pub error: Option<String>,
    pub polling_speed: PollingSpeed,
    pub interval_ms: u64,
    pub enabled: bool,
    pub visible: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl QueueSnapshot {
    pub fn new(kind: QueueKind, enabled: bool, visible: bool) -> Self {
        Self {
            kind,
            pending_detections: Vec::new(),
            latest_detection: None,
            loading: false,
            error: None,
            polling_speed: PollingSpeed::Normal,
            interval_ms: 0,
            enabled,
            visible,
            last_fetched_at: None,
        }
    }
}

// ============================================================================
// Backend envelopes
// ============================================================================

/// Standard backend response wrapper: `{ success, data, messages, status }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub messages: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

/// Lightweight "anything new?" probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestDetectionInfo {
    pub latest_id: i64,
    pub total_count: i64,
    #[serde(default)]
    pub latest_timestamp: Option<String>,
}

/// Body of the process-with-vehicle-type action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessVehicleTypeRequest {
    pub body_type_id: i64,
}

/// Body of the process-exit action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExitRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

/// Result of a processing action as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    #[serde(default)]
    pub messages: Option<String>,
    /// Detection, vehicle, passage and result objects. Opaque.
    #[serde(default)]
    pub data: serde_json::Value,
}
