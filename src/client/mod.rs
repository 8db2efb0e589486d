//! Parking API client: HTTP client for the parking backend
//!
//! Reads the pending detection queues and forwards operator actions
//! (vehicle type selection, exit confirmation).

mod error;

pub use error::ClientError;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::polling::QueueSource;
use crate::types::{
    Detection, Envelope, LatestDetectionInfo, ProcessExitRequest, ProcessOutcome,
    ProcessVehicleTypeRequest, QueueKind,
};

/// HTTP client for the parking backend
#[derive(Clone)]
pub struct ParkingApiClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl ParkingApiClient {
    /// Create a new client from backend settings
    pub fn new(config: &BackendConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// Get base URL for logging
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.post(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header(ACCEPT, "application/json");
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Fetch one pending queue, oldest first.
    ///
    /// An unparsable body or `success: false` yields an empty queue rather
    /// than an error; only transport failures and non-2xx statuses fail.
    pub async fn pending_detections(
        &self,
        kind: QueueKind,
        gate_id: Option<i64>,
    ) -> Result<Vec<Detection>, ClientError> {
        let mut req = self.get(kind.endpoint());
        if let Some(gate) = gate_id {
            req = req.query(&[("gate_id", gate)]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body));
        }

        let body = resp.bytes().await?;
        Ok(parse_pending_queue(kind, &body))
    }

    /// Assign a vehicle (body) type to an entry detection.
    pub async fn process_with_vehicle_type(
        &self,
        detection_id: i64,
        body_type_id: i64,
    ) -> Result<ProcessOutcome, ClientError> {
        let path = format!("/camera-detection/logs/{detection_id}/process-with-vehicle-type");
        let body = ProcessVehicleTypeRequest { body_type_id };
        self.send_action(self.post(&path).json(&body)).await
    }

    /// Confirm an exit detection.
    pub async fn process_exit(
        &self,
        detection_id: i64,
        request: &ProcessExitRequest,
    ) -> Result<ProcessOutcome, ClientError> {
        let path = format!("/camera-detection/logs/{detection_id}/process-exit");
        self.send_action(self.post(&path).json(request)).await
    }

    /// Latest detection id and count, optionally for one gate.
    pub async fn latest_detection_info(
        &self,
        gate_id: Option<i64>,
    ) -> Result<Option<LatestDetectionInfo>, ClientError> {
        let mut req = self.get("/camera-detection/logs/latest");
        if let Some(gate) = gate_id {
            req = req.query(&[("gate_id", gate)]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body));
        }

        let body = resp.bytes().await?;
        let envelope: Envelope<LatestDetectionInfo> = serde_json::from_slice(&body)?;
        Ok(if envelope.success { envelope.data } else { None })
    }

    async fn send_action(&self, req: reqwest::RequestBuilder) -> Result<ProcessOutcome, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::from_status(status, &body));
        }

        let outcome: ProcessOutcome = serde_json::from_str(&body)?;
        if !outcome.success {
            return Err(ClientError::Rejected(
                outcome
                    .messages
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(outcome)
    }
}

#[async_trait]
impl QueueSource for ParkingApiClient {
    async fn fetch_pending(
        &self,
        kind: QueueKind,
        gate_id: Option<i64>,
    ) -> Result<Vec<Detection>, ClientError> {
        self.pending_detections(kind, gate_id).await
    }

    fn source_name(&self) -> &str {
        &self.base_url
    }
}

/// Decode a pending-queue response body.
///
/// Malformed bodies and `success: false` count as an empty queue. Entries
/// that fail to decode are skipped; the rest keep their order.
pub fn parse_pending_queue(kind: QueueKind, body: &[u8]) -> Vec<Detection> {
    let envelope: Envelope<Vec<serde_json::Value>> = match serde_json::from_slice(body) {
        Ok(env) => env,
        Err(e) => {
            warn!(queue = %kind, error = %e, "Malformed pending queue response, treating as empty");
            return Vec::new();
        }
    };

    if !envelope.success {
        debug!(
            queue = %kind,
            messages = envelope.messages.as_deref().unwrap_or(""),
            "Backend reported success=false, treating as empty"
        );
        return Vec::new();
    }

    let rows = envelope.data.unwrap_or_default();
    let mut detections = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<Detection>(row) {
            Ok(detection) => detections.push(detection),
            Err(e) => warn!(queue = %kind, index, error = %e, "Skipping malformed queue entry"),
        }
    }

    let unexpected = detections
        .iter()
        .filter(|d| d.processing_status != kind.expected_status())
        .count();
    if unexpected > 0 {
        debug!(queue = %kind, unexpected, "Queue contains entries with a different processing status");
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_envelope_in_order() {
        let body = br#"{
            "success": true,
            "data": [
                {"id": 101, "numberplate": "AAA111", "processing_status": "pending_vehicle_type"},
                {"id": 102, "numberplate": "BBB222", "processing_status": "pending_vehicle_type"}
            ],
            "messages": "ok",
            "status": 200
        }"#;
        let queue = parse_pending_queue(QueueKind::VehicleType, body);
        assert_eq!(queue.iter().map(|d| d.id).collect::<Vec<_>>(), vec![101, 102]);
    }

    #[test]
    fn malformed_body_is_empty_queue() {
        assert!(parse_pending_queue(QueueKind::Exit, b"<html>502</html>").is_empty());
        assert!(parse_pending_queue(QueueKind::Exit, b"").is_empty());
    }

    #[test]
    fn unsuccessful_envelope_is_empty_queue() {
        let body = br#"{"success": false, "data": [{"id": 1, "numberplate": "X"}]}"#;
        assert!(parse_pending_queue(QueueKind::Exit, body).is_empty());
    }

    #[test]
    fn null_data_is_empty_queue() {
        let body = br#"{"success": true, "data": null}"#;
        assert!(parse_pending_queue(QueueKind::VehicleType, body).is_empty());
    }

    #[test]
    fn null_plates_decode_as_empty() {
        let body = br#"{
            "success": true,
            "data": [
                {"id": 101, "numberplate": "AAA111", "originalplate": null},
                {"id": 102, "numberplate": null, "originalplate": "BBB222"}
            ]
        }"#;
        let queue = parse_pending_queue(QueueKind::VehicleType, body);
        assert_eq!(queue.iter().map(|d| d.id).collect::<Vec<_>>(), vec![101, 102]);
        assert_eq!(queue[0].originalplate, "");
        assert_eq!(queue[1].plate(), "BBB222");
    }

    #[test]
    fn malformed_entry_is_skipped_not_whole_queue() {
        let body = br#"{
            "success": true,
            "data": [
                {"id": 101, "numberplate": "AAA111"},
                {"id": "not-a-number", "numberplate": "BAD"},
                {"numberplate": "NOID"},
                {"id": 103, "numberplate": "CCC333"}
            ]
        }"#;
        let queue = parse_pending_queue(QueueKind::VehicleType, body);
        assert_eq!(queue.iter().map(|d| d.id).collect::<Vec<_>>(), vec![101, 103]);
    }

    #[test]
    fn bad_entry_does_not_resurface_shown_detection() {
        use crate::polling::{Reconciler, Reconciliation};

        let good = br#"{"success": true, "data": [{"id": 102, "numberplate": "KA01"}]}"#;
        let with_bad = br#"{"success": true, "data": [
            {"id": 102, "numberplate": "KA01"},
            {"id": 103, "numberplate": null, "originalplate": null},
            {"id": {"nested": true}}
        ]}"#;

        let mut reconciler = Reconciler::new();
        let first = reconciler.reconcile(&parse_pending_queue(QueueKind::VehicleType, good));
        assert!(matches!(first, Reconciliation::Surfaced { .. }));
        let second = reconciler.reconcile(&parse_pending_queue(QueueKind::VehicleType, with_bad));
        assert_eq!(second, Reconciliation::Kept(102));
        let third = reconciler.reconcile(&parse_pending_queue(QueueKind::VehicleType, good));
        assert_eq!(third, Reconciliation::Kept(102));
    }

    #[test]
    fn trailing_slash_trimmed_from_base_url() {
        let config = BackendConfig {
            base_url: "http://parking.local/api/".to_string(),
            ..BackendConfig::default()
        };
        let client = ParkingApiClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://parking.local/api");
    }
}
