//! API route handlers
//!
//! Request handling for the operator API:
//! - Queue snapshots and poller control (fetch, clear, enable, activity)
//! - Console visibility reports
//! - Detection actions forwarded to the parking backend

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::client::ParkingApiClient;
use crate::polling::PollerHandle;
use crate::types::{ProcessExitRequest, QueueKind, QueueSnapshot};
use crate::visibility::{VisibilityEvent, VisibilityHandle};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct OperatorState {
    /// Running pollers, one per watched queue
    pub pollers: Arc<HashMap<QueueKind, PollerHandle>>,
    /// Console visibility publisher
    pub visibility: VisibilityHandle,
    /// Backend client for forwarded actions; `None` disables them
    pub client: Option<ParkingApiClient>,
    /// Gate the consoles are scoped to
    pub gate_id: Option<i64>,
    pub started_at: Instant,
}

impl OperatorState {
    pub fn new(
        pollers: impl IntoIterator<Item = PollerHandle>,
        visibility: VisibilityHandle,
        client: Option<ParkingApiClient>,
        gate_id: Option<i64>,
    ) -> Self {
        Self {
            pollers: Arc::new(pollers.into_iter().map(|h| (h.kind(), h)).collect()),
            visibility,
            client,
            gate_id,
            started_at: Instant::now(),
        }
    }

    /// Resolve a `{kind}` path segment to a running poller.
    fn poller(&self, slug: &str) -> Result<&PollerHandle, Response> {
        let kind: QueueKind = slug.parse().map_err(ApiErrorResponse::not_found)?;
        self.pollers
            .get(&kind)
            .ok_or_else(|| ApiErrorResponse::not_found(format!("Queue '{kind}' is not watched")))
    }

    fn client(&self) -> Result<&ParkingApiClient, Response> {
        self.client
            .as_ref()
            .ok_or_else(|| ApiErrorResponse::service_unavailable("Backend client not configured"))
    }
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub visible: bool,
    pub queues: Vec<QueueKind>,
    pub backend: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub event: VisibilityEvent,
}

#[derive(Debug, Serialize)]
pub struct VisibilityResponse {
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
pub struct VehicleTypeRequest {
    pub body_type_id: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health(State(state): State<OperatorState>) -> Response {
    let mut queues: Vec<QueueKind> = state.pollers.keys().copied().collect();
    queues.sort_by_key(|k| k.slug());

    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        visible: state.visibility.is_visible(),
        queues,
        backend: state.client.as_ref().map(|c| c.base_url().to_string()),
    })
}

/// GET /api/v1/queues
pub async fn list_queues(State(state): State<OperatorState>) -> Response {
    let snapshots: Vec<QueueSnapshot> = QueueKind::ALL
        .iter()
        .filter_map(|kind| state.pollers.get(kind))
        .map(PollerHandle::snapshot)
        .collect();
    ApiResponse::ok(snapshots)
}

/// GET /api/v1/queues/:kind
pub async fn get_queue(State(state): State<OperatorState>, Path(kind): Path<String>) -> Response {
    match state.poller(&kind) {
        Ok(poller) => ApiResponse::ok(poller.snapshot()),
        Err(resp) => resp,
    }
}

/// POST /api/v1/queues/:kind/fetch
pub async fn fetch_queue(State(state): State<OperatorState>, Path(kind): Path<String>) -> Response {
    control(&state, &kind, PollerHandle::fetch_now)
}

/// POST /api/v1/queues/:kind/clear
pub async fn clear_queue(State(state): State<OperatorState>, Path(kind): Path<String>) -> Response {
    control(&state, &kind, PollerHandle::clear_latest_detection)
}

/// POST /api/v1/queues/:kind/activity
pub async fn queue_activity(State(state): State<OperatorState>, Path(kind): Path<String>) -> Response {
    control(&state, &kind, PollerHandle::signal_activity)
}

/// POST /api/v1/queues/:kind/enabled
pub async fn set_queue_enabled(
    State(state): State<OperatorState>,
    Path(kind): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> Response {
    control(&state, &kind, |poller| poller.set_enabled(request.enabled))
}

fn control<F, E>(state: &OperatorState, kind: &str, op: F) -> Response
where
    F: FnOnce(&PollerHandle) -> Result<(), E>,
    E: std::fmt::Display,
{
    let poller = match state.poller(kind) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match op(poller) {
        Ok(()) => ApiResponse::accepted(poller.snapshot()),
        Err(e) => ApiErrorResponse::service_unavailable(e.to_string()),
    }
}

/// GET /api/v1/visibility
pub async fn get_visibility(State(state): State<OperatorState>) -> Response {
    ApiResponse::ok(VisibilityResponse {
        visible: state.visibility.is_visible(),
    })
}

/// POST /api/v1/visibility
pub async fn report_visibility(
    State(state): State<OperatorState>,
    Json(request): Json<VisibilityRequest>,
) -> Response {
    let visible = state.visibility.report(request.event);
    ApiResponse::ok(VisibilityResponse { visible })
}

/// POST /api/v1/detections/:id/vehicle-type
pub async fn process_vehicle_type(
    State(state): State<OperatorState>,
    Path(id): Path<i64>,
    Json(request): Json<VehicleTypeRequest>,
) -> Response {
    let client = match state.client() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match client.process_with_vehicle_type(id, request.body_type_id).await {
        Ok(outcome) => {
            info!(id, body_type_id = request.body_type_id, "Vehicle type assigned");
            finish_action(&state, QueueKind::VehicleType, id);
            ApiResponse::ok(outcome)
        }
        Err(e) => {
            warn!(id, error = %e, "Vehicle type assignment failed");
            ApiErrorResponse::from_client(&e)
        }
    }
}

/// POST /api/v1/detections/:id/exit
pub async fn process_exit(
    State(state): State<OperatorState>,
    Path(id): Path<i64>,
    Json(request): Json<ProcessExitRequest>,
) -> Response {
    let client = match state.client() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match client.process_exit(id, &request).await {
        Ok(outcome) => {
            info!(id, operator = ?request.operator_name, "Exit confirmed");
            finish_action(&state, QueueKind::Exit, id);
            ApiResponse::ok(outcome)
        }
        Err(e) => {
            warn!(id, error = %e, "Exit confirmation failed");
            ApiErrorResponse::from_client(&e)
        }
    }
}

/// The operator handled detection `id`: release it if it is the one
/// surfaced, and speed up either way.
///
/// Actions on any other detection leave the Shown-Set alone so the surfaced
/// entry is not handed out a second time.
fn finish_action(state: &OperatorState, kind: QueueKind, id: i64) {
    let Some(poller) = state.pollers.get(&kind) else {
        return;
    };
    let showing = poller.snapshot().latest_detection.map(|d| d.id);
    let result = if showing == Some(id) {
        poller
            .clear_latest_detection()
            .and_then(|()| poller.signal_activity())
    } else {
        debug!(id, showing = ?showing, queue = %kind, "Action on a detection that is not surfaced, keeping current");
        poller.signal_activity()
    };
    if let Err(e) = result {
        warn!(error = %e, "Could not notify poller");
    }
}

/// GET /api/v1/detections/latest
pub async fn latest_detection(State(state): State<OperatorState>) -> Response {
    let client = match state.client() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match client.latest_detection_info(state.gate_id).await {
        Ok(Some(info)) => ApiResponse::ok(info),
        Ok(None) => ApiErrorResponse::not_found("No detections recorded"),
        Err(e) => ApiErrorResponse::from_client(&e),
    }
}
