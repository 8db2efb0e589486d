//! Backend Client Integration Tests
//!
//! Runs `ParkingApiClient` against an in-process axum mock of the parking
//! backend bound to an ephemeral port.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use parking_watch::config::BackendConfig;
use parking_watch::polling::{DetectionPoller, PollerSettings};
use parking_watch::types::{ProcessExitRequest, ProcessingStatus, QueueKind};
use parking_watch::visibility::visibility_channel;
use parking_watch::{ClientError, ParkingApiClient};

#[derive(Clone, Default)]
struct MockBackend {
    /// (path, gate_id query, authorization header)
    seen: Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl MockBackend {
    fn record(&self, path: &str, query: &std::collections::HashMap<String, String>, headers: &HeaderMap) {
        self.seen.lock().unwrap().push((
            path.to_string(),
            query.get("gate_id").cloned(),
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ));
    }
}

type Q = Query<std::collections::HashMap<String, String>>;

async fn pending_vehicle_type(State(mock): State<MockBackend>, Query(q): Q, headers: HeaderMap) -> Json<Value> {
    mock.record("pending-vehicle-type", &q, &headers);
    Json(json!({
        "success": true,
        "data": [
            {
                "id": 101,
                "numberplate": "KA01AB1234",
                "originalplate": "KA01AB1234",
                "detection_timestamp": "2026-10-19T08:15:00",
                "gate_id": 3,
                "global_confidence": "0.93",
                "processing_status": "pending_vehicle_type",
                "camera_name": "Entry Cam 1"
            },
            {
                "id": 102,
                "numberplate": "KA01CD5678",
                "global_confidence": 0.71,
                "processing_status": null
            }
        ],
        "messages": "ok",
        "status": 200
    }))
}

async fn pending_exit(State(mock): State<MockBackend>, Query(q): Q, headers: HeaderMap) -> impl IntoResponse {
    mock.record("pending-exit", &q, &headers);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "exit table locked" })))
}

async fn vehicle_type_action(
    State(mock): State<MockBackend>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.bodies.lock().unwrap().push(body.clone());
    if id == 999 {
        return Json(json!({ "success": false, "messages": "Detection already processed" }));
    }
    Json(json!({
        "success": true,
        "messages": "Vehicle type assigned",
        "data": { "detection": { "id": id }, "result": { "body_type_id": body["body_type_id"] } }
    }))
}

async fn exit_action(
    State(mock): State<MockBackend>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.bodies.lock().unwrap().push(body);
    Json(json!({ "success": true, "messages": "Exit processed", "data": { "id": id } }))
}

async fn latest(State(mock): State<MockBackend>, Query(q): Q, headers: HeaderMap) -> Json<Value> {
    mock.record("latest", &q, &headers);
    Json(json!({
        "success": true,
        "data": { "latest_id": 102, "total_count": 2, "latest_timestamp": "2026-10-19T08:16:00" }
    }))
}

async fn spawn_backend() -> (String, MockBackend) {
    let mock = MockBackend::default();
    let app = Router::new()
        .route("/api/camera-detection/logs/pending-vehicle-type", get(pending_vehicle_type))
        .route("/api/camera-detection/logs/pending-exit", get(pending_exit))
        .route("/api/camera-detection/logs/latest", get(latest))
        .route(
            "/api/camera-detection/logs/:id/process-with-vehicle-type",
            post(vehicle_type_action),
        )
        .route("/api/camera-detection/logs/:id/process-exit", post(exit_action))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), mock)
}

fn client_for(base_url: &str, token: Option<&str>) -> ParkingApiClient {
    let config = BackendConfig {
        base_url: base_url.to_string(),
        api_token: token.map(str::to_string),
        ..BackendConfig::default()
    };
    ParkingApiClient::new(&config).unwrap()
}

#[tokio::test]
async fn pending_queue_parses_mixed_confidence_and_passthrough_fields() {
    let (base, mock) = spawn_backend().await;
    let client = client_for(&base, Some("s3cret"));

    let queue = client
        .pending_detections(QueueKind::VehicleType, Some(3))
        .await
        .unwrap();

    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].id, 101);
    assert_eq!(queue[0].global_confidence, Some(0.93));
    assert_eq!(queue[0].processing_status, ProcessingStatus::PendingVehicleType);
    assert_eq!(queue[0].extra_field("camera_name"), Some(&json!("Entry Cam 1")));
    assert_eq!(queue[1].global_confidence, Some(0.71));
    assert_eq!(queue[1].processing_status, ProcessingStatus::Unknown);

    let seen = mock.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1.as_deref(), Some("3"));
    assert_eq!(seen[0].2.as_deref(), Some("Bearer s3cret"));
}

#[tokio::test]
async fn server_error_carries_backend_detail() {
    let (base, _mock) = spawn_backend().await;
    let client = client_for(&base, None);

    let err = client.pending_detections(QueueKind::Exit, None).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.to_string(), "Server error: exit table locked");
}

#[tokio::test]
async fn unreachable_backend_is_an_http_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{addr}/api"), None);
    let err = client.pending_detections(QueueKind::Exit, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Http(_)), "got {err:?}");
}

#[tokio::test]
async fn vehicle_type_action_round_trip() {
    let (base, mock) = spawn_backend().await;
    let client = client_for(&base, None);

    let outcome = client.process_with_vehicle_type(101, 4).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.data["result"]["body_type_id"], 4);
    assert_eq!(mock.bodies.lock().unwrap()[0], json!({ "body_type_id": 4 }));

    let err = client.process_with_vehicle_type(999, 4).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref m) if m == "Detection already processed"));
}

#[tokio::test]
async fn exit_action_sends_only_set_fields() {
    let (base, mock) = spawn_backend().await;
    let client = client_for(&base, None);

    let request = ProcessExitRequest {
        payment_confirmed: Some(true),
        operator_name: Some("desk-2".to_string()),
        payment_method: None,
    };
    client.process_exit(102, &request).await.unwrap();
    assert_eq!(
        mock.bodies.lock().unwrap()[0],
        json!({ "payment_confirmed": true, "operator_name": "desk-2" })
    );
}

#[tokio::test]
async fn latest_detection_info_is_unwrapped() {
    let (base, _mock) = spawn_backend().await;
    let client = client_for(&base, None);

    let info = client.latest_detection_info(None).await.unwrap().unwrap();
    assert_eq!(info.latest_id, 102);
    assert_eq!(info.total_count, 2);
}

#[tokio::test]
async fn poller_over_http_surfaces_and_records_errors() {
    let (base, _mock) = spawn_backend().await;
    let client = Arc::new(client_for(&base, None));
    let (_visibility, observer) = visibility_channel();
    let cancel = CancellationToken::new();

    let (entry, _) = DetectionPoller::new(
        QueueKind::VehicleType,
        client.clone(),
        PollerSettings::default(),
        observer.clone(),
    )
    .spawn(cancel.clone());
    let (exit, _) = DetectionPoller::new(QueueKind::Exit, client, PollerSettings::default(), observer)
        .spawn(cancel.clone());

    let mut entry_rx = entry.subscribe();
    let snap = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        entry_rx.wait_for(|s| s.latest_detection.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snap.latest_detection.map(|d| d.id), Some(101));

    let mut exit_rx = exit.subscribe();
    let snap = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        exit_rx.wait_for(|s| s.error.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snap.error.as_deref(), Some("Server error: exit table locked"));
    assert!(snap.latest_detection.is_none());

    cancel.cancel();
}
