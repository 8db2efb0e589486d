//! API route definitions
//!
//! - /health - liveness and watched queues
//! - /api/v1/queues - poller snapshots and control
//! - /api/v1/visibility - console visibility reports
//! - /api/v1/detections - operator actions forwarded to the backend

use axum::{routing::{get, post}, Router};

use super::handlers::{self, OperatorState};

/// Create all operator API routes
pub fn api_routes(state: OperatorState) -> Router {
    Router::new()
        // Queues
        .route("/queues", get(handlers::list_queues))
        .route("/queues/:kind", get(handlers::get_queue))
        .route("/queues/:kind/fetch", post(handlers::fetch_queue))
        .route("/queues/:kind/clear", post(handlers::clear_queue))
        .route("/queues/:kind/enabled", post(handlers::set_queue_enabled))
        .route("/queues/:kind/activity", post(handlers::queue_activity))
        // Visibility
        .route(
            "/visibility",
            get(handlers::get_visibility).post(handlers::report_visibility),
        )
        // Detection actions (latest before parameterized routes)
        .route("/detections/latest", get(handlers::latest_detection))
        .route("/detections/:id/vehicle-type", post(handlers::process_vehicle_type))
        .route("/detections/:id/exit", post(handlers::process_exit))
        .with_state(state)
}

/// Health endpoint at root level
pub fn health_routes(state: OperatorState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::{DetectionPoller, PollerSettings, QueueSource};
    use crate::client::ClientError;
    use crate::types::{detection_stub, Detection, QueueKind};
    use crate::visibility::visibility_channel;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    struct OneEntry;

    #[async_trait]
    impl QueueSource for OneEntry {
        async fn fetch_pending(
            &self,
            kind: QueueKind,
            _gate_id: Option<i64>,
        ) -> Result<Vec<Detection>, ClientError> {
            Ok(vec![detection_stub(55, "KA01", kind.expected_status())])
        }

        fn source_name(&self) -> &str {
            "one-entry"
        }
    }

    fn create_test_state(cancel: &CancellationToken) -> OperatorState {
        let (visibility, observer) = visibility_channel();
        let (poller, _join) = DetectionPoller::new(
            QueueKind::Exit,
            Arc::new(OneEntry),
            PollerSettings::default(),
            observer,
        )
        .spawn(cancel.clone());
        OperatorState::new([poller], visibility, None, None)
    }

    fn app(state: OperatorState) -> Router {
        Router::new()
            .nest("/api/v1", api_routes(state.clone()))
            .merge(health_routes(state))
    }

    async fn json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_lists_watched_queues() {
        let cancel = CancellationToken::new();
        let resp = app(create_test_state(&cancel))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json(resp).await;
        assert_eq!(v["data"]["status"], "ok");
        assert_eq!(v["data"]["queues"], serde_json::json!(["exit"]));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unwatched_queue_is_not_found() {
        let cancel = CancellationToken::new();
        let resp = app(create_test_state(&cancel))
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queues/vehicle-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unknown_queue_is_not_found() {
        let cancel = CancellationToken::new();
        let resp = app(create_test_state(&cancel))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/queues/entry/fetch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_visibility_report() {
        let cancel = CancellationToken::new();
        let state = create_test_state(&cancel);
        let resp = app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/visibility")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"event":"hidden"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["data"]["visible"], false);
        assert!(!state.visibility.is_visible());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_actions_without_backend_unavailable() {
        let cancel = CancellationToken::new();
        let resp = app(create_test_state(&cancel))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/detections/55/exit")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        cancel.cancel();
    }
}
