//! Queue source abstraction.
//!
//! The poller only needs "give me the current pending queue". The production
//! implementation is [`crate::client::ParkingApiClient`]; tests plug in
//! scripted sources.

use async_trait::async_trait;

use crate::client::ClientError;
use crate::types::{Detection, QueueKind};

/// Where pending queues come from.
///
/// Implementations must be cancel-safe: the poller drops an in-flight
/// `fetch_pending` future when a newer tick supersedes it.
#[async_trait]
pub trait QueueSource: Send + Sync + 'static {
    /// Fetch the full pending queue for `kind`, oldest first.
    async fn fetch_pending(
        &self,
        kind: QueueKind,
        gate_id: Option<i64>,
    ) -> Result<Vec<Detection>, ClientError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// Notified when a poller surfaces a new detection.
pub trait DetectionListener: Send + Sync {
    fn on_new_detection(&self, kind: QueueKind, detection: &Detection);
}

impl<F> DetectionListener for F
where
    F: Fn(QueueKind, &Detection) + Send + Sync,
{
    fn on_new_detection(&self, kind: QueueKind, detection: &Detection) {
        self(kind, detection);
    }
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl DetectionListener for LogListener {
    fn on_new_detection(&self, kind: QueueKind, detection: &Detection) {
        tracing::info!(
            queue = %kind,
            id = detection.id,
            plate = %detection.plate(),
            gate = ?detection.gate_id,
            confidence = ?detection.global_confidence,
            "🚗 Detection awaiting operator"
        );
    }
}
