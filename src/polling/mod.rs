//! Detection polling: adaptive cadence, reconciliation and the poller task.

pub mod adaptive;
mod poller;
pub mod reconcile;
mod source;

pub use adaptive::{AdaptivePolling, AdaptiveSettings, FixedHour, LocalClock, PollingState, WallClock};
pub use poller::{DetectionPoller, PollerClosed, PollerHandle, PollerSettings};
pub use reconcile::{Reconciler, Reconciliation};
pub use source::{DetectionListener, LogListener, QueueSource};
