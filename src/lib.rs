//! parking-watch: detection reconciliation and adaptive polling for parking
//! operator consoles.
//!
//! ## Architecture
//!
//! - **Visibility Observer**: tracks whether the operator console is in the foreground
//! - **Adaptive Interval Calculator**: fast / normal / slow cadence from activity and time of day
//! - **Detection Queue Poller**: one task per queue, fetches the pending list from the backend
//! - **Reconciliation State Machine**: surfaces each queued detection exactly once

pub mod api;
pub mod client;
pub mod config;
pub mod polling;
pub mod types;
pub mod visibility;

// Re-export configuration
pub use config::{ConfigError, WatchConfig};

// Re-export commonly used types
pub use types::{Detection, PollingSpeed, ProcessingStatus, QueueKind, QueueSnapshot};

// Re-export the polling core
pub use polling::{
    DetectionListener, DetectionPoller, PollerHandle, PollerSettings, QueueSource, Reconciler,
    Reconciliation,
};

// Re-export the backend client
pub use client::{ClientError, ParkingApiClient};

pub use visibility::{visibility_channel, VisibilityEvent, VisibilityHandle, VisibilityObserver};
