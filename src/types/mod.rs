//! Shared data structures for detection reconciliation
//!
//! - Detection: one camera plate read, as the backend reports it
//! - QueueKind / PollingSpeed: which queue, how fast
//! - QueueSnapshot: the caller-facing view of one poller
//! - Envelope and request/response bodies of the parking REST API

mod detection;
mod queue;

pub use detection::*;
pub use queue::*;
