//! Reconciliation State Machine
//!
//! The backend re-sends the whole pending queue on every poll and never marks
//! entries as delivered. The reconciler keeps the Shown-Set (ids already put
//! in front of the operator) and decides per poll whether to surface a new
//! detection, keep the current one, or drop it.
//!
//! States are `idle` and `showing(id)`. `showing(id)` holds for as long as
//! `id` is still queued; the next unseen entry, in queue order, is surfaced
//! once the operator clears the current one or it leaves the queue.

use std::collections::HashSet;

use crate::types::Detection;

/// Outcome of reconciling one fetched queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Surface this detection to the operator. `released` is the id that was
    /// shown before and has left the queue, if any.
    Surfaced {
        detection: Detection,
        released: Option<i64>,
    },
    /// The shown detection is still queued.
    Kept(i64),
    /// The shown detection left the queue and nothing unseen remains.
    Released(i64),
    /// The queue is empty; every prior detection counts as processed.
    Drained,
    /// Idle, and every queued entry was already shown.
    Unchanged,
}

/// Per-queue Shown-Set plus the currently shown detection.
#[derive(Debug, Default)]
pub struct Reconciler {
    shown: HashSet<i64>,
    current: Option<Detection>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detection currently surfaced, if any.
    pub fn latest(&self) -> Option<&Detection> {
        self.current.as_ref()
    }

    pub fn showing_id(&self) -> Option<i64> {
        self.current.as_ref().map(|d| d.id)
    }

    pub fn is_shown(&self, id: i64) -> bool {
        self.shown.contains(&id)
    }

    pub fn shown_count(&self) -> usize {
        self.shown.len()
    }

    /// Apply a freshly fetched queue (oldest first).
    pub fn reconcile(&mut self, queue: &[Detection]) -> Reconciliation {
        if queue.is_empty() {
            self.shown.clear();
            self.current = None;
            return Reconciliation::Drained;
        }

        // A shown detection stays up until it leaves the queue.
        let mut released = None;
        if let Some(id) = self.showing_id() {
            if queue.iter().any(|d| d.id == id) {
                return Reconciliation::Kept(id);
            }
            self.shown.remove(&id);
            self.current = None;
            released = Some(id);
        }

        match queue.iter().find(|d| !self.shown.contains(&d.id)) {
            Some(next) => {
                // Record before the caller is notified so a re-poll racing
                // the notification cannot surface the same id twice.
                self.shown.insert(next.id);
                self.current = Some(next.clone());
                Reconciliation::Surfaced {
                    detection: next.clone(),
                    released,
                }
            }
            None => match released {
                Some(id) => Reconciliation::Released(id),
                None => Reconciliation::Unchanged,
            },
        }
    }

    /// The caller finished with the shown detection.
    ///
    /// Frees its id so it can be surfaced again if the backend still queues
    /// it on the next fetch. Returns the cleared id.
    pub fn clear_latest(&mut self) -> Option<i64> {
        let id = self.current.take()?.id;
        self.shown.remove(&id);
        Some(id)
    }
}
