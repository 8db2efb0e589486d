//! Visibility Observer: is the operator console in the foreground?
//!
//! The host (the console, through the operator API) reports page visibility
//! changes and window focus/blur. The most recent signal wins. Pollers read
//! the flag and stop issuing requests while it is false, which is the only
//! backpressure keeping background consoles off the backend.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Host signal that changes visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityEvent {
    /// Page became visible.
    Shown,
    /// Page was hidden (tab switched, minimized).
    Hidden,
    /// Window gained focus.
    Focus,
    /// Window lost focus.
    Blur,
}

impl VisibilityEvent {
    fn visible(self) -> bool {
        matches!(self, VisibilityEvent::Shown | VisibilityEvent::Focus)
    }
}

/// Publishing side, owned by whatever receives host signals.
#[derive(Debug, Clone)]
pub struct VisibilityHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

/// Reading side, one per poller.
#[derive(Debug, Clone)]
pub struct VisibilityObserver {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/observer pair. Starts visible.
pub fn visibility_channel() -> (VisibilityHandle, VisibilityObserver) {
    let (tx, rx) = watch::channel(true);
    (
        VisibilityHandle {
            tx: std::sync::Arc::new(tx),
        },
        VisibilityObserver { rx },
    )
}

impl VisibilityHandle {
    /// Apply a host signal. Returns the resulting visibility.
    pub fn report(&self, event: VisibilityEvent) -> bool {
        let visible = event.visible();
        let changed = self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
        if changed {
            tracing::debug!(?event, visible, "Visibility changed");
        }
        visible
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// New observer tracking this handle.
    pub fn observer(&self) -> VisibilityObserver {
        VisibilityObserver {
            rx: self.tx.subscribe(),
        }
    }
}

impl VisibilityObserver {
    pub fn is_visible(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the next visibility flip and return the new value.
    ///
    /// Returns `None` once every handle is gone; the value is then frozen.
    pub async fn changed(&mut self) -> Option<bool> {
        match self.rx.changed().await {
            Ok(()) => Some(*self.rx.borrow_and_update()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_visible() {
        let (handle, observer) = visibility_channel();
        assert!(handle.is_visible());
        assert!(observer.is_visible());
    }

    #[test]
    fn last_signal_wins() {
        let (handle, observer) = visibility_channel();
        handle.report(VisibilityEvent::Hidden);
        assert!(!observer.is_visible());
        handle.report(VisibilityEvent::Focus);
        assert!(observer.is_visible());
        handle.report(VisibilityEvent::Blur);
        assert!(!observer.is_visible());
        handle.report(VisibilityEvent::Shown);
        assert!(observer.is_visible());
    }

    #[tokio::test]
    async fn changed_fires_only_on_flip() {
        let (handle, mut observer) = visibility_channel();
        handle.report(VisibilityEvent::Focus); // already visible, no flip
        handle.report(VisibilityEvent::Hidden);
        assert_eq!(observer.changed().await, Some(false));
    }

    #[tokio::test]
    async fn changed_ends_when_handles_drop() {
        let (handle, mut observer) = visibility_channel();
        drop(handle);
        assert_eq!(observer.changed().await, None);
    }

    #[test]
    fn events_parse_lowercase() {
        let e: VisibilityEvent = serde_json::from_str("\"blur\"").unwrap();
        assert_eq!(e, VisibilityEvent::Blur);
    }
}
