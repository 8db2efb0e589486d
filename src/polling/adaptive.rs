//! Adaptive Interval Calculator
//!
//! Picks the poll interval from recent activity and the time of day:
//!
//! 1. activity within the boost window -> fast
//! 2. local hour inside a peak window   -> normal
//! 3. otherwise                         -> slow
//!
//! Time is passed in explicitly (`tokio::time::Instant` for the boost, a
//! [`WallClock`] for the hour) so the calculator is a pure function of its
//! inputs and runs under tokio's paused test clock.

use chrono::Timelike;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{PeakWindow, PollingConfig};
use crate::types::PollingSpeed;

/// Source of the local wall-clock hour.
pub trait WallClock: Send + Sync {
    /// Current local hour, 0-23.
    fn current_hour(&self) -> u32;
}

/// The machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn current_hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// Always reports the same hour.
#[derive(Debug, Clone, Copy)]
pub struct FixedHour(pub u32);

impl WallClock for FixedHour {
    fn current_hour(&self) -> u32 {
        self.0
    }
}

/// Interval tiers and boost length.
#[derive(Debug, Clone)]
pub struct AdaptiveSettings {
    pub fast: Duration,
    pub normal: Duration,
    pub slow: Duration,
    pub activity_boost: Duration,
    pub peak_hours: Vec<PeakWindow>,
}

impl From<&PollingConfig> for AdaptiveSettings {
    fn from(p: &PollingConfig) -> Self {
        Self {
            fast: Duration::from_millis(p.fast_interval_ms),
            normal: Duration::from_millis(p.normal_interval_ms),
            slow: Duration::from_millis(p.slow_interval_ms),
            activity_boost: Duration::from_millis(p.activity_boost_ms),
            peak_hours: p.peak_hours.clone(),
        }
    }
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

/// Interval and its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingState {
    pub interval: Duration,
    pub speed: PollingSpeed,
}

/// Activity-aware interval tracker.
pub struct AdaptivePolling {
    settings: AdaptiveSettings,
    clock: Arc<dyn WallClock>,
    last_activity: Option<Instant>,
    /// Armed by `signal_activity`, disarmed once handled.
    boost_expiry: Option<Instant>,
    state: PollingState,
}

impl AdaptivePolling {
    pub fn new(settings: AdaptiveSettings, clock: Arc<dyn WallClock>) -> Self {
        let mut polling = Self {
            state: PollingState {
                interval: settings.normal,
                speed: PollingSpeed::Normal,
            },
            settings,
            clock,
            last_activity: None,
            boost_expiry: None,
        };
        polling.state = polling.calculate(Instant::now());
        polling
    }

    pub fn state(&self) -> PollingState {
        self.state
    }

    /// When the current boost runs out, if one is pending.
    pub fn boost_expiry(&self) -> Option<Instant> {
        self.boost_expiry
    }

    /// Whether `hour` is inside any configured peak window.
    pub fn is_peak_hour(&self, hour: u32) -> bool {
        self.settings.peak_hours.iter().any(|w| w.contains(hour))
    }

    /// Interval for the given moment, without touching state.
    pub fn calculate(&self, now: Instant) -> PollingState {
        let boosted = self
            .last_activity
            .is_some_and(|at| now.saturating_duration_since(at) < self.settings.activity_boost);

        if boosted {
            PollingState {
                interval: self.settings.fast,
                speed: PollingSpeed::Fast,
            }
        } else if self.is_peak_hour(self.clock.current_hour()) {
            PollingState {
                interval: self.settings.normal,
                speed: PollingSpeed::Normal,
            }
        } else {
            PollingState {
                interval: self.settings.slow,
                speed: PollingSpeed::Slow,
            }
        }
    }

    /// Mark `now` as activity, switch to fast and arm the boost expiry.
    ///
    /// Returns true when the state changed.
    pub fn signal_activity(&mut self, now: Instant) -> bool {
        self.last_activity = Some(now);
        self.boost_expiry = Some(now + self.settings.activity_boost);
        self.apply(now)
    }

    /// Handle the boost expiry timer. Returns true when the state changed.
    pub fn expire_boost(&mut self, now: Instant) -> bool {
        self.boost_expiry = None;
        self.apply(now)
    }

    /// Periodic re-check. Leaves a running boost alone.
    pub fn recheck(&mut self, now: Instant) -> bool {
        let in_boost = self
            .last_activity
            .is_some_and(|at| now.saturating_duration_since(at) < self.settings.activity_boost);
        if in_boost {
            return false;
        }
        self.apply(now)
    }

    fn apply(&mut self, now: Instant) -> bool {
        let next = self.calculate(now);
        let changed = next != self.state;
        if changed {
            tracing::debug!(
                from = %self.state.speed,
                to = %next.speed,
                interval_ms = duration_ms(next.interval),
                "Polling speed changed"
            );
        }
        self.state = next;
        changed
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
