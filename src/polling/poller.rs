//! Detection Queue Poller
//!
//! One task per watched queue. The task owns the Reconciler, the adaptive
//! interval state and at most one in-flight fetch, and publishes a
//! [`QueueSnapshot`] on a watch channel after every state change.
//!
//! ```text
//!   commands ──┐
//!   visibility ┼──▶ select! loop ──▶ fetch ──▶ Reconciler ──▶ listener
//!   timers ────┘                         │
//!                                        └──▶ watch<QueueSnapshot>
//! ```
//!
//! A poller only issues requests while it is enabled and the console is
//! visible. A newer fetch always supersedes (drops) the one in flight, so
//! stale responses never reach the reconciler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::adaptive::{duration_ms, AdaptivePolling, AdaptiveSettings, LocalClock, WallClock};
use super::reconcile::{Reconciler, Reconciliation};
use super::source::{DetectionListener, LogListener, QueueSource};
use crate::client::ClientError;
use crate::config::PollingConfig;
use crate::types::{Detection, PollingSpeed, QueueKind, QueueSnapshot};
use crate::visibility::VisibilityObserver;

/// Per-poller tuning, derived from [`PollingConfig`].
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub enabled: bool,
    pub use_adaptive: bool,
    /// Fixed tick when adaptive mode is off
    pub poll_interval: Duration,
    pub clear_refetch_delay: Duration,
    pub recheck_interval: Duration,
    pub gate_id: Option<i64>,
    pub adaptive: AdaptiveSettings,
}

impl PollerSettings {
    pub fn from_config(polling: &PollingConfig, gate_id: Option<i64>) -> Self {
        Self {
            enabled: polling.enabled,
            use_adaptive: polling.use_adaptive,
            poll_interval: Duration::from_millis(polling.poll_interval_ms),
            clear_refetch_delay: Duration::from_millis(polling.clear_refetch_delay_ms),
            recheck_interval: Duration::from_secs(polling.recheck_interval_secs.max(1)),
            gate_id,
            adaptive: AdaptiveSettings::from(polling),
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default(), None)
    }
}

#[derive(Debug)]
enum PollerCommand {
    FetchNow,
    ClearLatest,
    SetEnabled(bool),
    SignalActivity,
}

/// The poller task has exited.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{0} poller has stopped")]
pub struct PollerClosed(pub QueueKind);

/// Caller side of a running poller. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    kind: QueueKind,
    commands: mpsc::UnboundedSender<PollerCommand>,
    snapshot: watch::Receiver<QueueSnapshot>,
}

impl PollerHandle {
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Current state of the queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot.clone()
    }

    /// Fetch immediately, superseding any fetch in flight.
    ///
    /// Ignored while the console is hidden or the poller is disabled.
    pub fn fetch_now(&self) -> Result<(), PollerClosed> {
        self.send(PollerCommand::FetchNow)
    }

    /// The operator is done with the surfaced detection.
    ///
    /// Frees it from the Shown-Set and schedules a follow-up fetch shortly
    /// after, so the next queued entry surfaces without waiting a full tick.
    pub fn clear_latest_detection(&self) -> Result<(), PollerClosed> {
        self.send(PollerCommand::ClearLatest)
    }

    /// Turn polling on or off. Turning it on fetches immediately.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), PollerClosed> {
        self.send(PollerCommand::SetEnabled(enabled))
    }

    /// Operator activity: switch to the fast interval for the boost window.
    pub fn signal_activity(&self) -> Result<(), PollerClosed> {
        self.send(PollerCommand::SignalActivity)
    }

    fn send(&self, cmd: PollerCommand) -> Result<(), PollerClosed> {
        self.commands.send(cmd).map_err(|_| PollerClosed(self.kind))
    }
}

/// Builder for one queue poller.
pub struct DetectionPoller {
    kind: QueueKind,
    source: Arc<dyn QueueSource>,
    settings: PollerSettings,
    visibility: VisibilityObserver,
    listener: Arc<dyn DetectionListener>,
    clock: Arc<dyn WallClock>,
}

impl DetectionPoller {
    pub fn new(
        kind: QueueKind,
        source: Arc<dyn QueueSource>,
        settings: PollerSettings,
        visibility: VisibilityObserver,
    ) -> Self {
        Self {
            kind,
            source,
            settings,
            visibility,
            listener: Arc::new(LogListener),
            clock: Arc::new(LocalClock),
        }
    }

    /// Replace the default logging listener.
    pub fn with_listener(mut self, listener: impl DetectionListener + 'static) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    /// Replace the local-time clock used for peak hours.
    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the poller task. It runs until `cancel` fires or every
    /// [`PollerHandle`] is dropped.
    pub fn spawn(self, cancel: CancellationToken) -> (PollerHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = PollerTask::new(self, cancel);
        let handle = PollerHandle {
            kind: task.kind,
            commands: cmd_tx,
            snapshot: task.snapshot_tx.subscribe(),
        };
        let join = tokio::spawn(task.run(cmd_rx));
        (handle, join)
    }
}

type FetchFuture = BoxFuture<'static, Result<Vec<Detection>, ClientError>>;

struct InFlight {
    token: CancellationToken,
    fut: FetchFuture,
}

struct PollerTask {
    kind: QueueKind,
    source: Arc<dyn QueueSource>,
    settings: PollerSettings,
    listener: Arc<dyn DetectionListener>,
    visibility: VisibilityObserver,
    visibility_open: bool,
    reconciler: Reconciler,
    /// `None` when adaptive mode is off
    adaptive: Option<AdaptivePolling>,
    enabled: bool,
    visible: bool,
    next_tick: Option<Instant>,
    refetch_at: Option<Instant>,
    in_flight: Option<InFlight>,
    snapshot: QueueSnapshot,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    cancel: CancellationToken,
}

impl PollerTask {
    fn new(poller: DetectionPoller, cancel: CancellationToken) -> Self {
        let DetectionPoller {
            kind,
            source,
            settings,
            visibility,
            listener,
            clock,
        } = poller;

        let adaptive = settings
            .use_adaptive
            .then(|| AdaptivePolling::new(settings.adaptive.clone(), clock));
        let enabled = settings.enabled;
        let visible = visibility.is_visible();

        let mut snapshot = QueueSnapshot::new(kind, enabled, visible);
        let (interval, speed) = match &adaptive {
            Some(a) => (a.state().interval, a.state().speed),
            None => (settings.poll_interval, PollingSpeed::Normal),
        };
        snapshot.interval_ms = duration_ms(interval);
        snapshot.polling_speed = speed;
        let (snapshot_tx, _) = watch::channel(snapshot.clone());

        Self {
            kind,
            source,
            settings,
            listener,
            visibility,
            visibility_open: true,
            reconciler: Reconciler::new(),
            adaptive,
            enabled,
            visible,
            next_tick: None,
            refetch_at: None,
            in_flight: None,
            snapshot,
            snapshot_tx,
            cancel,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PollerCommand>) {
        info!(
            queue = %self.kind,
            source = self.source.source_name(),
            adaptive = self.adaptive.is_some(),
            enabled = self.enabled,
            visible = self.visible,
            "✓ Poller started"
        );

        if self.is_active() {
            self.activate();
        }

        let period = self.settings.recheck_interval;
        let mut recheck = tokio::time::interval_at(Instant::now() + period, period);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let boost_expiry = self.adaptive.as_ref().and_then(AdaptivePolling::boost_expiry);

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!(queue = %self.kind, "All poller handles dropped");
                        break;
                    }
                },

                changed = self.visibility.changed(), if self.visibility_open => {
                    self.on_visibility(changed);
                }

                result = wait_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.on_fetch_result(result);
                }

                () = sleep_until_opt(self.next_tick) => self.on_tick(),

                () = sleep_until_opt(self.refetch_at) => {
                    self.refetch_at = None;
                    self.start_fetch("refetch after clear");
                }

                () = sleep_until_opt(boost_expiry) => self.on_boost_expired(),

                _ = recheck.tick() => self.on_recheck(),
            }
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
        self.next_tick = None;
        self.refetch_at = None;
        self.snapshot.loading = false;
        self.publish();
        info!(queue = %self.kind, "Poller stopped");
    }

    fn is_active(&self) -> bool {
        self.enabled && self.visible
    }

    fn interval(&self) -> Duration {
        self.adaptive
            .as_ref()
            .map_or(self.settings.poll_interval, |a| a.state().interval)
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    /// Fetch now and start the tick timer.
    fn activate(&mut self) {
        self.start_fetch("activated");
        self.schedule_tick();
    }

    /// Stop timers. A fetch already in flight may still complete.
    fn deactivate(&mut self) {
        self.next_tick = None;
        self.refetch_at = None;
    }

    fn schedule_tick(&mut self) {
        self.next_tick = Some(Instant::now() + self.interval());
    }

    fn on_tick(&mut self) {
        self.start_fetch("tick");
        self.schedule_tick();
    }

    fn start_fetch(&mut self, reason: &'static str) {
        if !self.is_active() {
            trace!(queue = %self.kind, reason, "Fetch skipped, poller inactive");
            return;
        }

        if let Some(previous) = self.in_flight.take() {
            debug!(queue = %self.kind, reason, "Superseding in-flight fetch");
            previous.token.cancel();
        }

        let token = self.cancel.child_token();
        let fut = cancellable_fetch(
            Arc::clone(&self.source),
            self.kind,
            self.settings.gate_id,
            token.clone(),
        )
        .boxed();
        self.in_flight = Some(InFlight { token, fut });

        trace!(queue = %self.kind, reason, "Fetching pending queue");
        if !self.snapshot.loading {
            self.snapshot.loading = true;
            self.publish();
        }
    }

    fn on_fetch_result(&mut self, result: Result<Vec<Detection>, ClientError>) {
        self.snapshot.loading = false;

        match result {
            Ok(queue) => {
                let outcome = self.reconciler.reconcile(&queue);
                self.snapshot.pending_detections = queue;
                self.snapshot.latest_detection = self.reconciler.latest().cloned();
                self.snapshot.error = None;
                self.snapshot.last_fetched_at = Some(Utc::now());
                self.handle_reconciliation(outcome);
            }
            Err(e) if e.is_cancelled() => {
                debug!(queue = %self.kind, "Fetch cancelled");
            }
            Err(e) => {
                warn!(queue = %self.kind, error = %e, "Pending queue fetch failed, retrying on next tick");
                self.snapshot.error = Some(e.to_string());
            }
        }

        self.publish();
    }

    fn handle_reconciliation(&mut self, outcome: Reconciliation) {
        match outcome {
            Reconciliation::Surfaced { detection, released } => {
                if let Some(id) = released {
                    debug!(queue = %self.kind, id, "Shown detection left the queue");
                }
                info!(
                    queue = %self.kind,
                    id = detection.id,
                    plate = %detection.plate(),
                    pending = self.snapshot.pending_detections.len(),
                    "New detection surfaced"
                );
                self.publish();
                self.listener.on_new_detection(self.kind, &detection);
                self.signal_activity();
            }
            Reconciliation::Released(id) => {
                debug!(queue = %self.kind, id, "Shown detection left the queue");
            }
            Reconciliation::Drained => {
                trace!(queue = %self.kind, "Queue empty");
            }
            Reconciliation::Kept(id) => {
                trace!(queue = %self.kind, id, "Still showing");
            }
            Reconciliation::Unchanged => {}
        }
    }

    fn handle_command(&mut self, cmd: PollerCommand) {
        match cmd {
            PollerCommand::FetchNow => self.start_fetch("manual"),
            PollerCommand::ClearLatest => {
                if let Some(id) = self.reconciler.clear_latest() {
                    info!(queue = %self.kind, id, "Detection cleared");
                }
                self.snapshot.latest_detection = None;
                self.publish();
                if self.is_active() {
                    self.refetch_at = Some(Instant::now() + self.settings.clear_refetch_delay);
                }
            }
            PollerCommand::SetEnabled(enabled) => {
                if enabled == self.enabled {
                    return;
                }
                self.enabled = enabled;
                self.snapshot.enabled = enabled;
                info!(queue = %self.kind, enabled, "Polling toggled");
                self.on_activity_changed();
            }
            PollerCommand::SignalActivity => self.signal_activity(),
        }
    }

    fn on_visibility(&mut self, changed: Option<bool>) {
        let Some(visible) = changed else {
            debug!(queue = %self.kind, "Visibility source closed, keeping last value");
            self.visibility_open = false;
            return;
        };
        if visible == self.visible {
            return;
        }
        self.visible = visible;
        self.snapshot.visible = visible;
        debug!(queue = %self.kind, visible, "Visibility changed");
        self.on_activity_changed();
    }

    fn on_activity_changed(&mut self) {
        if self.is_active() {
            self.activate();
        } else {
            self.deactivate();
        }
        self.publish();
    }

    fn signal_activity(&mut self) {
        let Some(adaptive) = self.adaptive.as_mut() else {
            return;
        };
        if adaptive.signal_activity(Instant::now()) {
            self.on_interval_changed();
        }
    }

    fn on_boost_expired(&mut self) {
        let Some(adaptive) = self.adaptive.as_mut() else {
            return;
        };
        if adaptive.expire_boost(Instant::now()) {
            self.on_interval_changed();
        }
    }

    fn on_recheck(&mut self) {
        let Some(adaptive) = self.adaptive.as_mut() else {
            return;
        };
        if adaptive.recheck(Instant::now()) {
            self.on_interval_changed();
        }
    }

    /// Re-arm the tick at the new interval.
    fn on_interval_changed(&mut self) {
        let Some(state) = self.adaptive.as_ref().map(AdaptivePolling::state) else {
            return;
        };
        info!(
            queue = %self.kind,
            speed = %state.speed,
            interval_ms = duration_ms(state.interval),
            "Polling speed adjusted"
        );
        self.snapshot.polling_speed = state.speed;
        self.snapshot.interval_ms = duration_ms(state.interval);
        if self.next_tick.is_some() {
            self.schedule_tick();
        }
        self.publish();
    }
}

async fn cancellable_fetch(
    source: Arc<dyn QueueSource>,
    kind: QueueKind,
    gate_id: Option<i64>,
    token: CancellationToken,
) -> Result<Vec<Detection>, ClientError> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(ClientError::Cancelled),
        result = source.fetch_pending(kind, gate_id) => result,
    }
}

async fn wait_in_flight(
    in_flight: &mut Option<InFlight>,
) -> Result<Vec<Detection>, ClientError> {
    match in_flight {
        Some(f) => (&mut f.fut).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
