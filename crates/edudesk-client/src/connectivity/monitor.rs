//! Connectivity monitor service.
//!
//! Owns the debounced state machine, schedules probes, folds in platform
//! network signals and publishes the result through a watch channel plus an
//! event broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::MonitorConfig;
use crate::connectivity::events::{ConnectivityEvent, ConnectivityEventBroadcaster};
use crate::connectivity::probe::ReachabilityProbe;
use crate::connectivity::state::{ConnectivityState, LinkState};

/// Hints delivered by the embedding platform.
///
/// Signals are advisory in the online direction and authoritative in the
/// offline direction: a platform claiming the link is up merely triggers a
/// probe, while a platform reporting it down flips the state immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSignal {
    /// The platform believes the link came up.
    Online,
    /// The platform reports the link down.
    Offline,
    /// The app moved between foreground and background.
    Visibility { visible: bool },
}

/// The connectivity monitor.
///
/// Construct once, share via `Arc`, and drive with [`ConnectivityMonitor::run`]
/// in a dedicated task. State reads and manual probes work from any task.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    config: MonitorConfig,
    state: std::sync::Mutex<ConnectivityState>,
    /// Set while a probe is running; later triggers are dropped, not queued.
    probe_in_flight: AtomicBool,
    watch_tx: watch::Sender<LinkState>,
    events: ConnectivityEventBroadcaster,
}

impl ConnectivityMonitor {
    /// Create a monitor in the optimistic online state.
    pub fn new(probe: Arc<dyn ReachabilityProbe>, config: MonitorConfig) -> Self {
        let state = ConnectivityState::new(config.failure_threshold, config.success_threshold);
        let (watch_tx, _) = watch::channel(state.state());
        Self {
            probe,
            config,
            state: std::sync::Mutex::new(state),
            probe_in_flight: AtomicBool::new(false),
            watch_tx,
            events: ConnectivityEventBroadcaster::default(),
        }
    }

    /// The current debounced link state.
    pub fn current(&self) -> LinkState {
        *self.watch_tx.borrow()
    }

    /// Watch the link state. The receiver always holds the latest value.
    pub fn watch(&self) -> watch::Receiver<LinkState> {
        self.watch_tx.subscribe()
    }

    /// Subscribe to connectivity events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Run one probe and fold the result into the state.
    ///
    /// Single-flight: while a probe is outstanding, further triggers return
    /// the current cached state without a second network call. The UI retry
    /// action maps onto this, so repeated clicks cannot storm the backend.
    pub async fn check_now(&self) -> LinkState {
        if self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("probe already in flight, trigger dropped");
            return self.current();
        }

        let success = match self.probe.probe().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "probe failed");
                false
            }
        };
        self.probe_in_flight.store(false, Ordering::SeqCst);

        self.events.probe_completed(success);
        if let Some(to) = self.with_state(|s| s.record(success)) {
            self.publish(to);
        }
        self.current()
    }

    /// Flip to offline immediately on an authoritative platform signal.
    pub fn force_offline(&self) {
        if let Some(to) = self.with_state(ConnectivityState::force_offline) {
            self.publish(to);
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ConnectivityState) -> R) -> R {
        // The state machine cannot panic mid-update, so a poisoned lock still
        // holds consistent data.
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn publish(&self, to: LinkState) {
        let from = *self.watch_tx.borrow();
        info!(%from, %to, "link state changed");
        self.watch_tx.send_replace(to);
        self.events.state_changed(from, to);
    }

    /// Drive the monitor until the token is cancelled.
    ///
    /// Scheduled probes fire on the configured interval only while visible;
    /// signal-triggered probes fire regardless, since a platform hint is
    /// worth acting on even in the background.
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<NetworkSignal>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately and doubles as the startup probe.
        let mut visible = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("connectivity monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    if visible {
                        self.check_now().await;
                    } else {
                        debug!("app hidden, scheduled probe skipped");
                    }
                }
                signal = signals.recv() => {
                    match signal {
                        Some(NetworkSignal::Online) => {
                            debug!("platform reports link up, probing to confirm");
                            self.check_now().await;
                        }
                        Some(NetworkSignal::Offline) => {
                            debug!("platform reports link down");
                            self.force_offline();
                        }
                        Some(NetworkSignal::Visibility { visible: v }) => {
                            visible = v;
                            if visible {
                                debug!("app visible again, probing immediately");
                                self.check_now().await;
                            }
                        }
                        None => {
                            debug!("signal channel closed");
                            // Keep probing on the interval; only cancellation
                            // stops the monitor.
                        }
                    }
                }
            }
        }
    }
}
