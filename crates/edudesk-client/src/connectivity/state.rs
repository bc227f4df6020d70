//! Debounced link state machine.
//!
//! Pure data; all I/O lives in the monitor. Transitions need a run of
//! consecutive probe results in the same direction, so one dropped packet or
//! one lucky probe cannot flap the published state.

use serde::{Deserialize, Serialize};

/// Connectivity as presented to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// The backend answered recently; requests are expected to succeed.
    Online,
    /// Consecutive probes failed or the platform reported the link down.
    Offline,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Hysteresis counters around a [`LinkState`].
#[derive(Debug)]
pub struct ConnectivityState {
    state: LinkState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    failure_threshold: u32,
    success_threshold: u32,
}

impl ConnectivityState {
    /// Create a state machine starting optimistically online.
    ///
    /// Thresholds of zero are clamped to one so a transition always needs at
    /// least one probe result.
    pub fn new(failure_threshold: u32, success_threshold: u32) -> Self {
        Self {
            state: LinkState::Online,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
        }
    }

    /// The current debounced state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Record one probe result. Returns the new state if it changed.
    pub fn record(&mut self, success: bool) -> Option<LinkState> {
        if success {
            self.record_success()
        } else {
            self.record_failure()
        }
    }

    fn record_success(&mut self) -> Option<LinkState> {
        self.consecutive_failures = 0;
        match self.state {
            LinkState::Online => None,
            LinkState::Offline => {
                self.consecutive_successes += 1;
                (self.consecutive_successes >= self.success_threshold)
                    .then(|| self.transition(LinkState::Online))
            }
        }
    }

    fn record_failure(&mut self) -> Option<LinkState> {
        self.consecutive_successes = 0;
        match self.state {
            LinkState::Offline => None,
            LinkState::Online => {
                self.consecutive_failures += 1;
                (self.consecutive_failures >= self.failure_threshold)
                    .then(|| self.transition(LinkState::Offline))
            }
        }
    }

    /// Force the offline state without waiting for the failure threshold.
    ///
    /// Used when the platform reports the link down, which is authoritative
    /// in that direction. Returns the new state if it changed.
    pub fn force_offline(&mut self) -> Option<LinkState> {
        match self.state {
            LinkState::Offline => {
                self.consecutive_successes = 0;
                None
            }
            LinkState::Online => Some(self.transition(LinkState::Offline)),
        }
    }

    fn transition(&mut self, to: LinkState) -> LinkState {
        self.state = to;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        to
    }
}
