//! Connectivity events.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::connectivity::state::LinkState;

/// Events emitted by the connectivity monitor.
#[derive(Debug, Clone)]
pub enum ConnectivityEvent {
    /// The debounced link state changed.
    StateChanged {
        from: LinkState,
        to: LinkState,
        timestamp: DateTime<Utc>,
    },
    /// One reachability probe completed.
    ProbeCompleted {
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcasts connectivity events to any number of subscribers.
#[derive(Clone)]
pub struct ConnectivityEventBroadcaster {
    sender: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityEventBroadcaster {
    /// Create a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to connectivity events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    pub fn send(&self, event: ConnectivityEvent) {
        if self.sender.send(event).is_err() {
            debug!("no connectivity event subscribers, event dropped");
        }
    }

    /// Publish a state change stamped with the current time.
    pub fn state_changed(&self, from: LinkState, to: LinkState) {
        self.send(ConnectivityEvent::StateChanged {
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    /// Publish a probe completion stamped with the current time.
    pub fn probe_completed(&self, success: bool) {
        self.send(ConnectivityEvent::ProbeCompleted {
            success,
            timestamp: Utc::now(),
        });
    }
}

impl Default for ConnectivityEventBroadcaster {
    fn default() -> Self {
        Self::new(32)
    }
}
