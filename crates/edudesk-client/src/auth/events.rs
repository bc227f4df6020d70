//! Session lifecycle events.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The access token was rejected and no refresh token was available.
    NoRefreshToken,
    /// The refresh exchange was rejected or failed.
    RefreshRejected,
}

/// Events emitted by the request pipeline.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session can no longer be recovered; both tokens were cleared and
    /// the user must log in again.
    Expired {
        reason: ExpiryReason,
        timestamp: DateTime<Utc>,
    },
    /// A refresh exchange succeeded and the access token was replaced.
    AccessRefreshed { timestamp: DateTime<Utc> },
}

/// Broadcasts session events to any number of subscribers.
///
/// Sending never blocks; if no subscriber is listening the event is dropped.
#[derive(Clone)]
pub struct SessionEventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBroadcaster {
    /// Create a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event to all subscribers.
    pub fn send(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("no session event subscribers, event dropped");
        }
    }

    /// Publish an expiry event stamped with the current time.
    pub fn session_expired(&self, reason: ExpiryReason) {
        self.send(SessionEvent::Expired {
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Publish a refresh event stamped with the current time.
    pub fn access_refreshed(&self) {
        self.send(SessionEvent::AccessRefreshed {
            timestamp: Utc::now(),
        });
    }
}

impl Default for SessionEventBroadcaster {
    fn default() -> Self {
        Self::new(16)
    }
}
