//! Lock event system.
//!
//! Each attached lock publishes [`LockEvent`]s on a broadcast channel. The
//! reconciliation engine subscribes once per attach and turns every event
//! into a read cycle or an `Unknown` fallback.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events a lock can raise after it has been attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEvent {
    /// The lock's activity log changed, its state should be re-read.
    ActivityLogChanged,
    /// No advertisement seen within the stale window.
    Stale,
    /// Advertisements resumed after the lock went stale.
    StaleRecovered,
}

impl std::fmt::Display for LockEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockEvent::ActivityLogChanged => write!(f, "activity log changed"),
            LockEvent::Stale => write!(f, "stale"),
            LockEvent::StaleRecovered => write!(f, "stale recovered"),
        }
    }
}

/// Sender for lock events.
pub type EventSender = broadcast::Sender<LockEvent>;

/// Receiver for lock events.
pub type EventReceiver = broadcast::Receiver<LockEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: LockEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(32)
    }
}
