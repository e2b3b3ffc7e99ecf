//! Advertisement-based stale detection.
//!
//! A lock advertises periodically while it is in range. The watchdog keeps
//! the last instant each registered lock was seen, raises
//! [`LockEvent::Stale`] once the lock has been silent for longer than the
//! window, and [`LockEvent::StaleRecovered`] on the next advertisement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{EventDispatcher, LockEvent};

/// Default silence window before a lock is marked stale.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug)]
struct Entry {
    last_seen: Instant,
    stale: bool,
    events: EventDispatcher,
}

/// Tracks advertisement freshness for a set of locks.
#[derive(Debug)]
pub struct StaleWatchdog {
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl StaleWatchdog {
    /// Create a watchdog with the given silence window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The silence window.
    pub fn window(&self) -> Duration {
        self.window
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a lock, counting it as seen now.
    pub fn register(&self, lock_id: &str, events: EventDispatcher) {
        self.entries().insert(
            lock_id.to_string(),
            Entry {
                last_seen: Instant::now(),
                stale: false,
                events,
            },
        );
    }

    /// Whether a lock is tracked.
    pub fn is_registered(&self, lock_id: &str) -> bool {
        self.entries().contains_key(lock_id)
    }

    /// Record an advertisement.
    ///
    /// Returns `true` if the lock was stale and has now recovered.
    pub fn observe(&self, lock_id: &str) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(lock_id) else {
            return false;
        };
        entry.last_seen = Instant::now();
        if entry.stale {
            entry.stale = false;
            info!(lock = %lock_id, "Smart Lock advertising again");
            entry.events.send(LockEvent::StaleRecovered);
            true
        } else {
            false
        }
    }

    /// Mark every lock silent since before `now - window` as stale.
    ///
    /// Returns the identifiers that became stale on this sweep.
    pub fn sweep(&self, now: Instant) -> Vec<String> {
        let mut newly_stale = Vec::new();
        for (id, entry) in self.entries().iter_mut() {
            if !entry.stale && now.saturating_duration_since(entry.last_seen) > self.window {
                entry.stale = true;
                info!(lock = %id, "No advertisement seen. Marking as stale");
                entry.events.send(LockEvent::Stale);
                newly_stale.push(id.clone());
            }
        }
        newly_stale
    }

    /// Sweep periodically until `cancel_token` is cancelled.
    pub fn start(self: &Arc<Self>, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        let watchdog = Arc::clone(self);
        let period = (watchdog.window / 4).max(Duration::from_millis(100));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Stale watchdog cancelled, shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        watchdog.sweep(Instant::now());
                    }
                }
            }
        })
    }
}

impl Default for StaleWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIMEOUT)
    }
}
