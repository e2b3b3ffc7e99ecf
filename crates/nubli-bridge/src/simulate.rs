//! In-process simulation of configured locks.
//!
//! Each configured lock gets a [`MockSmartLock`] announced on a
//! [`MockTransport`]. A background task changes a random lock's state every
//! interval and raises the event a real lock would, so the bridge runs its
//! full reconciliation path without hardware.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use nubli_core::mock::{MockSmartLock, MockTransport};
use nubli_core::{DoorSensorState, LockEvent, LockState, SmartLock};

use crate::config::Config;

/// What a simulated lock does on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedChange {
    /// Move to a new state and report activity.
    Activity {
        lock_state: LockState,
        door_sensor: DoorSensorState,
        battery_critical: bool,
    },
    /// Stop advertising.
    GoStale,
    /// Advertise again after going stale.
    Recover,
}

/// Mock locks for every configured accessory.
#[derive(Debug)]
pub struct Simulation {
    transport: Arc<MockTransport>,
    locks: Vec<Arc<MockSmartLock>>,
    credentials_dir: PathBuf,
}

impl Simulation {
    /// Create one mock lock per configured lock with pairing credentials in
    /// `credentials_dir`.
    pub fn new(config: &Config, credentials_dir: &Path) -> Self {
        let transport = Arc::new(MockTransport::new());
        let locks = config
            .identities()
            .into_iter()
            .map(|identity| {
                let lock = Arc::new(MockSmartLock::builder().id(&identity.id).build());
                lock.write_credentials(credentials_dir);
                lock
            })
            .collect();
        Self {
            transport,
            locks,
            credentials_dir: credentials_dir.to_path_buf(),
        }
    }

    /// Default directory for simulated credentials.
    pub fn default_credentials_dir() -> PathBuf {
        std::env::temp_dir().join("nubli-simulate")
    }

    /// The transport the locks are announced on.
    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.transport
    }

    /// The simulated locks.
    pub fn locks(&self) -> &[Arc<MockSmartLock>] {
        &self.locks
    }

    /// Directory holding the simulated credentials.
    pub fn credentials_dir(&self) -> &Path {
        &self.credentials_dir
    }

    /// Announce every lock on the transport.
    pub fn announce_all(&self) {
        for lock in &self.locks {
            info!("Simulated Smart Lock {} is advertising", lock.id());
            self.transport.announce(lock.clone());
        }
    }

    /// Apply `change` to the lock at `index`.
    pub fn apply(&self, index: usize, change: SimulatedChange) {
        let Some(lock) = self.locks.get(index) else {
            return;
        };
        match change {
            SimulatedChange::Activity {
                lock_state,
                door_sensor,
                battery_critical,
            } => {
                debug!(lock = %lock.id(), %lock_state, %door_sensor, "Simulated activity");
                lock.set_lock_state(lock_state);
                lock.set_door_sensor(door_sensor);
                lock.set_battery_critical(battery_critical);
                lock.emit(LockEvent::ActivityLogChanged);
            }
            SimulatedChange::GoStale => {
                debug!(lock = %lock.id(), "Simulated lock went quiet");
                lock.emit(LockEvent::Stale);
            }
            SimulatedChange::Recover => {
                debug!(lock = %lock.id(), "Simulated lock is back");
                lock.emit(LockEvent::StaleRecovered);
            }
        }
    }

    /// Change a random lock every `interval` until `cancel_token` is
    /// cancelled.
    pub fn start(
        self: &Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let simulation = Arc::clone(self);
        tokio::spawn(async move {
            let mut stale = vec![false; simulation.locks.len()];
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Simulation cancelled, shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if stale.is_empty() {
                            continue;
                        }
                        let (index, change) = next_change(&stale);
                        stale[index] = change == SimulatedChange::GoStale;
                        simulation.apply(index, change);
                    }
                }
            }
        })
    }
}

/// Pick a lock and what happens to it.
///
/// A stale lock always recovers on its next turn.
fn next_change(stale: &[bool]) -> (usize, SimulatedChange) {
    let mut rng = rand::rng();
    let index = rng.random_range(0..stale.len());
    if stale[index] {
        return (index, SimulatedChange::Recover);
    }
    if rng.random_bool(0.05) {
        return (index, SimulatedChange::GoStale);
    }

    let lock_state = match rng.random_range(0..10) {
        0..=3 => LockState::Locked,
        4..=7 => LockState::Unlocked,
        8 => LockState::Unlatched,
        _ => LockState::MotorBlocked,
    };
    let door_sensor = if rng.random_bool(0.7) {
        DoorSensorState::DoorClosed
    } else {
        DoorSensorState::DoorOpened
    };
    (
        index,
        SimulatedChange::Activity {
            lock_state,
            door_sensor,
            battery_critical: rng.random_bool(0.05),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockEntry;
    use nubli_core::mock::Operation;

    fn config() -> Config {
        Config {
            locks: vec![
                LockEntry {
                    uuid: "54d2720def0a".into(),
                    name: "Front Door".into(),
                },
                LockEntry {
                    uuid: "54d2720def0b".into(),
                    name: "Back Door".into(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_locks_have_credentials() {
        let temp = tempfile::tempdir().unwrap();
        let simulation = Simulation::new(&config(), temp.path());
        assert_eq!(simulation.locks().len(), 2);
        assert!(temp.path().join("54d2720def0a.json").is_file());
        assert!(temp.path().join("54d2720def0b.json").is_file());
    }

    #[test]
    fn test_stale_lock_recovers_next() {
        for _ in 0..50 {
            let (index, change) = next_change(&[true]);
            assert_eq!(index, 0);
            assert_eq!(change, SimulatedChange::Recover);
        }
    }

    #[test]
    fn test_next_change_index_in_range() {
        for _ in 0..100 {
            let (index, change) = next_change(&[false, false, false]);
            assert!(index < 3);
            assert_ne!(change, SimulatedChange::Recover);
        }
    }

    #[tokio::test]
    async fn test_apply_activity_updates_lock() {
        let temp = tempfile::tempdir().unwrap();
        let simulation = Simulation::new(&config(), temp.path());
        let lock = simulation.locks()[1].clone();
        let mut events = lock.subscribe();

        simulation.apply(
            1,
            SimulatedChange::Activity {
                lock_state: LockState::Unlocked,
                door_sensor: DoorSensorState::DoorOpened,
                battery_critical: false,
            },
        );

        assert_eq!(events.recv().await.unwrap(), LockEvent::ActivityLogChanged);
        let snapshot = lock.read_lock_state().await.unwrap();
        assert_eq!(snapshot.lock_state, LockState::Unlocked);
        assert_eq!(snapshot.door_sensor, DoorSensorState::DoorOpened);
        assert_eq!(lock.operations(), vec![Operation::ReadLockState]);
    }

    #[test]
    fn test_apply_out_of_range_is_ignored() {
        let temp = tempfile::tempdir().unwrap();
        let simulation = Simulation::new(&config(), temp.path());
        simulation.apply(5, SimulatedChange::GoStale);
    }
}
