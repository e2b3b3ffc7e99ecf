//! Per-accessory reconciliation engine.
//!
//! The engine owns one [`AccessoryStateStore`] and keeps it consistent with
//! the physical lock. Discovery, lock events and user commands all pass
//! through a per-accessory queue, so a command's optimistic target write can
//! never interleave with an event-driven fallback. Different accessories
//! run fully independently.
//!
//! Connectivity failures only ever move `current` to `Unknown`. `Secured`
//! and `Unsecured` are set exclusively from decoded device state.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nubli_types::{
    AccessoryIdentity, AccessoryInformation, AccessoryState, ChargingState, CharacteristicValue,
    DeviceSnapshot, LockAction, LockCurrentState, LockTargetState, decode,
};

use crate::error::{AttachError, CommandError};
use crate::events::LockEvent;
use crate::host::{AccessoryHost, LockAccessory};
use crate::lifecycle::ConnectionLifecycleManager;
use crate::store::AccessoryStateStore;
use crate::traits::SharedLock;

/// Which facet a command drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Facet {
    Lock,
    Latch,
}

/// Reconciliation engine for a single accessory.
pub struct ReconciliationEngine {
    store: AccessoryStateStore,
    lifecycle: ConnectionLifecycleManager,
    host: Arc<dyn AccessoryHost>,
    /// Serializes attach cycles, event handling and commands.
    queue: tokio::sync::Mutex<()>,
    subscription: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("store", &self.store)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl ReconciliationEngine {
    /// Create an engine for `identity`.
    ///
    /// Event subscriptions are stopped when `shutdown` is cancelled.
    pub fn new(
        identity: AccessoryIdentity,
        lifecycle: ConnectionLifecycleManager,
        host: Arc<dyn AccessoryHost>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store: AccessoryStateStore::new(identity),
            lifecycle,
            host,
            queue: tokio::sync::Mutex::new(()),
            subscription: Mutex::new(None),
            shutdown,
        }
    }

    /// Accessory identity.
    pub fn identity(&self) -> &AccessoryIdentity {
        self.store.identity()
    }

    /// The backing state store.
    pub fn store(&self) -> &AccessoryStateStore {
        &self.store
    }

    /// Current facets and battery. Never performs I/O.
    pub fn read_current_state(&self) -> AccessoryState {
        self.store.read_current_state()
    }

    /// Whether a lock handle is attached.
    pub fn is_attached(&self) -> bool {
        self.store.is_attached()
    }

    /// Handle a discovered lock that matches this accessory.
    ///
    /// Ignored if the lock is known to have no stored configuration, or if a
    /// handle is already attached. Otherwise runs an attach cycle and, on
    /// success, subscribes to the lock's events.
    pub async fn on_discovered(self: &Arc<Self>, lock: SharedLock) {
        if self.store.config_missing() {
            info!(
                lock = %lock.id(),
                "Smart Lock has no stored configuration. Ignoring discovery"
            );
            return;
        }

        let _queue = self.queue.lock().await;
        if self.store.config_missing() {
            return;
        }
        if self.store.is_attached() {
            debug!(lock = %lock.id(), "Smart Lock already attached. Ignoring discovery");
            return;
        }

        info!("Discovered Smart Lock with UUID {}", lock.id());
        if self.attach_cycle(&lock).await {
            self.subscribe(lock);
            info!(lock = %self.identity().id, "Smart Lock initialized");
        }
    }

    /// Drive the bolt lock to `target`.
    ///
    /// `target` is published immediately; `current` only changes once the
    /// lock acknowledges. On failure the previous target is restored.
    pub async fn request_lock_change(&self, target: LockTargetState) -> Result<(), CommandError> {
        let action = match target {
            LockTargetState::Secured => LockAction::Lock,
            LockTargetState::Unsecured => LockAction::Unlock,
        };
        self.run_command(Facet::Lock, target, action).await
    }

    /// Drive the latch to `target`.
    ///
    /// The latch can only be released: `Secured` is always rejected with
    /// [`CommandError::LatchCannotBeLocked`] and nothing is touched.
    pub async fn request_latch_change(&self, target: LockTargetState) -> Result<(), CommandError> {
        if target == LockTargetState::Secured {
            info!(lock = %self.identity().id, "The latch cannot be locked.");
            return Err(CommandError::LatchCannotBeLocked);
        }
        self.run_command(Facet::Latch, target, LockAction::Unlatch)
            .await
    }

    async fn run_command(
        &self,
        facet: Facet,
        target: LockTargetState,
        action: LockAction,
    ) -> Result<(), CommandError> {
        let _queue = self.queue.lock().await;
        let Some(device) = self.store.device() else {
            warn!(lock = %self.identity().id, %action, "No Smart Lock attached");
            return Err(CommandError::NoDeviceAttached);
        };

        let before = self.store.read_current_state();
        let previous = match facet {
            Facet::Lock => before.lock.target,
            Facet::Latch => before.latch.target,
        };
        self.publish(self.store.update(|state| match facet {
            Facet::Lock => state.lock.target = target,
            Facet::Latch => state.latch.target = target,
        }));

        let result = device.execute(action).await;
        if let Err(e) = device.disconnect().await {
            debug!(lock = %device.id(), error = %e, "Disconnect after command failed");
        }

        match result {
            Ok(ack) => {
                self.apply_snapshot(&ack);
                info!(lock = %self.identity().id, %action, "Command acknowledged");
                Ok(())
            }
            Err(e) => {
                self.publish(self.store.update(|state| match facet {
                    Facet::Lock => state.lock.target = previous,
                    Facet::Latch => state.latch.target = previous,
                }));
                warn!(lock = %self.identity().id, %action, error = %e, "Could not {action} door");
                Err(CommandError::CommandFailed(e.to_string()))
            }
        }
    }

    /// Run an attach cycle and apply its outcome. Caller holds the queue.
    ///
    /// Returns `true` if the lock is attached afterwards.
    async fn attach_cycle(&self, lock: &SharedLock) -> bool {
        match self.lifecycle.attach(lock.as_ref()).await {
            Ok(outcome) => {
                self.store.attach(Arc::clone(lock));
                self.apply_snapshot(&outcome.snapshot);
                if self.store.set_config(outcome.config) {
                    self.host
                        .update_information(self.identity(), &self.store.information());
                }
                true
            }
            Err(AttachError::ConfigNotFound { dir, .. }) => {
                self.store.mark_config_missing();
                info!(
                    lock = %lock.id(),
                    dir = %dir.display(),
                    "No stored configuration for Smart Lock. Pair it first"
                );
                false
            }
            Err(e) => {
                self.fall_back_to_unknown();
                warn!(error = %e, "Failed to get Smart Lock configuration");
                false
            }
        }
    }

    /// Re-read the lock after activity or recovery.
    ///
    /// An attached lock gets a refresh cycle. A lock whose handle was dropped
    /// (stale, or a failed cycle) gets a full attach cycle instead.
    async fn reconcile(&self, lock: &SharedLock, reason: LockEvent) {
        let _queue = self.queue.lock().await;
        match reason {
            LockEvent::StaleRecovered => {
                info!(lock = %lock.id(), "Smart Lock has recovered - Trying to get status now");
            }
            _ => info!(lock = %lock.id(), "Activity Log Changed - Updating state"),
        }

        if self.store.is_attached() {
            match self.lifecycle.refresh(lock.as_ref()).await {
                Ok(snapshot) => self.apply_snapshot(&snapshot),
                Err(e) => {
                    self.fall_back_to_unknown();
                    warn!(error = %e, "Failed to update Smart Lock state");
                }
            }
        } else {
            self.attach_cycle(lock).await;
        }
    }

    /// The lock stopped advertising: drop to `Unknown` without any I/O.
    async fn went_stale(&self) {
        let _queue = self.queue.lock().await;
        info!(
            lock = %self.identity().id,
            "Smart Lock has not sent any advertisements within a time period. Marking as stale"
        );
        self.fall_back_to_unknown();
    }

    fn apply_snapshot(&self, snapshot: &DeviceSnapshot) {
        let decoded = decode(snapshot);
        debug!(
            lock = %self.identity().id,
            lock_state = %snapshot.lock_state,
            door_sensor = %snapshot.door_sensor,
            battery_critical = snapshot.battery_critical,
            "Applying lock state"
        );
        self.publish(self.store.update(|state| {
            decoded.apply_to(&mut state.lock, &mut state.latch);
            state.battery = decoded.battery;
        }));
    }

    /// Drop the handle and mark both facets `Unknown`. Targets are kept.
    fn fall_back_to_unknown(&self) {
        self.store.detach();
        self.publish(self.store.update(|state| {
            state.lock.mark_unknown();
            state.latch.mark_unknown();
        }));
    }

    fn publish(&self, changes: Vec<CharacteristicValue>) {
        for value in changes {
            self.host.update_value(self.identity(), value);
        }
    }

    /// Listen for the lock's events until re-subscribed or shut down.
    fn subscribe(self: &Arc<Self>, lock: SharedLock) {
        let token = self.shutdown.child_token();
        if let Some(old) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            old.cancel();
        }

        let engine = Arc::clone(self);
        let mut events = lock.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(LockEvent::Stale) => engine.went_stale().await,
                        Ok(event) => engine.reconcile(&lock, event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(lock = %lock.id(), skipped, "Missed lock events");
                            engine.reconcile(&lock, LockEvent::ActivityLogChanged).await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(lock = %lock.id(), "Event subscription ended");
        });
    }
}

#[async_trait]
impl LockAccessory for ReconciliationEngine {
    fn identity(&self) -> &AccessoryIdentity {
        self.store.identity()
    }

    fn information(&self) -> AccessoryInformation {
        self.store.information()
    }

    fn lock_current_state(&self) -> LockCurrentState {
        self.store.read_current_state().lock.current
    }

    fn lock_target_state(&self) -> LockTargetState {
        self.store.read_current_state().lock.target
    }

    fn latch_current_state(&self) -> LockCurrentState {
        self.store.read_current_state().latch.current
    }

    fn latch_target_state(&self) -> LockTargetState {
        self.store.read_current_state().latch.target
    }

    fn battery_level(&self) -> u8 {
        self.store.read_current_state().battery.level
    }

    fn charging_state(&self) -> ChargingState {
        self.store.read_current_state().battery.charging
    }

    fn status_low_battery(&self) -> bool {
        self.store.read_current_state().battery.low_battery
    }

    async fn set_lock_target_state(&self, target: LockTargetState) -> Result<(), CommandError> {
        self.request_lock_change(target).await
    }

    async fn set_latch_target_state(&self, target: LockTargetState) -> Result<(), CommandError> {
        self.request_latch_change(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHost, MockSmartLock, Operation};
    use nubli_types::{DoorSensorState, LockFacet, LockState};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        host: Arc<MockHost>,
        engine: Arc<ReconciliationEngine>,
        lock: Arc<MockSmartLock>,
    }

    fn fixture(with_credentials: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let lock = Arc::new(
            MockSmartLock::builder()
                .id("54d2720def0a")
                .lock_state(LockState::Locked)
                .door_sensor(DoorSensorState::DoorClosed)
                .build(),
        );
        if with_credentials {
            lock.write_credentials(temp.path());
        }
        let host = Arc::new(MockHost::new());
        let engine = Arc::new(ReconciliationEngine::new(
            AccessoryIdentity::new("54d2720def0a", "Front Door"),
            ConnectionLifecycleManager::new(temp.path()),
            host.clone(),
            CancellationToken::new(),
        ));
        Fixture {
            temp,
            host,
            engine,
            lock,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_discovery_attaches() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;

        assert!(f.engine.is_attached());
        let state = f.engine.read_current_state();
        assert_eq!(
            state.lock,
            LockFacet::new(LockCurrentState::Secured, LockTargetState::Secured)
        );
        assert_eq!(
            state.latch,
            LockFacet::new(LockCurrentState::Secured, LockTargetState::Secured)
        );
        assert_eq!(f.engine.information().firmware_revision, "2.8.15");
        assert_eq!(
            f.host.information_for("54d2720def0a").unwrap().hardware_revision,
            "2.3"
        );
        assert!(!f.lock.is_connected());
        assert_eq!(f.lock.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_discovery_without_config() {
        let f = fixture(false);
        f.engine.on_discovered(f.lock.clone()).await;
        assert!(!f.engine.is_attached());
        assert!(f.engine.store().config_missing());

        // Further discoveries are a no-op.
        f.lock.write_credentials(f.temp.path());
        f.engine.on_discovered(f.lock.clone()).await;
        assert!(!f.engine.is_attached());
        assert!(f.lock.operations().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_while_attached_is_ignored() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.clear_operations();

        f.engine.on_discovered(f.lock.clone()).await;
        assert!(f.lock.operations().is_empty());
        assert_eq!(f.lock.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_attach_is_not_applied() {
        let f = fixture(true);
        f.lock.fail_on(Operation::ReadConfig);
        f.engine.on_discovered(f.lock.clone()).await;

        let state = f.engine.read_current_state();
        assert_eq!(state.lock.current, LockCurrentState::Unknown);
        assert_eq!(state.latch.current, LockCurrentState::Unknown);
        // The successful state read was not applied.
        assert_eq!(state.lock.target, LockTargetState::Unsecured);
        assert!(!f.engine.is_attached());
        assert_eq!(f.engine.information().firmware_revision, "Unknown");
    }

    #[tokio::test]
    async fn test_failed_attach_is_retried_on_next_discovery() {
        let f = fixture(true);
        f.lock.set_transient_failures(1);
        f.engine.on_discovered(f.lock.clone()).await;
        assert!(!f.engine.is_attached());

        f.engine.on_discovered(f.lock.clone()).await;
        assert!(f.engine.is_attached());
        assert_eq!(f.engine.lock_current_state(), LockCurrentState::Secured);
    }

    #[tokio::test]
    async fn test_lock_command_without_device() {
        let f = fixture(true);
        let err = f
            .engine
            .request_lock_change(LockTargetState::Secured)
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::NoDeviceAttached);
        assert_eq!(f.engine.lock_target_state(), LockTargetState::Unsecured);
        assert!(f.host.values_for("54d2720def0a").is_empty());
    }

    #[tokio::test]
    async fn test_unlock_command() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.host.clear();
        f.lock.clear_operations();

        f.engine
            .request_lock_change(LockTargetState::Unsecured)
            .await
            .unwrap();

        assert_eq!(
            f.engine.read_current_state().lock,
            LockFacet::new(LockCurrentState::Unsecured, LockTargetState::Unsecured)
        );
        assert_eq!(
            f.lock.operations(),
            vec![Operation::Execute(LockAction::Unlock), Operation::Disconnect]
        );
        // Target is pushed before current.
        assert_eq!(
            f.host.values_for("54d2720def0a"),
            vec![
                CharacteristicValue::LockTargetState(LockTargetState::Unsecured),
                CharacteristicValue::LockCurrentState(LockCurrentState::Unsecured),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_command_leaves_state() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.fail_on(Operation::Execute(LockAction::Unlock));
        let before = f.engine.read_current_state();

        let err = f
            .engine
            .request_lock_change(LockTargetState::Unsecured)
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::CommandFailed(_)));
        assert_eq!(f.engine.read_current_state(), before);
        assert!(f.engine.is_attached());
    }

    #[tokio::test]
    async fn test_latch_cannot_be_locked() {
        let f = fixture(true);
        for attach in [false, true] {
            if attach {
                f.engine.on_discovered(f.lock.clone()).await;
            }
            let before = f.engine.read_current_state();
            f.lock.clear_operations();
            let err = f
                .engine
                .request_latch_change(LockTargetState::Secured)
                .await
                .unwrap_err();
            assert_eq!(err, CommandError::LatchCannotBeLocked);
            assert_eq!(f.engine.read_current_state(), before);
            assert!(f.lock.operations().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unlatch_command() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.engine
            .set_latch_target_state(LockTargetState::Unsecured)
            .await
            .unwrap();

        let state = f.engine.read_current_state();
        assert_eq!(
            state.latch,
            LockFacet::new(LockCurrentState::Unsecured, LockTargetState::Unsecured)
        );
        assert_eq!(
            state.lock,
            LockFacet::new(LockCurrentState::Unsecured, LockTargetState::Unsecured)
        );
    }

    #[tokio::test]
    async fn test_stale_forces_unknown_without_io() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.clear_operations();

        f.lock.emit(LockEvent::Stale);
        settle().await;

        let state = f.engine.read_current_state();
        assert_eq!(state.lock.current, LockCurrentState::Unknown);
        assert_eq!(state.latch.current, LockCurrentState::Unknown);
        assert_eq!(state.lock.target, LockTargetState::Secured);
        assert!(f.lock.operations().is_empty());
        assert!(!f.engine.is_attached());
        assert_eq!(
            f.engine.request_lock_change(LockTargetState::Unsecured).await,
            Err(CommandError::NoDeviceAttached)
        );
    }

    #[tokio::test]
    async fn test_recovery_reattaches() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.emit(LockEvent::Stale);
        settle().await;

        f.lock.set_lock_state(LockState::Unlocked);
        f.lock.clear_operations();
        f.lock.emit(LockEvent::StaleRecovered);
        settle().await;

        assert!(f.engine.is_attached());
        assert_eq!(f.engine.lock_current_state(), LockCurrentState::Unsecured);
        assert_eq!(f.lock.operations().first(), Some(&Operation::LoadConfig));
    }

    #[tokio::test]
    async fn test_activity_refreshes() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.clear_operations();

        f.lock.set_lock_state(LockState::MotorBlocked);
        f.lock.set_battery_critical(true);
        f.lock.emit(LockEvent::ActivityLogChanged);
        settle().await;

        assert_eq!(f.engine.lock_current_state(), LockCurrentState::Jammed);
        assert_eq!(f.engine.lock_target_state(), LockTargetState::Secured);
        assert!(f.engine.status_low_battery());
        assert_eq!(
            f.lock.operations(),
            vec![Operation::ReadLockState, Operation::Disconnect]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_unknown() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.fail_on(Operation::ReadLockState);

        f.lock.emit(LockEvent::ActivityLogChanged);
        settle().await;

        assert_eq!(f.engine.lock_current_state(), LockCurrentState::Unknown);
        assert_eq!(f.engine.latch_current_state(), LockCurrentState::Unknown);
        assert!(!f.lock.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_waits_for_in_flight_command() {
        let f = fixture(true);
        f.engine.on_discovered(f.lock.clone()).await;
        f.lock.set_latency(Duration::from_secs(2));

        let engine = f.engine.clone();
        let command = tokio::spawn(async move {
            engine.request_lock_change(LockTargetState::Unsecured).await
        });
        settle().await;
        f.lock.emit(LockEvent::Stale);

        command.await.unwrap().unwrap();
        settle().await;

        // The stale fallback ran after the command completed.
        let state = f.engine.read_current_state();
        assert_eq!(state.lock.current, LockCurrentState::Unknown);
        assert_eq!(state.lock.target, LockTargetState::Unsecured);
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscription() {
        let temp = TempDir::new().unwrap();
        let lock = Arc::new(MockSmartLock::new("abc"));
        lock.write_credentials(temp.path());
        let shutdown = CancellationToken::new();
        let engine = Arc::new(ReconciliationEngine::new(
            AccessoryIdentity::new("abc", "Door"),
            ConnectionLifecycleManager::new(temp.path()),
            Arc::new(MockHost::new()),
            shutdown.clone(),
        ));
        engine.on_discovered(lock.clone()).await;
        assert_eq!(lock.subscriber_count(), 1);

        shutdown.cancel();
        settle().await;
        assert_eq!(lock.subscriber_count(), 0);
    }
}
