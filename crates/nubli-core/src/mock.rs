//! Mock lock, transport and host implementations for testing.
//!
//! This module provides in-process stand-ins for every external
//! collaborator of the reconciliation engine, so it can be exercised
//! without BLE hardware or a host framework.
//!
//! # Features
//!
//! - **Failure injection**: fail specific operations permanently, or the
//!   next `n` operations transiently
//! - **Latency simulation**: delay every device operation
//! - **Operation log**: inspect the exact order of calls made on a lock
//! - **Event injection**: raise activity, stale and recovery events

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::time::Instant;

use nubli_types::{
    AccessoryIdentity, AccessoryInformation, CharacteristicValue, DeviceSnapshot, DoorSensorState,
    LockAction, LockConfig, LockState,
};

use crate::credentials::{CredentialStore, LockCredentials, SHARED_SECRET_LEN};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, LockEvent};
use crate::host::{AccessoryHost, SharedAccessory};
use crate::traits::{AdapterReadiness, DiscoveryStream, LockTransport, SharedLock, SmartLock};

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A device operation recorded by [`MockSmartLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadConfig,
    ReadLockState,
    ReadConfig,
    Disconnect,
    Execute(LockAction),
}

/// A mock smart lock for testing.
///
/// Implements [`SmartLock`] for use in generic code and testing.
///
/// # Example
///
/// ```
/// use nubli_core::SmartLock;
/// use nubli_core::mock::MockSmartLock;
/// use nubli_types::LockState;
///
/// #[tokio::main]
/// async fn main() {
///     let lock = MockSmartLock::builder().lock_state(LockState::Locked).build();
///     let snapshot = lock.read_lock_state().await.unwrap();
///     assert_eq!(snapshot.lock_state, LockState::Locked);
/// }
/// ```
pub struct MockSmartLock {
    id: String,
    snapshot: Mutex<DeviceSnapshot>,
    config: Mutex<LockConfig>,
    connected: AtomicBool,
    credentials_loaded: AtomicBool,
    operations: Mutex<Vec<Operation>>,
    failing: Mutex<HashSet<Operation>>,
    /// Number of operations to fail before succeeding again.
    remaining_failures: AtomicU32,
    /// Simulated latency per operation in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    read_count: AtomicU32,
    events: EventDispatcher,
}

impl std::fmt::Debug for MockSmartLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSmartLock")
            .field("id", &self.id)
            .field("snapshot", &*lock_or_recover(&self.snapshot))
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockSmartLock {
    /// Create a mock lock with default state (locked, door closed).
    pub fn new(id: &str) -> Self {
        MockSmartLockBuilder::new().id(id).build()
    }

    /// Create a builder.
    pub fn builder() -> MockSmartLockBuilder {
        MockSmartLockBuilder::new()
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Whether `load_config` has succeeded.
    pub fn credentials_loaded(&self) -> bool {
        self.credentials_loaded.load(Ordering::Relaxed)
    }

    /// Every operation performed so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        lock_or_recover(&self.operations).clone()
    }

    /// Forget recorded operations.
    pub fn clear_operations(&self) {
        lock_or_recover(&self.operations).clear();
    }

    /// Number of state reads performed.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Set the state the lock reports.
    pub fn set_snapshot(&self, snapshot: DeviceSnapshot) {
        *lock_or_recover(&self.snapshot) = snapshot;
    }

    /// Set the composite lock state.
    pub fn set_lock_state(&self, state: LockState) {
        lock_or_recover(&self.snapshot).lock_state = state;
    }

    /// Set the door sensor state.
    pub fn set_door_sensor(&self, state: DoorSensorState) {
        lock_or_recover(&self.snapshot).door_sensor = state;
    }

    /// Set the battery-critical flag.
    pub fn set_battery_critical(&self, critical: bool) {
        lock_or_recover(&self.snapshot).battery_critical = critical;
    }

    /// Make `operation` fail until [`recover`](Self::recover) is called.
    pub fn fail_on(&self, operation: Operation) {
        lock_or_recover(&self.failing).insert(operation);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: Operation) {
        lock_or_recover(&self.failing).remove(&operation);
    }

    /// Fail the next `count` operations of any kind, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Set simulated latency for every operation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Raise a lock event.
    pub fn emit(&self, event: LockEvent) {
        self.events.send(event);
    }

    /// Number of live event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Write valid pairing credentials for this lock into `dir`.
    pub fn write_credentials(&self, dir: &Path) {
        let credentials = LockCredentials {
            authorization_id: 1,
            shared_secret: "00".repeat(SHARED_SECRET_LEN),
            app_id: 1,
        };
        if let Err(e) = CredentialStore::new(dir).save(&self.id, &credentials) {
            tracing::warn!(error = %e, "Failed to write mock credentials");
        }
    }

    async fn perform(&self, operation: Operation) -> Result<()> {
        lock_or_recover(&self.operations).push(operation);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if operation != Operation::Disconnect {
            self.connected.store(true, Ordering::Relaxed);
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::timeout(format!("{operation:?}"), Duration::from_secs(10)));
        }

        if lock_or_recover(&self.failing).contains(&operation) {
            return Err(Error::rejected(format!("{operation:?}"), "mock failure"));
        }

        Ok(())
    }
}

#[async_trait]
impl SmartLock for MockSmartLock {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_stored_config(&self, dir: &Path) -> bool {
        CredentialStore::new(dir).exists(&self.id)
    }

    async fn load_config(&self, dir: &Path) -> Result<()> {
        self.perform(Operation::LoadConfig).await?;
        CredentialStore::new(dir).load(&self.id)?;
        self.credentials_loaded.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn read_lock_state(&self) -> Result<DeviceSnapshot> {
        self.perform(Operation::ReadLockState).await?;
        self.read_count.fetch_add(1, Ordering::Relaxed);
        Ok(*lock_or_recover(&self.snapshot))
    }

    async fn read_config(&self) -> Result<LockConfig> {
        self.perform(Operation::ReadConfig).await?;
        Ok(lock_or_recover(&self.config).clone())
    }

    async fn disconnect(&self) -> Result<()> {
        let result = self.perform(Operation::Disconnect).await;
        self.connected.store(false, Ordering::Relaxed);
        result
    }

    async fn execute(&self, action: LockAction) -> Result<DeviceSnapshot> {
        self.perform(Operation::Execute(action)).await?;
        let mut snapshot = lock_or_recover(&self.snapshot);
        snapshot.lock_state = match action {
            LockAction::Lock => LockState::Locked,
            LockAction::Unlock => LockState::Unlocked,
            LockAction::Unlatch => LockState::Unlatched,
        };
        Ok(*snapshot)
    }

    fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

/// Builder for creating mock locks with custom settings.
#[derive(Debug)]
pub struct MockSmartLockBuilder {
    id: String,
    snapshot: DeviceSnapshot,
    config: LockConfig,
}

impl Default for MockSmartLockBuilder {
    fn default() -> Self {
        Self {
            id: format!("{:012x}", rand::random::<u64>() & 0xFFFF_FFFF_FFFF),
            snapshot: DeviceSnapshot::new(LockState::Locked, DoorSensorState::DoorClosed),
            config: LockConfig {
                name: "Mock Nuki".to_string(),
                firmware_revision: "2.8.15".to_string(),
                hardware_revision: "2.3".to_string(),
            },
        }
    }
}

impl MockSmartLockBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock identifier.
    #[must_use]
    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Set the composite lock state.
    #[must_use]
    pub fn lock_state(mut self, state: LockState) -> Self {
        self.snapshot.lock_state = state;
        self
    }

    /// Set the door sensor state.
    #[must_use]
    pub fn door_sensor(mut self, state: DoorSensorState) -> Self {
        self.snapshot.door_sensor = state;
        self
    }

    /// Set the battery-critical flag.
    #[must_use]
    pub fn battery_critical(mut self, critical: bool) -> Self {
        self.snapshot.battery_critical = critical;
        self
    }

    /// Set the firmware revision.
    #[must_use]
    pub fn firmware(mut self, revision: &str) -> Self {
        self.config.firmware_revision = revision.to_string();
        self
    }

    /// Set the hardware revision.
    #[must_use]
    pub fn hardware(mut self, revision: &str) -> Self {
        self.config.hardware_revision = revision.to_string();
        self
    }

    /// Build the mock lock.
    #[must_use]
    pub fn build(self) -> MockSmartLock {
        MockSmartLock {
            id: self.id,
            snapshot: Mutex::new(self.snapshot),
            config: Mutex::new(self.config),
            connected: AtomicBool::new(false),
            credentials_loaded: AtomicBool::new(false),
            operations: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            read_count: AtomicU32::new(0),
            events: EventDispatcher::default(),
        }
    }
}

/// A mock transport that hands out locks announced by the test.
pub struct MockTransport {
    /// Number of readiness waits that fail before the adapter is ready.
    readiness_failures: AtomicU32,
    /// Number of `discover` calls that fail.
    discover_failures: AtomicU32,
    readiness_attempts: Mutex<Vec<Instant>>,
    scan_started: Mutex<Option<Instant>>,
    sender: mpsc::UnboundedSender<SharedLock>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<SharedLock>>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("readiness_attempts", &lock_or_recover(&self.readiness_attempts).len())
            .field("scan_started", &*lock_or_recover(&self.scan_started))
            .finish()
    }
}

impl MockTransport {
    /// Create a transport whose adapter is ready immediately.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            readiness_failures: AtomicU32::new(0),
            discover_failures: AtomicU32::new(0),
            readiness_attempts: Mutex::new(Vec::new()),
            scan_started: Mutex::new(None),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Fail the next `count` readiness waits.
    pub fn set_readiness_failures(&self, count: u32) {
        self.readiness_failures.store(count, Ordering::Relaxed);
    }

    /// Fail the next `count` discover calls.
    pub fn set_discover_failures(&self, count: u32) {
        self.discover_failures.store(count, Ordering::Relaxed);
    }

    /// Instants at which readiness was awaited.
    pub fn readiness_attempts(&self) -> Vec<Instant> {
        lock_or_recover(&self.readiness_attempts).clone()
    }

    /// Instant at which scanning began, if it has.
    pub fn scan_started(&self) -> Option<Instant> {
        *lock_or_recover(&self.scan_started)
    }

    /// Make `lock` appear in the discovery stream.
    pub fn announce(&self, lock: SharedLock) {
        let _ = self.sender.unbounded_send(lock);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdapterReadiness for MockTransport {
    async fn wait_for_adapter(&self) -> Result<()> {
        lock_or_recover(&self.readiness_attempts).push(Instant::now());
        if self.readiness_failures.load(Ordering::Relaxed) > 0 {
            self.readiness_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::adapter_not_ready("mock adapter timed out"));
        }
        Ok(())
    }
}

#[async_trait]
impl LockTransport for MockTransport {
    async fn discover(&self) -> Result<DiscoveryStream> {
        if self.discover_failures.load(Ordering::Relaxed) > 0 {
            self.discover_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::adapter_not_ready("mock scan failed"));
        }
        let receiver = lock_or_recover(&self.receiver)
            .take()
            .ok_or_else(|| Error::rejected("discover", "scan already started"))?;
        *lock_or_recover(&self.scan_started) = Some(Instant::now());
        Ok(receiver.boxed())
    }
}

/// A host that records every registration and push.
#[derive(Default)]
pub struct MockHost {
    registered: Mutex<Vec<SharedAccessory>>,
    values: Mutex<Vec<(String, CharacteristicValue)>>,
    information: Mutex<Vec<(String, AccessoryInformation)>>,
}

impl std::fmt::Debug for MockHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHost")
            .field("registered", &lock_or_recover(&self.registered).len())
            .field("values", &lock_or_recover(&self.values).len())
            .finish()
    }
}

impl MockHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered accessories, in registration order.
    pub fn registered(&self) -> Vec<SharedAccessory> {
        lock_or_recover(&self.registered).clone()
    }

    /// Values pushed for the accessory `id`, in push order.
    pub fn values_for(&self, id: &str) -> Vec<CharacteristicValue> {
        lock_or_recover(&self.values)
            .iter()
            .filter(|(accessory, _)| accessory == id)
            .map(|(_, value)| *value)
            .collect()
    }

    /// Last information pushed for the accessory `id`.
    pub fn information_for(&self, id: &str) -> Option<AccessoryInformation> {
        lock_or_recover(&self.information)
            .iter()
            .rev()
            .find(|(accessory, _)| accessory == id)
            .map(|(_, info)| info.clone())
    }

    /// Forget recorded pushes.
    pub fn clear(&self) {
        lock_or_recover(&self.values).clear();
        lock_or_recover(&self.information).clear();
    }
}

impl AccessoryHost for MockHost {
    fn register(&self, accessory: SharedAccessory) {
        lock_or_recover(&self.registered).push(accessory);
    }

    fn update_value(&self, identity: &AccessoryIdentity, value: CharacteristicValue) {
        lock_or_recover(&self.values).push((identity.id.clone(), value));
    }

    fn update_information(&self, identity: &AccessoryIdentity, information: &AccessoryInformation) {
        lock_or_recover(&self.information).push((identity.id.clone(), information.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_lock_defaults() {
        let lock = MockSmartLock::new("abc");
        assert_eq!(lock.id(), "abc");
        let snapshot = lock.read_lock_state().await.unwrap();
        assert_eq!(snapshot.lock_state, LockState::Locked);
        assert_eq!(snapshot.door_sensor, DoorSensorState::DoorClosed);
        assert!(lock.is_connected());
        lock.disconnect().await.unwrap();
        assert!(!lock.is_connected());
        assert_eq!(lock.read_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_acknowledges_new_state() {
        let lock = MockSmartLock::new("abc");
        assert_eq!(lock.unlock().await.unwrap().lock_state, LockState::Unlocked);
        assert_eq!(lock.unlatch().await.unwrap().lock_state, LockState::Unlatched);
        assert_eq!(lock.lock().await.unwrap().lock_state, LockState::Locked);
        assert_eq!(
            lock.operations(),
            vec![
                Operation::Execute(LockAction::Unlock),
                Operation::Execute(LockAction::Unlatch),
                Operation::Execute(LockAction::Lock),
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_on_and_recover() {
        let lock = MockSmartLock::new("abc");
        lock.fail_on(Operation::ReadConfig);
        assert!(lock.read_config().await.is_err());
        assert!(lock.read_lock_state().await.is_ok());
        lock.recover(Operation::ReadConfig);
        assert!(lock.read_config().await.is_ok());
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let lock = MockSmartLock::new("abc");
        lock.set_transient_failures(2);
        assert!(lock.read_lock_state().await.is_err());
        assert!(lock.read_lock_state().await.is_err());
        assert!(lock.read_lock_state().await.is_ok());
    }

    #[tokio::test]
    async fn test_load_config_reads_credentials() {
        let temp = tempfile::TempDir::new().unwrap();
        let lock = MockSmartLock::new("abc");
        assert!(!lock.has_stored_config(temp.path()));
        assert!(lock.load_config(temp.path()).await.is_err());

        lock.write_credentials(temp.path());
        assert!(lock.has_stored_config(temp.path()));
        lock.load_config(temp.path()).await.unwrap();
        assert!(lock.credentials_loaded());
    }

    #[tokio::test]
    async fn test_emit() {
        let lock = MockSmartLock::new("abc");
        let mut rx = lock.subscribe();
        lock.emit(LockEvent::ActivityLogChanged);
        assert_eq!(rx.recv().await.unwrap(), LockEvent::ActivityLogChanged);
    }

    #[tokio::test]
    async fn test_transport_discovery() {
        let transport = MockTransport::new();
        transport.announce(Arc::new(MockSmartLock::new("abc")));

        let mut stream = transport.discover().await.unwrap();
        let lock = stream.next().await.unwrap();
        assert_eq!(lock.id(), "abc");
        assert!(transport.scan_started().is_some());
        assert!(transport.discover().await.is_err());
    }

    #[tokio::test]
    async fn test_transport_readiness_failures() {
        let transport = MockTransport::new();
        transport.set_readiness_failures(1);
        assert!(transport.wait_for_adapter().await.is_err());
        assert!(transport.wait_for_adapter().await.is_ok());
        assert_eq!(transport.readiness_attempts().len(), 2);
    }

    #[test]
    fn test_host_records() {
        let host = MockHost::new();
        let identity = AccessoryIdentity::new("abc", "Front Door");
        host.update_value(&identity, CharacteristicValue::BatteryLevel(100));
        host.update_information(&identity, &AccessoryInformation::for_identity(&identity));

        assert_eq!(host.values_for("abc"), vec![CharacteristicValue::BatteryLevel(100)]);
        assert!(host.values_for("other").is_empty());
        assert_eq!(host.information_for("abc").unwrap().serial_number, "abc");
    }
}
