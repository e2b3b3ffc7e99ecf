//! Cached accessory state.
//!
//! The store is the single source of truth for what the host sees. Reads
//! never wait on device I/O: the record sits behind a synchronous lock
//! that is only held for field copies.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nubli_types::{
    AccessoryIdentity, AccessoryInformation, AccessoryState, CharacteristicValue, LockConfig,
};

use crate::traits::SharedLock;

/// Mutable part of an accessory.
#[derive(Default)]
pub struct AccessoryRecord {
    /// Facets and battery.
    pub state: AccessoryState,
    /// Revisions read from the device.
    pub information: Option<LockConfig>,
    /// Attached lock handle. Cleared when the lock goes stale or an attach
    /// cycle fails.
    pub device: Option<SharedLock>,
    /// The lock was discovered without stored configuration.
    pub config_missing: bool,
}

impl std::fmt::Debug for AccessoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessoryRecord")
            .field("state", &self.state)
            .field("information", &self.information)
            .field("device", &self.device.as_ref().map(|d| d.id().to_string()))
            .field("config_missing", &self.config_missing)
            .finish()
    }
}

/// Per-accessory state store.
#[derive(Debug)]
pub struct AccessoryStateStore {
    identity: AccessoryIdentity,
    record: RwLock<AccessoryRecord>,
}

impl AccessoryStateStore {
    /// Create a store with default state for `identity`.
    pub fn new(identity: AccessoryIdentity) -> Self {
        Self {
            identity,
            record: RwLock::new(AccessoryRecord::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AccessoryRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccessoryRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accessory identity.
    pub fn identity(&self) -> &AccessoryIdentity {
        &self.identity
    }

    /// Current facets and battery. Never blocks on I/O.
    pub fn read_current_state(&self) -> AccessoryState {
        self.read().state
    }

    /// Accessory information with the last known revisions.
    pub fn information(&self) -> AccessoryInformation {
        let mut info = AccessoryInformation::for_identity(&self.identity);
        if let Some(config) = &self.read().information {
            info.apply_config(config);
        }
        info
    }

    /// Attached lock handle, if any.
    pub fn device(&self) -> Option<SharedLock> {
        self.read().device.clone()
    }

    /// Whether a lock handle is attached.
    pub fn is_attached(&self) -> bool {
        self.read().device.is_some()
    }

    /// Attach a lock handle.
    pub fn attach(&self, device: SharedLock) {
        self.write().device = Some(device);
    }

    /// Drop the lock handle.
    pub fn detach(&self) -> Option<SharedLock> {
        self.write().device.take()
    }

    /// Whether the lock was found without stored configuration.
    pub fn config_missing(&self) -> bool {
        self.read().config_missing
    }

    /// Remember that the lock has no stored configuration.
    pub fn mark_config_missing(&self) {
        self.write().config_missing = true;
    }

    /// Mutate the state and return the characteristics that changed.
    pub fn update<F>(&self, f: F) -> Vec<CharacteristicValue>
    where
        F: FnOnce(&mut AccessoryState),
    {
        let mut record = self.write();
        let before = record.state;
        f(&mut record.state);
        record.state.changes_since(&before)
    }

    /// Store device revisions. Returns `true` if they changed.
    pub fn set_config(&self, config: LockConfig) -> bool {
        let mut record = self.write();
        let changed = record.information.as_ref().is_none_or(|old| {
            old.firmware_revision != config.firmware_revision
                || old.hardware_revision != config.hardware_revision
        });
        record.information = Some(config);
        changed
    }
}
