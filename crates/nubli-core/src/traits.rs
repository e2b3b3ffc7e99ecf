//! Trait abstractions for lock and transport operations.
//!
//! [`SmartLock`] is a handle to one physical lock. [`LockTransport`] finds
//! locks and reports whether the Bluetooth adapter can be used. Both are
//! implemented by the btleplug transport and by the mocks in [`crate::mock`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use nubli_types::{DeviceSnapshot, LockAction, LockConfig};

use crate::error::Result;
use crate::events::EventReceiver;

/// Handle to a discovered smart lock.
///
/// Every operation opens the connection on demand; callers release it with
/// [`disconnect`](SmartLock::disconnect) once a cycle is complete.
///
/// # Example
///
/// ```ignore
/// use nubli_core::{SmartLock, Result};
///
/// async fn print_state<L: SmartLock + ?Sized>(lock: &L) -> Result<()> {
///     let snapshot = lock.read_lock_state().await?;
///     println!("{}: {}", lock.id(), snapshot.lock_state);
///     lock.disconnect().await
/// }
/// ```
#[async_trait]
pub trait SmartLock: Send + Sync {
    /// Lock identifier (BLE address without separators, lower case).
    fn id(&self) -> &str;

    /// Whether pairing credentials for this lock exist in `dir`.
    fn has_stored_config(&self, dir: &Path) -> bool;

    /// Load the pairing credentials for this lock from `dir`.
    async fn load_config(&self, dir: &Path) -> Result<()>;

    /// Read the current key-turner state.
    async fn read_lock_state(&self) -> Result<DeviceSnapshot>;

    /// Read the device configuration.
    async fn read_config(&self) -> Result<LockConfig>;

    /// Release the connection, if one is open.
    async fn disconnect(&self) -> Result<()>;

    /// Perform a lock action and return the state the lock acknowledged with.
    async fn execute(&self, action: LockAction) -> Result<DeviceSnapshot>;

    /// Throw the bolt.
    async fn lock(&self) -> Result<DeviceSnapshot> {
        self.execute(LockAction::Lock).await
    }

    /// Retract the bolt.
    async fn unlock(&self) -> Result<DeviceSnapshot> {
        self.execute(LockAction::Unlock).await
    }

    /// Retract the bolt and pull the latch.
    async fn unlatch(&self) -> Result<DeviceSnapshot> {
        self.execute(LockAction::Unlatch).await
    }

    /// Subscribe to activity, stale and recovery events.
    fn subscribe(&self) -> EventReceiver;
}

/// Shared lock handle.
pub type SharedLock = Arc<dyn SmartLock>;

/// Infinite stream of discovered locks.
pub type DiscoveryStream = BoxStream<'static, SharedLock>;

/// Something that can tell when the Bluetooth adapter is usable.
#[async_trait]
pub trait AdapterReadiness: Send + Sync {
    /// Wait once for the adapter to become ready.
    ///
    /// Fails with [`crate::Error::AdapterNotReady`] on timeout.
    async fn wait_for_adapter(&self) -> Result<()>;
}

/// A transport that discovers smart locks.
#[async_trait]
pub trait LockTransport: AdapterReadiness {
    /// Start scanning.
    ///
    /// The stream yields one handle per newly seen lock and is not
    /// restartable. A lock that reappears after going stale reports
    /// [`crate::LockEvent::StaleRecovered`] on its existing handle instead.
    /// A handle with no subscribers may be yielded again, which the engine
    /// treats as a fresh discovery.
    async fn discover(&self) -> Result<DiscoveryStream>;
}
