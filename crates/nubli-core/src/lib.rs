//! State reconciliation engine and BLE transport for Nuki smart locks.
//!
//! This crate keeps a HomeKit-style accessory (a bolt lock, a door latch and
//! a battery) consistent with a Nuki key-turner that is only reachable over
//! an intermittent Bluetooth Low Energy link.
//!
//! # Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`AdapterReadinessLoop`] | Waits for the adapter, retrying every 60 seconds, then starts discovery |
//! | [`PlatformRegistry`] | One [`ReconciliationEngine`] per configured lock, routes discovered handles |
//! | [`ReconciliationEngine`] | Attach cycles, lock event handling, user commands |
//! | [`ConnectionLifecycleManager`] | Load credentials, read state and config, always disconnect |
//! | [`AccessoryStateStore`] | Cached facets, read without touching the device |
//! | [`StaleWatchdog`] | Marks locks stale when their advertisements stop |
//! | [`BleTransport`] | btleplug discovery, beacon activity detection |
//!
//! Whenever the lock cannot be reached the exposed current states fall back
//! to `Unknown`. A confident `Secured` or `Unsecured` is only ever the
//! result of a successful read.
//!
//! # Platform Differences
//!
//! On Linux and Windows a lock is identified by its Bluetooth address
//! without separators (`54d2720def0a`). On macOS CoreBluetooth hides the
//! address and the peripheral UUID is used instead, so credential files
//! written on another machine must be renamed.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nubli_core::mock::{MockHost, MockTransport};
//! use nubli_core::{
//!     AccessoryIdentity, AdapterReadinessLoop, ConnectionLifecycleManager, PlatformRegistry,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let host = Arc::new(MockHost::new());
//!     let registry = PlatformRegistry::new(
//!         vec![AccessoryIdentity::new("54d2720def0a", "Front Door")],
//!         ConnectionLifecycleManager::default(),
//!         host.clone(),
//!         CancellationToken::new(),
//!     );
//!     registry.register_all(host.as_ref());
//!
//!     let readiness = AdapterReadinessLoop::new(Arc::new(MockTransport::new()));
//!     let discoveries = readiness.start().await;
//!     registry.run(discoveries).await;
//! }
//! ```

pub mod advertisement;
pub mod credentials;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod lifecycle;
pub mod mock;
pub mod readiness;
pub mod registry;
pub mod scan;
pub mod store;
pub mod traits;
pub mod transport;
pub mod util;
pub mod watchdog;

// Re-export types
pub use nubli_types::uuid;

// Core exports
pub use advertisement::{ActivityTracker, BeaconAdvertisement, parse_beacon};
pub use credentials::{CredentialStore, LockCredentials, default_credentials_dir};
pub use device::{BleSmartLock, ConnectionConfig, KeyturnerProtocol};
pub use engine::ReconciliationEngine;
pub use error::{AttachError, CommandError, Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, LockEvent};
pub use host::{AccessoryHost, LockAccessory, SharedAccessory};
pub use lifecycle::{AttachOutcome, ConnectionLifecycleManager};
pub use readiness::{ADAPTER_RETRY_INTERVAL, AdapterReadinessLoop, ReadinessPhase};
pub use registry::PlatformRegistry;
pub use scan::{DiscoveredLock, ScanOptions, get_adapter, scan_for_locks};
pub use store::AccessoryStateStore;
pub use traits::{AdapterReadiness, DiscoveryStream, LockTransport, SharedLock, SmartLock};
pub use transport::BleTransport;
pub use util::{lock_identifier, normalize_address};
pub use watchdog::{DEFAULT_STALE_TIMEOUT, StaleWatchdog};

// Re-export from nubli-types
pub use nubli_types::{
    AccessoryIdentity, AccessoryInformation, AccessoryState, BatteryStatus, CharacteristicValue,
    ChargingState, DeviceSnapshot, DoorSensorState, LockAction, LockConfig, LockCurrentState,
    LockFacet, LockState, LockTargetState,
};
