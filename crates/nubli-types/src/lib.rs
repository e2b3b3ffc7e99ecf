//! Platform-agnostic types for Nuki smart locks.
//!
//! This crate holds the device-side state model, the two-facet accessory
//! model it is exposed through, and the pure codec between them. It does
//! no I/O and is shared by nubli-core and nubli-bridge.
//!
//! # Features
//!
//! - Raw lock and door-sensor states with byte conversions
//! - Lock/latch facets and battery status
//! - [`decode`], the snapshot-to-facet mapping
//! - UUID constants for BLE services
//!
//! # Example
//!
//! ```
//! use nubli_types::{decode, DeviceSnapshot, DoorSensorState, LockCurrentState, LockState};
//!
//! let snapshot = DeviceSnapshot::new(LockState::Locked, DoorSensorState::DoorClosed);
//! let decoded = decode(&snapshot);
//! assert_eq!(decoded.lock.current, LockCurrentState::Secured);
//! ```

pub mod accessory;
pub mod codec;
pub mod error;
pub mod facet;
pub mod state;
pub mod uuid;

pub use accessory::{
    AccessoryIdentity, AccessoryInformation, AccessoryState, CharacteristicValue, MANUFACTURER,
    MODEL, UNKNOWN_REVISION,
};
pub use codec::{DecodedState, decode};
pub use error::{ParseError, ParseResult};
pub use facet::{
    BatteryStatus, ChargingState, FacetObservation, LockCurrentState, LockFacet, LockTargetState,
};
pub use state::{DeviceSnapshot, DoorSensorState, LockAction, LockConfig, LockState};
pub use uuid as uuids;
