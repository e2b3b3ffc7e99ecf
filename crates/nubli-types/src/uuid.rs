//! Bluetooth UUIDs and identifiers for Nuki smart locks.
//!
//! This module contains the identifiers needed to recognize Nuki smart
//! locks in BLE advertisements and to address their GATT services.

use uuid::{Uuid, uuid};

// --- Nuki Service UUIDs ---

/// Pairing service, advertised while the lock is in pairing mode.
pub const PAIRING_SERVICE: Uuid = uuid!("a92ee100-5501-11e4-916c-0800200c9a66");

/// Key-turner service used for all encrypted lock operations.
pub const KEYTURNER_SERVICE: Uuid = uuid!("a92ee200-5501-11e4-916c-0800200c9a66");

// --- Key-turner Characteristic UUIDs ---

/// General data input/output characteristic.
pub const KEYTURNER_GDIO: Uuid = uuid!("a92ee201-5501-11e4-916c-0800200c9a66");

/// User-specific (encrypted) data input/output characteristic.
pub const KEYTURNER_USDIO: Uuid = uuid!("a92ee202-5501-11e4-916c-0800200c9a66");

// --- Advertisement ---

/// Proximity UUID carried in the lock's iBeacon advertisement.
pub const BEACON_PROXIMITY_UUID: Uuid = KEYTURNER_SERVICE;

/// Apple company identifier, the key of iBeacon manufacturer data.
pub const APPLE_COMPANY_ID: u16 = 0x004C;
