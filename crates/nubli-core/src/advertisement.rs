//! Key-turner beacon parsing.
//!
//! A Nuki lock advertises an iBeacon under Apple's company id whose
//! proximity UUID is the key-turner service UUID. The lowest bit of the
//! measured-power byte flips when the lock's activity log changes, which is
//! how state changes are noticed without a connection.
//!
//! Manufacturer data layout (after the company id):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | Beacon type (`0x02`) |
//! | 1 | 1 | Payload length (`0x15`) |
//! | 2 | 16 | Proximity UUID |
//! | 18 | 2 | Major (big endian) |
//! | 20 | 2 | Minor (big endian) |
//! | 22 | 1 | Measured power |

use bytes::Buf;
use uuid::Uuid;

use nubli_types::uuid::BEACON_PROXIMITY_UUID;

use crate::error::{Error, Result};

/// iBeacon type byte.
const BEACON_TYPE: u8 = 0x02;

/// iBeacon payload length byte.
const BEACON_LENGTH: u8 = 0x15;

/// Size of an iBeacon manufacturer payload.
pub const BEACON_BYTES: usize = 23;

/// A parsed iBeacon advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconAdvertisement {
    pub proximity_uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub measured_power: u8,
}

impl BeaconAdvertisement {
    /// Whether this beacon belongs to a Nuki key-turner.
    pub fn is_keyturner(&self) -> bool {
        self.proximity_uuid == BEACON_PROXIMITY_UUID
    }

    /// The activity flag carried in the measured-power byte.
    pub fn activity_flag(&self) -> bool {
        self.measured_power & 0x01 != 0
    }
}

/// Parse an iBeacon from Apple manufacturer data.
pub fn parse_beacon(data: &[u8]) -> Result<BeaconAdvertisement> {
    if data.len() < BEACON_BYTES {
        return Err(Error::InvalidData(format!(
            "Beacon requires {BEACON_BYTES} bytes, got {}",
            data.len()
        )));
    }

    let mut buf = data;
    let beacon_type = buf.get_u8();
    let length = buf.get_u8();
    if beacon_type != BEACON_TYPE || length != BEACON_LENGTH {
        return Err(Error::InvalidData(format!(
            "Not an iBeacon: type 0x{beacon_type:02X}, length 0x{length:02X}"
        )));
    }

    let mut uuid = [0u8; 16];
    buf.copy_to_slice(&mut uuid);
    let major = buf.get_u16();
    let minor = buf.get_u16();
    let measured_power = buf.get_u8();

    Ok(BeaconAdvertisement {
        proximity_uuid: Uuid::from_bytes(uuid),
        major,
        minor,
        measured_power,
    })
}

/// Tracks the activity flag of one lock and reports rising edges.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivityTracker {
    last: Option<bool>,
}

impl ActivityTracker {
    /// Record a flag value. Returns `true` on a `false` → `true` change.
    ///
    /// The first value seen only sets the baseline.
    pub fn update(&mut self, flag: bool) -> bool {
        let rising = self.last == Some(false) && flag;
        self.last = Some(flag);
        rising
    }
}
