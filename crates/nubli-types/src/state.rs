//! Raw device-side state reported by a Nuki smart lock.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Composite lock-mechanism state as reported by the device.
///
/// The device folds bolt position, latch activity and motor health into a
/// single byte. [`crate::codec::decode`] splits it into the two external facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum LockState {
    /// Lock has never been calibrated.
    Uncalibrated = 0x00,
    /// Bolt is thrown.
    Locked = 0x01,
    /// Bolt is being retracted.
    Unlocking = 0x02,
    /// Bolt is retracted.
    Unlocked = 0x03,
    /// Bolt is being thrown.
    Locking = 0x04,
    /// Latch has been pulled and released.
    Unlatched = 0x05,
    /// Unlocked with lock 'n' go armed (relocks after a timeout).
    UnlockedLockNGo = 0x06,
    /// Latch is being pulled.
    Unlatching = 0x07,
    /// Calibration run in progress.
    Calibration = 0xFC,
    /// Device is booting.
    BootRun = 0xFD,
    /// Motor could not complete its movement.
    MotorBlocked = 0xFE,
    /// Device reported no meaningful state.
    Undefined = 0xFF,
}

impl LockState {
    /// All states in raw byte order.
    pub const ALL: [LockState; 12] = [
        LockState::Uncalibrated,
        LockState::Locked,
        LockState::Unlocking,
        LockState::Unlocked,
        LockState::Locking,
        LockState::Unlatched,
        LockState::UnlockedLockNGo,
        LockState::Unlatching,
        LockState::Calibration,
        LockState::BootRun,
        LockState::MotorBlocked,
        LockState::Undefined,
    ];

    /// Whether the state says anything about where the user wants the bolt.
    ///
    /// Transitional and settled bolt states do; boot, calibration and
    /// motor faults only describe the mechanism.
    #[must_use]
    pub fn carries_intent(self) -> bool {
        !matches!(
            self,
            LockState::Uncalibrated
                | LockState::Calibration
                | LockState::BootRun
                | LockState::MotorBlocked
                | LockState::Undefined
        )
    }
}

impl TryFrom<u8> for LockState {
    type Error = ParseError;

    /// Convert a raw status byte to a `LockState`.
    ///
    /// # Examples
    ///
    /// ```
    /// use nubli_types::LockState;
    ///
    /// assert_eq!(LockState::try_from(0x01), Ok(LockState::Locked));
    /// assert_eq!(LockState::try_from(0xFE), Ok(LockState::MotorBlocked));
    /// assert!(LockState::try_from(0x08).is_err());
    /// ```
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(LockState::Uncalibrated),
            0x01 => Ok(LockState::Locked),
            0x02 => Ok(LockState::Unlocking),
            0x03 => Ok(LockState::Unlocked),
            0x04 => Ok(LockState::Locking),
            0x05 => Ok(LockState::Unlatched),
            0x06 => Ok(LockState::UnlockedLockNGo),
            0x07 => Ok(LockState::Unlatching),
            0xFC => Ok(LockState::Calibration),
            0xFD => Ok(LockState::BootRun),
            0xFE => Ok(LockState::MotorBlocked),
            0xFF => Ok(LockState::Undefined),
            _ => Err(ParseError::UnknownLockState(value)),
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Uncalibrated => "uncalibrated",
            LockState::Locked => "locked",
            LockState::Unlocking => "unlocking",
            LockState::Unlocked => "unlocked",
            LockState::Locking => "locking",
            LockState::Unlatched => "unlatched",
            LockState::UnlockedLockNGo => "unlocked (lock 'n' go)",
            LockState::Unlatching => "unlatching",
            LockState::Calibration => "calibration",
            LockState::BootRun => "boot run",
            LockState::MotorBlocked => "motor blocked",
            LockState::Undefined => "undefined",
        };
        write!(f, "{name}")
    }
}

/// Door sensor state as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum DoorSensorState {
    /// No door sensor is paired.
    #[default]
    Unavailable = 0x00,
    /// Sensor is paired but switched off.
    Deactivated = 0x01,
    /// Door is closed.
    DoorClosed = 0x02,
    /// Door is open.
    DoorOpened = 0x03,
    /// Sensor is active but cannot tell.
    DoorStateUnknown = 0x04,
    /// Sensor calibration in progress.
    Calibrating = 0x05,
}

impl DoorSensorState {
    /// All states in raw byte order.
    pub const ALL: [DoorSensorState; 6] = [
        DoorSensorState::Unavailable,
        DoorSensorState::Deactivated,
        DoorSensorState::DoorClosed,
        DoorSensorState::DoorOpened,
        DoorSensorState::DoorStateUnknown,
        DoorSensorState::Calibrating,
    ];
}

impl TryFrom<u8> for DoorSensorState {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(DoorSensorState::Unavailable),
            0x01 => Ok(DoorSensorState::Deactivated),
            0x02 => Ok(DoorSensorState::DoorClosed),
            0x03 => Ok(DoorSensorState::DoorOpened),
            0x04 => Ok(DoorSensorState::DoorStateUnknown),
            0x05 => Ok(DoorSensorState::Calibrating),
            _ => Err(ParseError::UnknownDoorSensorState(value)),
        }
    }
}

impl fmt::Display for DoorSensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DoorSensorState::Unavailable => "unavailable",
            DoorSensorState::Deactivated => "deactivated",
            DoorSensorState::DoorClosed => "closed",
            DoorSensorState::DoorOpened => "open",
            DoorSensorState::DoorStateUnknown => "unknown",
            DoorSensorState::Calibrating => "calibrating",
        };
        write!(f, "{name}")
    }
}

/// Action the key-turner can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum LockAction {
    /// Retract the bolt.
    Unlock = 0x01,
    /// Throw the bolt.
    Lock = 0x02,
    /// Retract the bolt and pull the latch.
    Unlatch = 0x03,
}

impl TryFrom<u8> for LockAction {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(LockAction::Unlock),
            0x02 => Ok(LockAction::Lock),
            0x03 => Ok(LockAction::Unlatch),
            _ => Err(ParseError::UnknownLockAction(value)),
        }
    }
}

impl From<LockAction> for u8 {
    fn from(action: LockAction) -> u8 {
        action as u8
    }
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockAction::Unlock => write!(f, "unlock"),
            LockAction::Lock => write!(f, "lock"),
            LockAction::Unlatch => write!(f, "unlatch"),
        }
    }
}

/// Minimum size of a decrypted key-turner states payload.
pub const MIN_KEYTURNER_STATES_BYTES: usize = 19;

/// Raw status read from the device.
///
/// Produced by every state read and every command acknowledgement and
/// consumed immediately by [`crate::codec::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSnapshot {
    /// Composite lock-mechanism state.
    pub lock_state: LockState,
    /// Door sensor state.
    pub door_sensor: DoorSensorState,
    /// Battery reached the critical threshold.
    pub battery_critical: bool,
}

impl DeviceSnapshot {
    /// Create a snapshot with the battery flag cleared.
    #[must_use]
    pub fn new(lock_state: LockState, door_sensor: DoorSensorState) -> Self {
        Self {
            lock_state,
            door_sensor,
            battery_critical: false,
        }
    }

    /// Set the battery-critical flag.
    #[must_use]
    pub fn with_battery_critical(mut self, critical: bool) -> Self {
        self.battery_critical = critical;
        self
    }

    /// Parse a decrypted key-turner states payload (command `0x000C`).
    ///
    /// Layout: nuki state (1), lock state (1), trigger (1), current time (7),
    /// timezone offset (2), critical battery state (1), config update count (1),
    /// lock 'n' go timer (1), last lock action (1), last action trigger (1),
    /// last action completion status (1), door sensor state (1).
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` holds fewer than
    /// [`MIN_KEYTURNER_STATES_BYTES`] bytes, or an unknown-state error if the
    /// lock or door sensor byte is outside the documented range.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_keyturner_states(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < MIN_KEYTURNER_STATES_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_KEYTURNER_STATES_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let _nuki_state = buf.get_u8();
        let lock_state = LockState::try_from(buf.get_u8())?;
        // trigger, time and timezone offset
        buf.advance(1 + 7 + 2);
        let battery = buf.get_u8();
        // config count, lock 'n' go timer, last action, its trigger and status
        buf.advance(5);
        let door_sensor = DoorSensorState::try_from(buf.get_u8())?;

        Ok(DeviceSnapshot {
            lock_state,
            door_sensor,
            battery_critical: battery & 0x01 != 0,
        })
    }
}

/// Device configuration details returned by a config read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LockConfig {
    /// Device name stored on the lock.
    pub name: String,
    /// Firmware revision, e.g. `"2.8.15"`.
    pub firmware_revision: String,
    /// Hardware revision, e.g. `"2.3"`.
    pub hardware_revision: String,
}

impl LockConfig {
    /// Format a revision from its dotted components.
    #[must_use]
    pub fn format_revision(parts: &[u8]) -> String {
        parts
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}
