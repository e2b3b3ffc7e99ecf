//! Accessory-level types shared between the engine and the host.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::facet::{BatteryStatus, ChargingState, LockCurrentState, LockFacet, LockTargetState};
use crate::state::LockConfig;

/// Manufacturer reported in the accessory information.
pub const MANUFACTURER: &str = "Nubli";

/// Model reported in the accessory information.
pub const MODEL: &str = "Nuki Smart Lock v2.0";

/// Revision reported before the first successful config read.
pub const UNKNOWN_REVISION: &str = "Unknown";

/// Stable identity of a configured accessory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessoryIdentity {
    /// Lock identifier (the lock's BLE address without separators).
    pub id: String,
    /// Display name.
    pub name: String,
}

impl AccessoryIdentity {
    /// Create a new identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Whether a discovered lock identifier refers to this accessory.
    ///
    /// Comparison ignores ASCII case and `:` separators, so
    /// `"54:D2:72:0D:EF:0A"` matches `"54d2720def0a"`.
    #[must_use]
    pub fn matches(&self, lock_id: &str) -> bool {
        let normalize = |s: &str| -> String {
            s.chars()
                .filter(|c| *c != ':')
                .map(|c| c.to_ascii_lowercase())
                .collect()
        };
        normalize(&self.id) == normalize(lock_id)
    }
}

impl fmt::Display for AccessoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Accessory information service contents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessoryInformation {
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub serial_number: String,
    pub firmware_revision: String,
    pub hardware_revision: String,
}

impl AccessoryInformation {
    /// Information for an accessory whose config has not been read yet.
    #[must_use]
    pub fn for_identity(identity: &AccessoryIdentity) -> Self {
        Self {
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            name: identity.name.clone(),
            serial_number: identity.id.clone(),
            firmware_revision: UNKNOWN_REVISION.to_string(),
            hardware_revision: UNKNOWN_REVISION.to_string(),
        }
    }

    /// Take the revisions from a device config read.
    ///
    /// Returns `true` if anything changed.
    pub fn apply_config(&mut self, config: &LockConfig) -> bool {
        let changed = self.firmware_revision != config.firmware_revision
            || self.hardware_revision != config.hardware_revision;
        self.firmware_revision.clone_from(&config.firmware_revision);
        self.hardware_revision.clone_from(&config.hardware_revision);
        changed
    }
}

/// Snapshot of everything the host can query for one accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessoryState {
    /// Bolt lock facet.
    pub lock: LockFacet,
    /// Latch facet.
    pub latch: LockFacet,
    /// Battery status.
    pub battery: BatteryStatus,
}

impl AccessoryState {
    /// Every characteristic value of this state, in registration order.
    #[must_use]
    pub fn characteristics(&self) -> [CharacteristicValue; 7] {
        [
            CharacteristicValue::LockCurrentState(self.lock.current),
            CharacteristicValue::LockTargetState(self.lock.target),
            CharacteristicValue::LatchCurrentState(self.latch.current),
            CharacteristicValue::LatchTargetState(self.latch.target),
            CharacteristicValue::BatteryLevel(self.battery.level),
            CharacteristicValue::ChargingState(self.battery.charging),
            CharacteristicValue::StatusLowBattery(self.battery.low_battery),
        ]
    }

    /// Characteristic values that differ from `previous`.
    pub fn changes_since(&self, previous: &AccessoryState) -> Vec<CharacteristicValue> {
        self.characteristics()
            .into_iter()
            .zip(previous.characteristics())
            .filter(|(now, before)| now != before)
            .map(|(now, _)| now)
            .collect()
    }
}

/// A typed value for one exposed characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CharacteristicValue {
    LockCurrentState(LockCurrentState),
    LockTargetState(LockTargetState),
    LatchCurrentState(LockCurrentState),
    LatchTargetState(LockTargetState),
    BatteryLevel(u8),
    ChargingState(ChargingState),
    StatusLowBattery(bool),
}

impl CharacteristicValue {
    /// Characteristic name as shown by the host.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CharacteristicValue::LockCurrentState(_) => "Lock Current State",
            CharacteristicValue::LockTargetState(_) => "Lock Target State",
            CharacteristicValue::LatchCurrentState(_) => "Latch Current State",
            CharacteristicValue::LatchTargetState(_) => "Latch Target State",
            CharacteristicValue::BatteryLevel(_) => "Battery Level",
            CharacteristicValue::ChargingState(_) => "Charging State",
            CharacteristicValue::StatusLowBattery(_) => "Status Low Battery",
        }
    }

    /// Raw characteristic value.
    #[must_use]
    pub fn raw(&self) -> u8 {
        match *self {
            CharacteristicValue::LockCurrentState(v) | CharacteristicValue::LatchCurrentState(v) => {
                v.into()
            }
            CharacteristicValue::LockTargetState(v) | CharacteristicValue::LatchTargetState(v) => {
                v.into()
            }
            CharacteristicValue::BatteryLevel(v) => v,
            CharacteristicValue::ChargingState(v) => v.into(),
            CharacteristicValue::StatusLowBattery(v) => u8::from(v),
        }
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicValue::LockCurrentState(v) | CharacteristicValue::LatchCurrentState(v) => {
                write!(f, "{}: {v}", self.name())
            }
            CharacteristicValue::LockTargetState(v) | CharacteristicValue::LatchTargetState(v) => {
                write!(f, "{}: {v}", self.name())
            }
            _ => write!(f, "{}: {}", self.name(), self.raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matches() {
        let identity = AccessoryIdentity::new("54d2720def0a", "Front Door");
        assert!(identity.matches("54D2720DEF0A"));
        assert!(identity.matches("54:d2:72:0d:ef:0a"));
        assert!(!identity.matches("54d2720def0b"));
    }

    #[test]
    fn test_information_defaults() {
        let identity = AccessoryIdentity::new("abc", "Back Door");
        let info = AccessoryInformation::for_identity(&identity);
        assert_eq!(info.manufacturer, "Nubli");
        assert_eq!(info.model, "Nuki Smart Lock v2.0");
        assert_eq!(info.serial_number, "abc");
        assert_eq!(info.firmware_revision, "Unknown");
        assert_eq!(info.hardware_revision, "Unknown");
    }

    #[test]
    fn test_information_apply_config() {
        let mut info = AccessoryInformation::for_identity(&AccessoryIdentity::new("a", "b"));
        let config = LockConfig {
            name: "Nuki".into(),
            firmware_revision: "2.8.15".into(),
            hardware_revision: "2.3".into(),
        };
        assert!(info.apply_config(&config));
        assert!(!info.apply_config(&config));
        assert_eq!(info.firmware_revision, "2.8.15");
    }

    #[test]
    fn test_characteristics_order_and_values() {
        let state = AccessoryState::default();
        let raw: Vec<u8> = state.characteristics().iter().map(|c| c.raw()).collect();
        assert_eq!(raw, vec![3, 0, 3, 0, 100, 2, 0]);
    }

    #[test]
    fn test_changes_since() {
        let before = AccessoryState::default();
        let mut after = before;
        after.lock = LockFacet::new(LockCurrentState::Secured, LockTargetState::Secured);
        let changes = after.changes_since(&before);
        assert_eq!(
            changes,
            vec![
                CharacteristicValue::LockCurrentState(LockCurrentState::Secured),
                CharacteristicValue::LockTargetState(LockTargetState::Secured),
            ]
        );
        assert!(after.changes_since(&after).is_empty());
    }

    #[test]
    fn test_characteristic_display() {
        let value = CharacteristicValue::LatchCurrentState(LockCurrentState::Jammed);
        assert_eq!(value.to_string(), "Latch Current State: Jammed");
        assert_eq!(
            CharacteristicValue::BatteryLevel(100).to_string(),
            "Battery Level: 100"
        );
    }
}
