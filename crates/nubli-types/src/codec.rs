//! Translation from a device snapshot to the two-facet external model.
//!
//! [`decode`] is pure and total over [`LockState`] and [`DoorSensorState`].
//! The latch facet is resolved in three passes: the door sensor first, then
//! the composite states that carry latch information (`unlatching`,
//! `unlatched`), and finally an `unknown` door sensor, which always wins.

use crate::facet::{BatteryStatus, FacetObservation, LockCurrentState, LockFacet, LockTargetState};
use crate::state::{DeviceSnapshot, DoorSensorState, LockState};

use LockCurrentState as Current;
use LockTargetState as Target;

/// Result of decoding one [`DeviceSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedState {
    /// Bolt lock observation.
    pub lock: FacetObservation,
    /// Latch observation, `None` when the snapshot says nothing about it.
    pub latch: Option<FacetObservation>,
    /// Battery status.
    pub battery: BatteryStatus,
}

impl DecodedState {
    /// Write the observations into the cached facets.
    pub fn apply_to(&self, lock: &mut LockFacet, latch: &mut LockFacet) {
        lock.apply(self.lock);
        if let Some(observation) = self.latch {
            latch.apply(observation);
        }
    }
}

/// Decode a device snapshot into lock, latch and battery state.
///
/// # Examples
///
/// ```
/// use nubli_types::{decode, DeviceSnapshot, DoorSensorState, LockCurrentState, LockState};
///
/// let decoded = decode(&DeviceSnapshot::new(LockState::MotorBlocked, DoorSensorState::Unavailable));
/// assert_eq!(decoded.lock.current, LockCurrentState::Jammed);
/// assert_eq!(decoded.lock.target, None);
/// assert_eq!(decoded.latch, None);
/// ```
#[must_use]
pub fn decode(snapshot: &DeviceSnapshot) -> DecodedState {
    let mut latch = match snapshot.door_sensor {
        DoorSensorState::DoorOpened => Some(FacetObservation::settled(
            Current::Unsecured,
            Target::Unsecured,
        )),
        DoorSensorState::DoorClosed => {
            Some(FacetObservation::settled(Current::Secured, Target::Secured))
        }
        _ => None,
    };

    let lock = match snapshot.lock_state {
        LockState::Locked => FacetObservation::settled(Current::Secured, Target::Secured),
        LockState::Unlocking => FacetObservation::settled(Current::Secured, Target::Unsecured),
        LockState::Unlocked | LockState::UnlockedLockNGo => {
            FacetObservation::settled(Current::Unsecured, Target::Unsecured)
        }
        LockState::Locking => FacetObservation::settled(Current::Unsecured, Target::Secured),
        LockState::Unlatching => {
            latch = Some(FacetObservation::settled(Current::Secured, Target::Unsecured));
            FacetObservation::settled(Current::Unsecured, Target::Unsecured)
        }
        LockState::Unlatched => {
            latch = Some(FacetObservation::settled(
                Current::Unsecured,
                Target::Unsecured,
            ));
            FacetObservation::settled(Current::Unsecured, Target::Unsecured)
        }
        LockState::MotorBlocked => FacetObservation::current_only(Current::Jammed),
        LockState::Uncalibrated
        | LockState::Calibration
        | LockState::BootRun
        | LockState::Undefined => FacetObservation::current_only(Current::Unknown),
    };

    if snapshot.door_sensor == DoorSensorState::DoorStateUnknown {
        latch = Some(FacetObservation {
            current: Current::Unknown,
            target: latch.and_then(|observation| observation.target),
        });
    }

    DecodedState {
        lock,
        latch,
        battery: BatteryStatus::from_critical(snapshot.battery_critical),
    }
}
