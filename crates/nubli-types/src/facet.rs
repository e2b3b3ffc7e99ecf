//! Externally visible lock facets and battery status.
//!
//! The accessory exposes two independently lockable facets (bolt lock and
//! latch). Each one is a `current`/`target` pair using the HomeKit lock
//! characteristic values.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Current position of a facet, as last confirmed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum LockCurrentState {
    /// Facet is open.
    Unsecured = 0,
    /// Facet is closed.
    Secured = 1,
    /// Mechanism is blocked.
    Jammed = 2,
    /// Position cannot be determined.
    #[default]
    Unknown = 3,
}

impl LockCurrentState {
    /// Whether this is a confirmed open/closed position.
    #[must_use]
    pub fn is_confirmed(self) -> bool {
        matches!(self, LockCurrentState::Secured | LockCurrentState::Unsecured)
    }
}

impl From<LockCurrentState> for u8 {
    fn from(state: LockCurrentState) -> u8 {
        state as u8
    }
}

impl fmt::Display for LockCurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockCurrentState::Unsecured => write!(f, "Unsecured"),
            LockCurrentState::Secured => write!(f, "Secured"),
            LockCurrentState::Jammed => write!(f, "Jammed"),
            LockCurrentState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Desired position of a facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum LockTargetState {
    /// Open.
    #[default]
    Unsecured = 0,
    /// Closed.
    Secured = 1,
}

impl From<LockTargetState> for u8 {
    fn from(state: LockTargetState) -> u8 {
        state as u8
    }
}

impl fmt::Display for LockTargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTargetState::Unsecured => write!(f, "Unsecured"),
            LockTargetState::Secured => write!(f, "Secured"),
        }
    }
}

/// One decoded observation of a facet.
///
/// `target` is `None` when the device state carries no intent; applying such
/// an observation keeps the previously known target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetObservation {
    /// Observed position.
    pub current: LockCurrentState,
    /// Inferred intent, if any.
    pub target: Option<LockTargetState>,
}

impl FacetObservation {
    /// Observation that fixes both position and intent.
    #[must_use]
    pub const fn settled(current: LockCurrentState, target: LockTargetState) -> Self {
        Self {
            current,
            target: Some(target),
        }
    }

    /// Observation of position only.
    #[must_use]
    pub const fn current_only(current: LockCurrentState) -> Self {
        Self {
            current,
            target: None,
        }
    }
}

/// Externally exposed state of a single lockable facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LockFacet {
    /// Last confirmed position.
    pub current: LockCurrentState,
    /// Last commanded or inferred intent.
    pub target: LockTargetState,
}

impl LockFacet {
    /// Create a facet with explicit values.
    #[must_use]
    pub const fn new(current: LockCurrentState, target: LockTargetState) -> Self {
        Self { current, target }
    }

    /// Apply a decoded observation, keeping the target when it carries none.
    pub fn apply(&mut self, observation: FacetObservation) {
        self.current = observation.current;
        if let Some(target) = observation.target {
            self.target = target;
        }
    }

    /// Drop the current position to `Unknown`, leaving the target alone.
    pub fn mark_unknown(&mut self) {
        self.current = LockCurrentState::Unknown;
    }
}

impl fmt::Display for LockFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.current, self.target)
    }
}

/// Charging state characteristic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ChargingState {
    /// Not charging.
    NotCharging = 0,
    /// Charging.
    Charging = 1,
    /// Battery cannot be charged.
    #[default]
    NotChargeable = 2,
}

impl From<ChargingState> for u8 {
    fn from(state: ChargingState) -> u8 {
        state as u8
    }
}

/// Battery status exposed alongside the lock facets.
///
/// The lock only reports a critical flag, so `level` and `charging` are
/// fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatteryStatus {
    /// Battery level percentage.
    pub level: u8,
    /// Charging state.
    pub charging: ChargingState,
    /// Battery is low.
    pub low_battery: bool,
}

impl BatteryStatus {
    /// Reported battery level.
    pub const LEVEL: u8 = 100;

    /// Battery status for the given critical flag.
    #[must_use]
    pub const fn from_critical(critical: bool) -> Self {
        Self {
            level: Self::LEVEL,
            charging: ChargingState::NotChargeable,
            low_battery: critical,
        }
    }

    /// `StatusLowBattery` characteristic value (0 normal, 1 low).
    #[must_use]
    pub fn low_battery_value(&self) -> u8 {
        u8::from(self.low_battery)
    }
}

impl Default for BatteryStatus {
    fn default() -> Self {
        Self::from_critical(false)
    }
}
