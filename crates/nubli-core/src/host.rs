//! The accessory host boundary.
//!
//! The host framework sees each configured lock as a [`LockAccessory`]: one
//! typed getter per characteristic plus the two target setters. The engine
//! pushes unsolicited changes back through [`AccessoryHost`].

use std::sync::Arc;

use async_trait::async_trait;

use nubli_types::{
    AccessoryIdentity, AccessoryInformation, ChargingState, CharacteristicValue, LockCurrentState,
    LockTargetState,
};

use crate::error::CommandError;

/// One accessory as seen by the host.
///
/// Getters never perform I/O.
#[async_trait]
pub trait LockAccessory: Send + Sync {
    fn identity(&self) -> &AccessoryIdentity;
    fn information(&self) -> AccessoryInformation;

    fn lock_current_state(&self) -> LockCurrentState;
    fn lock_target_state(&self) -> LockTargetState;
    fn latch_current_state(&self) -> LockCurrentState;
    fn latch_target_state(&self) -> LockTargetState;

    fn battery_level(&self) -> u8;
    fn charging_state(&self) -> ChargingState;
    fn status_low_battery(&self) -> bool;

    /// Drive the bolt lock to `target`.
    async fn set_lock_target_state(&self, target: LockTargetState) -> Result<(), CommandError>;

    /// Drive the latch to `target`. Only `Unsecured` is accepted.
    async fn set_latch_target_state(&self, target: LockTargetState) -> Result<(), CommandError>;
}

/// Shared accessory reference handed to the host.
pub type SharedAccessory = Arc<dyn LockAccessory>;

/// The host accessory framework.
pub trait AccessoryHost: Send + Sync {
    /// Register an accessory and its characteristics.
    fn register(&self, accessory: SharedAccessory);

    /// Push a characteristic value that changed outside a direct get.
    fn update_value(&self, identity: &AccessoryIdentity, value: CharacteristicValue);

    /// Push updated accessory information.
    fn update_information(&self, identity: &AccessoryIdentity, information: &AccessoryInformation);
}
