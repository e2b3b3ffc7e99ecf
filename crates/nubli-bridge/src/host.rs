//! Accessory host that reports to the log.
//!
//! Stands in for a HomeKit bridge: every registration and characteristic
//! push is written through `tracing`, and the registered accessories can be
//! listed afterwards.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use nubli_core::{
    AccessoryHost, AccessoryIdentity, AccessoryInformation, CharacteristicValue, SharedAccessory,
};

/// Host that logs every update.
#[derive(Default)]
pub struct TracingHost {
    accessories: Mutex<Vec<SharedAccessory>>,
}

impl std::fmt::Debug for TracingHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingHost")
            .field("accessories", &self.accessories().len())
            .finish()
    }
}

impl TracingHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered accessories, in registration order.
    pub fn accessories(&self) -> Vec<SharedAccessory> {
        self.accessories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AccessoryHost for TracingHost {
    fn register(&self, accessory: SharedAccessory) {
        let identity = accessory.identity();
        info!(lock = %identity.id, "Registered accessory {}", identity.name);
        self.accessories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(accessory);
    }

    fn update_value(&self, identity: &AccessoryIdentity, value: CharacteristicValue) {
        info!(
            lock = %identity.id,
            characteristic = value.name(),
            "{}: {}",
            identity.name,
            value
        );
    }

    fn update_information(&self, identity: &AccessoryIdentity, information: &AccessoryInformation) {
        info!(
            lock = %identity.id,
            firmware = %information.firmware_revision,
            hardware = %information.hardware_revision,
            "{}: accessory information updated",
            identity.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nubli_core::mock::MockHost;
    use nubli_core::{ConnectionLifecycleManager, PlatformRegistry};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_register_keeps_order() {
        let host = TracingHost::new();
        let registry = PlatformRegistry::new(
            vec![
                AccessoryIdentity::new("aaaaaaaaaaaa", "Front Door"),
                AccessoryIdentity::new("bbbbbbbbbbbb", "Back Door"),
            ],
            ConnectionLifecycleManager::default(),
            Arc::new(MockHost::new()),
            CancellationToken::new(),
        );
        registry.register_all(&host);

        let names: Vec<String> = host
            .accessories()
            .iter()
            .map(|a| a.identity().name.clone())
            .collect();
        assert_eq!(names, vec!["Front Door", "Back Door"]);
    }
}
