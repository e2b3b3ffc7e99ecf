//! Platform registry: one engine per configured accessory.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use nubli_types::AccessoryIdentity;

use crate::engine::ReconciliationEngine;
use crate::host::{AccessoryHost, SharedAccessory};
use crate::lifecycle::ConnectionLifecycleManager;
use crate::traits::{DiscoveryStream, SharedLock};

/// Owns the engines for every configured accessory and routes discoveries.
#[derive(Debug)]
pub struct PlatformRegistry {
    engines: Vec<Arc<ReconciliationEngine>>,
    shutdown: CancellationToken,
}

impl PlatformRegistry {
    /// Create one engine per identity, in the given order.
    pub fn new(
        accessories: impl IntoIterator<Item = AccessoryIdentity>,
        lifecycle: ConnectionLifecycleManager,
        host: Arc<dyn AccessoryHost>,
        shutdown: CancellationToken,
    ) -> Self {
        let engines = accessories
            .into_iter()
            .map(|identity| {
                info!("Initializing Smart Lock {} with UUID {}", identity.name, identity.id);
                Arc::new(ReconciliationEngine::new(
                    identity,
                    lifecycle.clone(),
                    Arc::clone(&host),
                    shutdown.child_token(),
                ))
            })
            .collect();
        Self { engines, shutdown }
    }

    /// All engines, in configuration order.
    pub fn engines(&self) -> &[Arc<ReconciliationEngine>] {
        &self.engines
    }

    /// All accessories, in configuration order.
    pub fn accessories(&self) -> Vec<SharedAccessory> {
        self.engines
            .iter()
            .map(|engine| Arc::clone(engine) as SharedAccessory)
            .collect()
    }

    /// Register every accessory with `host`.
    pub fn register_all(&self, host: &dyn AccessoryHost) {
        for accessory in self.accessories() {
            host.register(accessory);
        }
    }

    /// Find the engine for a lock identifier.
    pub fn find(&self, lock_id: &str) -> Option<&Arc<ReconciliationEngine>> {
        self.engines
            .iter()
            .find(|engine| engine.identity().matches(lock_id))
    }

    /// Route a discovered lock to its engine and wait for it to be handled.
    ///
    /// Returns `false` if no configured accessory matches.
    pub async fn on_discovered(&self, lock: SharedLock) -> bool {
        match self.find(lock.id()) {
            Some(engine) => {
                engine.on_discovered(lock).await;
                true
            }
            None => {
                debug!(lock = %lock.id(), "Discovered Smart Lock is not configured");
                false
            }
        }
    }

    /// Route a discovered lock to its engine without waiting.
    pub fn dispatch(&self, lock: SharedLock) -> Option<JoinHandle<()>> {
        let Some(engine) = self.find(lock.id()) else {
            debug!(lock = %lock.id(), "Discovered Smart Lock is not configured");
            return None;
        };
        let engine = Arc::clone(engine);
        Some(tokio::spawn(async move { engine.on_discovered(lock).await }))
    }

    /// Route every discovered lock until the stream ends or shutdown.
    ///
    /// Each discovery runs on its own task so a slow attach cycle on one
    /// accessory never delays another.
    pub async fn run(&self, mut discoveries: DiscoveryStream) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Platform registry shutting down");
                    break;
                }
                next = discoveries.next() => match next {
                    Some(lock) => {
                        self.dispatch(lock);
                    }
                    None => {
                        info!("Discovery stream ended");
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHost, MockSmartLock};

    fn registry(host: Arc<MockHost>) -> PlatformRegistry {
        PlatformRegistry::new(
            vec![
                AccessoryIdentity::new("aaaaaaaaaaaa", "Front Door"),
                AccessoryIdentity::new("bbbbbbbbbbbb", "Back Door"),
            ],
            ConnectionLifecycleManager::new(std::env::temp_dir().join("nubli-registry-none")),
            host,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_accessories_in_config_order() {
        let registry = registry(Arc::new(MockHost::new()));
        let names: Vec<String> = registry
            .accessories()
            .iter()
            .map(|a| a.identity().name.clone())
            .collect();
        assert_eq!(names, vec!["Front Door", "Back Door"]);
    }

    #[test]
    fn test_register_all() {
        let host = Arc::new(MockHost::new());
        let registry = registry(host.clone());
        registry.register_all(host.as_ref());
        assert_eq!(host.registered().len(), 2);
        assert_eq!(host.registered()[1].identity().id, "bbbbbbbbbbbb");
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let registry = registry(Arc::new(MockHost::new()));
        assert!(registry.find("AAAAAAAAAAAA").is_some());
        assert!(registry.find("aa:aa:aa:aa:aa:aa").is_some());
        assert!(registry.find("cccccccccccc").is_none());
    }

    #[tokio::test]
    async fn test_unmatched_discovery() {
        let registry = registry(Arc::new(MockHost::new()));
        let lock = Arc::new(MockSmartLock::new("cccccccccccc"));
        assert!(!registry.on_discovered(lock.clone()).await);
        assert!(registry.dispatch(lock.clone()).is_none());
        assert!(lock.operations().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let registry = PlatformRegistry::new(
            Vec::new(),
            ConnectionLifecycleManager::default(),
            Arc::new(MockHost::new()),
            shutdown.clone(),
        );
        shutdown.cancel();
        registry.run(futures::stream::pending().boxed()).await;
    }
}
