//! The bridge service.
//!
//! Wires a [`LockTransport`] and an [`AccessoryHost`] to the platform
//! registry: accessories are registered up front, then discovery starts
//! once the adapter is ready and runs until shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use nubli_core::{
    AccessoryHost, AdapterReadinessLoop, ConnectionLifecycleManager, LockTransport,
    PlatformRegistry, ReadinessPhase,
};

use crate::config::{Config, ConfigError};

/// A running bridge between locks and an accessory host.
pub struct Bridge<T: ?Sized> {
    registry: Arc<PlatformRegistry>,
    readiness: AdapterReadinessLoop<T>,
    shutdown: CancellationToken,
}

impl<T: ?Sized> std::fmt::Debug for Bridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("accessories", &self.registry.engines().len())
            .field("readiness", &self.readiness)
            .finish()
    }
}

impl<T: LockTransport + ?Sized> Bridge<T> {
    /// Validate `config`, build one accessory per lock and register them
    /// all with `host`.
    pub fn new(
        config: &Config,
        transport: Arc<T>,
        host: Arc<dyn AccessoryHost>,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(PlatformRegistry::new(
            config.identities(),
            ConnectionLifecycleManager::new(config.credentials_dir()),
            Arc::clone(&host),
            shutdown.clone(),
        ));
        registry.register_all(host.as_ref());

        let readiness =
            AdapterReadinessLoop::new(transport).with_retry_interval(config.adapter_retry());

        Ok(Self {
            registry,
            readiness,
            shutdown,
        })
    }

    /// The accessory registry.
    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    /// Current readiness phase.
    pub fn phase(&self) -> ReadinessPhase {
        self.readiness.phase()
    }

    /// Token that stops the bridge when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for the adapter, then route discoveries until shutdown.
    pub async fn run(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = async {
                let discoveries = self.readiness.start().await;
                self.registry.run(discoveries).await;
            } => {}
        }
        info!("Bridge stopped");
    }

    /// Run until Ctrl-C or shutdown.
    pub async fn run_until_ctrl_c(&self) {
        let shutdown = self.shutdown.clone();
        let ctrl_c = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("Received Ctrl-C, shutting down");
                    }
                    shutdown.cancel();
                }
            }
        });
        self.run().await;
        ctrl_c.abort();
    }
}
