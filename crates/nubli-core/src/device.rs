//! Smart lock handle over Bluetooth Low Energy.
//!
//! [`BleSmartLock`] owns the btleplug peripheral and the pairing
//! credentials. It connects on demand and leaves the encrypted key-turner
//! exchange to a [`KeyturnerProtocol`] implementation.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use nubli_types::{DeviceSnapshot, LockAction, LockConfig};

use crate::credentials::{CredentialStore, LockCredentials};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver};
use crate::traits::SmartLock;

/// Default timeout for connecting to a lock.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for one key-turner request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a lock action, which includes motor travel.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for BLE timeouts.
///
/// # Example
///
/// ```
/// use nubli_core::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .action_timeout(Duration::from_secs(45));
/// assert_eq!(config.request_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for connect plus service discovery.
    pub connection_timeout: Duration,
    /// Timeout for state and config requests.
    pub request_timeout: Duration,
    /// Timeout for lock actions.
    pub action_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the action timeout.
    #[must_use]
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }
}

/// The encrypted key-turner exchange.
///
/// Implementations run on an already connected peripheral and return
/// decrypted payloads. The key-turner states payload is decoded with
/// [`DeviceSnapshot::from_keyturner_states`].
#[async_trait]
pub trait KeyturnerProtocol: Send + Sync + 'static {
    /// Request the key-turner states.
    async fn read_states(
        &self,
        peripheral: &Peripheral,
        credentials: &LockCredentials,
    ) -> Result<Vec<u8>>;

    /// Request the lock's configuration.
    async fn read_config(
        &self,
        peripheral: &Peripheral,
        credentials: &LockCredentials,
    ) -> Result<LockConfig>;

    /// Perform an action and return the key-turner states sent on completion.
    async fn execute(
        &self,
        peripheral: &Peripheral,
        credentials: &LockCredentials,
        action: LockAction,
    ) -> Result<Vec<u8>>;
}

/// A Nuki lock reached over btleplug.
pub struct BleSmartLock<P: ?Sized> {
    id: String,
    peripheral: Peripheral,
    protocol: Arc<P>,
    config: ConnectionConfig,
    credentials: RwLock<Option<LockCredentials>>,
    events: EventDispatcher,
    /// Serializes connect, request and disconnect.
    session: Mutex<()>,
}

impl<P: KeyturnerProtocol + ?Sized> std::fmt::Debug for BleSmartLock<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleSmartLock")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("credentials_loaded", &self.has_credentials())
            .finish()
    }
}

impl<P: KeyturnerProtocol + ?Sized> BleSmartLock<P> {
    /// Wrap a discovered peripheral.
    pub fn new(
        id: impl Into<String>,
        peripheral: Peripheral,
        protocol: Arc<P>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            id: id.into(),
            peripheral,
            protocol,
            config,
            credentials: RwLock::new(None),
            events: EventDispatcher::default(),
            session: Mutex::new(()),
        }
    }

    /// Event dispatcher fed by the transport.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// The underlying peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    fn has_credentials(&self) -> bool {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn credentials(&self) -> Result<LockCredentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::InvalidData("pairing credentials not loaded".into()))
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        debug!(lock = %self.id, "Connecting");
        let duration = self.config.connection_timeout;
        timeout(duration, async {
            self.peripheral.connect().await?;
            self.peripheral.discover_services().await?;
            Ok::<_, Error>(())
        })
        .await
        .map_err(|_| Error::timeout("connect to lock", duration))??;
        debug!(lock = %self.id, "Connected");
        Ok(())
    }

    async fn read_snapshot(&self, credentials: &LockCredentials) -> Result<DeviceSnapshot> {
        let duration = self.config.request_timeout;
        let payload = timeout(
            duration,
            self.protocol.read_states(&self.peripheral, credentials),
        )
        .await
        .map_err(|_| Error::timeout("read key-turner states", duration))??;
        Ok(DeviceSnapshot::from_keyturner_states(&payload)?)
    }
}

#[async_trait]
impl<P: KeyturnerProtocol + ?Sized> SmartLock for BleSmartLock<P> {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_stored_config(&self, dir: &Path) -> bool {
        CredentialStore::new(dir).exists(&self.id)
    }

    async fn load_config(&self, dir: &Path) -> Result<()> {
        let credentials = CredentialStore::new(dir).load(&self.id)?;
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials);
        Ok(())
    }

    async fn read_lock_state(&self) -> Result<DeviceSnapshot> {
        let credentials = self.credentials()?;
        let _session = self.session.lock().await;
        self.ensure_connected().await?;
        self.read_snapshot(&credentials).await
    }

    async fn read_config(&self) -> Result<LockConfig> {
        let credentials = self.credentials()?;
        let _session = self.session.lock().await;
        self.ensure_connected().await?;
        let duration = self.config.request_timeout;
        timeout(
            duration,
            self.protocol.read_config(&self.peripheral, &credentials),
        )
        .await
        .map_err(|_| Error::timeout("read config", duration))?
    }

    async fn disconnect(&self) -> Result<()> {
        let _session = self.session.lock().await;
        if self.peripheral.is_connected().await.unwrap_or(false) {
            debug!(lock = %self.id, "Disconnecting");
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn execute(&self, action: LockAction) -> Result<DeviceSnapshot> {
        let credentials = self.credentials()?;
        let _session = self.session.lock().await;
        self.ensure_connected().await?;

        info!(lock = %self.id, %action, "Sending lock action");
        let duration = self.config.action_timeout;
        let payload = timeout(
            duration,
            self.protocol
                .execute(&self.peripheral, &credentials, action),
        )
        .await
        .map_err(|_| Error::timeout(format!("{action}"), duration))?
        .inspect_err(|e| warn!(lock = %self.id, %action, error = %e, "Lock action failed"))?;

        Ok(DeviceSnapshot::from_keyturner_states(&payload)?)
    }

    fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connection_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.action_timeout, DEFAULT_ACTION_TIMEOUT);
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::default()
            .connection_timeout(Duration::from_secs(1))
            .request_timeout(Duration::from_secs(2))
            .action_timeout(Duration::from_secs(3));
        assert_eq!(config.connection_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.action_timeout, Duration::from_secs(3));
    }
}
