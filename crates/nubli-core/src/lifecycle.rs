//! Connection lifecycle for a single lock handle.
//!
//! Every cycle opens the connection once, performs its reads in a fixed
//! order and releases the connection again, whether the reads succeeded or
//! not. A cycle either yields all of its results or none of them.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use nubli_types::{DeviceSnapshot, LockConfig};

use crate::credentials::default_credentials_dir;
use crate::error::{AttachError, Error, Result};
use crate::traits::SmartLock;

/// Everything read during a successful attach cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOutcome {
    /// Lock state read.
    pub snapshot: DeviceSnapshot,
    /// Device configuration read.
    pub config: LockConfig,
}

/// Runs attach and refresh cycles against lock handles.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycleManager {
    credentials_dir: PathBuf,
}

impl ConnectionLifecycleManager {
    /// Create a manager that looks up pairing credentials in `credentials_dir`.
    pub fn new(credentials_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials_dir: credentials_dir.into(),
        }
    }

    /// Directory searched for pairing credentials.
    pub fn credentials_dir(&self) -> &Path {
        &self.credentials_dir
    }

    /// Attach to a freshly discovered lock.
    ///
    /// Runs load config → read lock state → read config → disconnect.
    ///
    /// # Errors
    ///
    /// [`AttachError::ConfigNotFound`] if no credentials exist for the lock
    /// (nothing is opened in that case), [`AttachError::DeviceUnreachable`]
    /// if any step fails.
    pub async fn attach(
        &self,
        lock: &dyn SmartLock,
    ) -> std::result::Result<AttachOutcome, AttachError> {
        if !lock.has_stored_config(&self.credentials_dir) {
            return Err(AttachError::ConfigNotFound {
                lock_id: lock.id().to_string(),
                dir: self.credentials_dir.clone(),
            });
        }

        let dir = self.credentials_dir.as_path();
        let outcome = self
            .cycle(lock, || async move {
                lock.load_config(dir).await?;
                let snapshot = lock.read_lock_state().await?;
                let config = lock.read_config().await?;
                Ok::<_, Error>(AttachOutcome { snapshot, config })
            })
            .await?;
        debug!(lock = %lock.id(), state = %outcome.snapshot.lock_state, "Attach cycle complete");
        Ok(outcome)
    }

    /// Re-read the lock state of an attached lock.
    pub async fn refresh(
        &self,
        lock: &dyn SmartLock,
    ) -> std::result::Result<DeviceSnapshot, AttachError> {
        let snapshot = self.cycle(lock, || lock.read_lock_state()).await?;
        debug!(lock = %lock.id(), state = %snapshot.lock_state, "Refresh cycle complete");
        Ok(snapshot)
    }

    /// Run `steps`, then always disconnect.
    ///
    /// A failed disconnect after successful steps still fails the cycle.
    async fn cycle<T, F, Fut>(
        &self,
        lock: &dyn SmartLock,
        steps: F,
    ) -> std::result::Result<T, AttachError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match steps().await {
            Ok(value) => match lock.disconnect().await {
                Ok(()) => Ok(value),
                Err(e) => Err(AttachError::unreachable(lock.id(), e)),
            },
            Err(e) => {
                if let Err(disconnect_err) = lock.disconnect().await {
                    warn!(lock = %lock.id(), error = %disconnect_err, "Disconnect after failed cycle failed");
                }
                Err(AttachError::unreachable(lock.id(), e))
            }
        }
    }
}

impl Default for ConnectionLifecycleManager {
    fn default() -> Self {
        Self::new(default_credentials_dir())
    }
}
