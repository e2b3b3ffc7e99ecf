//! `check` and `scan` command logic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use nubli_core::scan::{ScanOptions, scan_for_locks, wait_for_adapter};
use nubli_core::{
    AccessoryIdentity, AdapterReadiness, AdapterReadinessLoop, CredentialStore, DiscoveredLock,
};

use crate::config::Config;

/// Credential state of one configured lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No credential file.
    Missing,
    /// Credentials load. `written` is the file's modification time.
    Valid { written: Option<String> },
    /// The file exists but cannot be used.
    Invalid(String),
}

/// Result of checking one lock.
#[derive(Debug, Clone)]
pub struct LockCheck {
    pub identity: AccessoryIdentity,
    pub path: PathBuf,
    pub status: CredentialStatus,
}

impl std::fmt::Display for LockCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): ", self.identity.name, self.identity.id)?;
        match &self.status {
            CredentialStatus::Missing => {
                write!(f, "no credentials at {}", self.path.display())
            }
            CredentialStatus::Valid { written: Some(at) } => {
                write!(f, "credentials ok (written {at})")
            }
            CredentialStatus::Valid { written: None } => write!(f, "credentials ok"),
            CredentialStatus::Invalid(reason) => write!(f, "credentials invalid: {reason}"),
        }
    }
}

/// Check the credentials of every configured lock.
pub fn check(config: &Config) -> Vec<LockCheck> {
    let store = CredentialStore::new(config.credentials_dir());
    config
        .identities()
        .into_iter()
        .map(|identity| {
            let path = store.path_for(&identity.id);
            let status = if !store.exists(&identity.id) {
                CredentialStatus::Missing
            } else {
                match store.load(&identity.id) {
                    Ok(_) => CredentialStatus::Valid {
                        written: std::fs::metadata(&path)
                            .and_then(|m| m.modified())
                            .ok()
                            .and_then(format_timestamp),
                    },
                    Err(e) => CredentialStatus::Invalid(e.to_string()),
                }
            };
            LockCheck {
                identity,
                path,
                status,
            }
        })
        .collect()
}

fn format_timestamp(at: SystemTime) -> Option<String> {
    OffsetDateTime::from(at).format(&Rfc3339).ok()
}

/// Readiness check against the first local adapter.
#[derive(Debug, Clone, Copy)]
pub struct AdapterProbe {
    timeout: Duration,
}

impl AdapterProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl AdapterReadiness for AdapterProbe {
    async fn wait_for_adapter(&self) -> nubli_core::Result<()> {
        wait_for_adapter(self.timeout).await.map(|_| ())
    }
}

/// Wait for the adapter, then scan for `duration`.
pub async fn scan(config: &Config, duration: Duration) -> nubli_core::Result<Vec<DiscoveredLock>> {
    AdapterReadinessLoop::new(Arc::new(AdapterProbe::new(
        nubli_core::scan::DEFAULT_READINESS_TIMEOUT,
    )))
    .with_retry_interval(config.adapter_retry())
    .wait_until_ready()
    .await;

    scan_for_locks(ScanOptions::new().duration(duration)).await
}

/// Name of the configured accessory for a discovered lock, if any.
pub fn configured_name<'a>(config: &'a Config, lock: &DiscoveredLock) -> Option<&'a str> {
    config
        .locks
        .iter()
        .find(|entry| entry.identity().matches(&lock.id))
        .map(|entry| entry.name.as_str())
}
