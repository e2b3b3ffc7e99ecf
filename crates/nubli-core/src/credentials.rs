//! Pairing credentials stored on disk.
//!
//! The pairing tool writes one JSON file per lock, named after the lock
//! identifier. A lock "has stored config" exactly when its file exists.
//!
//! ```json
//! { "authorizationId": 7, "sharedSecret": "8a9b...", "appId": 1234 }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of the shared secret in bytes.
pub const SHARED_SECRET_LEN: usize = 32;

/// Default credential directory following platform conventions.
///
/// - Linux: `~/.local/share/nubli`
/// - macOS: `~/Library/Application Support/nubli`
/// - Windows: `C:\Users\<user>\AppData\Roaming\nubli`
pub fn default_credentials_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nubli")
}

/// Pairing material for one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockCredentials {
    /// Authorization id assigned by the lock during pairing.
    pub authorization_id: u32,
    /// Hex-encoded 32-byte shared secret.
    pub shared_secret: String,
    /// Id this bridge identified itself with.
    pub app_id: u32,
}

impl LockCredentials {
    /// Decode the shared secret.
    pub fn shared_secret_bytes(&self) -> std::result::Result<[u8; SHARED_SECRET_LEN], String> {
        let bytes = hex::decode(&self.shared_secret).map_err(|e| e.to_string())?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("expected {SHARED_SECRET_LEN} bytes, got {}", b.len()))
    }
}

/// Directory of per-lock credential files.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Open a store rooted at `dir`. Nothing is read until a lookup.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credential file for `lock_id`.
    pub fn path_for(&self, lock_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", lock_id.to_ascii_lowercase()))
    }

    /// Whether credentials exist for `lock_id`.
    pub fn exists(&self, lock_id: &str) -> bool {
        self.path_for(lock_id).is_file()
    }

    /// Load and validate the credentials for `lock_id`.
    pub fn load(&self, lock_id: &str) -> Result<LockCredentials> {
        let path = self.path_for(lock_id);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::invalid_credentials(&path, e.to_string()))?;
        let credentials: LockCredentials = serde_json::from_str(&content)
            .map_err(|e| Error::invalid_credentials(&path, e.to_string()))?;
        credentials
            .shared_secret_bytes()
            .map_err(|reason| Error::invalid_credentials(&path, reason))?;
        Ok(credentials)
    }

    /// Write credentials for `lock_id`, creating the directory if needed.
    pub fn save(&self, lock_id: &str, credentials: &LockCredentials) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(credentials)
            .map_err(|e| Error::InvalidData(e.to_string()))?;
        std::fs::write(self.path_for(lock_id), content)?;
        Ok(())
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(default_credentials_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn credentials() -> LockCredentials {
        LockCredentials {
            authorization_id: 7,
            shared_secret: "ab".repeat(SHARED_SECRET_LEN),
            app_id: 1234,
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::new(temp.path().join("nested"));

        assert!(!store.exists("54d2720def0a"));
        store.save("54d2720def0a", &credentials()).unwrap();
        assert!(store.exists("54d2720def0a"));
        assert!(store.exists("54D2720DEF0A"));
        assert_eq!(store.load("54d2720def0a").unwrap(), credentials());
    }

    #[test]
    fn test_file_uses_camel_case() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::new(temp.path());
        store.save("abc", &credentials()).unwrap();

        let content = std::fs::read_to_string(store.path_for("abc")).unwrap();
        assert!(content.contains("\"authorizationId\": 7"));
        assert!(content.contains("\"sharedSecret\""));
        assert!(content.contains("\"appId\": 1234"));
    }

    #[test]
    fn test_load_missing() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::new(temp.path());
        let err = store.load("missing").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials { .. }));
    }

    #[test]
    fn test_load_malformed() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::new(temp.path());
        std::fs::write(store.path_for("abc"), "{ not json").unwrap();
        assert!(store.exists("abc"));
        assert!(store.load("abc").is_err());
    }

    #[test]
    fn test_load_rejects_short_secret() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::new(temp.path());
        let mut creds = credentials();
        creds.shared_secret = "abcd".into();
        store.save("abc", &creds).unwrap();

        let err = store.load("abc").unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 2"));
    }

    #[test]
    fn test_default_dir_ends_with_nubli() {
        assert!(default_credentials_dir().ends_with("nubli"));
    }
}
