//! Bridge configuration.
//!
//! ```toml
//! debug = false
//! config_path = "/var/lib/nubli"
//! stale_timeout_secs = 120
//! adapter_retry_secs = 60
//!
//! [[locks]]
//! uuid = "54d2720def0a"
//! name = "Front Door"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nubli_core::{AccessoryIdentity, default_credentials_dir};

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log the core crates at debug level.
    pub debug: bool,
    /// Directory holding pairing credentials. Defaults to the platform data
    /// directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    /// Advertisement silence before a lock is marked stale.
    pub stale_timeout_secs: u64,
    /// Delay between adapter readiness attempts.
    pub adapter_retry_secs: u64,
    /// Locks to expose, in order.
    pub locks: Vec<LockEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            config_path: None,
            stale_timeout_secs: 120,
            adapter_retry_secs: 60,
            locks: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Lock uuids and names are not empty
    /// - No two locks share a uuid (ignoring case and separators)
    /// - The stale and retry intervals are not zero
    ///
    /// # Example
    ///
    /// ```
    /// use nubli_bridge::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.stale_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "stale_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.adapter_retry_secs == 0 {
            errors.push(ValidationError {
                field: "adapter_retry_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (i, lock) in self.locks.iter().enumerate() {
            let prefix = format!("locks[{}]", i);
            errors.extend(lock.validate(&prefix));

            if !lock.uuid.trim().is_empty() && !seen.insert(lock.normalized_uuid()) {
                errors.push(ValidationError {
                    field: format!("{}.uuid", prefix),
                    message: format!("duplicate lock uuid '{}'", lock.uuid),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Credential directory, falling back to the platform default.
    pub fn credentials_dir(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(default_credentials_dir)
    }

    /// Stale window as a duration.
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    /// Adapter retry interval as a duration.
    pub fn adapter_retry(&self) -> Duration {
        Duration::from_secs(self.adapter_retry_secs)
    }

    /// Accessory identities in configuration order.
    pub fn identities(&self) -> Vec<AccessoryIdentity> {
        self.locks.iter().map(LockEntry::identity).collect()
    }
}

/// One configured lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Lock identifier (Bluetooth address, with or without separators).
    pub uuid: String,
    /// Display name of the accessory.
    pub name: String,
}

impl LockEntry {
    /// Validate this lock entry.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.uuid.trim().is_empty() {
            errors.push(ValidationError {
                field: format!("{}.uuid", prefix),
                message: "uuid cannot be empty".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            errors.push(ValidationError {
                field: format!("{}.name", prefix),
                message: "name cannot be empty".to_string(),
            });
        }
        errors
    }

    /// Uuid in the form used for lock identifiers.
    pub fn normalized_uuid(&self) -> String {
        nubli_core::normalize_address(self.uuid.trim())
    }

    /// Accessory identity for this lock.
    pub fn identity(&self) -> AccessoryIdentity {
        AccessoryIdentity::new(self.normalized_uuid(), self.name.trim())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `locks[0].uuid`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nubli")
        .join("bridge.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(uuid: &str, name: &str) -> LockEntry {
        LockEntry {
            uuid: uuid.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.debug);
        assert_eq!(config.stale_timeout(), Duration::from_secs(120));
        assert_eq!(config.adapter_retry(), Duration::from_secs(60));
        assert!(config.locks.is_empty());
        assert_eq!(config.credentials_dir(), default_credentials_dir());
    }

    #[test]
    fn test_config_parse() {
        let toml = r#"
            debug = true
            config_path = "/var/lib/nubli"

            [[locks]]
            uuid = "54:D2:72:0D:EF:0A"
            name = "Front Door"

            [[locks]]
            uuid = "54d2720def0b"
            name = "Back Door"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.debug);
        assert_eq!(config.credentials_dir(), PathBuf::from("/var/lib/nubli"));
        assert_eq!(config.stale_timeout_secs, 120);

        let identities = config.identities();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].id, "54d2720def0a");
        assert_eq!(identities[0].name, "Front Door");
        assert_eq!(identities[1].name, "Back Door");
    }

    #[test]
    fn test_missing_name_is_parse_error() {
        let toml = r#"
            [[locks]]
            uuid = "54d2720def0a"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_validate_ok() {
        let config = Config {
            locks: vec![lock("54d2720def0a", "Front Door")],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = Config {
            stale_timeout_secs: 0,
            adapter_retry_secs: 0,
            locks: vec![lock("", " ")],
            ..Default::default()
        };
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "stale_timeout_secs",
                "adapter_retry_secs",
                "locks[0].uuid",
                "locks[0].name"
            ]
        );
    }

    #[test]
    fn test_validate_duplicate_uuid() {
        let config = Config {
            locks: vec![
                lock("54d2720def0a", "Front Door"),
                lock("54:D2:72:0D:EF:0A", "Also Front Door"),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("locks[1].uuid: duplicate lock uuid"));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("bridge.toml");

        let config = Config {
            debug: true,
            config_path: Some(PathBuf::from("/tmp/nubli")),
            stale_timeout_secs: 30,
            adapter_retry_secs: 5,
            locks: vec![lock("54d2720def0a", "Front Door")],
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/bridge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("nubli/bridge.toml"));
    }
}
