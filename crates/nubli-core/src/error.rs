//! Error types for nubli-core.
//!
//! Device and transport failures are reported through [`Error`]. The
//! reconciliation layer wraps them into two narrower enums:
//!
//! | Type | Raised by | Handling |
//! |------|-----------|----------|
//! | [`AttachError::ConfigNotFound`] | attach | Accessory skipped until reconfigured |
//! | [`AttachError::DeviceUnreachable`] | attach / refresh | Facets drop to `Unknown`, logged |
//! | [`Error::AdapterNotReady`] | readiness wait | Retried on a fixed interval |
//! | [`CommandError`] | lock / latch requests | Returned to the caller |
//!
//! None of these terminate the process.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to a lock or the Bluetooth adapter.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable Bluetooth adapter.
    #[error("Bluetooth adapter not ready: {0}")]
    AdapterNotReady(String),

    /// Operation attempted while not connected to the lock.
    #[error("Not connected to lock")]
    NotConnected,

    /// Required BLE characteristic not found on the lock.
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(String),

    /// Failed to parse data received from the lock.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The lock answered with an error status.
    #[error("Lock rejected {operation}: {reason}")]
    Rejected {
        /// Operation that was rejected.
        operation: String,
        /// Reason reported by the lock.
        reason: String,
    },

    /// Stored pairing credentials are missing or unreadable.
    #[error("Invalid credentials at {}: {reason}", path.display())]
    InvalidCredentials {
        /// Credential file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an adapter-not-ready error.
    pub fn adapter_not_ready(reason: impl Into<String>) -> Self {
        Self::AdapterNotReady(reason.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a rejection error.
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a credentials error.
    pub fn invalid_credentials(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<nubli_types::ParseError> for Error {
    fn from(err: nubli_types::ParseError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Result type alias using nubli-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of an attach or refresh cycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttachError {
    /// The lock has no stored pairing configuration.
    #[error("No configuration for lock {lock_id} in {}", dir.display())]
    ConfigNotFound {
        /// Lock identifier.
        lock_id: String,
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// A step of the cycle failed.
    #[error("Lock {lock_id} unreachable: {source}")]
    DeviceUnreachable {
        /// Lock identifier.
        lock_id: String,
        /// Underlying device error.
        #[source]
        source: Error,
    },
}

impl AttachError {
    /// Wrap a device error for the given lock.
    pub fn unreachable(lock_id: impl Into<String>, source: Error) -> Self {
        Self::DeviceUnreachable {
            lock_id: lock_id.into(),
            source,
        }
    }
}

/// A rejected lock or latch request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// No lock handle is attached to the accessory.
    #[error("No Smart Lock attached")]
    NoDeviceAttached,

    /// The lock did not carry out the command.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The latch can only be released.
    #[error("The latch cannot be locked")]
    LatchCannotBeLocked,
}

impl From<Error> for CommandError {
    fn from(err: Error) -> Self {
        CommandError::CommandFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::adapter_not_ready("powered off");
        assert_eq!(err.to_string(), "Bluetooth adapter not ready: powered off");

        let err = Error::timeout("read_state", Duration::from_secs(10));
        assert!(err.to_string().contains("read_state"));
        assert!(err.to_string().contains("10s"));

        let err = Error::rejected("lock", "motor blocked");
        assert_eq!(err.to_string(), "Lock rejected lock: motor blocked");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = nubli_types::ParseError::UnknownLockState(0x42).into();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_attach_error_source() {
        use std::error::Error as _;

        let err = AttachError::unreachable("54d2720def0a", Error::NotConnected);
        assert!(err.to_string().contains("54d2720def0a"));
        assert!(err.source().is_some());

        let err = AttachError::ConfigNotFound {
            lock_id: "abc".into(),
            dir: PathBuf::from("/var/lib/nubli"),
        };
        assert!(err.to_string().contains("/var/lib/nubli"));
    }

    #[test]
    fn test_command_error() {
        assert_eq!(
            CommandError::LatchCannotBeLocked.to_string(),
            "The latch cannot be locked"
        );
        let err: CommandError = Error::NotConnected.into();
        assert_eq!(
            err,
            CommandError::CommandFailed("Not connected to lock".into())
        );
    }
}
