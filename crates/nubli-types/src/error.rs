//! Error types for data parsing in nubli-types.

use thiserror::Error;

/// Errors that can occur when parsing raw smart lock data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in nubli-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not enough bytes to decode the payload.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// Unrecognized lock state byte.
    #[error("Unknown lock state: 0x{0:02X}")]
    UnknownLockState(u8),

    /// Unrecognized door sensor state byte.
    #[error("Unknown door sensor state: 0x{0:02X}")]
    UnknownDoorSensorState(u8),

    /// Unrecognized lock action byte.
    #[error("Unknown lock action: 0x{0:02X}")]
    UnknownLockAction(u8),

    /// A field held a value outside its valid range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using nubli-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
