//! Bridge service exposing Nuki smart locks as lock accessories.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `check` | Validate the configuration and report credentials per lock |
//! | `scan` | Wait for the adapter and list nearby locks |
//! | `simulate` | Run the bridge against simulated locks |
//!
//! # Configuration
//!
//! The bridge reads `bridge.toml` from the platform config directory:
//!
//! - Linux: `~/.config/nubli/bridge.toml`
//! - macOS: `~/Library/Application Support/nubli/bridge.toml`
//! - Windows: `C:\Users\<user>\AppData\Roaming\nubli\bridge.toml`
//!
//! Embedding the bridge with real hardware means supplying a
//! [`nubli_core::BleTransport`] built around a
//! [`nubli_core::KeyturnerProtocol`] implementation.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod host;
pub mod simulate;

pub use bridge::Bridge;
pub use config::{Config, ConfigError, LockEntry, ValidationError, default_config_path};
pub use host::TracingHost;
pub use simulate::{SimulatedChange, Simulation};
