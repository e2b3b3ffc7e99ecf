//! Utility functions for nubli-core.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Normalize a Bluetooth address into a lock identifier.
///
/// `"54:D2:72:0D:EF:0A"` becomes `"54d2720def0a"`, the form used in
/// configuration files and credential file names.
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Create a lock identifier from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the normalized Bluetooth address.
pub fn lock_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(peripheral_id).to_ascii_lowercase()
    } else {
        normalize_address(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("54:D2:72:0D:EF:0A"), "54d2720def0a");
        assert_eq!(normalize_address("54d2720def0a"), "54d2720def0a");
    }

    #[test]
    fn test_normalize_address_dashes() {
        assert_eq!(normalize_address("54-D2-72-0D-EF-0A"), "54d2720def0a");
    }
}
