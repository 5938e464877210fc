//! Utility functions for penlink-core.
//!
//! Helpers for naming btleplug peripherals and synthesising the object
//! paths used by the transport model.

use btleplug::platform::PeripheralId;

use crate::object::ObjectPath;

/// Root under which adapter paths are created.
pub const OBJECT_ROOT: &str = "/org/bluez";

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

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    identifier_or(address, || format_peripheral_id(peripheral_id))
}

fn identifier_or(address: &str, fallback: impl FnOnce() -> String) -> String {
    if address == "00:00:00:00:00:00" {
        fallback()
    } else {
        address.to_string()
    }
}

/// Replace every character that is not valid in a path segment with `_`.
pub fn path_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Path of the adapter with the given index.
pub fn adapter_path(index: usize) -> ObjectPath {
    ObjectPath::new(format!("{OBJECT_ROOT}/hci{index}"))
}

/// Path of a device below its adapter.
pub fn device_path(adapter: &ObjectPath, identifier: &str) -> ObjectPath {
    adapter.child(&format!("dev_{}", path_segment(identifier)))
}

/// Path of the `index`th service of a device.
pub fn service_path(device: &ObjectPath, index: usize) -> ObjectPath {
    device.child(&format!("service{index:04x}"))
}

/// Path of the `index`th characteristic of a service.
pub fn characteristic_path(service: &ObjectPath, index: usize) -> ObjectPath {
    service.child(&format!("char{index:04x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_with_valid_address() {
        let id = identifier_or("AA:BB:CC:DD:EE:FF", || "fallback".to_string());
        assert_eq!(id, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_identifier_with_zero_address() {
        let id = identifier_or("00:00:00:00:00:00", || "5A2F-11".to_string());
        assert_eq!(id, "5A2F-11");
    }

    #[test]
    fn test_paths() {
        let adapter = adapter_path(0);
        assert_eq!(adapter.as_str(), "/org/bluez/hci0");

        let device = device_path(&adapter, "AA:BB:CC:DD:EE:FF");
        assert_eq!(device.as_str(), "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF");

        let service = service_path(&device, 10);
        assert_eq!(service.as_str(), "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000a");
        assert_eq!(
            characteristic_path(&service, 11).as_str(),
            "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000a/char000b"
        );
    }
}
