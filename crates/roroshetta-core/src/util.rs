//! Peripheral addressing helpers.

use btleplug::platform::PeripheralId;

/// Address reported on platforms that hide the Bluetooth address (macOS).
pub const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS peripheral IDs are UUIDs; elsewhere they wrap the Bluetooth
/// address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// The string a device is addressed by: its Bluetooth address, or the
/// peripheral ID where the address is hidden.
pub fn device_address(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_hidden(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether the platform withheld the real address.
pub fn is_hidden(address: &str) -> bool {
    address == HIDDEN_ADDRESS
}
