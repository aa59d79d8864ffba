//! Bluetooth identifiers for the Roroshetta Sense.
//!
//! The sensor advertises a vendor service and streams its telemetry frame
//! through notifications on a single vendor characteristic.

use uuid::{Uuid, uuid};

/// Vendor service advertised by the Roroshetta Sense.
pub const SENSE_SERVICE: Uuid = uuid!("0000f00d-1212-efde-1523-785fef13d123");

/// Characteristic that notifies the environmental telemetry frame.
pub const TELEMETRY_CHARACTERISTIC: Uuid = uuid!("0000beef-1212-efde-1523-785fef13d123");

/// Bluetooth SIG company identifier carried in the manufacturer data block.
pub const MANUFACTURER_ID: u16 = 1837;

/// Local name the sensor advertises.
pub const DEVICE_NAME: &str = "Roroshetta Sense";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_strings() {
        assert_eq!(
            SENSE_SERVICE.to_string(),
            "0000f00d-1212-efde-1523-785fef13d123"
        );
        assert_eq!(
            TELEMETRY_CHARACTERISTIC.to_string(),
            "0000beef-1212-efde-1523-785fef13d123"
        );
    }

    #[test]
    fn test_manufacturer_id_hex() {
        assert_eq!(MANUFACTURER_ID, 0x072D);
    }
}
