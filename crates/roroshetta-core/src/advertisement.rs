//! Advertisement matching.
//!
//! Decides whether an advertisement comes from a Roroshetta Sense and, if so,
//! derives the device's [`DeviceIdentity`]. A match needs both the vendor
//! manufacturer ID and the vendor service UUID; either one alone is not enough.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use roroshetta_types::uuid::{MANUFACTURER_ID, SENSE_SERVICE};

/// A single BLE advertisement as reported by the host's scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// Device address as reported by the adapter.
    pub address: String,
    /// Advertised local name.
    pub local_name: Option<String>,
    /// Signal strength.
    pub rssi: Option<i16>,
    /// Manufacturer data blocks keyed by company identifier.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
    /// Service data blocks keyed by service UUID.
    pub service_data: HashMap<Uuid, Vec<u8>>,
}

impl Advertisement {
    /// Create an empty advertisement for an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Whether `service` is advertised, in the service list or as service data.
    pub fn advertises_service(&self, service: &Uuid) -> bool {
        self.services.contains(service) || self.service_data.contains_key(service)
    }
}

/// Stable identity of one physical sensor.
///
/// Addresses are normalised to upper case, so the same sensor reported with
/// different casing is one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Bluetooth address, upper case.
    pub address: String,
    /// Manufacturer ID the device advertised.
    pub manufacturer_id: u16,
    /// Vendor service the device advertised.
    pub service_uuid: Uuid,
}

impl DeviceIdentity {
    /// Identity of a Roroshetta Sense at `address`.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self {
            address: address.as_ref().trim().to_ascii_uppercase(),
            manufacturer_id: MANUFACTURER_ID,
            service_uuid: SENSE_SERVICE,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Return the identity of a Roroshetta Sense, or `None` for anything else.
pub fn match_advertisement(adv: &Advertisement) -> Option<DeviceIdentity> {
    if adv.address.trim().is_empty() {
        return None;
    }
    if !adv.manufacturer_data.contains_key(&MANUFACTURER_ID) {
        return None;
    }
    if !adv.advertises_service(&SENSE_SERVICE) {
        return None;
    }
    Some(DeviceIdentity::new(&adv.address))
}
