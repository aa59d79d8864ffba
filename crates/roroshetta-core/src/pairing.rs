//! Pairing through the platform Bluetooth stack.
//!
//! btleplug has no pairing API. On Linux the device is paired by calling
//! `org.bluez.Device1.Pair` on BlueZ over the system D-Bus; a device that is
//! already paired counts as success. Elsewhere the operating system pairs on
//! demand when the connection needs it, so there is nothing to do.

use std::time::Duration;

/// D-Bus object path of a device under a BlueZ adapter.
///
/// `device_path("hci0", "C8:2B:96:01:02:03")` is
/// `/org/bluez/hci0/dev_C8_2B_96_01_02_03`.
pub fn device_path(adapter: &str, address: &str) -> String {
    format!(
        "/org/bluez/{}/dev_{}",
        adapter,
        address.to_ascii_uppercase().replace(':', "_")
    )
}

#[cfg(target_os = "linux")]
pub use bluez::pair;

#[cfg(target_os = "linux")]
mod bluez {
    use std::time::Duration;

    use dbus::nonblock::Proxy;
    use tracing::{debug, info};

    use crate::error::{Error, Result};

    const BLUEZ_SERVICE: &str = "org.bluez";
    const DEVICE_INTERFACE: &str = "org.bluez.Device1";
    const ALREADY_EXISTS: &str = "org.bluez.Error.AlreadyExists";

    /// Pair with the device at `address` through BlueZ adapter `adapter` (e.g. `hci0`).
    pub async fn pair(adapter: &str, address: &str, timeout: Duration) -> Result<()> {
        let (resource, connection) = dbus_tokio::connection::new_system_sync()
            .map_err(|e| Error::PairingFailed(format!("D-Bus connection failed: {}", e)))?;

        let path = dbus::Path::new(super::device_path(adapter, address))
            .map_err(|e| Error::invalid_config(format!("invalid device path: {}", e)))?;
        let proxy = Proxy::new(BLUEZ_SERVICE, path, timeout, connection);

        debug!("Calling {}.Pair for {}", DEVICE_INTERFACE, address);
        let call = proxy.method_call::<(), _, _, _>(DEVICE_INTERFACE, "Pair", ());

        // The resource drives the connection and only completes if it is lost
        let result = tokio::select! {
            lost = resource => {
                return Err(Error::PairingFailed(format!("D-Bus connection lost: {}", lost)));
            }
            result = call => result,
        };

        match result {
            Ok(()) => {
                info!("Paired with {}", address);
                Ok(())
            }
            Err(e) if e.name() == Some(ALREADY_EXISTS) => {
                debug!("{} is already paired", address);
                Ok(())
            }
            Err(e) => Err(Error::PairingFailed(format!(
                "{}: {}",
                e.name().unwrap_or("D-Bus error"),
                e.message().unwrap_or("no message")
            ))),
        }
    }
}

/// Pairing is left to the operating system on this platform.
#[cfg(not(target_os = "linux"))]
pub async fn pair(_adapter: &str, address: &str, _timeout: Duration) -> crate::error::Result<()> {
    tracing::debug!("Pairing with {} is handled by the operating system", address);
    Ok(())
}

/// Default bound on a pairing request.
pub const DEFAULT_PAIR_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(
            device_path("hci0", "c8:2b:96:01:02:03"),
            "/org/bluez/hci0/dev_C8_2B_96_01_02_03"
        );
    }
}
