//! [`Transport`] implementation on btleplug.
//!
//! Peripherals are looked up by address among those the adapter has seen,
//! so the adapter must be scanning (see [`crate::scan::advertisements`]).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::advertisement::DeviceIdentity;
use crate::error::{Error, Result};
use crate::pairing::{self, DEFAULT_PAIR_TIMEOUT};
use crate::util::device_address;
use crate::transport::{NotificationStream, Transport};

/// Default BlueZ adapter name used for pairing on Linux.
pub const DEFAULT_BLUEZ_ADAPTER: &str = "hci0";

/// Real Bluetooth transport.
pub struct BleTransport {
    adapter: Adapter,
    bluez_adapter: String,
    pair_timeout: Duration,
    /// Peripherals with an open connection, keyed by identity.
    connected: RwLock<HashMap<DeviceIdentity, Peripheral>>,
}

impl BleTransport {
    /// Create a transport on `adapter`.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            bluez_adapter: DEFAULT_BLUEZ_ADAPTER.to_string(),
            pair_timeout: DEFAULT_PAIR_TIMEOUT,
            connected: RwLock::new(HashMap::new()),
        }
    }

    /// Set the BlueZ adapter name (`hci0`, `hci1`, ...) used for pairing.
    #[must_use]
    pub fn bluez_adapter(mut self, name: impl Into<String>) -> Self {
        self.bluez_adapter = name.into();
        self
    }

    /// Set the bound on a pairing request.
    #[must_use]
    pub fn pair_timeout(mut self, timeout: Duration) -> Self {
        self.pair_timeout = timeout;
        self
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn find_peripheral(&self, identity: &DeviceIdentity) -> Result<Peripheral> {
        for peripheral in self.adapter.peripherals().await? {
            let address = device_address(&peripheral.address().to_string(), &peripheral.id());
            if address.eq_ignore_ascii_case(&identity.address) {
                return Ok(peripheral);
            }
        }
        Err(Error::device_not_found(identity.address.clone()))
    }

    async fn connected_peripheral(&self, identity: &DeviceIdentity) -> Result<Peripheral> {
        self.connected
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| Error::SubscribeFailed(format!("{} is not connected", identity)))
    }
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| Error::SubscribeFailed(format!("characteristic {} not found", uuid)))
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self, identity: &DeviceIdentity) -> Result<()> {
        let peripheral = self.find_peripheral(identity).await?;
        let device_id = Some(identity.address.clone());

        if !peripheral.is_connected().await.unwrap_or(false) {
            debug!("Connecting to {}", identity);
            peripheral
                .connect()
                .await
                .map_err(|e| Error::connection_failed_str(device_id.clone(), e.to_string()))?;
        }

        if let Err(e) = peripheral.discover_services().await {
            if let Err(disconnect_err) = peripheral.disconnect().await {
                debug!("Disconnect after failed discovery of {}: {}", identity, disconnect_err);
            }
            return Err(Error::connection_failed_str(device_id, e.to_string()));
        }

        info!("Connected to {}", identity);
        self.connected
            .write()
            .await
            .insert(identity.clone(), peripheral);
        Ok(())
    }

    async fn pair(&self, identity: &DeviceIdentity) -> Result<()> {
        pairing::pair(&self.bluez_adapter, &identity.address, self.pair_timeout).await
    }

    async fn subscribe(
        &self,
        identity: &DeviceIdentity,
        characteristic: Uuid,
    ) -> Result<NotificationStream> {
        let peripheral = self.connected_peripheral(identity).await?;
        let target = find_characteristic(&peripheral, characteristic)?;

        // Open the stream first so the first notification cannot slip past
        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| Error::SubscribeFailed(e.to_string()))?;
        peripheral
            .subscribe(&target)
            .await
            .map_err(|e| Error::SubscribeFailed(e.to_string()))?;
        debug!("Subscribed to {} on {}", characteristic, identity);

        Ok(notifications
            .filter_map(move |n| {
                futures::future::ready((n.uuid == characteristic).then_some(n.value))
            })
            .boxed())
    }

    async fn unsubscribe(&self, identity: &DeviceIdentity, characteristic: Uuid) -> Result<()> {
        let peripheral = self.connected_peripheral(identity).await?;
        let target = find_characteristic(&peripheral, characteristic)?;
        peripheral.unsubscribe(&target).await?;
        Ok(())
    }

    async fn disconnect(&self, identity: &DeviceIdentity) -> Result<()> {
        let peripheral = self.connected.write().await.remove(identity);
        // A connect that timed out may still have gone through
        let peripheral = match peripheral {
            Some(peripheral) => peripheral,
            None => match self.find_peripheral(identity).await {
                Ok(peripheral) => peripheral,
                Err(_) => return Ok(()),
            },
        };

        if peripheral.is_connected().await.unwrap_or(true) {
            peripheral.disconnect().await?;
            debug!("Disconnected from {}", identity);
        }
        Ok(())
    }
}
