//! Adapter access and advertisement listening.
//!
//! Turns the adapter's [`CentralEvent`]s into a stream of [`Advertisement`]s
//! for [`Coordinator::on_advertisement`](crate::Coordinator::on_advertisement).

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info};

use crate::advertisement::Advertisement;
use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::device_address;

/// Get the Bluetooth adapter at `index` (0 is the first one).
pub async fn get_adapter(index: usize) -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    debug!("Found {} Bluetooth adapter(s)", adapters.len());

    adapters
        .into_iter()
        .nth(index)
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Start scanning and stream every advertisement the adapter reports.
///
/// The stream never filters; pass each item through the matcher. Stop the
/// scan with [`stop_scan`] when done.
pub async fn advertisements(adapter: &Adapter) -> Result<BoxStream<'static, Advertisement>> {
    let events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    info!("Listening for advertisements");

    let adapter = adapter.clone();
    Ok(events
        .filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                let id = advertised_peripheral(event)?;
                let peripheral = adapter.peripheral(&id).await.ok()?;
                let properties = peripheral.properties().await.ok()??;
                let address = device_address(&properties.address.to_string(), &id);
                Some(advertisement_from_properties(address, &properties))
            }
        })
        .boxed())
}

/// Stop a scan started by [`advertisements`].
pub async fn stop_scan(adapter: &Adapter) -> Result<()> {
    adapter.stop_scan().await?;
    Ok(())
}

fn advertised_peripheral(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. }
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

/// Build an [`Advertisement`] from what the adapter knows about a peripheral.
pub fn advertisement_from_properties(
    address: String,
    properties: &PeripheralProperties,
) -> Advertisement {
    Advertisement {
        address,
        local_name: properties.local_name.clone(),
        rssi: properties.rssi,
        manufacturer_data: properties.manufacturer_data.clone(),
        services: properties.services.clone(),
        service_data: properties.service_data.clone(),
    }
}
