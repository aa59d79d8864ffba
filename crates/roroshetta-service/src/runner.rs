//! Foreground runner: scan, poll, print, stop on Ctrl-C.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use roroshetta_core::{
    Advertisement, BleTransport, Coordinator, DeviceEvent, EventReceiver, Transport, scan,
};

use crate::config::{Config, ConfigError};
use crate::output::{LinePublisher, OutputFormat};

/// Runner errors.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] roroshetta_core::Error),
}

/// Polls configured and advertising devices until Ctrl-C.
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Create a runner.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The runner's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a coordinator with every configured device registered.
    pub async fn coordinator(&self, transport: Arc<dyn Transport>) -> Coordinator {
        let coordinator = Coordinator::new(transport, self.config.coordinator_config());
        for (identity, name) in self.config.device_identities() {
            debug!("Registering configured device {}", identity);
            coordinator.register(identity, name).await;
        }
        coordinator
    }

    /// Run against the configured Bluetooth adapter until Ctrl-C.
    pub async fn run(self) -> Result<(), RunnerError> {
        self.config.validate()?;

        let bluetooth = &self.config.bluetooth;
        let adapter = scan::get_adapter(bluetooth.adapter).await?;
        let transport = BleTransport::new(adapter.clone())
            .bluez_adapter(bluetooth.bluez_adapter.clone())
            .pair_timeout(Duration::from_secs(bluetooth.pair_timeout));

        let coordinator = self.coordinator(Arc::new(transport)).await;
        coordinator
            .add_publisher(Arc::new(LinePublisher::stdout(self.config.output.format)))
            .await;

        let advertisements = scan::advertisements(&adapter).await?;
        info!(
            "Polling {} configured device(s) every {}s",
            self.config.devices.len(),
            self.config.polling.interval
        );

        drive(&coordinator, advertisements, shutdown_signal()).await;

        if let Err(e) = scan::stop_scan(&adapter).await {
            warn!("Failed to stop scan: {}", e);
        }
        info!("Stopped");
        Ok(())
    }
}

/// Feed advertisements and poll until `stop` resolves or the stream ends.
///
/// Shuts the coordinator down on the way out and waits for in-flight
/// sessions to unwind.
pub async fn drive<S, F>(coordinator: &Coordinator, mut advertisements: S, stop: F)
where
    S: Stream<Item = Advertisement> + Unpin,
    F: Future<Output = ()>,
{
    let polling = coordinator.run_polling();
    tokio::pin!(polling);
    tokio::pin!(stop);

    let listen = async {
        while let Some(adv) = advertisements.next().await {
            coordinator.on_advertisement(&adv).await;
        }
    };

    let polling_done = tokio::select! {
        biased;
        _ = &mut stop => {
            info!("Shutdown requested");
            false
        }
        _ = listen => {
            warn!("Advertisement stream ended");
            false
        }
        _ = log_events(coordinator.subscribe()) => false,
        _ = &mut polling => true,
    };

    coordinator.shutdown();
    if !polling_done {
        polling.await;
    }
}

async fn log_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(DeviceEvent::Discovered { device, name, rssi }) => {
                info!(
                    "Discovered {} ({}, rssi {})",
                    device,
                    name.as_deref().unwrap_or("unnamed"),
                    rssi.map_or_else(|| "?".to_string(), |r| r.to_string())
                );
            }
            Ok(DeviceEvent::Paired { device }) => info!("Paired with {}", device),
            Ok(DeviceEvent::PairingFailed { device }) => warn!("Pairing with {} failed", device),
            Ok(event) => debug!("{:?}", event),
            Err(RecvError::Lagged(n)) => warn!("Dropped {} device event(s)", n),
            Err(RecvError::Closed) => break,
        }
    }
    std::future::pending::<()>().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use async_trait::async_trait;
    use futures::stream;
    use roroshetta_core::mock::MockTransport;
    use roroshetta_core::uuid::{MANUFACTURER_ID, SENSE_SERVICE};
    use roroshetta_core::{DeviceIdentity, Publisher, Reading};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<DeviceIdentity>>);

    impl Collect {
        fn count(&self, identity: &DeviceIdentity) -> usize {
            self.0.lock().unwrap().iter().filter(|i| *i == identity).count()
        }
    }

    #[async_trait]
    impl Publisher for Collect {
        async fn publish(
            &self,
            identity: &DeviceIdentity,
            _reading: &Reading,
        ) -> roroshetta_core::Result<()> {
            self.0.lock().unwrap().push(identity.clone());
            Ok(())
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.devices.push(DeviceConfig {
            address: "C8:2B:96:10:20:30".to_string(),
            name: Some("Kitchen".to_string()),
        });
        config
    }

    fn advertisement(address: &str) -> Advertisement {
        let mut adv = Advertisement::new(address);
        adv.manufacturer_data.insert(MANUFACTURER_ID, vec![0x01]);
        adv.services.push(SENSE_SERVICE);
        adv
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_devices_registered() {
        let runner = Runner::new(config());
        let coordinator = runner.coordinator(Arc::new(MockTransport::new())).await;

        let record = coordinator
            .registry()
            .get(&DeviceIdentity::new("c8:2b:96:10:20:30"))
            .await
            .unwrap();
        assert_eq!(record.name.as_deref(), Some("Kitchen"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_polls_every_interval() {
        let runner = Runner::new(config());
        let coordinator = runner.coordinator(Arc::new(MockTransport::new())).await;
        let collect = Arc::new(Collect::default());
        coordinator.add_publisher(collect.clone()).await;

        let adverts = stream::iter(vec![advertisement("C8:2B:96:10:20:31")]).chain(stream::pending());
        drive(
            &coordinator,
            adverts,
            tokio::time::sleep(Duration::from_secs(130)),
        )
        .await;

        // Rounds at 0s, 60s and 120s
        assert_eq!(collect.count(&DeviceIdentity::new("C8:2B:96:10:20:30")), 3);
        assert_eq!(collect.count(&DeviceIdentity::new("C8:2B:96:10:20:31")), 3);
        assert!(coordinator.is_shut_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unwinds_running_session() {
        let mock = Arc::new(MockTransport::builder().silent().build());
        let coordinator = Runner::new(config()).coordinator(mock.clone()).await;
        let collect = Arc::new(Collect::default());
        coordinator.add_publisher(collect.clone()).await;

        drive(
            &coordinator,
            stream::pending(),
            tokio::time::sleep(Duration::from_secs(3)),
        )
        .await;

        assert!(collect.0.lock().unwrap().is_empty());
        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_stops_runner() {
        let coordinator = Runner::new(Config::default())
            .coordinator(Arc::new(MockTransport::new()))
            .await;

        drive(&coordinator, stream::empty(), std::future::pending()).await;

        assert!(coordinator.is_shut_down());
    }
}
