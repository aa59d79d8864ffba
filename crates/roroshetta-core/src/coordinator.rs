//! Polling coordinator.
//!
//! The [`Coordinator`] runs sessions for registered devices and hands the
//! resulting readings to [`Publisher`]s. The host decides when: it calls
//! [`Coordinator::on_tick`] on its update interval (or lets
//! [`Coordinator::run_polling`] do that) and [`Coordinator::request_refresh`]
//! for on-demand reads. Nothing here spawns tasks; sessions for different
//! devices run concurrently inside the caller's future.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use roroshetta_types::Reading;

use crate::advertisement::{Advertisement, DeviceIdentity};
use crate::error::{Error, Result};
use crate::events::{DeviceEvent, EventDispatcher, EventReceiver};
use crate::registry::{DeviceRegistry, Discovery};
use crate::session::{PairingState, Session, SessionConfig, SessionState};
use crate::transport::Transport;

/// Default time between polling rounds.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Receives every new reading exactly once.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver a reading. Errors are logged and do not affect other publishers.
    async fn publish(&self, identity: &DeviceIdentity, reading: &Reading) -> Result<()>;
}

/// Configuration for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Timeouts and retries for each session.
    pub session: SessionConfig,
    /// Time between polling rounds in [`Coordinator::run_polling`].
    pub update_interval: Duration,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            event_capacity: 100,
        }
    }
}

/// What one triggered refresh came to.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A reading was stored and published.
    Published(Reading),
    /// Every attempt failed; nothing was published.
    Failed(Error),
    /// A session for the device was already running.
    Skipped,
    /// The session was cancelled; nothing was published.
    Cancelled,
}

impl RefreshOutcome {
    /// The published reading, if any.
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Self::Published(reading) => Some(reading),
            _ => None,
        }
    }

    /// Whether a reading was published.
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// Drives sessions for all registered devices.
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    publishers: RwLock<Vec<Arc<dyn Publisher>>>,
    events: EventDispatcher,
    config: CoordinatorConfig,
    shutdown: CancellationToken,
}

impl Coordinator {
    /// Create a coordinator with an empty registry.
    pub fn new(transport: Arc<dyn Transport>, config: CoordinatorConfig) -> Self {
        let shutdown = CancellationToken::new();
        let registry = Arc::new(DeviceRegistry::new(shutdown.child_token()));
        Self {
            transport,
            registry,
            publishers: RwLock::new(Vec::new()),
            events: EventDispatcher::new(config.event_capacity),
            config,
            shutdown,
        }
    }

    /// The device registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The coordinator's configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Subscribe to device events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Add a reading subscriber.
    pub async fn add_publisher(&self, publisher: Arc<dyn Publisher>) {
        self.publishers.write().await.push(publisher);
    }

    /// Feed an advertisement to the registry.
    ///
    /// Returns the identity of a matching device.
    pub async fn on_advertisement(&self, adv: &Advertisement) -> Option<DeviceIdentity> {
        match self.registry.on_advertisement(adv).await? {
            Discovery::New(identity) => {
                self.events.send(DeviceEvent::Discovered {
                    device: identity.clone(),
                    name: adv.local_name.clone(),
                    rssi: adv.rssi,
                });
                Some(identity)
            }
            Discovery::Updated(identity) => Some(identity),
        }
    }

    /// Register a device ahead of its first advertisement.
    pub async fn register(&self, identity: DeviceIdentity, name: Option<String>) -> bool {
        self.registry.register(identity, name).await
    }

    /// Remove a device, cancelling its session.
    pub async fn remove(&self, identity: &DeviceIdentity) -> bool {
        if self.registry.remove(identity).await.is_some() {
            self.events.send(DeviceEvent::Removed {
                device: identity.clone(),
            });
            true
        } else {
            false
        }
    }

    /// Run one polling round: a session for every device not already busy.
    ///
    /// Sessions run concurrently; each publishes as soon as it finishes.
    pub async fn on_tick(&self) -> Vec<(DeviceIdentity, RefreshOutcome)> {
        let identities = self.registry.identities().await;
        debug!("Polling {} device(s)", identities.len());

        let futures = identities.into_iter().map(|identity| async move {
            let outcome = match self.refresh(&identity).await {
                Ok(outcome) => outcome,
                // Removed between listing and claiming
                Err(e) => {
                    debug!("Skipping {}: {}", identity, e);
                    RefreshOutcome::Skipped
                }
            };
            (identity, outcome)
        });

        join_all(futures).await
    }

    /// Run a session for one device now.
    ///
    /// Returns [`RefreshOutcome::Skipped`] if one is already running.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`] if the device is not registered.
    pub async fn request_refresh(&self, identity: &DeviceIdentity) -> Result<RefreshOutcome> {
        self.refresh(identity).await
    }

    /// Call [`Coordinator::on_tick`] every update interval until shutdown.
    ///
    /// The first round runs immediately.
    pub async fn run_polling(&self) {
        let mut ticker = tokio::time::interval(self.config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Polling stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let outcomes = self.on_tick().await;
                    let published = outcomes.iter().filter(|(_, o)| o.is_published()).count();
                    debug!("Polling round done: {}/{} published", published, outcomes.len());
                }
            }
        }
    }

    /// Cancel every running session and stop [`Coordinator::run_polling`].
    pub fn shutdown(&self) {
        info!("Shutting down coordinator");
        self.shutdown.cancel();
    }

    /// Whether [`Coordinator::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn refresh(&self, identity: &DeviceIdentity) -> Result<RefreshOutcome> {
        let permit = match self.registry.begin_session(identity).await {
            Ok(permit) => permit,
            Err(Error::SessionBusy) => {
                debug!("Session already running for {}, skipping", identity);
                return Ok(RefreshOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        self.events.send(DeviceEvent::SessionStarted {
            device: identity.clone(),
        });

        let report = Session::new(
            Arc::clone(&self.transport),
            identity.clone(),
            self.config.session.clone(),
            permit.cancel.clone(),
        )
        .with_state(Arc::clone(&permit.state))
        .run()
        .await;

        match report.pairing {
            Some(PairingState::Paired) => self.events.send(DeviceEvent::Paired {
                device: identity.clone(),
            }),
            Some(PairingState::Failed) => self.events.send(DeviceEvent::PairingFailed {
                device: identity.clone(),
            }),
            _ => {}
        }

        if permit.cancel.is_cancelled() {
            permit.state.send_replace(SessionState::Idle);
            self.events.send(DeviceEvent::SessionCancelled {
                device: identity.clone(),
            });
            return Ok(RefreshOutcome::Cancelled);
        }

        let outcome = match report.result {
            Ok(reading) => {
                self.registry
                    .record_success(identity, reading, report.pairing)
                    .await;
                self.publish(identity, &reading).await;
                self.events.send(DeviceEvent::Reading {
                    device: identity.clone(),
                    reading,
                });
                RefreshOutcome::Published(reading)
            }
            Err(Error::Cancelled) => {
                permit.state.send_replace(SessionState::Idle);
                self.events.send(DeviceEvent::SessionCancelled {
                    device: identity.clone(),
                });
                RefreshOutcome::Cancelled
            }
            Err(e) => {
                self.registry
                    .record_failure(identity, &e, report.pairing)
                    .await;
                warn!("Failed to read {}: {}", identity, e);
                self.events.send(DeviceEvent::SessionFailed {
                    device: identity.clone(),
                    attempts: report.attempts,
                    error: e.to_string(),
                });
                RefreshOutcome::Failed(e)
            }
        };

        // Held until the outcome is stored and published
        drop(permit);
        Ok(outcome)
    }

    async fn publish(&self, identity: &DeviceIdentity, reading: &Reading) {
        let publishers = self.publishers.read().await.clone();
        for publisher in publishers {
            if let Err(e) = publisher.publish(identity, reading).await {
                warn!("Failed to publish reading for {}: {}", identity, e);
            }
        }
    }
}
