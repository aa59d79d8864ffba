//! Mock transport implementation for testing.
//!
//! [`MockTransport`] implements [`Transport`] without any Bluetooth hardware.
//! Its behaviour is scripted per operation: queued steps are consumed one per
//! call, and once a queue is empty the configured default applies.
//!
//! # Features
//!
//! - **Failure injection**: connect, pair and subscribe failures, hangs, missing devices
//! - **Pairing**: a device that refuses connections until paired
//! - **Notifications**: immediate, delayed, silent or ending streams per subscription
//! - **Latency simulation**: connect and disconnect delays, driven by tokio time
//! - **Inspection**: call counters, connect timestamps, overlapping connections

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tokio::time::Instant;
use uuid::Uuid;

use roroshetta_types::{Reading, frame};

use crate::advertisement::DeviceIdentity;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{NotificationStream, Transport};

/// Outcome of one scripted `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStep {
    /// Connect normally (still subject to pairing).
    Succeed,
    /// Fail with the given reason.
    Fail(ConnectionFailureReason),
    /// Never complete.
    Hang,
}

/// What the notification stream of one subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Deliver the payload right away.
    Frame(Vec<u8>),
    /// Deliver the payload after a delay.
    Delayed(Duration, Vec<u8>),
    /// Deliver nothing, keep the stream open.
    Silent,
    /// End the stream without delivering anything.
    End,
}

/// Reading delivered by a default [`MockTransport`].
pub fn sample_reading() -> Reading {
    Reading {
        temperature: 21.5,
        heat_index: 21.0,
        humidity: 45.0,
        co2: 612,
        tvoc: 120,
        pm2_5: 3.5,
        aqi: 24,
        power: 35,
        uptime: 86_400,
        light_level: 15,
        fan_speed: 10,
        grease_filter_status: 92,
        activity_level: 2,
        alarm_level: 0,
    }
}

/// A scripted [`Transport`] for tests.
///
/// # Example
///
/// ```
/// use roroshetta_core::mock::MockTransport;
/// use roroshetta_core::{ConnectionFailureReason, DeviceIdentity, Transport};
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockTransport::builder()
///         .fail_connect(ConnectionFailureReason::GattEstablish)
///         .build();
///     let id = DeviceIdentity::new("C8:2B:96:00:00:01");
///
///     assert!(mock.connect(&id).await.is_err());
///     assert!(mock.connect(&id).await.is_ok());
///     assert_eq!(mock.connect_count(), 2);
/// }
/// ```
pub struct MockTransport {
    connect_script: Mutex<VecDeque<ConnectStep>>,
    default_connect: ConnectStep,
    pair_failures: Mutex<VecDeque<String>>,
    subscribe_failures: Mutex<VecDeque<String>>,
    notifications: Mutex<VecDeque<Notification>>,
    default_notification: Mutex<Notification>,
    missing: HashSet<String>,
    requires_pairing: bool,
    paired: AtomicBool,
    connect_latency: Duration,
    disconnect_latency: Duration,
    fail_disconnect: bool,
    connect_count: AtomicU32,
    pair_count: AtomicU32,
    subscribe_count: AtomicU32,
    unsubscribe_count: AtomicU32,
    disconnect_count: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
    open: Mutex<HashMap<DeviceIdentity, u32>>,
    overlapping: AtomicBool,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("default_connect", &self.default_connect)
            .field("requires_pairing", &self.requires_pairing)
            .field("paired", &self.paired.load(Ordering::Relaxed))
            .field("connect_count", &self.connect_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransportBuilder::new().build()
    }
}

impl MockTransport {
    /// A healthy device that answers every subscription with [`sample_reading`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a scripted transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    /// Change the reading delivered once the notification script is used up.
    pub fn set_reading(&self, reading: &Reading) {
        *lock(&self.default_notification) = Notification::Frame(frame::encode(reading).to_vec());
    }

    /// Queue a step for a future `connect` call.
    pub fn push_connect_step(&self, step: ConnectStep) {
        lock(&self.connect_script).push_back(step);
    }

    /// Queue a notification for a future subscription.
    pub fn push_notification(&self, notification: Notification) {
        lock(&self.notifications).push_back(notification);
    }

    /// Number of `connect` calls.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of `pair` calls.
    pub fn pair_count(&self) -> u32 {
        self.pair_count.load(Ordering::SeqCst)
    }

    /// Number of `subscribe` calls.
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    /// Number of `unsubscribe` calls.
    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    /// When each `connect` call started.
    pub fn connect_times(&self) -> Vec<Instant> {
        lock(&self.connect_times).clone()
    }

    /// Whether a successful `pair` call has happened.
    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    /// Connections established and not yet disconnected.
    pub fn open_connections(&self) -> u32 {
        lock(&self.open).values().sum()
    }

    /// Whether a device was ever connected twice at the same time.
    pub fn overlapping_connects(&self) -> bool {
        self.overlapping.load(Ordering::SeqCst)
    }

    fn notification_stream(notification: Notification) -> NotificationStream {
        match notification {
            Notification::Frame(bytes) => stream::once(async move { bytes })
                .chain(stream::pending())
                .boxed(),
            Notification::Delayed(delay, bytes) => stream::once(async move {
                tokio::time::sleep(delay).await;
                bytes
            })
            .chain(stream::pending())
            .boxed(),
            Notification::Silent => stream::pending().boxed(),
            Notification::End => stream::empty().boxed(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, identity: &DeviceIdentity) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.connect_times).push(Instant::now());

        if self.missing.contains(&identity.address) {
            return Err(Error::device_not_found(identity.address.clone()));
        }

        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }

        let step = lock(&self.connect_script)
            .pop_front()
            .unwrap_or_else(|| self.default_connect.clone());

        match step {
            ConnectStep::Hang => std::future::pending().await,
            ConnectStep::Fail(reason) => Err(Error::connection_failed(
                Some(identity.address.clone()),
                reason,
            )),
            ConnectStep::Succeed => {
                if self.requires_pairing && !self.is_paired() {
                    return Err(Error::connection_failed(
                        Some(identity.address.clone()),
                        ConnectionFailureReason::PairingRequired,
                    ));
                }
                let mut open = lock(&self.open);
                let count = open.entry(identity.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    self.overlapping.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
        }
    }

    async fn pair(&self, _identity: &DeviceIdentity) -> Result<()> {
        self.pair_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.pair_failures).pop_front() {
            return Err(Error::PairingFailed(message));
        }
        self.paired.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        _identity: &DeviceIdentity,
        _characteristic: Uuid,
    ) -> Result<NotificationStream> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.subscribe_failures).pop_front() {
            return Err(Error::SubscribeFailed(message));
        }
        let notification = lock(&self.notifications)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default_notification).clone());
        Ok(Self::notification_stream(notification))
    }

    async fn unsubscribe(&self, _identity: &DeviceIdentity, _characteristic: Uuid) -> Result<()> {
        self.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self, identity: &DeviceIdentity) -> Result<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        if !self.disconnect_latency.is_zero() {
            tokio::time::sleep(self.disconnect_latency).await;
        }
        {
            let mut open = lock(&self.open);
            if let Some(count) = open.get_mut(identity) {
                *count -= 1;
                if *count == 0 {
                    open.remove(identity);
                }
            }
        }
        if self.fail_disconnect {
            return Err(Error::connection_failed(
                Some(identity.address.clone()),
                ConnectionFailureReason::Other("mock disconnect failure".to_string()),
            ));
        }
        Ok(())
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    connect_script: VecDeque<ConnectStep>,
    default_connect: ConnectStep,
    pair_failures: VecDeque<String>,
    subscribe_failures: VecDeque<String>,
    notifications: VecDeque<Notification>,
    default_notification: Notification,
    missing: HashSet<String>,
    requires_pairing: bool,
    connect_latency: Duration,
    disconnect_latency: Duration,
    fail_disconnect: bool,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportBuilder {
    /// Create a builder for a healthy device.
    pub fn new() -> Self {
        Self {
            connect_script: VecDeque::new(),
            default_connect: ConnectStep::Succeed,
            pair_failures: VecDeque::new(),
            subscribe_failures: VecDeque::new(),
            notifications: VecDeque::new(),
            default_notification: Notification::Frame(frame::encode(&sample_reading()).to_vec()),
            missing: HashSet::new(),
            requires_pairing: false,
            connect_latency: Duration::ZERO,
            disconnect_latency: Duration::ZERO,
            fail_disconnect: false,
        }
    }

    /// Deliver `reading` on every subscription without a scripted notification.
    #[must_use]
    pub fn reading(mut self, reading: &Reading) -> Self {
        self.default_notification = Notification::Frame(frame::encode(reading).to_vec());
        self
    }

    /// Deliver raw `bytes` on every subscription without a scripted notification.
    #[must_use]
    pub fn frame(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.default_notification = Notification::Frame(bytes.into());
        self
    }

    /// Never notify unless a notification is scripted.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.default_notification = Notification::Silent;
        self
    }

    /// Script notifications, one per subscription.
    #[must_use]
    pub fn notifications(mut self, notifications: impl IntoIterator<Item = Notification>) -> Self {
        self.notifications.extend(notifications);
        self
    }

    /// Script connect outcomes, one per call.
    #[must_use]
    pub fn connect_steps(mut self, steps: impl IntoIterator<Item = ConnectStep>) -> Self {
        self.connect_script.extend(steps);
        self
    }

    /// Fail the next connect with `reason`.
    #[must_use]
    pub fn fail_connect(self, reason: ConnectionFailureReason) -> Self {
        self.fail_connect_times(1, reason)
    }

    /// Fail the next `times` connects with `reason`.
    #[must_use]
    pub fn fail_connect_times(mut self, times: usize, reason: ConnectionFailureReason) -> Self {
        self.connect_script
            .extend(std::iter::repeat_n(ConnectStep::Fail(reason), times));
        self
    }

    /// Fail every unscripted connect with `reason`.
    #[must_use]
    pub fn always_fail_connect(mut self, reason: ConnectionFailureReason) -> Self {
        self.default_connect = ConnectStep::Fail(reason);
        self
    }

    /// Never complete an unscripted connect.
    #[must_use]
    pub fn hang_connect(mut self) -> Self {
        self.default_connect = ConnectStep::Hang;
        self
    }

    /// Refuse connections until paired.
    #[must_use]
    pub fn require_pairing(mut self) -> Self {
        self.requires_pairing = true;
        self
    }

    /// Fail the next pair call.
    #[must_use]
    pub fn fail_pair(mut self, message: impl Into<String>) -> Self {
        self.pair_failures.push_back(message.into());
        self
    }

    /// Fail the next subscribe call.
    #[must_use]
    pub fn fail_subscribe(mut self, message: impl Into<String>) -> Self {
        self.subscribe_failures.push_back(message.into());
        self
    }

    /// Report `address` as unknown to the adapter.
    #[must_use]
    pub fn missing_device(mut self, address: &str) -> Self {
        self.missing.insert(DeviceIdentity::new(address).address);
        self
    }

    /// Delay every connect.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Delay every disconnect.
    #[must_use]
    pub fn disconnect_latency(mut self, latency: Duration) -> Self {
        self.disconnect_latency = latency;
        self
    }

    /// Fail every disconnect (after tearing the connection down).
    #[must_use]
    pub fn fail_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    /// Build the transport.
    pub fn build(self) -> MockTransport {
        MockTransport {
            connect_script: Mutex::new(self.connect_script),
            default_connect: self.default_connect,
            pair_failures: Mutex::new(self.pair_failures),
            subscribe_failures: Mutex::new(self.subscribe_failures),
            notifications: Mutex::new(self.notifications),
            default_notification: Mutex::new(self.default_notification),
            missing: self.missing,
            requires_pairing: self.requires_pairing,
            paired: AtomicBool::new(false),
            connect_latency: self.connect_latency,
            disconnect_latency: self.disconnect_latency,
            fail_disconnect: self.fail_disconnect,
            connect_count: AtomicU32::new(0),
            pair_count: AtomicU32::new(0),
            subscribe_count: AtomicU32::new(0),
            unsubscribe_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
            connect_times: Mutex::new(Vec::new()),
            open: Mutex::new(HashMap::new()),
            overlapping: AtomicBool::new(false),
        }
    }
}
