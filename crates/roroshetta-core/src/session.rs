//! One connect-through-disconnect cycle with a single device.
//!
//! A [`Session`] walks the device through
//! `Connecting -> [Pairing] -> Subscribing -> AwaitingNotification -> Decoding
//! -> Disconnecting` and ends in [`SessionState::Success`] or
//! [`SessionState::Failed`]. Failed attempts are retried according to the
//! [`RetryPolicy`] in the [`SessionConfig`]; every attempt disconnects
//! before the next one starts.
//!
//! Cancellation is checked at every suspension point. A cancelled session
//! still disconnects and never yields a reading.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use roroshetta_types::uuid::TELEMETRY_CHARACTERISTIC;
use roroshetta_types::{Reading, frame};

use crate::advertisement::DeviceIdentity;
use crate::error::{Error, Result};
use crate::guard::ConnectionGuard;
use crate::retry::{RetryPolicy, is_retryable};
use crate::transport::Transport;

/// Default bound on connect, pair, subscribe and disconnect calls.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the telemetry notification.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(8);

/// Where a device's session currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session running.
    #[default]
    Idle,
    /// Establishing the GATT connection.
    Connecting,
    /// Pairing after the device refused an unpaired connection.
    Pairing,
    /// Enabling telemetry notifications.
    Subscribing,
    /// Waiting for the telemetry frame.
    AwaitingNotification,
    /// Decoding the received frame.
    Decoding,
    /// Tearing the connection down.
    Disconnecting,
    /// The last session produced a reading.
    Success,
    /// The last session used up its attempts.
    Failed,
}

impl SessionState {
    /// Whether this state belongs to a running session.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Pairing => "pairing",
            Self::Subscribing => "subscribing",
            Self::AwaitingNotification => "awaiting notification",
            Self::Decoding => "decoding",
            Self::Disconnecting => "disconnecting",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Whether the device is known to be bonded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingState {
    /// Never needed or never attempted.
    #[default]
    Unknown,
    /// Pairing succeeded.
    Paired,
    /// The last pairing attempt failed.
    Failed,
}

/// Timeouts and retry policy for sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Attempts and backoff.
    pub retry: RetryPolicy,
    /// Bound on each connect, pair, subscribe and disconnect call.
    pub connect_timeout: Duration,
    /// How long to wait for the telemetry notification.
    pub notification_timeout: Duration,
    /// Characteristic that carries the telemetry frame.
    pub characteristic: Uuid,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            characteristic: TELEMETRY_CHARACTERISTIC,
        }
    }
}

impl SessionConfig {
    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the notification timeout.
    #[must_use]
    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Check for values a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect_timeout must be greater than zero"));
        }
        if self.notification_timeout.is_zero() {
            return Err(Error::invalid_config(
                "notification_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What a finished session produced.
#[derive(Debug)]
pub struct SessionReport {
    /// The reading, or the terminal error.
    ///
    /// Failures after at least one attempt are wrapped in
    /// [`Error::SessionFailed`]; cancellation is [`Error::Cancelled`].
    pub result: Result<Reading>,
    /// Attempts started.
    pub attempts: u32,
    /// Outcome of pairing, if pairing was attempted.
    pub pairing: Option<PairingState>,
}

/// One triggered session for one device.
pub struct Session {
    transport: Arc<dyn Transport>,
    identity: DeviceIdentity,
    config: SessionConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
    pairing: Option<PairingState>,
}

impl Session {
    /// Prepare a session. Nothing happens until [`Session::run`].
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: DeviceIdentity,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            transport,
            identity,
            config,
            cancel,
            state: Arc::new(state),
            pairing: None,
        }
    }

    /// Report state transitions on `state`.
    #[must_use]
    pub fn with_state(mut self, state: Arc<watch::Sender<SessionState>>) -> Self {
        self.state = state;
        self
    }

    /// Watch this session's state.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run attempts until one yields a reading, the attempts are used up, or
    /// the session is cancelled.
    #[tracing::instrument(name = "session", skip(self), fields(device = %self.identity))]
    pub async fn run(mut self) -> SessionReport {
        if let Err(e) = self.config.validate() {
            self.set_state(SessionState::Failed);
            return self.report(Err(e), 0);
        }

        let policy = self.config.retry.clone();
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            match self.attempt(attempt).await {
                Ok(reading) => break Ok(reading),
                Err(Error::Cancelled) => break Err(Error::Cancelled),
                Err(e) if !is_retryable(&e) || !policy.has_next(attempt) => {
                    break Err(Error::session_failed(attempt, e));
                }
                Err(e) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, policy.max_attempts, e, delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        match &result {
            Ok(reading) => {
                info!(
                    attempts = attempt,
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    co2 = reading.co2,
                    "Session succeeded"
                );
                self.set_state(SessionState::Success);
            }
            Err(Error::Cancelled) => {
                debug!("Session cancelled");
                self.set_state(SessionState::Idle);
            }
            Err(e) => {
                warn!("{}", e);
                self.set_state(SessionState::Failed);
            }
        }

        self.report(result, attempt)
    }

    fn report(&self, result: Result<Reading>, attempts: u32) -> SessionReport {
        SessionReport {
            result,
            attempts,
            pairing: self.pairing,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    async fn attempt(&mut self, attempt: u32) -> Result<Reading> {
        debug!(attempt, "Starting attempt");

        if let Err(e) = self.connect().await {
            // The link may be up even though connecting failed: a late
            // connect after a timeout, or a failure during service discovery
            self.set_state(SessionState::Disconnecting);
            self.guard().release().await;
            return Err(e);
        }

        let guard = self.guard();
        let mut subscribed = false;
        let result = self.exchange(&mut subscribed).await;

        self.set_state(SessionState::Disconnecting);
        if subscribed {
            let unsubscribe = self
                .transport
                .unsubscribe(&self.identity, self.config.characteristic);
            match tokio::time::timeout(self.config.connect_timeout, unsubscribe).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Failed to stop notifications: {}", e),
                Err(_) => debug!("Timed out stopping notifications"),
            }
        }
        guard.release().await;

        result
    }

    fn guard(&self) -> ConnectionGuard {
        ConnectionGuard::new(
            Arc::clone(&self.transport),
            self.identity.clone(),
            self.config.connect_timeout,
        )
    }

    async fn connect(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);

        let connected = self
            .call("connect", self.transport.connect(&self.identity))
            .await;

        match connected {
            Err(e) if e.requires_pairing() => {
                info!("Device requires pairing, pairing now");
                self.set_state(SessionState::Pairing);

                let paired = self.call("pair", self.transport.pair(&self.identity)).await;
                if let Err(e) = paired {
                    if matches!(e, Error::Cancelled) {
                        return Err(e);
                    }
                    self.pairing = Some(PairingState::Failed);
                    return Err(match e {
                        Error::PairingFailed(_) => e,
                        other => Error::PairingFailed(other.to_string()),
                    });
                }

                info!("Paired");
                self.pairing = Some(PairingState::Paired);
                self.set_state(SessionState::Connecting);
                self.call("connect", self.transport.connect(&self.identity))
                    .await
            }
            other => other,
        }
    }

    async fn exchange(&self, subscribed: &mut bool) -> Result<Reading> {
        self.set_state(SessionState::Subscribing);
        let mut frames = self
            .call(
                "subscribe",
                self.transport
                    .subscribe(&self.identity, self.config.characteristic),
            )
            .await?;
        *subscribed = true;

        self.set_state(SessionState::AwaitingNotification);
        let timeout = self.config.notification_timeout;
        let bytes = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            next = tokio::time::timeout(timeout, frames.next()) => match next {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    return Err(Error::SubscribeFailed(
                        "notification stream ended".to_string(),
                    ));
                }
                Err(_) => return Err(Error::NotificationTimeout(timeout)),
            },
        };

        self.set_state(SessionState::Decoding);
        debug!(len = bytes.len(), "Received telemetry frame");
        Ok(frame::decode(&bytes)?)
    }

    /// Await a transport call, bounded by the connect timeout and the
    /// cancellation token.
    async fn call<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.connect_timeout;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, fut) => {
                result.unwrap_or_else(|_| Err(Error::timeout(operation, timeout)))
            }
        }
    }
}
