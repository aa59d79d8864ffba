//! Device event system for discovery, session and reading notifications.
//!
//! The [`Coordinator`](crate::Coordinator) emits a [`DeviceEvent`] for every
//! discovery, session start and outcome, and pairing change. Observers
//! subscribe through the [`EventDispatcher`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use roroshetta_types::Reading;

use crate::advertisement::DeviceIdentity;

/// Events emitted while managing devices.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// A sensor was seen for the first time.
    Discovered {
        device: DeviceIdentity,
        name: Option<String>,
        rssi: Option<i16>,
    },
    /// A device was removed from the registry.
    Removed { device: DeviceIdentity },
    /// A session started.
    SessionStarted { device: DeviceIdentity },
    /// Pairing succeeded.
    Paired { device: DeviceIdentity },
    /// Pairing failed.
    PairingFailed { device: DeviceIdentity },
    /// A session produced a reading.
    Reading {
        device: DeviceIdentity,
        reading: Reading,
    },
    /// A session used up its attempts.
    SessionFailed {
        device: DeviceIdentity,
        attempts: u32,
        error: String,
    },
    /// A session was cancelled.
    SessionCancelled { device: DeviceIdentity },
}

impl DeviceEvent {
    /// The device this event is about.
    pub fn device(&self) -> &DeviceIdentity {
        match self {
            Self::Discovered { device, .. }
            | Self::Removed { device }
            | Self::SessionStarted { device }
            | Self::Paired { device }
            | Self::PairingFailed { device }
            | Self::Reading { device, .. }
            | Self::SessionFailed { device, .. }
            | Self::SessionCancelled { device } => device,
        }
    }
}

/// Sender for device events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for device events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DeviceEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
