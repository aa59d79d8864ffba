//! Long-lived records for every known sensor.
//!
//! The registry turns advertisements into [`DeviceRecord`]s and owns the
//! per-device session machinery: a mutex that admits one session at a time,
//! a cancellation token, and a watch channel carrying the [`SessionState`].
//! Records are never dropped implicitly; only [`DeviceRegistry::remove`]
//! forgets a device. A removed device's session lock outlives its record
//! until the running session ends, so a device that comes back straight
//! away cannot get a second session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use roroshetta_types::Reading;

use crate::advertisement::{Advertisement, DeviceIdentity, match_advertisement};
use crate::error::{Error, Result};
use crate::session::{PairingState, SessionState};

/// Everything known about one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identity.
    pub identity: DeviceIdentity,
    /// Advertised name, if any.
    pub name: Option<String>,
    /// Signal strength of the latest advertisement.
    pub rssi: Option<i16>,
    /// When the device was first registered.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    /// When the device was last advertised or registered.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    /// Pairing status.
    pub pairing_state: PairingState,
    /// State of the current or most recent session.
    pub connection_state: SessionState,
    /// Most recent reading.
    pub last_reading: Option<Reading>,
    /// When `last_reading` was taken.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_reading_at: Option<OffsetDateTime>,
    /// Error of the most recent failed session.
    pub last_error: Option<String>,
    /// Failed sessions since the last reading.
    pub consecutive_failures: u32,
}

impl DeviceRecord {
    fn new(identity: DeviceIdentity) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            identity,
            name: None,
            rssi: None,
            first_seen: now,
            last_seen: now,
            pairing_state: PairingState::Unknown,
            connection_state: SessionState::Idle,
            last_reading: None,
            last_reading_at: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Result of feeding an advertisement to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// First sighting; a record was created.
    New(DeviceIdentity),
    /// Known device; `last_seen` was refreshed.
    Updated(DeviceIdentity),
}

impl Discovery {
    /// The matched device.
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            Self::New(identity) | Self::Updated(identity) => identity,
        }
    }
}

struct DeviceSlot {
    record: DeviceRecord,
    lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
}

impl DeviceSlot {
    fn new(identity: DeviceIdentity, lock: Arc<Mutex<()>>, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            record: DeviceRecord::new(identity),
            lock,
            cancel,
            state: Arc::new(state),
        }
    }

    fn snapshot(&self) -> DeviceRecord {
        let mut record = self.record.clone();
        record.connection_state = *self.state.borrow();
        record
    }
}

/// Exclusive right to run a session for one device.
///
/// Holding it keeps every other session for the device out; dropping it
/// lets the next one in.
pub struct SessionPermit {
    _guard: OwnedMutexGuard<()>,
    /// Cancelled when the device is removed or the registry shuts down.
    pub cancel: CancellationToken,
    /// Where the session reports its state.
    pub state: Arc<watch::Sender<SessionState>>,
}

/// Registry of known Roroshetta Sense devices.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceIdentity, DeviceSlot>>,
    /// Locks of removed devices whose session is still running.
    /// Only touched while `devices` is write-locked.
    retired: std::sync::Mutex<HashMap<DeviceIdentity, Arc<Mutex<()>>>>,
    root: CancellationToken,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl DeviceRegistry {
    /// Create an empty registry. Per-device tokens are children of `root`.
    pub fn new(root: CancellationToken) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            retired: std::sync::Mutex::new(HashMap::new()),
            root,
        }
    }

    fn retired(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceIdentity, Arc<Mutex<()>>>> {
        self.retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A fresh slot, reusing the lock of a removed session that is still running.
    fn new_slot(&self, identity: &DeviceIdentity) -> DeviceSlot {
        let mut retired = self.retired();
        // A lock only the map refers to has no session behind it
        retired.retain(|_, lock| Arc::strong_count(lock) > 1);
        let lock = retired
            .remove(identity)
            .unwrap_or_else(|| Arc::new(Mutex::new(())));
        DeviceSlot::new(identity.clone(), lock, self.root.child_token())
    }

    /// Match an advertisement and create or refresh its record.
    ///
    /// Returns `None` for advertisements from other devices.
    pub async fn on_advertisement(&self, adv: &Advertisement) -> Option<Discovery> {
        let identity = match_advertisement(adv)?;
        let mut devices = self.devices.write().await;

        let discovery = if devices.contains_key(&identity) {
            Discovery::Updated(identity.clone())
        } else {
            info!("Discovered Roroshetta Sense {}", identity);
            let slot = self.new_slot(&identity);
            devices.insert(identity.clone(), slot);
            Discovery::New(identity.clone())
        };

        if let Some(slot) = devices.get_mut(&identity) {
            let record = &mut slot.record;
            record.last_seen = OffsetDateTime::now_utc();
            if adv.local_name.is_some() {
                record.name = adv.local_name.clone();
            }
            if adv.rssi.is_some() {
                record.rssi = adv.rssi;
            }
        }

        Some(discovery)
    }

    /// Add a device without waiting for its advertisement.
    ///
    /// Returns `false` if it was already known.
    pub async fn register(&self, identity: DeviceIdentity, name: Option<String>) -> bool {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&identity) {
            return false;
        }
        debug!("Registered {}", identity);
        let mut slot = self.new_slot(&identity);
        slot.record.name = name;
        devices.insert(identity, slot);
        true
    }

    /// Forget a device, cancelling its session if one is running.
    pub async fn remove(&self, identity: &DeviceIdentity) -> Option<DeviceRecord> {
        let mut devices = self.devices.write().await;
        let slot = devices.remove(identity)?;
        slot.cancel.cancel();
        if slot.lock.try_lock().is_err() {
            debug!("Keeping session lock of {} until its session ends", identity);
            self.retired().insert(identity.clone(), Arc::clone(&slot.lock));
        }
        drop(devices);
        info!("Removed {}", identity);
        Some(slot.snapshot())
    }

    /// Snapshot of one record.
    pub async fn get(&self, identity: &DeviceIdentity) -> Option<DeviceRecord> {
        self.devices.read().await.get(identity).map(DeviceSlot::snapshot)
    }

    /// Snapshots of all records, ordered by address.
    pub async fn records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<_> = self
            .devices
            .read()
            .await
            .values()
            .map(DeviceSlot::snapshot)
            .collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        records
    }

    /// All known identities, ordered by address.
    pub async fn identities(&self) -> Vec<DeviceIdentity> {
        let mut identities: Vec<_> = self.devices.read().await.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Number of known devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether no devices are known.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Watch a device's session state.
    pub async fn watch_state(&self, identity: &DeviceIdentity) -> Option<watch::Receiver<SessionState>> {
        self.devices
            .read()
            .await
            .get(identity)
            .map(|slot| slot.state.subscribe())
    }

    /// Whether a session is running for the device.
    pub async fn is_busy(&self, identity: &DeviceIdentity) -> bool {
        self.devices
            .read()
            .await
            .get(identity)
            .is_some_and(|slot| slot.lock.try_lock().is_err())
    }

    /// Claim the device for a session.
    ///
    /// # Errors
    ///
    /// [`Error::SessionBusy`] if a session is already running for it,
    /// [`Error::DeviceNotFound`] if it is not registered.
    pub async fn begin_session(&self, identity: &DeviceIdentity) -> Result<SessionPermit> {
        let devices = self.devices.read().await;
        let slot = devices
            .get(identity)
            .ok_or_else(|| Error::device_not_found(identity.address.clone()))?;
        let guard = Arc::clone(&slot.lock)
            .try_lock_owned()
            .map_err(|_| Error::SessionBusy)?;
        Ok(SessionPermit {
            _guard: guard,
            cancel: slot.cancel.clone(),
            state: Arc::clone(&slot.state),
        })
    }

    /// Store a successful reading. Resets the failure count.
    pub async fn record_success(
        &self,
        identity: &DeviceIdentity,
        reading: Reading,
        pairing: Option<PairingState>,
    ) {
        self.update(identity, |record| {
            record.last_reading = Some(reading);
            record.last_reading_at = Some(OffsetDateTime::now_utc());
            record.last_error = None;
            record.consecutive_failures = 0;
            if let Some(pairing) = pairing {
                record.pairing_state = pairing;
            }
        })
        .await;
    }

    /// Note a failed session. The previous reading is kept.
    pub async fn record_failure(
        &self,
        identity: &DeviceIdentity,
        error: &Error,
        pairing: Option<PairingState>,
    ) {
        self.update(identity, |record| {
            record.last_error = Some(error.to_string());
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            if let Some(pairing) = pairing {
                record.pairing_state = pairing;
            }
        })
        .await;
    }

    /// Cancel every device's session.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    async fn update(&self, identity: &DeviceIdentity, apply: impl FnOnce(&mut DeviceRecord)) {
        if let Some(slot) = self.devices.write().await.get_mut(identity) {
            apply(&mut slot.record);
        }
    }
}
