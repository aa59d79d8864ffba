//! The BLE capability a session runs against.
//!
//! [`Transport`] abstracts over the real Bluetooth stack
//! ([`BleTransport`](crate::ble::BleTransport)) and the scripted
//! [`MockTransport`](crate::mock::MockTransport) used in tests. Any call may
//! fail or hang; callers bound every call with a timeout.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::advertisement::DeviceIdentity;
use crate::error::Result;

/// Stream of raw notification payloads from one characteristic.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// Connection-level operations on a BLE device.
///
/// One transport serves every device; calls are keyed by [`DeviceIdentity`].
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
/// use roroshetta_core::{DeviceIdentity, Transport};
/// use roroshetta_types::uuid::TELEMETRY_CHARACTERISTIC;
///
/// async fn first_frame(transport: &dyn Transport, id: &DeviceIdentity) -> roroshetta_core::Result<Vec<u8>> {
///     transport.connect(id).await?;
///     let mut frames = transport.subscribe(id, TELEMETRY_CHARACTERISTIC).await?;
///     let frame = frames.next().await;
///     transport.disconnect(id).await?;
///     frame.ok_or(roroshetta_core::Error::SubscribeFailed("stream ended".into()))
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a GATT connection.
    ///
    /// A device that insists on pairing should fail with
    /// [`ConnectionFailureReason::PairingRequired`](crate::ConnectionFailureReason::PairingRequired).
    async fn connect(&self, identity: &DeviceIdentity) -> Result<()>;

    /// Pair (bond) with the device. Pairing an already paired device succeeds.
    async fn pair(&self, identity: &DeviceIdentity) -> Result<()>;

    /// Enable notifications on `characteristic` and stream their payloads.
    async fn subscribe(
        &self,
        identity: &DeviceIdentity,
        characteristic: Uuid,
    ) -> Result<NotificationStream>;

    /// Disable notifications on `characteristic`.
    ///
    /// The default implementation does nothing.
    async fn unsubscribe(&self, _identity: &DeviceIdentity, _characteristic: Uuid) -> Result<()> {
        Ok(())
    }

    /// Tear down the connection.
    async fn disconnect(&self, identity: &DeviceIdentity) -> Result<()>;
}
