//! Connection guard for automatic disconnect on drop.
//!
//! A session wraps every established connection in a [`ConnectionGuard`].
//! The normal path calls [`ConnectionGuard::release`], which disconnects and
//! waits for it. If the guard is dropped instead (the session future was
//! dropped mid-flight), a best-effort disconnect is spawned on the current
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::advertisement::DeviceIdentity;
use crate::error::Error;
use crate::transport::Transport;

/// Owns one live connection until it is released or dropped.
pub struct ConnectionGuard {
    transport: Option<Arc<dyn Transport>>,
    identity: DeviceIdentity,
    timeout: Duration,
}

impl ConnectionGuard {
    /// Take ownership of an established connection.
    ///
    /// `timeout` bounds the disconnect call.
    pub fn new(transport: Arc<dyn Transport>, identity: DeviceIdentity, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            identity,
            timeout,
        }
    }

    /// The device this guard holds a connection to.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Disconnect and wait for it.
    ///
    /// Errors are logged and swallowed; a failed disconnect never changes the
    /// outcome of the session that owned the connection.
    pub async fn release(mut self) {
        if let Some(transport) = self.transport.take() {
            disconnect(transport, self.identity.clone(), self.timeout).await;
        }
    }
}

async fn disconnect(transport: Arc<dyn Transport>, identity: DeviceIdentity, timeout: Duration) {
    match tokio::time::timeout(timeout, transport.disconnect(&identity)).await {
        Ok(Ok(())) => debug!("Disconnected from {}", identity),
        Ok(Err(e)) => warn!("Failed to disconnect from {}: {}", identity, e),
        Err(_) => warn!(
            "Failed to disconnect from {}: {}",
            identity,
            Error::timeout("disconnect", timeout)
        ),
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            let identity = self.identity.clone();
            let timeout = self.timeout;
            // Try to get a runtime handle to perform async disconnect
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(disconnect(transport, identity, timeout));
            } else {
                warn!(
                    "No tokio runtime available to disconnect {} in guard drop",
                    identity
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("C8:2B:96:00:00:01")
    }

    #[tokio::test]
    async fn test_release_disconnects() {
        let mock = Arc::new(MockTransport::new());
        let guard = ConnectionGuard::new(mock.clone(), identity(), Duration::from_secs(1));
        guard.release().await;
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_release_swallows_errors() {
        let mock = Arc::new(MockTransport::builder().fail_disconnect().build());
        let guard = ConnectionGuard::new(mock.clone(), identity(), Duration::from_secs(1));
        guard.release().await;
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_disconnects() {
        let mock = Arc::new(MockTransport::new());
        {
            let _guard = ConnectionGuard::new(mock.clone(), identity(), Duration::from_secs(1));
        }
        // Let the spawned disconnect run
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_bounded_by_timeout() {
        let mock = Arc::new(
            MockTransport::builder()
                .disconnect_latency(Duration::from_secs(60))
                .build(),
        );
        let guard = ConnectionGuard::new(mock.clone(), identity(), Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        guard.release().await;
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
