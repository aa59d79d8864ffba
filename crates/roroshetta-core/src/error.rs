//! Error types for roroshetta-core.
//!
//! # Retry classification
//!
//! A triggered session retries an attempt only when the failure may clear up
//! on its own:
//!
//! | Error | Retried |
//! |-------|---------|
//! | [`Error::ConnectionFailed`] | yes, unless the adapter is unavailable |
//! | [`Error::PairingFailed`] | yes |
//! | [`Error::SubscribeFailed`] | yes |
//! | [`Error::NotificationTimeout`] | yes |
//! | [`Error::Frame`] | yes |
//! | [`Error::Timeout`] | yes |
//! | [`Error::Bluetooth`] | yes |
//! | [`Error::Io`] | yes |
//! | [`Error::DeviceNotFound`] | no |
//! | [`Error::InvalidConfig`] | no |
//! | [`Error::SessionBusy`] | no |
//! | [`Error::Cancelled`] | no |
//!
//! See [`crate::retry::is_retryable`].

use std::time::Duration;

use thiserror::Error;

use roroshetta_types::ParseError;

/// Errors that can occur while talking to a Roroshetta Sense.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found by the transport.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device address that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Pairing was attempted and failed.
    #[error("Pairing failed: {0}")]
    PairingFailed(String),

    /// Enabling notifications on the telemetry characteristic failed.
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// No telemetry frame arrived within the notification window.
    #[error("No notification received within {0:?}")]
    NotificationTimeout(Duration),

    /// The notified frame could not be decoded.
    #[error("Invalid telemetry frame: {0}")]
    Frame(#[from] ParseError),

    /// Every attempt of a session failed.
    #[error("Session failed after {attempts} attempt(s): {source}")]
    SessionFailed {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: Box<Error>,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A session for this device is already running.
    #[error("A session is already in progress for this device")]
    SessionBusy,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// Transports usually only have an error message to go on;
/// [`ConnectionFailureReason::from_message`] recognises the common ones.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Device is out of range or no longer advertising.
    OutOfRange,
    /// The GATT link could not be established (common through ESP32 proxies).
    GattEstablish,
    /// Device rejected the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// The device requires pairing before it accepts the connection.
    PairingRequired,
    /// Already connected or a connection attempt is in progress.
    AlreadyConnected,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl ConnectionFailureReason {
    /// Classify a transport error message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();

        if message.contains("ESP_GATT_CONN_FAIL_ESTABLISH") {
            Self::GattEstablish
        } else if lower.contains("device not found") || lower.contains("out of range") {
            Self::OutOfRange
        } else if lower.contains("authentication")
            || lower.contains("encryption")
            || lower.contains("not paired")
            || lower.contains("pairing required")
        {
            Self::PairingRequired
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("already connected") || lower.contains("in progress") {
            Self::AlreadyConnected
        } else if lower.contains("rejected") || lower.contains("refused") {
            Self::Rejected
        } else if lower.contains("adapter") && lower.contains("not") {
            Self::AdapterUnavailable
        } else {
            Self::Other(message.to_string())
        }
    }
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::GattEstablish => write!(f, "GATT connection could not be established"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::PairingRequired => write!(f, "device requires pairing"),
            Self::AlreadyConnected => write!(f, "device already connected"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// The adapter has not seen the address.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a connection failure from a transport error message.
    ///
    /// The message is classified with [`ConnectionFailureReason::from_message`].
    pub fn connection_failed_str(device_id: Option<String>, message: impl AsRef<str>) -> Self {
        Self::ConnectionFailed {
            device_id,
            reason: ConnectionFailureReason::from_message(message.as_ref()),
        }
    }

    /// Wrap the last attempt's error into a terminal session failure.
    pub fn session_failed(attempts: u32, source: Error) -> Self {
        Self::SessionFailed {
            attempts,
            source: Box::new(source),
        }
    }

    /// Whether the device asked to be paired before it accepts a connection.
    pub fn requires_pairing(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed {
                reason: ConnectionFailureReason::PairingRequired,
                ..
            }
        )
    }

    /// The innermost error, looking through [`Error::SessionFailed`].
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::SessionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias using roroshetta-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("C8:2B:96:00:11:22");
        assert!(err.to_string().contains("C8:2B:96:00:11:22"));

        let err = Error::timeout("connect", Duration::from_secs(10));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("10s"));

        let err = Error::NotificationTimeout(Duration::from_secs(8));
        assert_eq!(err.to_string(), "No notification received within 8s");
    }

    #[test]
    fn test_classify_gatt_establish() {
        let reason = ConnectionFailureReason::from_message(
            "Error ESP_GATT_CONN_FAIL_ESTABLISH while connecting",
        );
        assert_eq!(reason, ConnectionFailureReason::GattEstablish);
    }

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            ConnectionFailureReason::from_message("Device not found"),
            ConnectionFailureReason::OutOfRange
        );
        assert_eq!(
            ConnectionFailureReason::from_message("Connection Timeout"),
            ConnectionFailureReason::Timeout
        );
        assert_eq!(
            ConnectionFailureReason::from_message("org.bluez.Error.Failed: Insufficient Authentication"),
            ConnectionFailureReason::PairingRequired
        );
        assert_eq!(
            ConnectionFailureReason::from_message("Operation already in progress"),
            ConnectionFailureReason::AlreadyConnected
        );
        assert_eq!(
            ConnectionFailureReason::from_message("something odd"),
            ConnectionFailureReason::Other("something odd".to_string())
        );
    }

    #[test]
    fn test_requires_pairing() {
        let err = Error::connection_failed(None, ConnectionFailureReason::PairingRequired);
        assert!(err.requires_pairing());
        let err = Error::connection_failed(None, ConnectionFailureReason::GattEstablish);
        assert!(!err.requires_pairing());
    }

    #[test]
    fn test_session_failed_root_cause() {
        let err = Error::session_failed(3, Error::NotificationTimeout(Duration::from_secs(8)));
        assert!(err.to_string().starts_with("Session failed after 3 attempt(s)"));
        assert!(matches!(err.root_cause(), Error::NotificationTimeout(_)));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::frame_length(60, 40).into();
        assert!(matches!(
            err,
            Error::Frame(ParseError::FrameLength {
                expected: 60,
                actual: 40
            })
        ));
    }
}
