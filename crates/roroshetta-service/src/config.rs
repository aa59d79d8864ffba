//! Runner configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use roroshetta_core::ble::DEFAULT_BLUEZ_ADAPTER;
use roroshetta_core::{CoordinatorConfig, DeviceIdentity, RetryPolicy, SessionConfig};

use crate::output::OutputFormat;

/// Minimum update interval in seconds.
pub const MIN_UPDATE_INTERVAL: u64 = 10;
/// Maximum update interval in seconds (1 hour).
pub const MAX_UPDATE_INTERVAL: u64 = 3600;
/// Upper bound on session attempts.
pub const MAX_ATTEMPTS: u32 = 10;

/// Runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth adapter settings.
    pub bluetooth: BluetoothConfig,
    /// Polling and session settings.
    pub polling: PollingConfig,
    /// Output settings.
    pub output: OutputConfig,
    /// Devices to poll before they are first heard advertising.
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from the default path, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration, collecting every problem found.
    ///
    /// ```
    /// use roroshetta_service::Config;
    ///
    /// Config::default().validate().unwrap();
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.bluetooth.validate());
        errors.extend(self.polling.validate());

        let mut seen = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{}]", i);
            errors.extend(device.validate(&prefix));

            if !seen.insert(device.address.trim().to_uppercase()) {
                errors.push(ValidationError::new(
                    format!("{}.address", prefix),
                    format!("duplicate device address '{}'", device.address),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Coordinator settings derived from the polling section.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let polling = &self.polling;
        let retry = RetryPolicy::new(polling.max_attempts)
            .base_delay(Duration::from_millis(polling.backoff_ms))
            .jitter(polling.jitter);

        CoordinatorConfig {
            session: SessionConfig::default()
                .retry(retry)
                .connect_timeout(Duration::from_secs(polling.connect_timeout))
                .notification_timeout(Duration::from_secs(polling.notification_timeout)),
            update_interval: Duration::from_secs(polling.interval),
            ..CoordinatorConfig::default()
        }
    }

    /// Identities and names of the configured devices.
    pub fn device_identities(&self) -> Vec<(DeviceIdentity, Option<String>)> {
        self.devices
            .iter()
            .map(|d| (DeviceIdentity::new(&d.address), d.name.clone()))
            .collect()
    }
}

/// Bluetooth adapter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Index of the adapter to scan with.
    pub adapter: usize,
    /// BlueZ adapter name used for pairing (Linux only).
    pub bluez_adapter: String,
    /// Pairing timeout in seconds.
    pub pair_timeout: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            bluez_adapter: DEFAULT_BLUEZ_ADAPTER.to_string(),
            pair_timeout: 30,
        }
    }
}

impl BluetoothConfig {
    /// Validate Bluetooth configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.bluez_adapter.trim().is_empty() {
            errors.push(ValidationError::new(
                "bluetooth.bluez_adapter",
                "adapter name cannot be empty",
            ));
        }
        if self.pair_timeout == 0 {
            errors.push(ValidationError::new(
                "bluetooth.pair_timeout",
                "pair timeout must be at least 1 second",
            ));
        }
        errors
    }
}

/// Polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between polling rounds.
    pub interval: u64,
    /// Session attempts per round.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds. Doubles per attempt.
    pub backoff_ms: u64,
    /// Randomize backoff delays by up to 25%.
    pub jitter: bool,
    /// Timeout for each transport call, in seconds.
    pub connect_timeout: u64,
    /// Time to wait for the telemetry notification, in seconds.
    pub notification_timeout: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: 60,
            max_attempts: 3,
            backoff_ms: 1000,
            jitter: false,
            connect_timeout: 10,
            notification_timeout: 8,
        }
    }
}

impl PollingConfig {
    /// Validate polling configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval < MIN_UPDATE_INTERVAL {
            errors.push(ValidationError::new(
                "polling.interval",
                format!(
                    "interval {} is too short (minimum {} seconds)",
                    self.interval, MIN_UPDATE_INTERVAL
                ),
            ));
        } else if self.interval > MAX_UPDATE_INTERVAL {
            errors.push(ValidationError::new(
                "polling.interval",
                format!(
                    "interval {} is too long (maximum {} seconds / 1 hour)",
                    self.interval, MAX_UPDATE_INTERVAL
                ),
            ));
        }

        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            errors.push(ValidationError::new(
                "polling.max_attempts",
                format!("max attempts must be between 1 and {}", MAX_ATTEMPTS),
            ));
        }
        if self.connect_timeout == 0 {
            errors.push(ValidationError::new(
                "polling.connect_timeout",
                "connect timeout must be at least 1 second",
            ));
        }
        if self.notification_timeout == 0 {
            errors.push(ValidationError::new(
                "polling.notification_timeout",
                "notification timeout must be at least 1 second",
            ));
        }

        errors
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// How readings are printed.
    pub format: OutputFormat,
}

/// A device to poll from startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bluetooth address, e.g. `C8:2B:96:10:20:30`.
    pub address: String,
    /// Friendly name.
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceConfig {
    /// Validate device configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.address", prefix),
                "device address cannot be empty",
            ));
        } else if !is_mac_address(self.address.trim()) {
            errors.push(ValidationError::new(
                format!("{}.address", prefix),
                format!(
                    "invalid address '{}': expected format 'XX:XX:XX:XX:XX:XX'",
                    self.address
                ),
            ));
        }

        if let Some(name) = &self.name
            && name.is_empty()
        {
            errors.push(ValidationError::new(
                format!("{}.name", prefix),
                "name cannot be empty string (omit it instead)",
            ));
        }

        errors
    }
}

fn is_mac_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path, e.g. `polling.interval` or `devices[0].address`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roroshetta")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str) -> DeviceConfig {
        DeviceConfig {
            address: address.to_string(),
            name: None,
        }
    }

    #[test]
    fn test_defaults_match_core() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator, CoordinatorConfig::default());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [polling]
            interval = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.polling.interval, 120);
        assert_eq!(config.polling.max_attempts, 3);
        assert_eq!(config.bluetooth.bluez_adapter, "hci0");
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_full_toml() {
        let config: Config = toml::from_str(
            r#"
            [bluetooth]
            adapter = 1
            bluez_adapter = "hci1"

            [polling]
            max_attempts = 5
            backoff_ms = 500
            notification_timeout = 12

            [output]
            format = "json"

            [[devices]]
            address = "c8:2b:96:10:20:30"
            name = "Kitchen"

            [[devices]]
            address = "C8:2B:96:10:20:31"
            "#,
        )
        .unwrap();

        assert_eq!(config.bluetooth.adapter, 1);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.validate().is_ok());

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.session.retry.max_attempts, 5);
        assert_eq!(
            coordinator.session.retry.delay_for_attempt(2),
            Duration::from_secs(1)
        );
        assert_eq!(
            coordinator.session.notification_timeout,
            Duration::from_secs(12)
        );

        let identities = config.device_identities();
        assert_eq!(identities[0].0.address, "C8:2B:96:10:20:30");
        assert_eq!(identities[0].1.as_deref(), Some("Kitchen"));
        assert_eq!(identities[1].1, None);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.polling.interval = 300;
        config.output.format = OutputFormat::Json;
        config.devices.push(DeviceConfig {
            address: "C8:2B:96:10:20:30".to_string(),
            name: Some("Kitchen".to_string()),
        });

        config.save(&path).unwrap();
        let loaded = Config::load_validated(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("invalid.toml");
        std::fs::write(&path, "this is not valid { toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("roroshetta/config.toml"));
    }

    #[test]
    fn test_polling_validation() {
        let mut polling = PollingConfig::default();
        assert!(polling.validate().is_empty());

        polling.interval = 5;
        let errors = polling.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too short"));

        polling.interval = 7200;
        assert!(polling.validate()[0].message.contains("too long"));

        let polling = PollingConfig {
            max_attempts: 0,
            connect_timeout: 0,
            notification_timeout: 0,
            ..PollingConfig::default()
        };
        let fields: Vec<_> = polling.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "polling.max_attempts",
                "polling.connect_timeout",
                "polling.notification_timeout"
            ]
        );
    }

    #[test]
    fn test_bluetooth_validation() {
        let bluetooth = BluetoothConfig {
            bluez_adapter: " ".to_string(),
            pair_timeout: 0,
            ..BluetoothConfig::default()
        };
        assert_eq!(bluetooth.validate().len(), 2);
    }

    #[test]
    fn test_device_validation() {
        assert!(device("C8:2B:96:10:20:30").validate("d").is_empty());
        assert!(device(" c8:2b:96:10:20:30 ").validate("d").is_empty());

        let errors = device("").validate("devices[0]");
        assert_eq!(errors[0].field, "devices[0].address");
        assert!(errors[0].message.contains("cannot be empty"));

        for bad in ["Roroshetta Sense", "C8:2B:96:10:20", "C8:2B:96:10:20:3G", "C82B96102030"] {
            let errors = device(bad).validate("d");
            assert_eq!(errors.len(), 1, "{bad}");
            assert!(errors[0].message.contains("XX:XX"));
        }

        let empty_name = DeviceConfig {
            address: "C8:2B:96:10:20:30".to_string(),
            name: Some(String::new()),
        };
        assert!(empty_name.validate("d")[0].message.contains("empty string"));
    }

    #[test]
    fn test_duplicate_addresses_case_insensitive() {
        let config = Config {
            devices: vec![device("C8:2B:96:10:20:30"), device("c8:2b:96:10:20:30")],
            ..Config::default()
        };

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "devices[1].address");
                assert!(errors[0].message.contains("duplicate"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_error_display() {
        let error = ConfigError::Validation(vec![
            ValidationError::new("polling.interval", "too short"),
            ValidationError::new("devices[0].address", "cannot be empty"),
        ]);
        let display = error.to_string();
        assert!(display.contains("  - polling.interval: too short"));
        assert!(display.contains("devices[0].address"));
    }
}
