//! Host runner for Roroshetta Sense range hoods.
//!
//! Listens for Roroshetta Sense advertisements, polls every known device
//! on a fixed interval and prints each reading as text or JSON.
//!
//! # Configuration
//!
//! The runner reads `~/.config/roroshetta/config.toml` (or the path given
//! with `--config`). Every section is optional:
//!
//! ```toml
//! [bluetooth]
//! adapter = 0
//! bluez_adapter = "hci0"
//!
//! [polling]
//! interval = 60             # seconds between rounds
//! max_attempts = 3
//! backoff_ms = 1000         # doubles per attempt
//! connect_timeout = 10
//! notification_timeout = 8
//!
//! [output]
//! format = "json"
//!
//! [[devices]]
//! address = "C8:2B:96:10:20:30"
//! name = "Kitchen"
//! ```
//!
//! Devices listed under `[[devices]]` are polled from startup; others are
//! picked up as soon as they advertise.

pub mod config;
pub mod logging;
pub mod output;
pub mod runner;

pub use config::{
    BluetoothConfig, Config, ConfigError, DeviceConfig, OutputConfig, PollingConfig,
    ValidationError, default_config_path,
};
pub use logging::{DEFAULT_FILTER, env_filter};
pub use output::{LinePublisher, OutputFormat, format_reading};
pub use runner::{Runner, RunnerError, drive};
