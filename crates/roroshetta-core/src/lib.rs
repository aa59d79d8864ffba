//! Core BLE library for the Roroshetta Sense kitchen hood sensor.
//!
//! The sensor only reports over a GATT notification, so every reading is a
//! full connect, subscribe, wait, decode and disconnect cycle. This crate
//! runs that cycle reliably through flaky links (including ESP32 Bluetooth
//! proxies): it pairs when the device asks for it, bounds every step with a
//! timeout, retries with exponential backoff, and never leaves a connection
//! open.
//!
//! # Features
//!
//! - **Discovery**: match advertisements by manufacturer ID and vendor service
//! - **Sessions**: connect, pair on demand, subscribe, decode, always disconnect
//! - **Polling**: concurrent per-tick refresh with one session per device at a time
//! - **Events**: broadcast discovery, pairing, reading and failure events
//! - **Testing**: a scripted [`mock::MockTransport`]
//!
//! # Platform Differences
//!
//! - **Linux**: devices are addressed by MAC address; pairing goes through BlueZ.
//! - **macOS**: CoreBluetooth hides the MAC address, so devices are addressed by
//!   their peripheral UUID and the OS pairs on demand.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use roroshetta_core::{BleTransport, Coordinator, CoordinatorConfig, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = scan::get_adapter(0).await?;
//!     let mut adverts = scan::advertisements(&adapter).await?;
//!     let coordinator = Coordinator::new(
//!         Arc::new(BleTransport::new(adapter)),
//!         CoordinatorConfig::default(),
//!     );
//!
//!     while let Some(adv) = adverts.next().await {
//!         if let Some(identity) = coordinator.on_advertisement(&adv).await {
//!             let outcome = coordinator.request_refresh(&identity).await?;
//!             println!("{}: {:?}", identity, outcome);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod advertisement;
pub mod ble;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod guard;
pub mod mock;
pub mod pairing;
pub mod registry;
pub mod retry;
pub mod scan;
pub mod session;
pub mod transport;
pub mod util;

// Re-export types
pub use roroshetta_types::types;
pub use roroshetta_types::uuid;

pub use advertisement::{Advertisement, DeviceIdentity, match_advertisement};
pub use ble::BleTransport;
pub use coordinator::{Coordinator, CoordinatorConfig, Publisher, RefreshOutcome};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use events::{DeviceEvent, EventDispatcher, EventReceiver, EventSender};
pub use guard::ConnectionGuard;
pub use registry::{DeviceRecord, DeviceRegistry, Discovery, SessionPermit};
pub use retry::{RetryPolicy, is_retryable};
pub use session::{PairingState, Session, SessionConfig, SessionReport, SessionState};
pub use transport::{NotificationStream, Transport};

pub use roroshetta_types::uuid as uuids;
pub use roroshetta_types::{FRAME_LEN, ParseError, Reading, frame};
