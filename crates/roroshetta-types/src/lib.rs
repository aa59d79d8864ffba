//! Platform-agnostic types for the Roroshetta Sense kitchen hood sensor.
//!
//! This crate holds everything about the sensor that does not need a
//! Bluetooth stack: the decoded [`Reading`], the telemetry [`frame`] codec,
//! and the service/characteristic identifiers.
//!
//! # Example
//!
//! ```
//! use roroshetta_types::{frame, Reading};
//!
//! let reading = Reading { temperature: 21.5, humidity: 45.0, ..Default::default() };
//! let bytes = frame::encode(&reading);
//! let decoded = frame::decode(&bytes).unwrap();
//! assert!((decoded.temperature - 21.5).abs() < 0.01);
//! ```

pub mod error;
pub mod frame;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use frame::FRAME_LEN;
pub use types::{CONTROL_STEPS, Reading};
pub use uuid as uuids;
