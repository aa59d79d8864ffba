//! Error types for telemetry parsing in roroshetta-types.

use thiserror::Error;

/// Errors that can occur when decoding or encoding a telemetry frame.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in roroshetta-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The frame does not have the fixed protocol length.
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    FrameLength {
        /// Protocol frame length.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },

    /// A field value cannot be represented in the frame.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ParseError {
    /// Create a frame length error.
    pub fn frame_length(expected: usize, actual: usize) -> Self {
        Self::FrameLength { expected, actual }
    }
}

/// Result type alias using roroshetta-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
