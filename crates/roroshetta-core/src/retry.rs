//! Retry policy for device sessions.
//!
//! A session makes up to [`RetryPolicy::max_attempts`] attempts. After failed
//! attempt `n` (1-indexed) it waits [`RetryPolicy::delay_for_attempt`]`(n)`,
//! which is `base_delay * 2^(n-1)` by default, before the next one. There is
//! no wait after the last attempt.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use roroshetta_core::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
//! assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error};

/// Default number of attempts per triggered session.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff after the first failed attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per session, including the first (at least 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given number of attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Set the number of attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Whether another attempt follows failed attempt `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Check the policy for values a session cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_config("max_attempts must be at least 1"));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(Error::invalid_config(
                "backoff_multiplier must be a finite value >= 1.0",
            ));
        }
        Ok(())
    }
}

/// Check if an error is worth another attempt.
pub fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Timeout { .. } => true,
        Error::Bluetooth(_) => true,
        Error::ConnectionFailed { reason, .. } => {
            !matches!(reason, ConnectionFailureReason::AdapterUnavailable)
        }
        Error::PairingFailed(_) => true,
        Error::SubscribeFailed(_) => true,
        Error::NotificationTimeout(_) => true,
        // A garbled frame is usually a one-off radio glitch
        Error::Frame(_) => true,
        Error::Io(_) => true,
        // The device may simply not have advertised recently
        Error::DeviceNotFound(reason) => !matches!(reason, DeviceNotFoundReason::NoAdapter),
        Error::SessionFailed { .. } => false,
        Error::SessionBusy => false,
        Error::Cancelled => false,
        Error::InvalidConfig(_) => false,
    }
}
