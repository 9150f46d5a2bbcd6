//! Checkout tuning knobs.

use std::time::Duration;

/// Bounds applied to every checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Upper bound on each individual store call.
    pub call_timeout: Duration,
    /// How many times a single stock release is tried before giving up.
    pub compensation_attempts: u32,
    /// Pause between release retries, multiplied by the attempt number.
    pub compensation_backoff: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            compensation_attempts: 3,
            compensation_backoff: Duration::from_millis(50),
        }
    }
}

impl CheckoutConfig {
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Sets the release retry count; values below one are raised to one.
    pub fn with_compensation_attempts(mut self, attempts: u32) -> Self {
        self.compensation_attempts = attempts.max(1);
        self
    }

    pub fn with_compensation_backoff(mut self, backoff: Duration) -> Self {
        self.compensation_backoff = backoff;
        self
    }
}
