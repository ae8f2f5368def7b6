//! Retry delays for the opt-in controller reconnect.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`.

use std::time::Duration;

use thermo_settings::ReconnectSettings;

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
    /// Consecutive failed connects before the link gives up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given attempt number (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        // Overflow and non-finite results fall back to the cap.
        Duration::try_from_secs_f64(secs).map_or(self.max, |delay| delay.min(self.max))
    }

    /// `None` when reconnect is disabled.
    pub fn from_settings(settings: &ReconnectSettings) -> Option<Self> {
        settings.enabled.then(|| Self {
            first: Duration::from_millis(settings.initial_delay_ms),
            max: Duration::from_millis(settings.max_delay_ms),
            factor: settings.factor,
            max_attempts: settings.max_attempts,
        })
    }
}
