//! Doubling backoff schedule for provider retries.

use std::iter::Take;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delays of `base, 2*base, 4*base, ...`, each capped at `max`.
///
/// Plugs into [`tokio_retry::RetryIf::start`] as the retry strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoublingBackoff {
    next: Duration,
    max: Duration,
}

impl DoublingBackoff {
    /// An unbounded schedule.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { next: base, max }
    }

    /// The retry schedule for a configuration: one delay per retry, so
    /// `max_attempts - 1` delays in total.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Take<Self> {
        let retries = config.max_attempts.saturating_sub(1) as usize;
        Self::new(config.base_delay(), config.max_delay()).take(retries)
    }
}

impl Iterator for DoublingBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next.min(self.max);
        self.next = self.next.saturating_mul(2);
        Some(delay)
    }
}
