//! Exponential backoff between acquire attempts.

use std::time::Duration;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Doubling delay with an upper bound.
///
/// Successive calls to [`Backoff::next_delay`] never decrease and settle at
/// `max` once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// `initial` is clamped to at most `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            max,
            current: initial.min(max),
        }
    }

    /// Delay to sleep now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}
