//! Time source and cancellable sleeping.
//!
//! Every component that reads the time or waits goes through a [`Clock`], so
//! lease expiry and backoff can be exercised in tests with a [`ManualClock`]
//! instead of real sleeps.

use crate::error::{LeaseError, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of wall-clock time plus the ability to wait.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Wait for `duration`, returning `Err(LeaseError::Cancelled)` as soon as
    /// `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()>;
}

/// Real time, real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
        if cancel.wait_timeout(duration) {
            Err(LeaseError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// Test clock: time only moves when told to, and `sleep` advances it
/// instantly while recording the requested durations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Create a clock frozen at the given unix timestamp.
    pub fn at_unix(secs: i64) -> Self {
        let now = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(now)
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now += to_chrono(duration);
    }

    /// Move time forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Durations passed to `sleep` so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(LeaseError::Cancelled);
        }
        let mut state = self.state.lock();
        state.sleeps.push(duration);
        state.now += to_chrono(duration);
        Ok(())
    }
}

/// Convert a std duration into a chrono one, saturating at i64 milliseconds.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    let millis = duration.as_millis().min(i64::MAX as u128) as i64;
    chrono::Duration::milliseconds(millis)
}

/// `now + duration`, or a validation error when the result leaves chrono's range.
pub fn deadline_after(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(to_chrono(duration)).ok_or_else(|| {
        LeaseError::Validation(format!("{:?} from {} is out of range", duration, now))
    })
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Shared flag that aborts waits.
///
/// Clones observe the same flag. Cancelling wakes every thread currently
/// blocked in [`CancelToken::wait_timeout`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block for up to `timeout`. Returns `true` if the token fired.
    ///
    /// A timeout too large for an `Instant` waits until cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .wakeup
                        .wait_until(&mut cancelled, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.inner.wakeup.wait(&mut cancelled),
            }
        }
        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::at_unix(1_000);
        let token = CancelToken::new();

        clock.sleep(Duration::from_secs(4), &token).unwrap();

        assert_eq!(clock.now().timestamp(), 1_004);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(4)]);
    }

    #[test]
    fn manual_clock_sleep_honours_cancellation() {
        let clock = ManualClock::at_unix(1_000);
        let token = CancelToken::new();
        token.cancel();

        let result = clock.sleep(Duration::from_secs(4), &token);

        assert!(matches!(result, Err(LeaseError::Cancelled)));
        assert_eq!(clock.now().timestamp(), 1_000);
    }

    #[test]
    fn deadline_after_adds_in_range_durations() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let deadline = deadline_after(now, Duration::from_secs(5)).unwrap();
        assert_eq!(deadline.timestamp(), 1_005);
    }

    #[test]
    fn deadline_after_rejects_overflow() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let result = deadline_after(now, Duration::MAX);
        assert!(matches!(result, Err(LeaseError::Validation(_))));

        let near_end = DateTime::<Utc>::MAX_UTC - chrono::Duration::seconds(1);
        assert!(deadline_after(near_end, Duration::from_secs(10)).is_err());
    }

    #[test]
    fn unbounded_wait_still_wakes_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = thread::spawn(move || waiter.wait_timeout(Duration::MAX));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_timeout_returns_false_when_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn cancel_wakes_a_blocked_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();

        let handle = thread::spawn(move || {
            let started = Instant::now();
            let result = SystemClock.sleep(Duration::from_secs(30), &sleeper);
            (result, started.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let (result, elapsed) = handle.join().unwrap();
        assert!(matches!(result, Err(LeaseError::Cancelled)));
        assert!(elapsed < Duration::from_secs(10));
    }
}
