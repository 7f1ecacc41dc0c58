//! Outcome and report types returned by lease stores.
//!
//! Contention is a normal outcome, not an error, so every contended path has
//! its own variant here.

use super::record::LockRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of `create_if_absent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A live record is in the way; this is what the store currently holds.
    Exists(LockRecord),
}

/// Result of a conditional `reclaim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    Reclaimed,
    /// The stored lease id no longer matches, or the record is gone.
    Conflict,
}

/// Result of a session-level `acquire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(LockRecord),
    AlreadyHeld(LockRecord),
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NotHeldByCaller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddSignalOutcome {
    Added,
    NotHeld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveSignalOutcome {
    Removed,
    NotPresent,
    NotHeld,
}

/// Per-lock result of `unrelease_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreleaseReport {
    /// Locks whose pending release was cancelled; they are held again unchanged.
    pub restored: Vec<String>,

    /// Locks whose countdown had already elapsed; they are free again.
    pub too_late: Vec<String>,
}

impl UnreleaseReport {
    pub fn is_empty(&self) -> bool {
        self.restored.is_empty() && self.too_late.is_empty()
    }

    /// Every pending lock came back.
    pub fn fully_restored(&self) -> bool {
        self.too_late.is_empty()
    }

    pub(crate) fn sort(&mut self) {
        self.restored.sort();
        self.too_late.sort();
    }
}

/// Entry returned by `find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundLock {
    pub lock_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// What a maintenance window got done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Records (or stale guard files) removed.
    pub purged: usize,

    /// `false` when the budget ran out before the sweep finished.
    pub complete: bool,

    pub elapsed: Duration,
}

/// Point-in-time counters for `STATS` and startup logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub lock_count: usize,
    pub session_count: usize,
    pub pending_release_count: usize,
    pub signal_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_acquired_at: Option<DateTime<Utc>>,
}
