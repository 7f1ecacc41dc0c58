//! The persisted lock record and its liveness predicates.

use crate::clock::to_chrono;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One record per lock id, as stored by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The resource being protected.
    pub lock_id: String,

    /// Identifies this holder's epoch; regenerated on every acquire or reclaim.
    pub lease_id: String,

    /// Agent that acquired the lock (the client id for session acquires).
    pub owner: String,

    /// Lease length in seconds, as requested at acquire time.
    pub lease_duration: u64,

    /// When the current lease was granted.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub acquired_at: DateTime<Utc>,

    /// `acquired_at + lease_duration`, stored as a unix timestamp.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiration_time: DateTime<Utc>,

    /// Flags attached by the holder or a controller.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub signals: BTreeSet<String>,

    /// Deadline of a pending release-all; the record lapses once it passes.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub release_at: Option<DateTime<Utc>>,
}

impl LockRecord {
    /// Build a fresh record with a new lease id.
    ///
    /// The expiration saturates at the latest representable time.
    pub fn new(lock_id: &str, owner: &str, lease_duration: u64, now: DateTime<Utc>) -> Self {
        Self {
            lock_id: lock_id.to_string(),
            lease_id: super::new_lease_id(),
            owner: owner.to_string(),
            lease_duration,
            acquired_at: now,
            expiration_time: now
                .checked_add_signed(seconds(lease_duration))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            signals: BTreeSet::new(),
            release_at: None,
        }
    }

    /// A pending release-all deadline has passed; the record counts as absent.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.release_at.is_some_and(|at| now >= at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_time
    }

    /// Live and unexpired.
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        !self.is_lapsed(now) && !self.is_expired(now)
    }

    /// Expired for longer than `grace`, so a new lease may replace it.
    pub fn is_reclaimable(&self, now: DateTime<Utc>, grace: std::time::Duration) -> bool {
        !self.is_lapsed(now) && now.signed_duration_since(self.expiration_time) > to_chrono(grace)
    }

    pub fn is_pending_release(&self, now: DateTime<Utc>) -> bool {
        self.release_at.is_some_and(|at| now < at)
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(i64::MAX as u64 / 1_000) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn new_record_computes_expiration() {
        let record = LockRecord::new("job-7", "A", 10, at(100));

        assert_eq!(record.expiration_time, at(110));
        assert_eq!(record.acquired_at, at(100));
        assert!(record.signals.is_empty());
        assert!(record.release_at.is_none());
        assert!(!record.lease_id.is_empty());
    }

    #[test]
    fn huge_lease_saturates_instead_of_overflowing() {
        let record = LockRecord::new("job-7", "A", u64::MAX, at(100));

        assert_eq!(record.expiration_time, DateTime::<Utc>::MAX_UTC);
        assert!(record.is_held(at(100)));
    }

    #[test]
    fn lease_ids_differ_between_records() {
        let a = LockRecord::new("job-7", "A", 10, at(100));
        let b = LockRecord::new("job-7", "A", 10, at(100));
        assert_ne!(a.lease_id, b.lease_id);
    }

    #[test]
    fn held_until_expiration_inclusive() {
        let record = LockRecord::new("job-7", "A", 10, at(100));

        assert!(record.is_held(at(110)));
        assert!(!record.is_held(at(111)));
    }

    #[test]
    fn reclaimable_only_strictly_after_grace() {
        let record = LockRecord::new("job-7", "A", 10, at(100));
        let grace = StdDuration::from_secs(5);

        assert!(!record.is_reclaimable(at(115), grace));
        assert!(record.is_reclaimable(at(116), grace));
    }

    #[test]
    fn pending_release_lapses_at_deadline() {
        let mut record = LockRecord::new("job-7", "A", 60, at(100));
        record.release_at = Some(at(105));

        assert!(record.is_pending_release(at(104)));
        assert!(record.is_held(at(104)));
        assert!(record.is_lapsed(at(105)));
        assert!(!record.is_held(at(105)));
        assert!(!record.is_reclaimable(at(500), StdDuration::from_secs(5)));
    }

    #[test]
    fn record_serializes_unix_timestamps() {
        let mut record = LockRecord::new("job-7", "A", 10, at(100));
        record.signals.insert("drain".to_string());

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"expiration_time\":110"));
        assert!(json.contains("drain"));
        assert!(!json.contains("release_at"));

        let parsed: LockRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
