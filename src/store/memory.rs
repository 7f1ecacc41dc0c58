//! In-memory reference implementation of [`LeaseStore`].
//!
//! Records live in a sharded [`DashMap`], so operations on the same lock id
//! serialize on one shard while unrelated lock ids proceed in parallel.
//! Session bookkeeping sits behind a single mutex that is only ever taken
//! *after* a shard lock (never the other way round).
//!
//! State can be snapshotted to a JSON file with `dump` and restored with
//! `load_dump`, which is how the lock server survives restarts.

use super::{LeaseStore, compile_pattern};
use crate::clock::{Clock, deadline_after};
use crate::error::{LeaseError, Result};
use crate::fs::atomic_write;
use crate::lease::{
    AcquireOutcome, AddSignalOutcome, ClientSession, CreateOutcome, FoundLock, LockRecord,
    MaintenanceReport, ReclaimOutcome, ReleaseOutcome, RemoveSignalOutcome, StoreStats,
    UnreleaseReport, validate_client_id, validate_lease_duration, validate_lock_id,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// File name used for snapshots inside the data directory.
pub const DUMP_FILE_NAME: &str = "leasehold.dump.json";

const DUMP_VERSION: u32 = 1;

/// How many map entries a maintenance sweep visits between deadline checks.
const MAINTENANCE_CHECK_INTERVAL: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<LockRecord>,
    sessions: Vec<ClientSession>,
}

/// Sharded in-memory lease store.
#[derive(Debug)]
pub struct MemoryLeaseStore {
    records: DashMap<String, LockRecord>,
    sessions: Mutex<HashMap<String, ClientSession>>,
    clock: Arc<dyn Clock>,
    reclaim_grace: Duration,
    dump_path: Option<PathBuf>,
}

impl MemoryLeaseStore {
    /// Create an empty store with a 5 second reclaim grace and no dump file.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            sessions: Mutex::new(HashMap::new()),
            clock,
            reclaim_grace: Duration::from_secs(5),
            dump_path: None,
        }
    }

    /// Grace applied when `acquire` takes over an expired lease.
    pub fn with_reclaim_grace(mut self, grace: Duration) -> Self {
        self.reclaim_grace = grace;
        self
    }

    /// Snapshot into `<data_dir>/leasehold.dump.json`.
    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.dump_path = Some(data_dir.as_ref().join(DUMP_FILE_NAME));
        self
    }

    pub fn dump_path(&self) -> Option<&Path> {
        self.dump_path.as_deref()
    }

    /// Locks currently attributed to `client_id`, including pending releases.
    pub fn held_lock_ids(&self, client_id: &str) -> Vec<String> {
        self.sessions
            .lock()
            .get(client_id)
            .map(|s| s.held_lock_ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn require_dump_path(&self) -> Result<&Path> {
        self.dump_path.as_deref().ok_or_else(|| {
            LeaseError::Config("memory store has no data directory for dumps".to_string())
        })
    }

    fn track(&self, owner: &str, lock_id: &str) {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(owner.to_string())
            .or_insert_with(|| ClientSession::new(owner))
            .held_lock_ids
            .insert(lock_id.to_string());
    }

    fn untrack(&self, owner: &str, lock_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(owner) {
            session.held_lock_ids.remove(lock_id);
        }
    }

    /// Swap ownership bookkeeping after a record changed hands.
    fn retrack(&self, previous_owner: &str, new_owner: &str, lock_id: &str) {
        if previous_owner != new_owner {
            self.untrack(previous_owner, lock_id);
        }
        self.track(new_owner, lock_id);
    }
}

impl LeaseStore for MemoryLeaseStore {
    fn create_if_absent(&self, record: &LockRecord) -> Result<CreateOutcome> {
        validate_lock_id(&record.lock_id)?;
        let now = self.clock.now();

        match self.records.entry(record.lock_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_lapsed(now) {
                    return Ok(CreateOutcome::Exists(entry.get().clone()));
                }
                let previous = entry.insert(record.clone());
                self.retrack(&previous.owner, &record.owner, &record.lock_id);
            }
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                self.track(&record.owner, &record.lock_id);
            }
        }
        Ok(CreateOutcome::Created)
    }

    fn read(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(lock_id)
            .filter(|record| !record.is_lapsed(now))
            .map(|record| record.clone()))
    }

    fn reclaim(&self, expected_lease_id: &str, replacement: &LockRecord) -> Result<ReclaimOutcome> {
        validate_lock_id(&replacement.lock_id)?;
        let now = self.clock.now();

        let Some(mut current) = self.records.get_mut(&replacement.lock_id) else {
            return Ok(ReclaimOutcome::Conflict);
        };
        if current.lease_id != expected_lease_id || current.is_lapsed(now) {
            return Ok(ReclaimOutcome::Conflict);
        }

        let mut fresh = replacement.clone();
        fresh.signals.clear();
        fresh.release_at = None;
        let previous = std::mem::replace(&mut *current, fresh);
        self.retrack(&previous.owner, &replacement.owner, &replacement.lock_id);
        drop(current);

        debug!(
            lock_id = %replacement.lock_id,
            previous_owner = %previous.owner,
            owner = %replacement.owner,
            "lease reclaimed"
        );
        Ok(ReclaimOutcome::Reclaimed)
    }

    fn acquire(
        &self,
        client_id: &str,
        lock_id: &str,
        lease_duration: u64,
        reentrant: bool,
    ) -> Result<AcquireOutcome> {
        validate_client_id(client_id)?;
        validate_lock_id(lock_id)?;
        validate_lease_duration(lease_duration)?;
        let now = self.clock.now();

        match self.records.entry(lock_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.is_lapsed(now) || current.is_reclaimable(now, self.reclaim_grace) {
                    let record = LockRecord::new(lock_id, client_id, lease_duration, now);
                    let previous = entry.insert(record.clone());
                    self.retrack(&previous.owner, client_id, lock_id);
                    Ok(AcquireOutcome::Acquired(record))
                } else if reentrant && current.owner == client_id {
                    Ok(AcquireOutcome::Acquired(current.clone()))
                } else {
                    Ok(AcquireOutcome::AlreadyHeld(current.clone()))
                }
            }
            Entry::Vacant(entry) => {
                let record = LockRecord::new(lock_id, client_id, lease_duration, now);
                entry.insert(record.clone());
                self.track(client_id, lock_id);
                Ok(AcquireOutcome::Acquired(record))
            }
        }
    }

    fn release(&self, client_id: &str, lock_id: &str) -> Result<ReleaseOutcome> {
        let now = self.clock.now();
        let removed = self
            .records
            .remove_if(lock_id, |_, record| {
                record.owner == client_id && !record.is_lapsed(now)
            });

        match removed {
            Some(_) => {
                self.untrack(client_id, lock_id);
                Ok(ReleaseOutcome::Released)
            }
            None => Ok(ReleaseOutcome::NotHeldByCaller),
        }
    }

    fn release_all(&self, client_id: &str, timeout: Duration) -> Result<usize> {
        let now = self.clock.now();
        let release_at = deadline_after(now, timeout)?;
        let mut marked = 0;

        for lock_id in self.held_lock_ids(client_id) {
            if let Some(mut record) = self.records.get_mut(&lock_id)
                && record.owner == client_id
                && !record.is_lapsed(now)
            {
                let deadline = record.release_at.map_or(release_at, |at| at.min(release_at));
                record.release_at = Some(deadline);
                marked += 1;
            }
        }

        debug!(client_id, marked, ?timeout, "release-all scheduled");
        Ok(marked)
    }

    fn unrelease_all(&self, client_id: &str) -> Result<UnreleaseReport> {
        let now = self.clock.now();
        let mut report = UnreleaseReport::default();

        for lock_id in self.held_lock_ids(client_id) {
            match self.records.get_mut(&lock_id) {
                Some(mut record) if record.owner == client_id => match record.release_at {
                    Some(at) if now < at => {
                        record.release_at = None;
                        report.restored.push(lock_id);
                    }
                    Some(_) => report.too_late.push(lock_id),
                    None => {}
                },
                _ => report.too_late.push(lock_id),
            }
        }

        if !report.too_late.is_empty() {
            let mut sessions = self.sessions.lock();
            if let Some(session) = sessions.get_mut(client_id) {
                for lock_id in &report.too_late {
                    session.held_lock_ids.remove(lock_id);
                }
            }
        }

        report.sort();
        Ok(report)
    }

    fn locked(&self, lock_id: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(lock_id)
            .is_some_and(|record| record.is_held(now)))
    }

    fn set_client_last_address(&self, client_id: &str, address: SocketAddr) -> Result<()> {
        validate_client_id(client_id)?;
        let mut sessions = self.sessions.lock();
        sessions
            .entry(client_id.to_string())
            .or_insert_with(|| ClientSession::new(client_id))
            .last_address = Some(address);
        Ok(())
    }

    fn get_client_last_address(&self, client_id: &str) -> Result<Option<SocketAddr>> {
        Ok(self
            .sessions
            .lock()
            .get(client_id)
            .and_then(|session| session.last_address))
    }

    fn find(&self, pattern: &str) -> Result<Vec<FoundLock>> {
        let matcher = compile_pattern(pattern)?;
        let now = self.clock.now();

        let mut found: Vec<FoundLock> = self
            .records
            .iter()
            .filter(|record| record.is_held(now) && matcher.is_match(record.key()))
            .map(|record| FoundLock {
                lock_id: record.lock_id.clone(),
                acquired_at: record.acquired_at,
            })
            .collect();
        found.sort_by(|a, b| a.lock_id.cmp(&b.lock_id));
        Ok(found)
    }

    fn add_signal(&self, lock_id: &str, signal: &str) -> Result<AddSignalOutcome> {
        let now = self.clock.now();
        match self.records.get_mut(lock_id) {
            Some(mut record) if record.is_held(now) => {
                record.signals.insert(signal.to_string());
                Ok(AddSignalOutcome::Added)
            }
            _ => Ok(AddSignalOutcome::NotHeld),
        }
    }

    fn has_signal(&self, lock_id: &str, signal: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(lock_id)
            .is_some_and(|record| record.is_held(now) && record.signals.contains(signal)))
    }

    fn remove_signal(&self, lock_id: &str, signal: &str) -> Result<RemoveSignalOutcome> {
        let now = self.clock.now();
        match self.records.get_mut(lock_id) {
            Some(mut record) if record.is_held(now) => {
                if record.signals.remove(signal) {
                    Ok(RemoveSignalOutcome::Removed)
                } else {
                    Ok(RemoveSignalOutcome::NotPresent)
                }
            }
            _ => Ok(RemoveSignalOutcome::NotHeld),
        }
    }

    fn dump(&self) -> Result<()> {
        let path = self.require_dump_path()?;

        let mut records: Vec<LockRecord> =
            self.records.iter().map(|record| record.clone()).collect();
        records.sort_by(|a, b| a.lock_id.cmp(&b.lock_id));
        let mut sessions: Vec<ClientSession> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.client_id.cmp(&b.client_id));

        let snapshot = Snapshot {
            version: DUMP_VERSION,
            records,
            sessions,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        atomic_write(path, json.as_bytes())?;

        info!(
            path = %path.display(),
            locks = snapshot.records.len(),
            sessions = snapshot.sessions.len(),
            "dumped lock state"
        );
        Ok(())
    }

    fn load_dump(&self) -> Result<usize> {
        let path = self.require_dump_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "no dump to load");
            return Ok(0);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LeaseError::Backend(format!("failed to read dump '{}': {}", path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            LeaseError::Backend(format!("failed to parse dump '{}': {}", path.display(), e))
        })?;
        if snapshot.version != DUMP_VERSION {
            return Err(LeaseError::Backend(format!(
                "unsupported dump version {} in '{}'",
                snapshot.version,
                path.display()
            )));
        }

        self.records.clear();
        let count = snapshot.records.len();
        for record in snapshot.records {
            self.records.insert(record.lock_id.clone(), record);
        }
        let mut sessions = self.sessions.lock();
        sessions.clear();
        for session in snapshot.sessions {
            sessions.insert(session.client_id.clone(), session);
        }

        Ok(count)
    }

    fn clear_dump(&self) -> Result<()> {
        let path = self.require_dump_path()?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LeaseError::Backend(format!(
                "failed to remove dump '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn maintenance(&self, budget: Duration) -> Result<MaintenanceReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = MaintenanceReport {
            complete: true,
            ..MaintenanceReport::default()
        };

        let mut lapsed = Vec::new();
        for (visited, record) in self.records.iter().enumerate() {
            if visited % MAINTENANCE_CHECK_INTERVAL == 0 && started.elapsed() >= budget {
                report.complete = false;
                break;
            }
            if record.is_lapsed(now) {
                lapsed.push((record.lock_id.clone(), record.owner.clone()));
            }
        }

        for (lock_id, owner) in lapsed {
            if started.elapsed() >= budget {
                report.complete = false;
                break;
            }
            if self
                .records
                .remove_if(&lock_id, |_, record| record.is_lapsed(now))
                .is_some()
            {
                self.untrack(&owner, &lock_id);
                report.purged += 1;
            }
        }

        if report.complete {
            self.sessions.lock().retain(|_, session| !session.is_idle());
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    fn stats(&self) -> Result<StoreStats> {
        let now = self.clock.now();
        let mut stats = StoreStats::default();

        for record in self.records.iter() {
            if record.is_lapsed(now) {
                continue;
            }
            stats.lock_count += 1;
            stats.signal_count += record.signals.len();
            if record.is_pending_release(now) {
                stats.pending_release_count += 1;
            }
            stats.oldest_acquired_at = Some(match stats.oldest_acquired_at {
                Some(oldest) => oldest.min(record.acquired_at),
                None => record.acquired_at,
            });
        }
        stats.session_count = self.sessions.lock().len();

        Ok(stats)
    }
}
