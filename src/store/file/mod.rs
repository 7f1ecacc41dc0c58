//! File-backed lease store.
//!
//! Every lock is a JSON file in a shared directory, so any number of
//! processes (or hosts on a shared filesystem with working `O_EXCL`) can
//! coordinate through it. Each read-modify-write of a record happens under
//! that record's guard file and lands with an atomic rename, which makes the
//! conditional writes linearizable per lock id. Reads skip the guard: a
//! rename never exposes a partial record.
//!
//! Client bookkeeping is derived rather than stored: the locks a client holds
//! are the records whose owner is that client. Only the last known address
//! needs its own file.

mod guard;
mod layout;

pub use guard::{GuardMetadata, RecordGuard};
pub use layout::{StoreLayout, encode_id};

use super::{LeaseStore, compile_pattern};
use crate::clock::{Clock, deadline_after};
use crate::error::{LeaseError, Result};
use crate::fs::atomic::is_staging_file;
use crate::fs::{atomic_write, read_optional};
use crate::lease::{
    AcquireOutcome, AddSignalOutcome, ClientSession, CreateOutcome, FoundLock, LockRecord,
    MaintenanceReport, ReclaimOutcome, ReleaseOutcome, RemoveSignalOutcome, StoreStats,
    UnreleaseReport, validate_client_id, validate_lease_duration, validate_lock_id,
};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_GUARD_WAIT: Duration = Duration::from_secs(2);
const DEFAULT_GUARD_STALE: Duration = Duration::from_secs(30);

/// Lease store over a directory of JSON record files.
#[derive(Debug)]
pub struct FileLeaseStore {
    layout: StoreLayout,
    clock: Arc<dyn Clock>,
    reclaim_grace: Duration,
    guard_wait: Duration,
    guard_stale: Duration,
}

impl FileLeaseStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let layout = StoreLayout::new(root);
        for dir in [&layout.locks_dir, &layout.guards_dir, &layout.sessions_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                LeaseError::Backend(format!(
                    "failed to create store directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            layout,
            clock,
            reclaim_grace: Duration::from_secs(5),
            guard_wait: DEFAULT_GUARD_WAIT,
            guard_stale: DEFAULT_GUARD_STALE,
        })
    }

    pub fn with_reclaim_grace(mut self, grace: Duration) -> Self {
        self.reclaim_grace = grace;
        self
    }

    /// Age after which an abandoned guard file is broken.
    pub fn with_guard_stale(mut self, stale: Duration) -> Self {
        self.guard_stale = stale;
        self
    }

    fn guard(&self, lock_id: &str) -> Result<RecordGuard> {
        RecordGuard::acquire(
            &self.layout.guard_path(lock_id),
            self.guard_wait,
            self.guard_stale,
        )
    }

    /// Raw record on disk, lapsed or not.
    fn load(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        let path = self.layout.record_path(lock_id);
        match read_optional(&path)? {
            Some(content) => parse_record(&path, &content).map(Some),
            None => Ok(None),
        }
    }

    fn store(&self, record: &LockRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        atomic_write(self.layout.record_path(&record.lock_id), json.as_bytes())
    }

    fn remove(&self, lock_id: &str) -> Result<()> {
        let path = self.layout.record_path(lock_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LeaseError::Backend(format!(
                "failed to remove '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Load, mutate, and write back one record under its guard.
    ///
    /// `apply` returns `(replacement, result)`; nothing is written when
    /// `replacement` is `None`.
    fn update<T>(
        &self,
        lock_id: &str,
        apply: impl FnOnce(Option<LockRecord>) -> Result<(Option<LockRecord>, T)>,
    ) -> Result<T> {
        let _guard = self.guard(lock_id)?;
        let current = self.load(lock_id)?;
        let (replacement, result) = apply(current)?;
        if let Some(record) = replacement {
            self.store(&record)?;
        }
        Ok(result)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.layout.locks_dir, layout::RECORD_EXT)
    }

    /// Every parseable record on disk. Corrupt files are logged and skipped.
    fn scan(&self) -> Result<Vec<LockRecord>> {
        let mut records = Vec::new();
        for path in self.record_files()? {
            let Some(content) = read_optional(&path)? else {
                continue;
            };
            match parse_record(&path, &content) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "skipping unreadable lock record"),
            }
        }
        Ok(records)
    }

    fn owned_by(&self, client_id: &str) -> Result<Vec<LockRecord>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|record| record.owner == client_id)
            .collect())
    }

    fn load_session(&self, client_id: &str) -> Result<Option<ClientSession>> {
        let path = self.layout.session_path(client_id);
        match read_optional(&path)? {
            Some(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                LeaseError::Backend(format!(
                    "failed to parse session '{}': {}",
                    path.display(),
                    e
                ))
            }),
            None => Ok(None),
        }
    }

    fn purge_if_lapsed(&self, lock_id: &str) -> Result<bool> {
        let _guard = self.guard(lock_id)?;
        let now = self.clock.now();
        match self.load(lock_id)? {
            Some(record) if record.is_lapsed(now) => {
                self.remove(lock_id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Remove guards and staging files abandoned by crashed writers.
    fn sweep_debris(&self, deadline: Instant) -> Result<(usize, bool)> {
        let mut removed = 0;
        let candidates = list_files(&self.layout.guards_dir, layout::GUARD_EXT)?
            .into_iter()
            .chain(staging_files(&self.layout.locks_dir)?)
            .chain(staging_files(&self.layout.sessions_dir)?);

        for path in candidates {
            if Instant::now() >= deadline {
                return Ok((removed, false));
            }
            if guard::file_age(&path).is_some_and(|age| age > self.guard_stale)
                && fs::remove_file(&path).is_ok()
            {
                debug!(path = %path.display(), "removed abandoned file");
                removed += 1;
            }
        }
        Ok((removed, true))
    }
}

impl LeaseStore for FileLeaseStore {
    fn create_if_absent(&self, record: &LockRecord) -> Result<CreateOutcome> {
        validate_lock_id(&record.lock_id)?;
        let now = self.clock.now();

        self.update(&record.lock_id, |current| match current {
            Some(existing) if !existing.is_lapsed(now) => {
                Ok((None, CreateOutcome::Exists(existing)))
            }
            _ => Ok((Some(record.clone()), CreateOutcome::Created)),
        })
    }

    fn read(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        validate_lock_id(lock_id)?;
        let now = self.clock.now();
        Ok(self.load(lock_id)?.filter(|record| !record.is_lapsed(now)))
    }

    fn reclaim(&self, expected_lease_id: &str, replacement: &LockRecord) -> Result<ReclaimOutcome> {
        validate_lock_id(&replacement.lock_id)?;
        let now = self.clock.now();

        self.update(&replacement.lock_id, |current| match current {
            Some(existing)
                if existing.lease_id == expected_lease_id && !existing.is_lapsed(now) =>
            {
                let mut fresh = replacement.clone();
                fresh.signals.clear();
                fresh.release_at = None;
                Ok((Some(fresh), ReclaimOutcome::Reclaimed))
            }
            _ => Ok((None, ReclaimOutcome::Conflict)),
        })
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
        let grace = self.reclaim_grace;

        self.update(lock_id, |current| match current {
            Some(existing)
                if !existing.is_lapsed(now) && !existing.is_reclaimable(now, grace) =>
            {
                if reentrant && existing.owner == client_id {
                    Ok((None, AcquireOutcome::Acquired(existing)))
                } else {
                    Ok((None, AcquireOutcome::AlreadyHeld(existing)))
                }
            }
            _ => {
                let record = LockRecord::new(lock_id, client_id, lease_duration, now);
                Ok((Some(record.clone()), AcquireOutcome::Acquired(record)))
            }
        })
    }

    fn release(&self, client_id: &str, lock_id: &str) -> Result<ReleaseOutcome> {
        validate_lock_id(lock_id)?;
        let _guard = self.guard(lock_id)?;
        let now = self.clock.now();

        match self.load(lock_id)? {
            Some(record) if record.owner == client_id && !record.is_lapsed(now) => {
                self.remove(lock_id)?;
                Ok(ReleaseOutcome::Released)
            }
            _ => Ok(ReleaseOutcome::NotHeldByCaller),
        }
    }

    fn release_all(&self, client_id: &str, timeout: Duration) -> Result<usize> {
        let now = self.clock.now();
        let release_at = deadline_after(now, timeout)?;
        let mut marked = 0;

        for candidate in self.owned_by(client_id)? {
            let did_mark = self.update(&candidate.lock_id, |current| match current {
                Some(mut record) if record.owner == client_id && !record.is_lapsed(now) => {
                    let deadline = record.release_at.map_or(release_at, |at| at.min(release_at));
                    record.release_at = Some(deadline);
                    Ok((Some(record), true))
                }
                _ => Ok((None, false)),
            })?;
            if did_mark {
                marked += 1;
            }
        }

        debug!(client_id, marked, ?timeout, "release-all scheduled");
        Ok(marked)
    }

    fn unrelease_all(&self, client_id: &str) -> Result<UnreleaseReport> {
        let mut report = UnreleaseReport::default();

        for candidate in self.owned_by(client_id)? {
            if candidate.release_at.is_none() {
                continue;
            }
            let lock_id = candidate.lock_id.clone();
            let now = self.clock.now();
            let restored = self.update(&lock_id, |current| match current {
                Some(mut record) if record.owner == client_id => match record.release_at {
                    Some(at) if now < at => {
                        record.release_at = None;
                        Ok((Some(record), true))
                    }
                    _ => Ok((None, false)),
                },
                _ => Ok((None, false)),
            })?;
            if restored {
                report.restored.push(lock_id);
            } else {
                report.too_late.push(lock_id);
            }
        }

        report.sort();
        Ok(report)
    }

    fn locked(&self, lock_id: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self.read(lock_id)?.is_some_and(|record| record.is_held(now)))
    }

    fn set_client_last_address(&self, client_id: &str, address: SocketAddr) -> Result<()> {
        validate_client_id(client_id)?;
        let mut session = self
            .load_session(client_id)?
            .unwrap_or_else(|| ClientSession::new(client_id));
        session.last_address = Some(address);

        let json = serde_json::to_string_pretty(&session)?;
        atomic_write(self.layout.session_path(client_id), json.as_bytes())
    }

    fn get_client_last_address(&self, client_id: &str) -> Result<Option<SocketAddr>> {
        validate_client_id(client_id)?;
        Ok(self
            .load_session(client_id)?
            .and_then(|session| session.last_address))
    }

    fn find(&self, pattern: &str) -> Result<Vec<FoundLock>> {
        let matcher = compile_pattern(pattern)?;
        let now = self.clock.now();

        let mut found: Vec<FoundLock> = self
            .scan()?
            .into_iter()
            .filter(|record| record.is_held(now) && matcher.is_match(&record.lock_id))
            .map(|record| FoundLock {
                lock_id: record.lock_id,
                acquired_at: record.acquired_at,
            })
            .collect();
        found.sort_by(|a, b| a.lock_id.cmp(&b.lock_id));
        Ok(found)
    }

    fn add_signal(&self, lock_id: &str, signal: &str) -> Result<AddSignalOutcome> {
        validate_lock_id(lock_id)?;
        let now = self.clock.now();

        self.update(lock_id, |current| match current {
            Some(mut record) if record.is_held(now) => {
                if record.signals.insert(signal.to_string()) {
                    Ok((Some(record), AddSignalOutcome::Added))
                } else {
                    Ok((None, AddSignalOutcome::Added))
                }
            }
            _ => Ok((None, AddSignalOutcome::NotHeld)),
        })
    }

    fn has_signal(&self, lock_id: &str, signal: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .read(lock_id)?
            .is_some_and(|record| record.is_held(now) && record.signals.contains(signal)))
    }

    fn remove_signal(&self, lock_id: &str, signal: &str) -> Result<RemoveSignalOutcome> {
        validate_lock_id(lock_id)?;
        let now = self.clock.now();

        self.update(lock_id, |current| match current {
            Some(mut record) if record.is_held(now) => {
                if record.signals.remove(signal) {
                    Ok((Some(record), RemoveSignalOutcome::Removed))
                } else {
                    Ok((None, RemoveSignalOutcome::NotPresent))
                }
            }
            _ => Ok((None, RemoveSignalOutcome::NotHeld)),
        })
    }

    fn dump(&self) -> Result<()> {
        debug!(root = %self.layout.root.display(), "file store is always durable; dump is a no-op");
        Ok(())
    }

    fn load_dump(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(self
            .scan()?
            .iter()
            .filter(|record| !record.is_lapsed(now))
            .count())
    }

    fn clear_dump(&self) -> Result<()> {
        debug!(root = %self.layout.root.display(), "file store keeps no separate dump");
        Ok(())
    }

    fn maintenance(&self, budget: Duration) -> Result<MaintenanceReport> {
        let started = Instant::now();
        let deadline = started + budget;
        let mut report = MaintenanceReport {
            complete: true,
            ..MaintenanceReport::default()
        };

        let now = self.clock.now();
        for path in self.record_files()? {
            if Instant::now() >= deadline {
                report.complete = false;
                break;
            }
            let Some(content) = read_optional(&path)? else {
                continue;
            };
            let Ok(record) = parse_record(&path, &content) else {
                continue;
            };
            if record.is_lapsed(now) && self.purge_if_lapsed(&record.lock_id)? {
                report.purged += 1;
            }
        }

        if report.complete {
            let (removed, complete) = self.sweep_debris(deadline)?;
            report.purged += removed;
            report.complete = complete;
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    fn stats(&self) -> Result<StoreStats> {
        let now = self.clock.now();
        let mut stats = StoreStats::default();

        for record in self.scan()? {
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
        stats.session_count = list_files(&self.layout.sessions_dir, layout::SESSION_EXT)?.len();

        Ok(stats)
    }
}

fn parse_record(path: &Path, content: &str) -> Result<LockRecord> {
    serde_json::from_str(content).map_err(|e| {
        LeaseError::Backend(format!(
            "failed to parse lock record '{}': {}",
            path.display(),
            e
        ))
    })
}

fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| {
        LeaseError::Backend(format!(
            "failed to read directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            LeaseError::Backend(format!("failed to read entry in '{}': {}", dir.display(), e))
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Files in `dir` with extension `ext`, ignoring staging files.
fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    Ok(read_dir_paths(dir)?
        .into_iter()
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            !is_staging_file(name) && path.extension().and_then(|e| e.to_str()) == Some(ext)
        })
        .collect())
}

fn staging_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_dir_paths(dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_staging_file)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, FileLeaseStore, ManualClock) {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::at_unix(1_700_000_000);
        let store = FileLeaseStore::open(dir.path(), Arc::new(clock.clone())).unwrap();
        (dir, store, clock)
    }

    #[test]
    fn open_creates_layout() {
        let (dir, _store, _clock) = open_store();

        assert!(dir.path().join("locks").is_dir());
        assert!(dir.path().join("guards").is_dir());
        assert!(dir.path().join("sessions").is_dir());
    }

    #[test]
    fn records_are_json_files_named_by_id() {
        let (dir, store, _clock) = open_store();

        store.acquire("A", "svc/db", 60, false).unwrap();

        let path = dir.path().join("locks").join("svc%2Fdb.lease");
        let content = fs::read_to_string(&path).unwrap();
        let record: LockRecord = serde_json::from_str(&content).unwrap();
        assert_eq!(record.lock_id, "svc/db");
        assert_eq!(record.owner, "A");
    }

    #[test]
    fn guards_are_released_after_each_operation() {
        let (dir, store, _clock) = open_store();

        store.acquire("A", "job-7", 60, false).unwrap();
        store.add_signal("job-7", "drain").unwrap();
        store.release("A", "job-7").unwrap();

        let leftovers = fs::read_dir(dir.path().join("guards")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn two_stores_on_one_directory_see_each_other() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::at_unix(1_700_000_000);
        let first = FileLeaseStore::open(dir.path(), Arc::new(clock.clone())).unwrap();
        let second = FileLeaseStore::open(dir.path(), Arc::new(clock)).unwrap();

        assert!(first.acquire("A", "job-7", 60, false).unwrap().is_acquired());
        assert!(!second.acquire("B", "job-7", 60, false).unwrap().is_acquired());
        assert!(second.locked("job-7").unwrap());
    }

    #[test]
    fn corrupt_record_fails_direct_read_but_not_scans() {
        let (dir, store, _clock) = open_store();
        store.acquire("A", "good", 60, false).unwrap();
        fs::write(dir.path().join("locks").join("bad.lease"), "not json").unwrap();

        assert!(matches!(store.read("bad"), Err(LeaseError::Backend(_))));
        let found = store.find("*").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lock_id, "good");
    }

    #[test]
    fn session_addresses_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::at_unix(1_700_000_000);
        let addr: SocketAddr = "10.0.0.5:9000".parse().unwrap();
        {
            let store = FileLeaseStore::open(dir.path(), Arc::new(clock.clone())).unwrap();
            store.set_client_last_address("worker-1", addr).unwrap();
        }

        let store = FileLeaseStore::open(dir.path(), Arc::new(clock)).unwrap();
        assert_eq!(store.get_client_last_address("worker-1").unwrap(), Some(addr));
        assert_eq!(store.stats().unwrap().session_count, 1);
    }

    #[test]
    fn maintenance_removes_lapsed_records_and_debris() {
        let (dir, store, clock) = open_store();
        let store = store.with_guard_stale(Duration::ZERO);
        store.acquire("A", "job-1", 600, false).unwrap();
        store.acquire("B", "job-2", 600, false).unwrap();
        store.release_all("A", Duration::from_secs(5)).unwrap();
        fs::write(dir.path().join("guards").join("orphan.guard"), "").unwrap();
        fs::write(dir.path().join("locks").join(".job-9.lease.abc.tmp"), "").unwrap();
        std::thread::sleep(Duration::from_millis(10));

        clock.advance_secs(6);
        let report = store.maintenance(Duration::from_secs(5)).unwrap();

        assert!(report.complete);
        assert_eq!(report.purged, 3);
        assert!(!dir.path().join("locks").join("job-1.lease").exists());
        assert!(dir.path().join("locks").join("job-2.lease").exists());
        assert!(!dir.path().join("guards").join("orphan.guard").exists());
    }

    #[test]
    fn load_dump_counts_live_records() {
        let (_dir, store, _clock) = open_store();
        store.acquire("A", "job-1", 60, false).unwrap();
        store.acquire("A", "job-2", 60, false).unwrap();

        store.dump().unwrap();
        assert_eq!(store.load_dump().unwrap(), 2);
        store.clear_dump().unwrap();
        assert_eq!(store.load_dump().unwrap(), 2);
    }
}
