//! Exclusive guard files arbitrating writes to one lock record.
//!
//! A guard is taken by creating `<lock>.guard` with `create_new`; whoever
//! creates it may read-modify-write the record, and dropping the guard
//! deletes the file. A process that dies mid-write leaves its guard behind,
//! so guards older than the stale threshold are broken by the next writer.

use crate::error::{LeaseError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;

const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Diagnostic content written into a guard file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardMetadata {
    pub owner: String,
    pub pid: u32,
}

impl GuardMetadata {
    fn current() -> Self {
        Self {
            owner: crate::lease::default_owner(),
            pid: std::process::id(),
        }
    }
}

/// RAII guard; the file is removed on drop.
#[derive(Debug)]
pub struct RecordGuard {
    path: PathBuf,
}

impl RecordGuard {
    /// Take the guard at `path`, waiting up to `wait` for a live holder.
    ///
    /// Guards whose file is older than `stale` are removed and retried.
    pub fn acquire(path: &Path, wait: Duration, stale: Duration) -> Result<Self> {
        let deadline = Instant::now() + wait;

        loop {
            match try_create(path) {
                Ok(guard) => return Ok(guard),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(LeaseError::Backend(format!(
                        "failed to create guard '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }

            if is_stale(path, stale) {
                let holder = read_metadata(path);
                warn!(
                    guard = %path.display(),
                    holder = ?holder,
                    "breaking stale guard"
                );
                let _ = fs::remove_file(path);
                continue;
            }

            if Instant::now() >= deadline {
                return Err(LeaseError::Backend(format!(
                    "timed out after {:?} waiting for guard '{}'",
                    wait,
                    path.display()
                )));
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(guard = %self.path.display(), error = %e, "failed to remove guard");
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<RecordGuard> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;

    // The guard is held from this point; metadata is best effort.
    let guard = RecordGuard {
        path: path.to_path_buf(),
    };
    if let Ok(json) = serde_json::to_vec(&GuardMetadata::current()) {
        let _ = file.write_all(&json);
    }
    Ok(guard)
}

/// Age of the file at `path` by modification time.
pub fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn is_stale(path: &Path, stale: Duration) -> bool {
    file_age(path).is_some_and(|age| age > stale)
}

fn read_metadata(path: &Path) -> Option<GuardMetadata> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
