//! Lease storage contract and its backends.
//!
//! [`LeaseStore`] is the single source of truth for exclusivity. It exposes
//! two layers:
//!
//! - **Primitives** (`create_if_absent`, `read`, `reclaim`) that the client-side
//!   acquire protocol composes into its retry loop.
//! - **Session operations** (`acquire`, `release`, `release_all`, signals, ...)
//!   used by the lock server on behalf of connected clients.
//!
//! Every mutating call is linearizable per lock id. Calls on different lock
//! ids must not block each other.
//!
//! # Backends
//!
//! - [`MemoryLeaseStore`]: sharded in-memory map with dump/restore to a JSON file
//! - [`FileLeaseStore`]: one record file per lock in a shared directory, with
//!   conditional writes arbitrated by exclusive guard files
//! - [`StorageGate`]: decorator adding the maintenance pause and shutdown fence
//!
//! The trait has no default method bodies: a backend that does not implement
//! an operation does not compile, so nothing can silently no-op.

pub mod file;
pub mod gate;
pub mod memory;


pub use file::FileLeaseStore;
pub use gate::StorageGate;
pub use memory::MemoryLeaseStore;

use crate::error::Result;
use crate::lease::{
    AcquireOutcome, AddSignalOutcome, CreateOutcome, FoundLock, LockRecord, MaintenanceReport,
    ReclaimOutcome, ReleaseOutcome, RemoveSignalOutcome, StoreStats, UnreleaseReport,
};
use std::net::SocketAddr;
use std::time::Duration;

/// Storage contract every lease backend satisfies.
pub trait LeaseStore: Send + Sync {
    // =========================================================================
    // Primitives
    // =========================================================================

    /// Atomically store `record` iff no live record exists for its lock id.
    ///
    /// Lapsed records (pending release-all past its deadline) count as absent.
    /// On conflict the current record is returned.
    fn create_if_absent(&self, record: &LockRecord) -> Result<CreateOutcome>;

    /// Current record for `lock_id`, `None` if absent or lapsed.
    fn read(&self, lock_id: &str) -> Result<Option<LockRecord>>;

    /// Replace the record iff its lease id still equals `expected_lease_id`.
    ///
    /// The replacement's signal set and pending release are cleared.
    fn reclaim(&self, expected_lease_id: &str, replacement: &LockRecord) -> Result<ReclaimOutcome>;

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Acquire `lock_id` for `client_id`.
    ///
    /// - absent, lapsed, or reclaimable under the store's grace: new lease
    /// - held by `client_id` and `reentrant`: succeeds, lease id unchanged
    /// - otherwise: `AlreadyHeld`
    fn acquire(
        &self,
        client_id: &str,
        lock_id: &str,
        lease_duration: u64,
        reentrant: bool,
    ) -> Result<AcquireOutcome>;

    /// Remove the record iff `client_id` owns it.
    fn release(&self, client_id: &str, lock_id: &str) -> Result<ReleaseOutcome>;

    /// Mark every lock owned by `client_id` free after `timeout`.
    ///
    /// Returns the number of locks marked.
    fn release_all(&self, client_id: &str, timeout: Duration) -> Result<usize>;

    /// Cancel pending releases for `client_id` whose countdown has not elapsed.
    fn unrelease_all(&self, client_id: &str) -> Result<UnreleaseReport>;

    fn locked(&self, lock_id: &str) -> Result<bool>;

    fn set_client_last_address(&self, client_id: &str, address: SocketAddr) -> Result<()>;

    fn get_client_last_address(&self, client_id: &str) -> Result<Option<SocketAddr>>;

    /// Held locks whose id matches the glob `pattern`, sorted by lock id.
    fn find(&self, pattern: &str) -> Result<Vec<FoundLock>>;

    fn add_signal(&self, lock_id: &str, signal: &str) -> Result<AddSignalOutcome>;

    /// `false` for locks that are not held.
    fn has_signal(&self, lock_id: &str, signal: &str) -> Result<bool>;

    fn remove_signal(&self, lock_id: &str, signal: &str) -> Result<RemoveSignalOutcome>;

    // =========================================================================
    // Persistence and upkeep
    // =========================================================================

    /// Snapshot all state to durable storage.
    fn dump(&self) -> Result<()>;

    /// Restore state written by `dump`. Returns the number of locks restored.
    fn load_dump(&self) -> Result<usize>;

    /// Forget any snapshot.
    fn clear_dump(&self) -> Result<()>;

    /// Incremental upkeep that must return within `budget`.
    fn maintenance(&self, budget: Duration) -> Result<MaintenanceReport>;

    fn stats(&self) -> Result<StoreStats>;
}

/// Build a glob matcher for `find`.
pub(crate) fn compile_pattern(pattern: &str) -> Result<globset::GlobMatcher> {
    use crate::error::LeaseError;

    if pattern.is_empty() {
        return Err(LeaseError::Validation(
            "find pattern must not be empty".to_string(),
        ));
    }
    globset::Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| LeaseError::Validation(format!("invalid find pattern '{}': {}", pattern, e)))
}
