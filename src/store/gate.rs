//! Maintenance pause and shutdown fence around any [`LeaseStore`].
//!
//! Regular operations share a read lock; a maintenance window takes the
//! write lock, so it only starts once in-flight operations have drained and
//! nothing new starts until it ends. `try_maintenance` never waits: if any
//! operation is in progress the window is skipped for this period.
//!
//! Once [`StorageGate::terminate`] runs, mutating operations fail with
//! [`LeaseError::Terminating`]; reads keep working so a draining server can
//! still answer `LOCKED` and `FIND`.

use super::LeaseStore;
use crate::error::{LeaseError, Result};
use crate::lease::{
    AcquireOutcome, AddSignalOutcome, CreateOutcome, FoundLock, LockRecord, MaintenanceReport,
    ReclaimOutcome, ReleaseOutcome, RemoveSignalOutcome, StoreStats, UnreleaseReport,
};
use parking_lot::{RwLock, RwLockReadGuard};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub struct StorageGate<S> {
    inner: S,
    pause: RwLock<()>,
    terminating: AtomicBool,
}

impl<S: LeaseStore> StorageGate<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pause: RwLock::new(()),
            terminating: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// Run a maintenance window unless operations are in flight.
    ///
    /// Returns `Ok(None)` when the window was skipped.
    pub fn try_maintenance(&self, budget: Duration) -> Result<Option<MaintenanceReport>> {
        let Some(_pause) = self.pause.try_write() else {
            return Ok(None);
        };
        self.inner.maintenance(budget).map(Some)
    }

    /// Fence off writes, wait for in-flight operations, then dump state.
    pub fn terminate(&self) -> Result<()> {
        if self.terminating.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _pause = self.pause.write();
        info!("storage fenced; dumping state");
        self.inner.dump().inspect_err(|e| {
            warn!(error = %e, "failed to dump state during shutdown");
        })
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.pause.read()
    }

    fn writable(&self) -> Result<RwLockReadGuard<'_, ()>> {
        let guard = self.pause.read();
        if self.is_terminating() {
            return Err(LeaseError::Terminating);
        }
        Ok(guard)
    }
}

impl<S: LeaseStore> LeaseStore for StorageGate<S> {
    fn create_if_absent(&self, record: &LockRecord) -> Result<CreateOutcome> {
        let _op = self.writable()?;
        self.inner.create_if_absent(record)
    }

    fn read(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        let _op = self.shared();
        self.inner.read(lock_id)
    }

    fn reclaim(&self, expected_lease_id: &str, replacement: &LockRecord) -> Result<ReclaimOutcome> {
        let _op = self.writable()?;
        self.inner.reclaim(expected_lease_id, replacement)
    }

    fn acquire(
        &self,
        client_id: &str,
        lock_id: &str,
        lease_duration: u64,
        reentrant: bool,
    ) -> Result<AcquireOutcome> {
        let _op = self.writable()?;
        self.inner
            .acquire(client_id, lock_id, lease_duration, reentrant)
    }

    fn release(&self, client_id: &str, lock_id: &str) -> Result<ReleaseOutcome> {
        let _op = self.writable()?;
        self.inner.release(client_id, lock_id)
    }

    fn release_all(&self, client_id: &str, timeout: Duration) -> Result<usize> {
        let _op = self.writable()?;
        self.inner.release_all(client_id, timeout)
    }

    fn unrelease_all(&self, client_id: &str) -> Result<UnreleaseReport> {
        let _op = self.writable()?;
        self.inner.unrelease_all(client_id)
    }

    fn locked(&self, lock_id: &str) -> Result<bool> {
        let _op = self.shared();
        self.inner.locked(lock_id)
    }

    fn set_client_last_address(&self, client_id: &str, address: SocketAddr) -> Result<()> {
        let _op = self.writable()?;
        self.inner.set_client_last_address(client_id, address)
    }

    fn get_client_last_address(&self, client_id: &str) -> Result<Option<SocketAddr>> {
        let _op = self.shared();
        self.inner.get_client_last_address(client_id)
    }

    fn find(&self, pattern: &str) -> Result<Vec<FoundLock>> {
        let _op = self.shared();
        self.inner.find(pattern)
    }

    fn add_signal(&self, lock_id: &str, signal: &str) -> Result<AddSignalOutcome> {
        let _op = self.writable()?;
        self.inner.add_signal(lock_id, signal)
    }

    fn has_signal(&self, lock_id: &str, signal: &str) -> Result<bool> {
        let _op = self.shared();
        self.inner.has_signal(lock_id, signal)
    }

    fn remove_signal(&self, lock_id: &str, signal: &str) -> Result<RemoveSignalOutcome> {
        let _op = self.writable()?;
        self.inner.remove_signal(lock_id, signal)
    }

    fn dump(&self) -> Result<()> {
        let _op = self.shared();
        self.inner.dump()
    }

    fn load_dump(&self) -> Result<usize> {
        let _op = self.writable()?;
        self.inner.load_dump()
    }

    fn clear_dump(&self) -> Result<()> {
        let _op = self.writable()?;
        self.inner.clear_dump()
    }

    /// Blocking variant of [`StorageGate::try_maintenance`].
    fn maintenance(&self, budget: Duration) -> Result<MaintenanceReport> {
        let _pause = self.pause.write();
        self.inner.maintenance(budget)
    }

    fn stats(&self) -> Result<StoreStats> {
        let _op = self.shared();
        self.inner.stats()
    }
}
