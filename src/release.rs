//! Disconnect and reconnect handling for server-side sessions.
//!
//! A dropped connection does not free its locks at once: they are marked to
//! lapse after `release_all_timeout`, and a client that comes back under the
//! same id before then gets them back untouched.

use crate::error::Result;
use crate::lease::UnreleaseReport;
use crate::store::LeaseStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What `on_disconnect` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Locks were scheduled for release; holds the number marked.
    Scheduled(usize),
    /// A newer connection for the same client exists; nothing was touched.
    Superseded,
}

#[derive(Debug)]
pub struct ReleaseAllController<S: ?Sized> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: LeaseStore + ?Sized> ReleaseAllController<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// First contact under a fresh client id.
    pub fn on_connect(&self, client_id: &str, peer: SocketAddr) -> Result<()> {
        self.store.set_client_last_address(client_id, peer)?;
        debug!(client_id, %peer, "client connected");
        Ok(())
    }

    /// A known client id came back; restore whatever has not lapsed yet.
    pub fn on_reconnect(&self, client_id: &str, peer: SocketAddr) -> Result<UnreleaseReport> {
        let report = self.store.unrelease_all(client_id)?;
        self.store.set_client_last_address(client_id, peer)?;

        if !report.is_empty() {
            info!(
                client_id,
                %peer,
                restored = report.restored.len(),
                too_late = report.too_late.len(),
                "client reconnected"
            );
        }
        Ok(report)
    }

    /// Connection from `peer` dropped.
    ///
    /// Locks are only scheduled for release when `peer` is the client's most
    /// recent address (or none is known); an older connection going away
    /// must not release what the newer one holds.
    pub fn on_disconnect(&self, client_id: &str, peer: SocketAddr) -> Result<DisconnectOutcome> {
        match self.store.get_client_last_address(client_id)? {
            Some(last) if last != peer => {
                debug!(client_id, %peer, %last, "stale connection closed; keeping locks");
                Ok(DisconnectOutcome::Superseded)
            }
            _ => {
                let marked = self.store.release_all(client_id, self.timeout)?;
                if marked > 0 {
                    info!(client_id, %peer, marked, timeout = ?self.timeout, "client gone; locks pending release");
                }
                Ok(DisconnectOutcome::Scheduled(marked))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lease::AcquireOutcome;
    use crate::store::{FileLeaseStore, MemoryLeaseStore};
    use tempfile::TempDir;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn memory() -> (Arc<MemoryLeaseStore>, ManualClock) {
        let clock = ManualClock::at_unix(1_700_000_000);
        (Arc::new(MemoryLeaseStore::new(Arc::new(clock.clone()))), clock)
    }

    #[test]
    fn disconnect_then_timely_reconnect_restores_locks() {
        let (store, clock) = memory();
        let controller = ReleaseAllController::new(Arc::clone(&store), Duration::from_secs(5));
        controller.on_connect("A", addr(4000)).unwrap();
        let before = store.acquire("A", "job-7", 600, false).unwrap();

        assert_eq!(
            controller.on_disconnect("A", addr(4000)).unwrap(),
            DisconnectOutcome::Scheduled(1)
        );
        clock.advance_secs(3);
        let report = controller.on_reconnect("A", addr(4001)).unwrap();

        assert_eq!(report.restored, vec!["job-7".to_string()]);
        clock.advance_secs(10);
        let AcquireOutcome::Acquired(before) = before else {
            panic!("expected Acquired");
        };
        assert_eq!(store.read("job-7").unwrap().unwrap().lease_id, before.lease_id);
        assert_eq!(store.get_client_last_address("A").unwrap(), Some(addr(4001)));
    }

    #[test]
    fn late_reconnect_finds_locks_taken() {
        let (store, clock) = memory();
        let controller = ReleaseAllController::new(Arc::clone(&store), Duration::from_secs(5));
        controller.on_connect("A", addr(4000)).unwrap();
        store.acquire("A", "job-7", 600, false).unwrap();
        controller.on_disconnect("A", addr(4000)).unwrap();

        clock.advance_secs(6);
        let report = controller.on_reconnect("A", addr(4001)).unwrap();

        assert!(report.restored.is_empty());
        assert_eq!(report.too_late, vec!["job-7".to_string()]);
        assert!(store.acquire("B", "job-7", 600, false).unwrap().is_acquired());
    }

    #[test]
    fn reconnect_after_takeover_restores_nothing() {
        let (store, clock) = memory();
        let controller = ReleaseAllController::new(Arc::clone(&store), Duration::from_secs(5));
        controller.on_connect("A", addr(4000)).unwrap();
        store.acquire("A", "job-7", 600, false).unwrap();
        controller.on_disconnect("A", addr(4000)).unwrap();

        clock.advance_secs(6);
        assert!(store.acquire("B", "job-7", 600, false).unwrap().is_acquired());
        let report = controller.on_reconnect("A", addr(4001)).unwrap();

        assert!(report.restored.is_empty());
        assert_eq!(store.read("job-7").unwrap().unwrap().owner, "B");
    }

    #[test]
    fn stale_connection_drop_keeps_locks_of_newer_one() {
        let (store, clock) = memory();
        let controller = ReleaseAllController::new(Arc::clone(&store), Duration::from_secs(5));
        controller.on_connect("A", addr(4000)).unwrap();
        store.acquire("A", "job-7", 600, false).unwrap();
        controller.on_reconnect("A", addr(4001)).unwrap();

        assert_eq!(
            controller.on_disconnect("A", addr(4000)).unwrap(),
            DisconnectOutcome::Superseded
        );
        clock.advance_secs(60);
        assert!(store.locked("job-7").unwrap());
    }

    #[test]
    fn disconnect_without_known_address_releases() {
        let (store, clock) = memory();
        let controller = ReleaseAllController::new(Arc::clone(&store), Duration::from_secs(5));
        store.acquire("A", "job-7", 600, false).unwrap();

        assert_eq!(
            controller.on_disconnect("A", addr(4000)).unwrap(),
            DisconnectOutcome::Scheduled(1)
        );
        clock.advance_secs(5);
        assert!(!store.locked("job-7").unwrap());
    }

    #[test]
    fn repeated_disconnect_reconnect_cycles_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::at_unix(1_700_000_000);
        let store = Arc::new(FileLeaseStore::open(dir.path(), Arc::new(clock.clone())).unwrap());
        let controller = ReleaseAllController::new(Arc::clone(&store), Duration::from_secs(5));
        controller.on_connect("A", addr(4000)).unwrap();
        store.acquire("A", "job-7", 600, false).unwrap();
        let lease_id = store.read("job-7").unwrap().unwrap().lease_id;

        for port in 4001..4005 {
            controller.on_disconnect("A", addr(port - 1)).unwrap();
            controller.on_disconnect("A", addr(port - 1)).unwrap();
            clock.advance_secs(1);
            let report = controller.on_reconnect("A", addr(port)).unwrap();
            assert_eq!(report.restored, vec!["job-7".to_string()]);
        }

        let record = store.read("job-7").unwrap().unwrap();
        assert_eq!(record.lease_id, lease_id);
        assert_eq!(record.release_at, None);
    }
}
