//! Periodic, bounded maintenance windows.
//!
//! Each tick tries to take the storage gate exclusively. If any storage call
//! is in flight the tick is skipped rather than queued; otherwise every
//! storage call waits until the window ends, which is why windows carry a
//! time budget.

use crate::clock::CancelToken;
use crate::error::Result;
use crate::lease::MaintenanceReport;
use crate::store::{LeaseStore, StorageGate};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub struct MaintenanceScheduler<S> {
    gate: Arc<StorageGate<S>>,
    period: Duration,
    budget: Duration,
}

/// Running scheduler thread; stops on [`MaintenanceHandle::stop`] or drop.
#[derive(Debug)]
pub struct MaintenanceHandle {
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("maintenance thread panicked");
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: LeaseStore + 'static> MaintenanceScheduler<S> {
    pub fn new(gate: Arc<StorageGate<S>>, period: Duration, budget: Duration) -> Self {
        Self {
            gate,
            period,
            budget,
        }
    }

    /// One tick. `Ok(None)` means the window was skipped.
    pub fn run_once(&self) -> Result<Option<MaintenanceReport>> {
        let Some(report) = self.gate.try_maintenance(self.budget)? else {
            debug!("storage busy; maintenance skipped");
            return Ok(None);
        };

        if report.elapsed > self.budget {
            warn!(
                elapsed = ?report.elapsed,
                budget = ?self.budget,
                "maintenance window overran its budget"
            );
        }
        if report.purged > 0 || !report.complete {
            debug!(
                purged = report.purged,
                complete = report.complete,
                elapsed = ?report.elapsed,
                "maintenance window"
            );
        }
        Ok(Some(report))
    }

    /// Run ticks on a background thread every `period` until stopped.
    pub fn spawn(self) -> Result<MaintenanceHandle> {
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let thread = thread::Builder::new()
            .name("leasehold-maintenance".to_string())
            .spawn(move || {
                while !token.wait_timeout(self.period) {
                    if let Err(e) = self.run_once() {
                        error!(error = %e, "maintenance failed");
                    }
                }
                debug!("maintenance thread stopped");
            })
            .map_err(|e| {
                crate::error::LeaseError::Backend(format!(
                    "failed to start maintenance thread: {}",
                    e
                ))
            })?;

        Ok(MaintenanceHandle {
            cancel,
            thread: Some(thread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryLeaseStore;

    fn gate_with_clock() -> (Arc<StorageGate<MemoryLeaseStore>>, ManualClock) {
        let clock = ManualClock::at_unix(1_700_000_000);
        let gate = Arc::new(StorageGate::new(MemoryLeaseStore::new(Arc::new(
            clock.clone(),
        ))));
        (gate, clock)
    }

    #[test]
    fn run_once_purges_lapsed_records() {
        let (gate, clock) = gate_with_clock();
        gate.acquire("A", "job-7", 600, false).unwrap();
        gate.release_all("A", Duration::from_secs(1)).unwrap();
        clock.advance_secs(2);

        let scheduler =
            MaintenanceScheduler::new(Arc::clone(&gate), Duration::from_secs(1), Duration::from_secs(1));
        let report = scheduler.run_once().unwrap().unwrap();

        assert_eq!(report.purged, 1);
        assert_eq!(gate.stats().unwrap().lock_count, 0);
    }

    #[test]
    fn background_thread_runs_and_stops() {
        let (gate, clock) = gate_with_clock();
        gate.acquire("A", "job-7", 600, false).unwrap();
        gate.release_all("A", Duration::ZERO).unwrap();
        clock.advance_secs(1);

        let handle = MaintenanceScheduler::new(
            Arc::clone(&gate),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .spawn()
        .unwrap();

        let mut purged = false;
        for _ in 0..200 {
            if gate.inner().held_lock_ids("A").is_empty() {
                purged = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.stop();

        assert!(purged);
    }
}
