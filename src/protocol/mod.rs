//! Client-side acquire protocol over the store primitives.
//!
//! `Trying -> {Acquired, Denied, TimedOut}`. Each attempt is one atomic
//! `create_if_absent`, optionally followed by one conditional `reclaim` of an
//! expired lease. Between attempts the caller sleeps on an exponential
//! backoff. The only writes are those two atomic calls, so aborting a wait
//! through the [`CancelToken`] never leaves a half-created record.

mod backoff;


pub use backoff::{Backoff, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};

use crate::clock::{CancelToken, Clock, to_chrono};
use crate::error::{LeaseError, Result};
use crate::lease::{
    CreateOutcome, LockRecord, ReclaimOutcome, validate_client_id, validate_lease_duration,
    validate_lock_id,
};
use crate::store::LeaseStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Parameters of one acquire call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    pub lock_id: String,
    /// Seconds.
    pub lease_duration: u64,
    /// Seconds; `0` waits indefinitely.
    pub wait_time: u64,
    pub no_wait: bool,
    pub owner: String,
    /// Seconds past expiration before a lease may be reclaimed.
    pub reclaim_grace: u64,
}

impl AcquireRequest {
    pub fn new(lock_id: &str, owner: &str, lease_duration: u64) -> Self {
        Self {
            lock_id: lock_id.to_string(),
            lease_duration,
            wait_time: 0,
            no_wait: false,
            owner: owner.to_string(),
            reclaim_grace: 5,
        }
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    pub fn wait_time(mut self, secs: u64) -> Self {
        self.wait_time = secs;
        self
    }

    pub fn reclaim_grace(mut self, secs: u64) -> Self {
        self.reclaim_grace = secs;
        self
    }

    /// Reject requests that can never succeed.
    pub fn validate(&self) -> Result<()> {
        validate_lock_id(&self.lock_id)?;
        validate_client_id(&self.owner)
            .map_err(|_| LeaseError::Validation(format!("invalid owner '{}'", self.owner)))?;
        validate_lease_duration(self.lease_duration)?;
        if self.no_wait && self.wait_time > 0 {
            return Err(LeaseError::Validation(
                "--no-wait cannot be combined with a non-zero wait time".to_string(),
            ));
        }
        Ok(())
    }
}

/// A lease held by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub lock_id: String,
    pub lease_id: String,
    pub expiration_time: DateTime<Utc>,
    /// Obtained by replacing an expired lease rather than a fresh create.
    pub reclaimed: bool,
}

/// Terminal state of an acquire call. Only `Acquired` means the caller holds
/// the lock; neither of the others is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired(Lease),
    /// `no_wait` was set and the lock is held.
    Denied { holder: LockRecord },
    /// The wait budget ran out.
    TimedOut { attempts: u32 },
}

impl Acquisition {
    pub fn lease(&self) -> Option<&Lease> {
        match self {
            Acquisition::Acquired(lease) => Some(lease),
            _ => None,
        }
    }
}

/// Runs the acquire loop against a store.
#[derive(Debug)]
pub struct AcquireProtocol<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl<S: LeaseStore + ?Sized> AcquireProtocol<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Try until acquired, denied, out of wait budget, or cancelled.
    ///
    /// Backend errors abort immediately. Cancellation during a backoff sleep
    /// returns `Err(LeaseError::Cancelled)`.
    pub fn acquire(&self, request: &AcquireRequest, cancel: &CancelToken) -> Result<Acquisition> {
        request.validate()?;

        let started = self.clock.now();
        let wait_budget = to_chrono(Duration::from_secs(request.wait_time));
        let grace = Duration::from_secs(request.reclaim_grace);
        let mut backoff = Backoff::new(self.initial_backoff, self.max_backoff);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let now = self.clock.now();
            let candidate =
                LockRecord::new(&request.lock_id, &request.owner, request.lease_duration, now);

            let existing = match self.store.create_if_absent(&candidate)? {
                CreateOutcome::Created => {
                    info!(lock_id = %request.lock_id, lease_id = %candidate.lease_id, "lock acquired");
                    return Ok(Acquisition::Acquired(lease_of(candidate, false)));
                }
                CreateOutcome::Exists(existing) => existing,
            };

            if existing.is_reclaimable(now, grace) {
                match self.store.reclaim(&existing.lease_id, &candidate)? {
                    ReclaimOutcome::Reclaimed => {
                        info!(
                            lock_id = %request.lock_id,
                            lease_id = %candidate.lease_id,
                            previous_owner = %existing.owner,
                            "expired lease reclaimed"
                        );
                        return Ok(Acquisition::Acquired(lease_of(candidate, true)));
                    }
                    ReclaimOutcome::Conflict => {
                        debug!(lock_id = %request.lock_id, "lost reclaim race");
                    }
                }
            }

            if request.no_wait {
                debug!(lock_id = %request.lock_id, holder = %existing.owner, "lock held; not waiting");
                return Ok(Acquisition::Denied { holder: existing });
            }

            let delay = backoff.next_delay();
            debug!(
                lock_id = %request.lock_id,
                holder = %existing.owner,
                attempt = attempts,
                ?delay,
                "lock held; backing off"
            );
            self.clock.sleep(delay, cancel)?;

            let elapsed = self.clock.now().signed_duration_since(started);
            if request.wait_time != 0 && elapsed > wait_budget {
                info!(lock_id = %request.lock_id, attempts, "gave up waiting for lock");
                return Ok(Acquisition::TimedOut { attempts });
            }
        }
    }
}

fn lease_of(record: LockRecord, reclaimed: bool) -> Lease {
    Lease {
        lock_id: record.lock_id,
        lease_id: record.lease_id,
        expiration_time: record.expiration_time,
        reclaimed,
    }
}
