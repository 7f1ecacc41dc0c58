//! Implementation of the `leasehold acquire` command.

use super::{emit, open_store, system_clock};
use crate::cli::AcquireArgs;
use crate::clock::CancelToken;
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::lease::default_owner;
use crate::protocol::{AcquireProtocol, AcquireRequest, Acquisition};
use std::io::Write;
use std::time::Duration;

/// Execute the `leasehold acquire` command.
///
/// Prints the lease id on success. A lock that stays held (`--no-wait`, or
/// the wait budget running out) becomes [`LeaseError::Unavailable`], which
/// the binary turns into a silent exit 3.
pub fn cmd_acquire(config: &Config, args: AcquireArgs, out: &mut dyn Write) -> Result<()> {
    let owner = args.owner.unwrap_or_else(default_owner);
    let lease_duration = args.lease_duration.unwrap_or(config.default_lease_secs);

    let mut request = AcquireRequest::new(&args.lock_id, &owner, lease_duration)
        .wait_time(args.wait_time)
        .reclaim_grace(args.reclaim_grace.unwrap_or(config.reclaim_grace_secs));
    if args.no_wait {
        request = request.no_wait();
    }
    // Fail on bad input before creating the store directory.
    request.validate()?;

    let clock = system_clock();
    let store = open_store(config, clock.clone())?;
    let protocol = AcquireProtocol::new(store, clock).with_backoff(
        Duration::from_secs(config.initial_backoff_secs),
        Duration::from_secs(config.max_backoff_secs),
    );

    match protocol.acquire(&request, &CancelToken::new())? {
        Acquisition::Acquired(lease) => emit(out, &lease.lease_id),
        Acquisition::Denied { holder } => Err(LeaseError::Unavailable(format!(
            "'{}' is held by {}",
            args.lock_id, holder.owner
        ))),
        Acquisition::TimedOut { attempts } => Err(LeaseError::Unavailable(format!(
            "'{}' still held after {} attempts",
            args.lock_id, attempts
        ))),
    }
}
