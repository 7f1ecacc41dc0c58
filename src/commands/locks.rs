//! `release`, `locked`, and `find`.

use super::{emit, open_store, system_clock};
use crate::cli::{FindArgs, LockedArgs, ReleaseArgs};
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::lease::{ReleaseOutcome, default_owner, validate_lock_id};
use crate::store::LeaseStore;
use chrono::SecondsFormat;
use std::io::Write;

/// Release a lock. Not holding it is reported as unavailable (exit 3).
pub fn cmd_release(config: &Config, args: ReleaseArgs, _out: &mut dyn Write) -> Result<()> {
    validate_lock_id(&args.lock_id)?;
    let owner = args.owner.unwrap_or_else(default_owner);
    let store = open_store(config, system_clock())?;

    match store.release(&owner, &args.lock_id)? {
        ReleaseOutcome::Released => Ok(()),
        ReleaseOutcome::NotHeldByCaller => Err(LeaseError::Unavailable(format!(
            "'{}' is not held by {}",
            args.lock_id, owner
        ))),
    }
}

/// Print `true` or `false`.
pub fn cmd_locked(config: &Config, args: LockedArgs, out: &mut dyn Write) -> Result<()> {
    validate_lock_id(&args.lock_id)?;
    let store = open_store(config, system_clock())?;
    let locked = store.locked(&args.lock_id)?;
    emit(out, if locked { "true" } else { "false" })
}

/// Print `lock_id<TAB>acquired_at` for every held lock matching the pattern.
pub fn cmd_find(config: &Config, args: FindArgs, out: &mut dyn Write) -> Result<()> {
    let store = open_store(config, system_clock())?;
    for found in store.find(&args.pattern)? {
        emit(
            out,
            &format!(
                "{}\t{}",
                found.lock_id,
                found.acquired_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        )?;
    }
    Ok(())
}
