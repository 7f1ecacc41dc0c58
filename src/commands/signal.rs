//! Implementation of the `leasehold signal` subcommands.

use super::{emit, open_store, system_clock};
use crate::cli::{SignalAction, SignalCommand};
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::lease::{AddSignalOutcome, RemoveSignalOutcome};
use crate::signals::SignalChannel;
use std::io::Write;

/// `add` and `remove` on a lock nobody holds exit 3; `has` prints a boolean.
/// Removing a signal that is not raised succeeds.
pub fn cmd_signal(config: &Config, signal: SignalCommand, out: &mut dyn Write) -> Result<()> {
    let channel = SignalChannel::new(open_store(config, system_clock())?);

    match signal.action {
        SignalAction::Add(args) => match channel.raise(&args.lock_id, &args.signal)? {
            AddSignalOutcome::Added => Ok(()),
            AddSignalOutcome::NotHeld => Err(not_held(&args.lock_id)),
        },
        SignalAction::Has(args) => {
            let raised = channel.is_raised(&args.lock_id, &args.signal)?;
            emit(out, if raised { "true" } else { "false" })
        }
        SignalAction::Remove(args) => match channel.clear(&args.lock_id, &args.signal)? {
            RemoveSignalOutcome::Removed | RemoveSignalOutcome::NotPresent => Ok(()),
            RemoveSignalOutcome::NotHeld => Err(not_held(&args.lock_id)),
        },
    }
}

fn not_held(lock_id: &str) -> LeaseError {
    LeaseError::Unavailable(format!("'{}' is not held", lock_id))
}
