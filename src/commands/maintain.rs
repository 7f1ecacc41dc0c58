//! Implementation of the `leasehold maintain` command.

use super::{emit, open_store, system_clock};
use crate::cli::MaintainArgs;
use crate::config::Config;
use crate::error::Result;
use crate::store::LeaseStore;
use std::io::Write;
use std::time::Duration;
use tracing::warn;

/// Run one bounded maintenance window and print how many records were purged.
pub fn cmd_maintain(config: &Config, args: MaintainArgs, out: &mut dyn Write) -> Result<()> {
    let budget = Duration::from_millis(args.budget_ms.unwrap_or(config.maintenance_timeout_ms));
    let store = open_store(config, system_clock())?;

    let report = store.maintenance(budget)?;
    if !report.complete {
        warn!(elapsed = ?report.elapsed, ?budget, "maintenance stopped at its budget");
    }
    emit(out, &format!("purged {}", report.purged))
}
