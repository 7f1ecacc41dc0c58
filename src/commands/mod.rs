//! Command implementations for leasehold.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command except `serve` works directly on the file
//! lease store under `store_dir`, so separate processes on one host (or on
//! hosts sharing the directory) coordinate through it.

mod acquire;
mod locks;
mod maintain;
mod serve;
mod signal;

#[cfg(test)]
mod tests;

pub use acquire::cmd_acquire;
pub use locks::{cmd_find, cmd_locked, cmd_release};
pub use maintain::cmd_maintain;
pub use serve::cmd_serve;
pub use signal::cmd_signal;

use crate::cli::{Cli, Command};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::store::FileLeaseStore;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Dispatch a parsed command line.
///
/// Resolves the config (file, environment, then `--store`) and routes to the
/// command handler. Command output goes to stdout.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Acquire(args) => cmd_acquire(&config, args, &mut out),
        Command::Release(args) => cmd_release(&config, args, &mut out),
        Command::Locked(args) => cmd_locked(&config, args, &mut out),
        Command::Find(args) => cmd_find(&config, args, &mut out),
        Command::Signal(signal) => cmd_signal(&config, signal, &mut out),
        Command::Maintain(args) => cmd_maintain(&config, args, &mut out),
        Command::Serve(args) => cmd_serve(&config, args),
    }
}

/// Effective config for this invocation.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(store) = &cli.store {
        config.store_dir = store.to_string_lossy().to_string();
    }
    debug!(store_dir = %config.store_dir, "config resolved");
    Ok(config)
}

/// Open the file store configured in `config`.
pub(crate) fn open_store(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<FileLeaseStore>> {
    let store = FileLeaseStore::open(&config.store_dir, clock)?
        .with_reclaim_grace(Duration::from_secs(config.reclaim_grace_secs))
        .with_guard_stale(Duration::from_secs(config.guard_stale_secs));
    Ok(Arc::new(store))
}

pub(crate) fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

pub(crate) fn emit(out: &mut dyn Write, line: &str) -> Result<()> {
    writeln!(out, "{}", line)
        .map_err(|e| LeaseError::Backend(format!("failed to write output: {}", e)))
}
