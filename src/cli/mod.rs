//! CLI argument parsing for leasehold.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Leasehold: lease-based distributed locks.
///
/// Locks live in a shared store directory. A lock is held under a lease that
/// expires on its own, so a crashed holder never blocks others for longer
/// than its lease plus a short grace period.
#[derive(Parser, Debug)]
#[command(name = "leasehold")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory of the lock store (overrides `store_dir`).
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// YAML config file (default: ./leasehold.yaml when present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Explicit log level (trace, debug, info, warn, error).
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for leasehold.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a lock and print its lease id.
    ///
    /// Exits 3 without output when the lock stays held by someone else.
    Acquire(AcquireArgs),

    /// Release a lock held by the given owner.
    Release(ReleaseArgs),

    /// Print `true` if the lock is currently held.
    Locked(LockedArgs),

    /// List held locks whose id matches a glob pattern.
    Find(FindArgs),

    /// Manage signals on a held lock.
    Signal(SignalCommand),

    /// Run one maintenance window against the store.
    ///
    /// Purges records whose pending release has passed and sweeps leftover
    /// guard and staging files.
    Maintain(MaintainArgs),

    /// Run the TCP lock server.
    Serve(ServeArgs),
}

/// Arguments for the `acquire` command.
#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Lock to acquire.
    #[arg(long)]
    pub lock_id: String,

    /// Lease length in seconds (default: `default_lease_secs`).
    #[arg(long, value_name = "SECS")]
    pub lease_duration: Option<u64>,

    /// Give up after this many seconds; 0 waits indefinitely.
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub wait_time: u64,

    /// Fail at once if the lock is held.
    #[arg(long)]
    pub no_wait: bool,

    /// Owner recorded on the lease (default: user@host).
    #[arg(long)]
    pub owner: Option<String>,

    /// Seconds past expiration before an expired lease may be taken over.
    #[arg(long, value_name = "SECS")]
    pub reclaim_grace: Option<u64>,
}

/// Arguments for the `release` command.
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    #[arg(long)]
    pub lock_id: String,

    /// Owner the lease was acquired under (default: user@host).
    #[arg(long)]
    pub owner: Option<String>,
}

/// Arguments for the `locked` command.
#[derive(Args, Debug)]
pub struct LockedArgs {
    #[arg(long)]
    pub lock_id: String,
}

/// Arguments for the `find` command.
#[derive(Args, Debug)]
pub struct FindArgs {
    /// Glob over lock ids, e.g. `job-*`.
    pub pattern: String,
}

/// Signal subcommands.
#[derive(Args, Debug)]
pub struct SignalCommand {
    #[command(subcommand)]
    pub action: SignalAction,
}

#[derive(Subcommand, Debug)]
pub enum SignalAction {
    /// Raise a signal on a held lock.
    Add(SignalArgs),

    /// Print `true` if the signal is raised.
    Has(SignalArgs),

    /// Clear a signal.
    Remove(SignalArgs),
}

#[derive(Args, Debug)]
pub struct SignalArgs {
    #[arg(long)]
    pub lock_id: String,

    /// Signal name (case-insensitive).
    pub signal: String,
}

/// Arguments for the `maintain` command.
#[derive(Args, Debug)]
pub struct MaintainArgs {
    /// Time budget in milliseconds (default: `maintenance_timeout_ms`).
    #[arg(long, value_name = "MS")]
    pub budget_ms: Option<u64>,
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (default: `bind`).
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (default: `port`).
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for the state dump (default: `data_dir`).
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Accept the `SHUTDOWN` command.
    #[arg(long)]
    pub shutdown_support: bool,

    /// Start empty instead of restoring the last dump.
    #[arg(long)]
    pub disable_dump_load: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
