//! Implementation of the `leasehold serve` command.

use super::system_clock;
use crate::cli::ServeArgs;
use crate::config::Config;
use crate::error::Result;
use crate::server::{LockServer, ServerSettings};
use crate::store::MemoryLeaseStore;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Apply `serve` flags on top of the resolved config.
pub(crate) fn server_config(config: &Config, args: &ServeArgs) -> Config {
    let mut config = config.clone();
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.to_string_lossy().to_string();
    }
    config.shutdown_support |= args.shutdown_support;
    config.disable_dump_load |= args.disable_dump_load;
    config
}

/// Run the lock server in the foreground until it is shut down.
pub fn cmd_serve(config: &Config, args: ServeArgs) -> Result<()> {
    let config = server_config(config, &args);
    config.validate()?;

    let clock = system_clock();
    let data_dir = PathBuf::from(&config.data_dir);
    let store = MemoryLeaseStore::new(clock.clone())
        .with_reclaim_grace(Duration::from_secs(config.reclaim_grace_secs))
        .with_data_dir(&data_dir);

    let server = LockServer::new(store, clock, ServerSettings::from(&config))?;
    let listener = server.bind()?;
    info!(data_dir = %data_dir.display(), "starting lock server");
    server.serve(listener)
}
