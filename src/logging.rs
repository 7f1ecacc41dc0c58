//! Structured logging with tracing.
//!
//! Everything goes to stderr so stdout stays reserved for command output
//! (lease ids, `true`/`false`, `find` rows). `LEASEHOLD_LOG` takes any
//! `EnvFilter` directive and wins over the verbosity flag.

use crate::error::{LeaseError, Result};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a filter directive, e.g. `leasehold=trace`.
pub const LOG_ENV: &str = "LEASEHOLD_LOG";

/// Default level for a given `-v` count.
pub fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Parse a level name.
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(LeaseError::Config(format!(
            "invalid log level '{}': use trace, debug, info, warn, or error",
            level
        ))),
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(default_level: Level) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_lowercase()));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
