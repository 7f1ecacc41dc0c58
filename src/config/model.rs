//! Config struct definition and default implementation.

use serde::{Deserialize, Serialize};

/// Configuration shared by the CLI and the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Storage
    // =========================================================================
    /// Root of the file lease store used by the CLI.
    pub store_dir: String,

    /// Directory the server writes its dump file into.
    pub data_dir: String,

    /// Seconds after which an abandoned record guard may be broken.
    pub guard_stale_secs: u64,

    // =========================================================================
    // Leases
    // =========================================================================
    /// Lease length for `acquire` without `--lease-duration`.
    pub default_lease_secs: u64,

    /// Extra seconds past expiration before an expired lease may be reclaimed.
    pub reclaim_grace_secs: u64,

    /// First retry delay of the acquire loop.
    pub initial_backoff_secs: u64,

    /// Cap on the acquire loop's retry delay.
    pub max_backoff_secs: u64,

    // =========================================================================
    // Server
    // =========================================================================
    pub bind: String,

    pub port: u16,

    /// How long a disconnected client's locks survive before they lapse.
    pub release_all_timeout_secs: u64,

    /// Lease length for `AQ` without an explicit duration.
    pub session_lease_secs: u64,

    pub maintenance_period_secs: u64,

    /// Time budget of one maintenance window.
    pub maintenance_timeout_ms: u64,

    /// Skip restoring the dump on start.
    pub disable_dump_load: bool,

    /// Accept the `SHUTDOWN` command.
    pub shutdown_support: bool,

    /// Longest request line the server accepts.
    pub max_line_bytes: usize,

    // =========================================================================
    // Dead peer detection
    // =========================================================================
    /// Idle seconds before the first TCP keepalive probe; 0 disables keepalive.
    pub tcp_keepalive_time_secs: u64,

    /// Seconds between unanswered keepalive probes.
    pub tcp_keepalive_interval_secs: u64,

    /// Unanswered probes before the kernel drops the connection.
    pub tcp_keepalive_probes: u32,

    /// Seconds sent data may stay unacknowledged (Linux only); 0 keeps the
    /// system default.
    pub tcp_user_timeout_secs: u64,

    /// Close connections that send nothing for this many seconds; 0 never does.
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: ".leasehold".to_string(),
            data_dir: ".".to_string(),
            guard_stale_secs: 30,
            default_lease_secs: 60,
            reclaim_grace_secs: 5,
            initial_backoff_secs: 1,
            max_backoff_secs: 300,
            bind: "127.0.0.1".to_string(),
            port: 7873,
            release_all_timeout_secs: 5,
            session_lease_secs: 86_400,
            maintenance_period_secs: 1,
            maintenance_timeout_ms: 100,
            disable_dump_load: false,
            shutdown_support: false,
            max_line_bytes: 4096,
            tcp_keepalive_time_secs: 30,
            tcp_keepalive_interval_secs: 10,
            tcp_keepalive_probes: 3,
            tcp_user_timeout_secs: 60,
            idle_timeout_secs: 0,
        }
    }
}
