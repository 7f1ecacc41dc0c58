//! Config loading, environment overrides, and validation.

use super::model::Config;
use crate::error::{LeaseError, Result};
use crate::lease::MAX_LEASE_SECS;
use std::path::Path;
use std::str::FromStr;

/// Prefix of environment overrides, e.g. `LEASEHOLD_PORT`.
pub const ENV_PREFIX: &str = "LEASEHOLD_";

/// Config file picked up from the working directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "leasehold.yaml";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields are ignored. The result is validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LeaseError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LeaseError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LeaseError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Resolve the effective config for a process.
    ///
    /// An explicit `path` must exist. Without one, `leasehold.yaml` in the
    /// working directory is used when present. Environment overrides apply
    /// on top either way.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE_NAME).is_file() => Self::load(CONFIG_FILE_NAME)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LEASEHOLD_<FIELD>` overrides found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| lookup(&format!("{}{}", ENV_PREFIX, field.to_uppercase()));

        if let Some(value) = get("store_dir") {
            self.store_dir = value;
        }
        if let Some(value) = get("data_dir") {
            self.data_dir = value;
        }
        if let Some(value) = get("bind") {
            self.bind = value;
        }

        override_parsed(&get, "guard_stale_secs", &mut self.guard_stale_secs)?;
        override_parsed(&get, "default_lease_secs", &mut self.default_lease_secs)?;
        override_parsed(&get, "reclaim_grace_secs", &mut self.reclaim_grace_secs)?;
        override_parsed(&get, "initial_backoff_secs", &mut self.initial_backoff_secs)?;
        override_parsed(&get, "max_backoff_secs", &mut self.max_backoff_secs)?;
        override_parsed(&get, "port", &mut self.port)?;
        override_parsed(
            &get,
            "release_all_timeout_secs",
            &mut self.release_all_timeout_secs,
        )?;
        override_parsed(&get, "session_lease_secs", &mut self.session_lease_secs)?;
        override_parsed(
            &get,
            "maintenance_period_secs",
            &mut self.maintenance_period_secs,
        )?;
        override_parsed(&get, "maintenance_timeout_ms", &mut self.maintenance_timeout_ms)?;
        override_parsed(&get, "disable_dump_load", &mut self.disable_dump_load)?;
        override_parsed(&get, "shutdown_support", &mut self.shutdown_support)?;
        override_parsed(&get, "max_line_bytes", &mut self.max_line_bytes)?;
        override_parsed(
            &get,
            "tcp_keepalive_time_secs",
            &mut self.tcp_keepalive_time_secs,
        )?;
        override_parsed(
            &get,
            "tcp_keepalive_interval_secs",
            &mut self.tcp_keepalive_interval_secs,
        )?;
        override_parsed(&get, "tcp_keepalive_probes", &mut self.tcp_keepalive_probes)?;
        override_parsed(&get, "tcp_user_timeout_secs", &mut self.tcp_user_timeout_secs)?;
        override_parsed(&get, "idle_timeout_secs", &mut self.idle_timeout_secs)?;
        Ok(())
    }

    /// Validate config values.
    ///
    /// - timeouts, lease durations, and the port must be non-zero
    /// - lease durations and the release-all timeout must fit a timestamp
    /// - keepalive needs a non-zero interval and probe count when enabled
    /// - `initial_backoff_secs` must not exceed `max_backoff_secs`
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("guard_stale_secs", self.guard_stale_secs),
            ("default_lease_secs", self.default_lease_secs),
            ("initial_backoff_secs", self.initial_backoff_secs),
            ("max_backoff_secs", self.max_backoff_secs),
            ("port", u64::from(self.port)),
            ("release_all_timeout_secs", self.release_all_timeout_secs),
            ("session_lease_secs", self.session_lease_secs),
            ("maintenance_period_secs", self.maintenance_period_secs),
            ("maintenance_timeout_ms", self.maintenance_timeout_ms),
            ("max_line_bytes", self.max_line_bytes as u64),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(LeaseError::Config(format!(
                    "config validation failed: {} must be greater than 0",
                    field
                )));
            }
        }

        let bounded = [
            ("default_lease_secs", self.default_lease_secs),
            ("session_lease_secs", self.session_lease_secs),
            ("release_all_timeout_secs", self.release_all_timeout_secs),
        ];
        for (field, value) in bounded {
            if value > MAX_LEASE_SECS {
                return Err(LeaseError::Config(format!(
                    "config validation failed: {} ({}) exceeds {}",
                    field, value, MAX_LEASE_SECS
                )));
            }
        }

        if self.tcp_keepalive_time_secs > 0
            && (self.tcp_keepalive_interval_secs == 0 || self.tcp_keepalive_probes == 0)
        {
            return Err(LeaseError::Config(
                "config validation failed: tcp_keepalive_interval_secs and tcp_keepalive_probes must be greater than 0 when keepalive is enabled".to_string(),
            ));
        }

        if self.initial_backoff_secs > self.max_backoff_secs {
            return Err(LeaseError::Config(format!(
                "config validation failed: initial_backoff_secs ({}) exceeds max_backoff_secs ({})",
                self.initial_backoff_secs, self.max_backoff_secs
            )));
        }

        if self.store_dir.trim().is_empty() {
            return Err(LeaseError::Config(
                "config validation failed: store_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn override_parsed<T, G>(get: &G, field: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(field) else {
        return Ok(());
    };

    *target = raw.trim().parse().map_err(|e: T::Err| {
        LeaseError::Config(format!(
            "invalid value '{}' for {}{}: {}",
            raw,
            ENV_PREFIX,
            field.to_uppercase(),
            e
        ))
    })?;
    Ok(())
}
