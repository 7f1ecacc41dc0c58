//! Tests for config functionality.

use crate::config::{CONFIG_FILE_NAME, Config};
use crate::error::LeaseError;
use crate::test_support::{DirGuard, EnvGuard};
use serial_test::serial;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.store_dir, ".leasehold");
    assert_eq!(config.data_dir, ".");
    assert_eq!(config.bind, "127.0.0.1");
    assert_eq!(config.port, 7873);
    assert_eq!(config.release_all_timeout_secs, 5);
    assert_eq!(config.reclaim_grace_secs, 5);
    assert_eq!(config.default_lease_secs, 60);
    assert_eq!(config.session_lease_secs, 86_400);
    assert_eq!(config.initial_backoff_secs, 1);
    assert_eq!(config.max_backoff_secs, 300);
    assert_eq!(config.maintenance_period_secs, 1);
    assert_eq!(config.maintenance_timeout_ms, 100);
    assert_eq!(config.guard_stale_secs, 30);
    assert!(!config.disable_dump_load);
    assert!(!config.shutdown_support);
    assert_eq!(config.max_line_bytes, 4096);
    assert_eq!(config.tcp_keepalive_time_secs, 30);
    assert_eq!(config.tcp_keepalive_interval_secs, 10);
    assert_eq!(config.tcp_keepalive_probes, 3);
    assert_eq!(config.tcp_user_timeout_secs, 60);
    assert_eq!(config.idle_timeout_secs, 0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_empty_yaml() {
    assert_eq!(Config::from_yaml("").unwrap(), Config::default());
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
port: 9000
shutdown_support: true
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.port, 9000);
    assert!(config.shutdown_support);
    assert_eq!(config.bind, "127.0.0.1");
    assert_eq!(config.max_backoff_secs, 300);
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = r#"
store_dir: /var/lib/leasehold
future_option: 42
nested:
  key: value
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.store_dir, "/var/lib/leasehold");
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let result = Config::from_yaml("port: [not, a, number]");
    assert!(matches!(result, Err(LeaseError::Config(_))));
}

#[test]
fn test_zero_values_rejected() {
    for yaml in [
        "port: 0",
        "default_lease_secs: 0",
        "release_all_timeout_secs: 0",
        "maintenance_timeout_ms: 0",
        "max_line_bytes: 0",
    ] {
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(
            err.to_string().contains("must be greater than 0"),
            "{}: {}",
            yaml,
            err
        );
    }
}

#[test]
fn test_unrepresentable_durations_rejected() {
    for yaml in [
        "default_lease_secs: 99999999999999",
        "session_lease_secs: 99999999999999",
        "release_all_timeout_secs: 18446744073709551615",
    ] {
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{}: {}", yaml, err);
        assert_eq!(err.exit_code(), crate::exit_codes::VALIDATION_FAILURE);
    }
}

#[test]
fn test_keepalive_settings_validated() {
    assert!(Config::from_yaml("tcp_keepalive_probes: 0").is_err());
    assert!(Config::from_yaml("tcp_keepalive_interval_secs: 0").is_err());

    let disabled =
        Config::from_yaml("tcp_keepalive_time_secs: 0\ntcp_keepalive_probes: 0").unwrap();
    assert_eq!(disabled.tcp_keepalive_time_secs, 0);
}

#[test]
fn test_backoff_order_validated() {
    let err = Config::from_yaml("initial_backoff_secs: 10\nmax_backoff_secs: 5").unwrap_err();
    assert!(err.to_string().contains("exceeds max_backoff_secs"));
    assert_eq!(err.exit_code(), crate::exit_codes::VALIDATION_FAILURE);
}

#[test]
fn test_yaml_round_trip_keeps_values() {
    let config = Config {
        port: 1234,
        data_dir: "/tmp/dumps".to_string(),
        ..Config::default()
    };
    let parsed = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_env_overrides_apply() {
    let mut config = Config::default();
    config
        .apply_env(env(&[
            ("LEASEHOLD_PORT", "8000"),
            ("LEASEHOLD_STORE_DIR", "/srv/locks"),
            ("LEASEHOLD_SHUTDOWN_SUPPORT", "true"),
            ("LEASEHOLD_MAINTENANCE_TIMEOUT_MS", " 250 "),
            ("LEASEHOLD_IDLE_TIMEOUT_SECS", "600"),
            ("LEASEHOLD_TCP_KEEPALIVE_PROBES", "5"),
        ]))
        .unwrap();

    assert_eq!(config.port, 8000);
    assert_eq!(config.store_dir, "/srv/locks");
    assert!(config.shutdown_support);
    assert_eq!(config.maintenance_timeout_ms, 250);
    assert_eq!(config.idle_timeout_secs, 600);
    assert_eq!(config.tcp_keepalive_probes, 5);
}

#[test]
fn test_env_override_parse_error_names_variable() {
    let mut config = Config::default();
    let err = config
        .apply_env(env(&[("LEASEHOLD_PORT", "seventy")]))
        .unwrap_err();

    assert!(matches!(err, LeaseError::Config(_)));
    assert!(err.to_string().contains("LEASEHOLD_PORT"));
}

#[test]
fn test_load_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    let result = Config::load(temp.path().join("missing.yaml"));
    assert!(matches!(result, Err(LeaseError::Config(_))));
}

#[test]
#[serial]
fn test_resolve_picks_up_working_directory_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(CONFIG_FILE_NAME), "port: 7000\n").unwrap();

    let _guard = DirGuard::new(temp.path());
    let config = Config::resolve(None).unwrap();
    assert_eq!(config.port, 7000);
}

#[test]
#[serial]
fn test_resolve_applies_process_env() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.yaml");
    std::fs::write(&path, "port: 7000\nbind: 0.0.0.0\n").unwrap();

    let _guard = EnvGuard::set(&[("LEASEHOLD_PORT", "7100")]);
    let config = Config::resolve(Some(Path::new(&path))).unwrap();

    assert_eq!(config.port, 7100);
    assert_eq!(config.bind, "0.0.0.0");
}

#[test]
#[serial]
fn test_resolve_rejects_invalid_env_combination() {
    let _guard = EnvGuard::set(&[
        ("LEASEHOLD_INITIAL_BACKOFF_SECS", "600"),
        ("LEASEHOLD_MAX_BACKOFF_SECS", "300"),
    ]);
    assert!(matches!(
        Config::resolve(Some(Path::new("/nonexistent/leasehold.yaml"))),
        Err(LeaseError::Config(_))
    ));

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ok.yaml");
    std::fs::write(&path, "").unwrap();
    assert!(matches!(
        Config::resolve(Some(&path)),
        Err(LeaseError::Config(_))
    ));
}
