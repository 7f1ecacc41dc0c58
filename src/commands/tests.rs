//! Tests for command handlers against a temporary store directory.

use super::serve::server_config;
use super::*;
use crate::cli::{
    AcquireArgs, FindArgs, LockedArgs, MaintainArgs, ReleaseArgs, ServeArgs, SignalAction,
    SignalArgs, SignalCommand,
};
use crate::exit_codes;
use serial_test::serial;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> Config {
    Config {
        store_dir: dir.path().join("store").to_string_lossy().to_string(),
        ..Config::default()
    }
}

fn acquire_args(lock_id: &str, owner: &str) -> AcquireArgs {
    AcquireArgs {
        lock_id: lock_id.to_string(),
        lease_duration: Some(600),
        wait_time: 0,
        no_wait: true,
        owner: Some(owner.to_string()),
        reclaim_grace: None,
    }
}

fn run<F>(f: F) -> (Result<()>, String)
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut buf = Vec::new();
    let result = f(&mut buf);
    (result, String::from_utf8(buf).unwrap())
}

fn signal(action: fn(SignalArgs) -> SignalAction, lock_id: &str, name: &str) -> SignalCommand {
    SignalCommand {
        action: action(SignalArgs {
            lock_id: lock_id.to_string(),
            signal: name.to_string(),
        }),
    }
}

#[test]
fn acquire_prints_lease_id() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let (result, output) = run(|out| cmd_acquire(&config, acquire_args("job-7", "A"), out));

    result.unwrap();
    let lease_id = output.trim();
    assert_eq!(lease_id.len(), 36);
    assert!(dir.path().join("store").is_dir());
}

#[test]
fn acquire_held_lock_is_silent_exit_three() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    run(|out| cmd_acquire(&config, acquire_args("job-7", "A"), out))
        .0
        .unwrap();

    let (result, output) = run(|out| cmd_acquire(&config, acquire_args("job-7", "B"), out));

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::LOCK_UNAVAILABLE);
    assert!(err.is_silent());
    assert!(output.is_empty());
}

#[test]
fn acquire_with_wait_budget_times_out() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        initial_backoff_secs: 1,
        max_backoff_secs: 1,
        ..config_in(&dir)
    };
    run(|out| cmd_acquire(&config, acquire_args("job-7", "A"), out))
        .0
        .unwrap();

    let args = AcquireArgs {
        no_wait: false,
        wait_time: 1,
        ..acquire_args("job-7", "B")
    };
    let (result, _) = run(|out| cmd_acquire(&config, args, out));

    assert!(matches!(result, Err(LeaseError::Unavailable(_))));
}

#[test]
fn acquire_rejects_no_wait_with_wait_time() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let args = AcquireArgs {
        wait_time: 5,
        ..acquire_args("job-7", "A")
    };

    let (result, output) = run(|out| cmd_acquire(&config, args, out));

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
    assert!(output.is_empty());
    assert!(!dir.path().join("store").exists());
}

#[test]
fn acquire_rejects_unrepresentable_lease_duration() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let args = AcquireArgs {
        lease_duration: Some(99_999_999_999_999),
        ..acquire_args("job-7", "A")
    };

    let (result, output) = run(|out| cmd_acquire(&config, args, out));

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
    assert!(output.is_empty());
    assert!(!dir.path().join("store").exists());
}

#[test]
fn acquire_accepts_a_long_escaped_lock_id() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let lock_id = "Job/".repeat(63);

    let (result, output) = run(|out| cmd_acquire(&config, acquire_args(&lock_id, "A"), out));

    result.unwrap();
    assert_eq!(output.trim().len(), 36);
}

#[test]
fn release_by_owner_frees_the_lock() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    run(|out| cmd_acquire(&config, acquire_args("job-7", "A"), out))
        .0
        .unwrap();

    let (result, _) = run(|out| {
        cmd_release(
            &config,
            ReleaseArgs {
                lock_id: "job-7".to_string(),
                owner: Some("B".to_string()),
            },
            out,
        )
    });
    assert_eq!(
        result.unwrap_err().exit_code(),
        exit_codes::LOCK_UNAVAILABLE
    );

    let (result, _) = run(|out| {
        cmd_release(
            &config,
            ReleaseArgs {
                lock_id: "job-7".to_string(),
                owner: Some("A".to_string()),
            },
            out,
        )
    });
    result.unwrap();

    let (_, output) = run(|out| {
        cmd_locked(
            &config,
            LockedArgs {
                lock_id: "job-7".to_string(),
            },
            out,
        )
    });
    assert_eq!(output, "false\n");
}

#[test]
fn locked_prints_true_while_held() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    run(|out| cmd_acquire(&config, acquire_args("job-7", "A"), out))
        .0
        .unwrap();

    let (result, output) = run(|out| {
        cmd_locked(
            &config,
            LockedArgs {
                lock_id: "job-7".to_string(),
            },
            out,
        )
    });

    result.unwrap();
    assert_eq!(output, "true\n");
}

#[test]
fn find_lists_matching_locks() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    for id in ["job-1", "job-2", "other"] {
        run(|out| cmd_acquire(&config, acquire_args(id, "A"), out))
            .0
            .unwrap();
    }

    let (result, output) = run(|out| {
        cmd_find(
            &config,
            FindArgs {
                pattern: "job-*".to_string(),
            },
            out,
        )
    });

    result.unwrap();
    let ids: Vec<&str> = output
        .lines()
        .map(|line| line.split('\t').next().unwrap())
        .collect();
    assert_eq!(ids, vec!["job-1", "job-2"]);
    assert!(output.lines().all(|line| line.ends_with('Z')));
}

#[test]
fn find_with_bad_pattern_is_validation_error() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let (result, _) = run(|out| {
        cmd_find(
            &config,
            FindArgs {
                pattern: "job-[".to_string(),
            },
            out,
        )
    });

    assert_eq!(
        result.unwrap_err().exit_code(),
        exit_codes::VALIDATION_FAILURE
    );
}

#[test]
fn signal_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let (result, _) = run(|out| cmd_signal(&config, signal(SignalAction::Add, "job-7", "drain"), out));
    assert!(matches!(result, Err(LeaseError::Unavailable(_))));

    run(|out| cmd_acquire(&config, acquire_args("job-7", "A"), out))
        .0
        .unwrap();
    run(|out| cmd_signal(&config, signal(SignalAction::Add, "job-7", "Drain"), out))
        .0
        .unwrap();

    let (_, output) =
        run(|out| cmd_signal(&config, signal(SignalAction::Has, "job-7", "drain"), out));
    assert_eq!(output, "true\n");

    run(|out| cmd_signal(&config, signal(SignalAction::Remove, "job-7", "drain"), out))
        .0
        .unwrap();
    run(|out| cmd_signal(&config, signal(SignalAction::Remove, "job-7", "drain"), out))
        .0
        .unwrap();

    let (_, output) =
        run(|out| cmd_signal(&config, signal(SignalAction::Has, "job-7", "drain"), out));
    assert_eq!(output, "false\n");
}

#[test]
fn maintain_reports_purged_count() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let (result, output) = run(|out| cmd_maintain(&config, MaintainArgs { budget_ms: None }, out));

    result.unwrap();
    assert_eq!(output, "purged 0\n");
}

#[test]
fn serve_flags_override_config() {
    let config = Config::default();
    let args = ServeArgs {
        bind: Some("0.0.0.0".to_string()),
        port: Some(9001),
        data_dir: Some("/var/lib/leasehold".into()),
        shutdown_support: true,
        disable_dump_load: false,
    };

    let merged = server_config(&config, &args);

    assert_eq!(merged.bind, "0.0.0.0");
    assert_eq!(merged.port, 9001);
    assert_eq!(merged.data_dir, "/var/lib/leasehold");
    assert!(merged.shutdown_support);
    assert!(!merged.disable_dump_load);
    assert_eq!(merged.store_dir, config.store_dir);
}

#[test]
#[serial]
fn store_flag_overrides_config_dir() {
    use clap::Parser;

    let dir = TempDir::new().unwrap();
    let store = dir.path().join("elsewhere");
    let cli = Cli::try_parse_from([
        "leasehold",
        "--store",
        store.to_str().unwrap(),
        "--config",
        dir.path().join("none.yaml").to_str().unwrap(),
        "locked",
        "--lock-id",
        "job-7",
    ])
    .unwrap();

    // Missing explicit config file is an error.
    assert!(matches!(resolve_config(&cli), Err(LeaseError::Config(_))));

    std::fs::write(dir.path().join("none.yaml"), "store_dir: ignored\n").unwrap();
    let config = resolve_config(&cli).unwrap();
    assert_eq!(config.store_dir, store.to_string_lossy());
}
