//! Basic CLI E2E tests.
//!
//! Each test runs the built binary with `HOME` pointed at a fresh temporary
//! directory, so config and store files never touch the real user profile.

use std::process::Command;

/// Run a CLI command under `home` and return (code, stdout, stderr).
fn run_cli(home: &std::path::Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_mysterybox"))
        .args(args)
        .env("HOME", home)
        .env_remove("MYSTERYBOX_ENV")
        .env_remove("MYSTERYBOX_DAPP_DEFINITION_ADDRESS")
        .env("MYSTERYBOX_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

#[test]
fn test_streak_visit_and_show() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(home.path(), &["streak", "show"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "Streak: 0");

    let (code, stdout, _) = run_cli(home.path(), &["streak", "visit"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "Streak: 1");

    let (_, stdout, _) = run_cli(home.path(), &["streak", "visit"]);
    assert_eq!(stdout.trim(), "Streak: 1", "same-day visit is idempotent");
}

#[test]
fn test_box_open_requires_account() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["box", "open"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Connect wallet first"), "{stderr}");
}

#[test]
fn test_box_open_offline_is_queued() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(
        home.path(),
        &["config", "set", "mint.endpoint", "http://127.0.0.1:9/api/mint"],
    );
    assert_eq!(code, 0);

    let (code, stdout, stderr) = run_cli(
        home.path(),
        &["box", "open", "--account", "account_tdx_2_1qexample"],
    );
    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.contains("Queued offline (will sync)"), "{stdout}");

    let (code, stdout, _) = run_cli(home.path(), &["queue", "list"]);
    assert_eq!(code, 0);
    let pending: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(pending.as_array().map(Vec::len), Some(1));
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(home.path(), &["config", "get", "polling.interval_ms"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5000");

    let (code, _, _) = run_cli(home.path(), &["config", "set", "polling.interval_ms", "2500"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "polling.interval_ms"]);
    assert_eq!(stdout.trim(), "2500");

    let (code, _, _) = run_cli(home.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
}

#[test]
fn test_dapp_definition() {
    let home = tempfile::tempdir().unwrap();

    let (_, stdout, _) = run_cli(home.path(), &["dapp", "get"]);
    assert_eq!(stdout.trim(), "(not set)");

    let (code, _, _) = run_cli(home.path(), &["dapp", "set", "resource_tdx_2_1abc"]);
    assert_eq!(code, 1);

    let (code, _, _) = run_cli(home.path(), &["dapp", "set", "account_tdx_2_1dapp"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["dapp", "get"]);
    assert_eq!(stdout.trim(), "account_tdx_2_1dapp");
}

#[test]
fn test_balance_rejects_wrong_network() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["balance", "get", "--account", "account_rdx1mainnet"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not on the expected network"), "{stderr}");
}

#[test]
fn test_config_rejects_unusable_values() {
    let home = tempfile::tempdir().unwrap();

    let (code, _, _) = run_cli(home.path(), &["config", "set", "mint.retention_hours", "9999999999999"]);
    assert_eq!(code, 1);
    let (code, _, _) = run_cli(home.path(), &["config", "set", "mint.endpoint", "ftp://localhost/api/mint"]);
    assert_eq!(code, 1);

    let (code, stdout, stderr) = run_cli(home.path(), &["queue", "list"]);
    assert_eq!(code, 0, "{stderr}");
    assert_eq!(stdout.trim(), "[]");
}
