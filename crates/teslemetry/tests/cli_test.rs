//! Integration tests for the `teslemetry` CLI binary.
//!
//! Argument parsing, help output, completions, config round trips and
//! credential errors, all without a live Teslemetry account.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `teslemetry` binary with env isolation.
///
/// Clears all `TESLEMETRY_*` env vars and points config directories at
/// `home` so tests never touch the user's real configuration.
fn teslemetry_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("teslemetry");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env_remove("TESLEMETRY_PROFILE")
        .env_remove("TESLEMETRY_ACCESS_TOKEN")
        .env_remove("TESLEMETRY_OUTPUT")
        .env_remove("TESLEMETRY_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = teslemetry_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("status")
                .and(predicate::str::contains("watch"))
                .and(predicate::str::contains("command"))
                .and(predicate::str::contains("wake"))
                .and(predicate::str::contains("energy")),
        );
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_charge_limit_out_of_range() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["command", "5YJ3E1EA7KF000001", "charge-limit", "20"])
        .assert()
        .code(2);
}

#[test]
fn test_vehicle_actions_exist() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["command", "VIN", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("charge-start")
                .and(predicate::str::contains("climate"))
                .and(predicate::str::contains("navigate"))
                .and(predicate::str::contains("speed-limit")),
        );
}

// ── Credentials ─────────────────────────────────────────────────────

#[test]
fn test_status_without_token_fails() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["--profile", "cli-test-no-token", "status"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("cli-test-no-token"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_then_show() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["--profile", "garage", "config", "set", "vehicle_interval", "60"])
        .assert()
        .success();

    teslemetry_cmd(home.path())
        .args(["--output", "json", "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("garage").and(predicate::str::contains("\"vehicle_interval\": 60")),
        );
}

#[test]
fn test_config_set_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["config", "set", "colour", "red"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown config key"));
}

#[test]
fn test_config_use_missing_profile() {
    let home = tempfile::tempdir().unwrap();
    teslemetry_cmd(home.path())
        .args(["config", "use", "nowhere"])
        .assert()
        .code(4);
}
