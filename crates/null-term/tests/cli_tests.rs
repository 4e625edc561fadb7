mod common;

use common::{null_term_cmd, TestHost, WAIT_TIMEOUT};
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    null_term_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("host"))
        .stdout(predicate::str::contains("panel"))
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("::tab N"));
}

#[test]
fn test_sessions_without_host_fails_with_suggestion() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("missing.sock");

    null_term_cmd()
        .args(["sessions", "--socket"])
        .arg(&socket)
        .assert()
        .code(74)
        .stderr(predicate::str::contains("Host not running"))
        .stderr(predicate::str::contains("null-term host"));
}

#[test]
fn test_panel_without_autostart_fails_when_host_missing() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("missing.sock");

    null_term_cmd()
        .args(["panel", "--no-autostart", "--socket"])
        .arg(&socket)
        .timeout(WAIT_TIMEOUT)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Host not running"));
}

#[test]
fn test_unknown_spawn_mode_is_a_usage_error() {
    null_term_cmd()
        .args(["host", "--spawn-mode", "telepathy"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown spawn mode"));
}

#[test]
fn test_sessions_lists_empty_host() {
    let host = TestHost::start();

    null_term_cmd()
        .args(["sessions", "--socket"])
        .arg(host.socket())
        .timeout(WAIT_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions"));

    null_term_cmd()
        .args(["sessions", "--json", "--socket"])
        .arg(host.socket())
        .timeout(WAIT_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sessions\": []"));
}

#[test]
fn test_sessions_shows_live_shell() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let host = TestHost::start();
    let (mut manager, _surfaces) = runtime.block_on(host.manager());
    let id = runtime.block_on(manager.create_session());

    null_term_cmd()
        .args(["sessions", "--socket"])
        .arg(host.socket())
        .timeout(WAIT_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("/bin/sh"));

    runtime.block_on(manager.close_all());
}

#[test]
fn test_panel_runs_a_command_and_quits() {
    let host = TestHost::start();

    null_term_cmd()
        .args(["panel", "--no-autostart", "--socket"])
        .arg(host.socket())
        .write_stdin("echo $((20+22))\n::tabs\n::quit\n")
        .timeout(WAIT_TIMEOUT)
        .assert()
        .success()
        .stderr(predicate::str::contains("1. Terminal 1"));

    assert!(host.handle.server().registry().is_empty());
}
