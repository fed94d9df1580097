// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end specs driving the `prox` binary.

use std::path::Path;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use serial_test::serial;

const CONFIG: &str = r#"
[processes.sleeper]
command = "sleep 30"

[api]
host = "127.0.0.1"
port = 0
auth = false
"#;

fn write_config(dir: &Path) {
    std::fs::write(dir.join("prox.toml"), CONFIG).unwrap();
}

fn prox(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("prox").unwrap();
    cmd.current_dir(dir);
    cmd
}

fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn state_path(dir: &Path) -> std::path::PathBuf {
    dir.join(".prox").join("prox.state")
}

/// Best-effort teardown so a failing assertion does not leak a daemon.
fn shutdown_daemon(dir: &Path) {
    let _ = prox(dir).arg("down").output();
    let state = state_path(dir);
    wait_for("daemon to exit", || !state.exists());
}

#[test]
#[serial(daemon)]
fn daemon_runs_a_single_instance_per_directory() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path());

    let first = prox(tmp.path()).args(["up", "--detach"]).output().unwrap();
    assert!(first.status.success());
    let stdout = String::from_utf8_lossy(&first.stdout);
    assert!(stdout.contains("started (pid"), "stdout: {stdout}");

    wait_for("state file", || state_path(tmp.path()).exists());

    // A second detach in the same directory must refuse to start.
    let second = prox(tmp.path()).args(["up", "--detach"]).output().unwrap();
    assert!(!second.status.success());
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("already running"), "stderr: {stderr}");

    shutdown_daemon(tmp.path());
}

#[test]
#[serial(daemon)]
fn detached_daemon_supervises_and_shuts_down_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path());

    prox(tmp.path()).args(["up", "--detach"]).assert().success();
    wait_for("state file", || state_path(tmp.path()).exists());

    // The state file names the daemon and its API endpoint.
    let state: serde_json::Value =
        serde_json::from_slice(&std::fs::read(state_path(tmp.path())).unwrap()).unwrap();
    assert!(state["pid"].as_u64().unwrap() > 0);
    assert!(state["port"].as_u64().unwrap() > 0);
    assert_eq!(state["host"], "127.0.0.1");

    // The configured process comes up automatically.
    wait_for("sleeper to run", || {
        let output = prox(tmp.path()).arg("ps").output().unwrap();
        String::from_utf8_lossy(&output.stdout).contains("running")
    });

    let ps = prox(tmp.path()).arg("ps").output().unwrap();
    let stdout = String::from_utf8_lossy(&ps.stdout);
    assert!(stdout.contains("sleeper"), "stdout: {stdout}");

    // Stop and restart one process through the API.
    prox(tmp.path()).args(["stop", "sleeper"]).assert().success();
    prox(tmp.path()).args(["start", "sleeper"]).assert().success();

    // Logs include the supervisor's own lines.
    let logs = prox(tmp.path()).arg("logs").output().unwrap();
    let stdout = String::from_utf8_lossy(&logs.stdout);
    assert!(stdout.contains("started sleeper"), "stdout: {stdout}");

    prox(tmp.path()).arg("down").assert().success();
    wait_for("daemon to exit", || !state_path(tmp.path()).exists());
    assert!(!tmp.path().join(".prox/prox.pid").exists());
    // The daemon log survives shutdown.
    assert!(tmp.path().join(".prox/prox.log").exists());
}

#[test]
#[serial(daemon)]
fn commands_fail_cleanly_without_a_daemon() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path());

    let output = prox(tmp.path()).arg("status").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no daemon running"), "stderr: {stderr}");
}
