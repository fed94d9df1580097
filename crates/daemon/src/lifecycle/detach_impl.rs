// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detach protocol: re-exec the same binary with a marker environment
//! variable, new session, stdio detached. The child recognizes the marker
//! and redirects its stdio into the daemon log file.

use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::LifecycleError;

/// Set in the re-exec'd child so it runs the daemon loop instead of
/// detaching again.
pub const DAEMON_ENV_MARKER: &str = "_PROX_DAEMON";

/// True when this process is the re-exec'd daemon child.
pub fn should_run_as_daemon() -> bool {
    std::env::var_os(DAEMON_ENV_MARKER).is_some()
}

/// Re-exec the current binary with the identical argument vector, marker
/// set, in a fresh session with detached stdio. Returns the child pid;
/// the caller prints `started (pid ...)` and exits 0.
#[allow(unsafe_code)]
pub fn detach() -> Result<u32, LifecycleError> {
    let exe = std::env::current_exe().map_err(LifecycleError::Detach)?;
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();

    let mut command = Command::new(exe);
    command
        .args(args)
        .env(DAEMON_ENV_MARKER, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // A fresh session divorces the daemon from the controlling terminal.
    // SAFETY: setsid is async-signal-safe and allocates nothing.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let child = command.spawn().map_err(LifecycleError::Detach)?;
    debug!(pid = child.id(), "daemon detached");
    Ok(child.id())
}

/// Point stdout/stderr at the daemon log (append, `0600`) and stdin at
/// `/dev/null`. Called by the child before anything logs.
pub fn redirect_stdio(log_path: &Path) -> Result<(), LifecycleError> {
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(log_path)?;
    let null = std::fs::OpenOptions::new().read(true).open("/dev/null")?;

    nix::unistd::dup2(null.as_raw_fd(), 0).map_err(std::io::Error::from)?;
    nix::unistd::dup2(log.as_raw_fd(), 1).map_err(std::io::Error::from)?;
    nix::unistd::dup2(log.as_raw_fd(), 2).map_err(std::io::Error::from)?;
    Ok(())
}
