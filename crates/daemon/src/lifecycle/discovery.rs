// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Is a daemon running here? Signal-0 probes and stale-file recovery.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::info;

use super::pidfile::is_locked;
use super::statefile::load_state;
use super::statefile::remove_state;
use super::StateDir;

/// Signal-0 probe. `EPERM` means the pid exists but belongs to someone
/// else, which still counts as alive.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw == 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// A daemon is running when the PID file is locked, or the state file
/// names a live pid.
pub fn is_running(state_dir: &StateDir) -> bool {
    if is_locked(&state_dir.pid_path()) {
        return true;
    }
    match load_state(&state_dir.state_path()) {
        Ok(Some(state)) => pid_alive(state.pid),
        _ => false,
    }
}

/// Remove pid/state files left behind by a crashed daemon. The log file is
/// never touched.
pub fn recover_stale(state_dir: &StateDir) {
    if is_locked(&state_dir.pid_path()) {
        return;
    }

    let state_alive = match load_state(&state_dir.state_path()) {
        Ok(Some(state)) => pid_alive(state.pid),
        Ok(None) => return,
        // A corrupt state file without a lock is stale by definition.
        Err(_) => false,
    };
    if state_alive {
        return;
    }

    info!(dir = %state_dir.root().display(), "removing stale daemon files");
    remove_state(&state_dir.state_path());
    let _ = std::fs::remove_file(state_dir.pid_path());
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
