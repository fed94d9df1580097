// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: the per-working-directory state dir, PID-file lock,
//! state file, process discovery, and the detach protocol.

mod detach_impl;
mod discovery;
mod pidfile;
mod statefile;

pub use detach_impl::{detach, redirect_stdio, should_run_as_daemon, DAEMON_ENV_MARKER};
pub use discovery::{is_running, pid_alive, recover_stale};
pub use pidfile::{is_locked, PidFile};
pub use statefile::{load_state, new_state, remove_state, write_state};

use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("daemon already running (lock held on {0})")]
    AlreadyRunning(PathBuf),

    #[error("failed to lock {0}: {1}")]
    Lock(PathBuf, #[source] std::io::Error),

    #[error("failed to write state file {0}: {1}")]
    StateWrite(PathBuf, #[source] std::io::Error),

    #[error("state file {0} is corrupt: {1}")]
    StateParse(PathBuf, #[source] serde_json::Error),

    #[error("failed to re-exec for detach: {0}")]
    Detach(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The dotted per-working-directory state directory (`.prox/`).
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// `<base>/.prox`
    pub fn new(base: &Path) -> Self {
        Self { root: base.join(".prox") }
    }

    /// Create the directory with `0700` if missing.
    pub fn ensure(&self) -> Result<(), LifecycleError> {
        match std::fs::DirBuilder::new().recursive(true).mode(0o700).create(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join("prox.pid")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("prox.state")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("prox.log")
    }

    pub fn captures_dir(&self) -> PathBuf {
        self.root.join("captures")
    }
}
