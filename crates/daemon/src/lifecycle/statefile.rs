// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading and writing the published daemon state file.
//!
//! The document shape lives in `prox_core::DaemonState` so clients can
//! decode it without pulling in the daemon.

use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;

use prox_core::DaemonState;

use super::LifecycleError;

/// State for this process, stamped now.
pub fn new_state(host: impl Into<String>, port: u16, config_file: PathBuf) -> DaemonState {
    DaemonState {
        pid: std::process::id(),
        host: host.into(),
        port,
        started_at: Utc::now(),
        config_file,
    }
}

/// Atomic write: temp file (`0600`) in the same directory, then rename.
pub fn write_state(state: &DaemonState, path: &Path) -> Result<(), LifecycleError> {
    let json = serde_json::to_vec_pretty(state)
        .map_err(|e| LifecycleError::StateParse(path.to_path_buf(), e))?;

    let tmp = path.with_extension("state.tmp");
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&tmp)
        .map_err(|e| LifecycleError::StateWrite(tmp.clone(), e))?;
    file.write_all(&json).map_err(|e| LifecycleError::StateWrite(tmp.clone(), e))?;
    file.sync_all().map_err(|e| LifecycleError::StateWrite(tmp.clone(), e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| LifecycleError::StateWrite(path.to_path_buf(), e))
}

/// `Ok(None)` when the file does not exist.
pub fn load_state(path: &Path) -> Result<Option<DaemonState>, LifecycleError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| LifecycleError::StateParse(path.to_path_buf(), e))
}

/// Remove the state file; missing is fine.
pub fn remove_state(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to remove state file: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "statefile_tests.rs"]
mod tests;
