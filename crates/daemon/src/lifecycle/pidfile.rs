// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID file with an exclusive advisory lock.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::LifecycleError;

/// An acquired PID-file lock. Held for the lifetime of the daemon run;
/// `release` (or drop) unlocks and removes the file.
#[derive(Debug)]
pub struct PidFile {
    file: Option<File>,
    path: PathBuf,
}

impl PidFile {
    /// Open-or-create without truncating, take the exclusive lock
    /// non-blocking, then overwrite with our pid.
    ///
    /// Truncation must wait until the lock is held, or a losing contender
    /// would wipe the running daemon's pid.
    pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(|e| LifecycleError::Lock(path.to_path_buf(), e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                return Err(LifecycleError::AlreadyRunning(path.to_path_buf()));
            }
            return Err(LifecycleError::Lock(path.to_path_buf(), e));
        }

        let mut file = file;
        file.set_len(0).map_err(|e| LifecycleError::Lock(path.to_path_buf(), e))?;
        writeln!(file, "{}", std::process::id())
            .map_err(|e| LifecycleError::Lock(path.to_path_buf(), e))?;
        file.sync_all().map_err(|e| LifecycleError::Lock(path.to_path_buf(), e))?;

        debug!(path = %path.display(), pid = std::process::id(), "pid file locked");
        Ok(Self { file: Some(file), path: path.to_path_buf() })
    }

    /// Unlock, close, and remove the file. Errors are swallowed and
    /// repeated calls are no-ops.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
            drop(file);
            let _ = std::fs::remove_file(&self.path);
            debug!(path = %self.path.display(), "pid file released");
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// True iff some process currently holds an exclusive lock on `path`.
/// Missing files are not locked.
pub fn is_locked(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    match file.try_lock_shared() {
        Ok(()) => {
            let _ = fs2::FileExt::unlock(&file);
            false
        }
        Err(_) => true,
    }
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
