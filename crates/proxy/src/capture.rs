// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response body capture with inline-or-disk storage.
//!
//! Bodies are teed into a [`CaptureBuf`] as they stream through the proxy,
//! capped at `max_body_bytes`. Finalizing a buffer stores small bodies
//! inline and spills larger ones to `<dir>/<id>_{req,res}.bin` with `0600`
//! permissions. A failed disk write falls back to inline with a warning;
//! captured data is never lost to an I/O error.

use std::fs;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use prox_core::{BodyStorage, CapturedBody};

/// Bytes of body sampled for binary detection.
const BINARY_SAMPLE: usize = 512;

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to prepare capture directory {0}: {1}")]
    Dir(PathBuf, #[source] std::io::Error),

    #[error("failed to read captured body {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
}

/// Which side of the exchange a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Request,
    Response,
}

impl BodyKind {
    fn suffix(&self) -> &'static str {
        match self {
            BodyKind::Request => "req",
            BodyKind::Response => "res",
        }
    }
}

/// Capture tunables.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory for spilled bodies; recreated on enable
    pub dir: PathBuf,
    /// Hard cap per body; bytes past it are discarded
    pub max_body_bytes: u64,
    /// Bodies at or below this stay in memory
    pub inline_max_bytes: u64,
}

impl CaptureConfig {
    pub fn new(dir: PathBuf, max_body_bytes: u64) -> Self {
        Self { dir, max_body_bytes, inline_max_bytes: 64 * 1024 }
    }
}

/// Accumulates one body up to the cap while counting total size.
#[derive(Debug)]
pub struct CaptureBuf {
    data: Vec<u8>,
    size: u64,
    cap: u64,
}

impl CaptureBuf {
    fn new(cap: u64) -> Self {
        Self { data: Vec::new(), size: 0, cap }
    }

    /// A zero-capacity placeholder for `mem::replace`.
    pub(crate) fn empty() -> Self {
        Self::new(0)
    }

    /// Tee one chunk; bytes past the cap are counted but discarded.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.size += chunk.len() as u64;
        let room = (self.cap as usize).saturating_sub(self.data.len());
        if room > 0 {
            self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
    }

    pub fn observed(&self) -> u64 {
        self.size
    }

    fn truncated(&self) -> bool {
        self.size > self.cap
    }
}

/// Owns the capture directory and the storage policy.
pub struct CaptureManager {
    config: CaptureConfig,
}

impl CaptureManager {
    /// Enabling capture wipes and recreates the directory (`0700`), so a
    /// new session never serves stale bodies from a previous run.
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        if config.dir.exists() {
            fs::remove_dir_all(&config.dir)
                .map_err(|e| CaptureError::Dir(config.dir.clone(), e))?;
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&config.dir)
            .map_err(|e| CaptureError::Dir(config.dir.clone(), e))?;
        Ok(Self { config })
    }

    pub fn buffer(&self) -> CaptureBuf {
        CaptureBuf::new(self.config.max_body_bytes)
    }

    /// Turn an accumulated buffer into a stored body. Empty bodies yield
    /// `None`.
    pub fn finalize(&self, id: &str, kind: BodyKind, buf: CaptureBuf, content_type: &str) -> Option<CapturedBody> {
        if buf.size == 0 {
            return None;
        }

        let binary = is_binary(content_type, &buf.data);
        let truncated = buf.truncated();
        let size = buf.size;

        let storage = if buf.data.len() as u64 <= self.config.inline_max_bytes {
            BodyStorage::Inline(buf.data)
        } else {
            let path = self.spill_path(id, kind);
            match write_spill(&path, &buf.data) {
                Ok(()) => BodyStorage::File(path),
                Err(e) => {
                    warn!(id, path = %path.display(), "capture spill failed, keeping inline: {}", e);
                    BodyStorage::Inline(buf.data)
                }
            }
        };

        Some(CapturedBody {
            size,
            truncated,
            content_type: content_type.to_string(),
            binary,
            storage,
        })
    }

    /// Owned copy of the body bytes, wherever they live.
    pub fn load_body(&self, body: &CapturedBody) -> Result<Vec<u8>, CaptureError> {
        match &body.storage {
            BodyStorage::Inline(bytes) => Ok(bytes.clone()),
            BodyStorage::File(path) => {
                fs::read(path).map_err(|e| CaptureError::Read(path.clone(), e))
            }
        }
    }

    /// Remove both spill files for a request id, if present.
    pub fn cleanup(&self, id: &str) {
        for kind in [BodyKind::Request, BodyKind::Response] {
            let path = self.spill_path(id, kind);
            match fs::remove_file(&path) {
                Ok(()) => debug!(id, path = %path.display(), "removed capture file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(id, "failed to remove capture file: {}", e),
            }
        }
    }

    /// Remove the whole capture directory.
    pub fn cleanup_all(&self) {
        if let Err(e) = fs::remove_dir_all(&self.config.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.config.dir.display(), "capture cleanup failed: {}", e);
            }
        }
    }

    fn spill_path(&self, id: &str, kind: BodyKind) -> PathBuf {
        self.config.dir.join(format!("{id}_{}.bin", kind.suffix()))
    }
}

fn write_spill(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    Ok(())
}

/// Content-Type heuristics first, then a control-byte and UTF-8 sample.
pub fn is_binary(content_type: &str, data: &[u8]) -> bool {
    let ct = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if !ct.is_empty() {
        if ct.starts_with("text/")
            || ct == "application/json"
            || ct == "application/xml"
            || ct == "application/javascript"
            || ct == "application/x-www-form-urlencoded"
            || ct.ends_with("+json")
            || ct.ends_with("+xml")
        {
            return false;
        }
        if ct.starts_with("image/")
            || ct.starts_with("audio/")
            || ct.starts_with("video/")
            || ct == "application/octet-stream"
            || ct == "application/pdf"
            || ct.starts_with("font/")
        {
            return true;
        }
    }

    let sample = &data[..data.len().min(BINARY_SAMPLE)];
    if sample.contains(&0) {
        return true;
    }
    let control = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();
    if control * 10 > sample.len() {
        return true;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => false,
        // A multi-byte char split at the sample edge is still text.
        Err(e) => e.valid_up_to() + 4 < sample.len(),
    }
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
