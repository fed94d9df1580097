// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's published state document.
//!
//! Written by the daemon to `.prox/prox.state` while it holds the PID
//! lock; read by clients to discover where the control API lives.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub host: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub config_file: PathBuf,
}

impl DaemonState {
    /// Base url of the control API.
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
