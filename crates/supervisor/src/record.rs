// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process runtime record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prox_core::{ExitInfo, HealthStatus, ProcessSummary};

/// The supervisor-visible lifecycle states.
///
/// ```text
/// stopped ─start─▶ starting ─ok─▶ running ─stop─▶ stopping ─▶ stopped
///                      │             │                           ▲
///                      │             └─exit─▶ restarting ─▶ starting
///                      └─fail─▶ failed ──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Restarting,
    Failed,
}

impl ProcessState {
    /// States from which an explicit start is legal.
    pub fn can_start(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed)
    }

    /// States from which an explicit stop is legal.
    pub fn can_stop(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Restarting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Restarting => "restarting",
            ProcessState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable runtime state for one configured process.
///
/// Owned by the supervisor behind a short-lived lock; never held across
/// `.await`.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub name: String,
    pub state: ProcessState,
    /// OS pid, 0 when not running
    pub pid: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_exit: Option<ExitInfo>,
    pub health: HealthStatus,
    /// Tail (≤ 4 KiB) of the most recent health check output
    pub health_output: String,
}

impl ProcessRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ProcessState::Stopped,
            pid: 0,
            started_at: None,
            restart_count: 0,
            last_exit: None,
            health: HealthStatus::Unknown,
            health_output: String::new(),
        }
    }

    /// Record a successful os-level start.
    pub fn mark_running(&mut self, pid: u32) {
        self.state = ProcessState::Running;
        self.pid = pid;
        self.started_at = Some(Utc::now());
    }

    /// Record process exit; the caller decides the next state.
    pub fn mark_exited(&mut self, state: ProcessState, code: Option<i32>, signal: Option<i32>) {
        self.state = state;
        self.pid = 0;
        self.started_at = None;
        self.health = HealthStatus::Unknown;
        self.health_output.clear();
        self.last_exit = Some(ExitInfo { code, signal, at: Utc::now() });
    }

    pub fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            name: self.name.clone(),
            state: self.state.as_str().to_string(),
            pid: self.pid,
            started_at: self.started_at,
            restarts: self.restart_count,
            health: self.health,
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
