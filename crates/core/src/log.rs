// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entry and filter types shared by the supervisor, API, and client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Synthetic lines written by the supervisor itself
    System,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStream::Stdout => write!(f, "stdout"),
            LogStream::Stderr => write!(f, "stderr"),
            LogStream::System => write!(f, "system"),
        }
    }
}

/// One captured line, without its terminating newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub process: String,
    pub stream: LogStream,
    pub line: String,
}

impl LogEntry {
    pub fn new(process: impl Into<String>, stream: LogStream, line: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), process: process.into(), stream, line: line.into() }
    }
}

/// History/subscription filter.
///
/// An empty process list matches every process. The pattern is a literal
/// substring unless `regex` is set; pattern validity is checked where the
/// filter is compiled, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub processes: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: bool,
}

impl LogFilter {
    /// True when the entry's process is selected by this filter.
    pub fn matches_process(&self, process: &str) -> bool {
        self.processes.is_empty() || self.processes.iter().any(|p| p == process)
    }
}
