// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the control API (`/api/v1`), shared with the client crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::request::RequestRecord;

/// Machine-readable error codes carried in the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProcessNotFound,
    ProcessAlreadyRunning,
    ProcessNotRunning,
    InvalidPattern,
    ShutdownInProgress,
    ProxyNotEnabled,
    MissingRequestId,
    RequestNotFound,
    StreamingNotSupported,
    Unauthorized,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProcessNotFound => "PROCESS_NOT_FOUND",
            ErrorCode::ProcessAlreadyRunning => "PROCESS_ALREADY_RUNNING",
            ErrorCode::ProcessNotRunning => "PROCESS_NOT_RUNNING",
            ErrorCode::InvalidPattern => "INVALID_PATTERN",
            ErrorCode::ShutdownInProgress => "SHUTDOWN_IN_PROGRESS",
            ErrorCode::ProxyNotEnabled => "PROXY_NOT_ENABLED",
            ErrorCode::MissingRequestId => "MISSING_REQUEST_ID",
            ErrorCode::RequestNotFound => "REQUEST_NOT_FOUND",
            ErrorCode::StreamingNotSupported => "STREAMING_NOT_SUPPORTED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// The JSON error envelope: `{"error": <message>, "code": <UPPER_SNAKE>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self { error: error.into(), code }
    }
}

/// `GET /api/v1/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub config_file: String,
    pub api_version: String,
}

/// Health state reported on process summaries and details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// One row of `GET /api/v1/processes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub name: String,
    pub state: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub restarts: u32,
    pub health: HealthStatus,
}

/// Exit information kept from the most recent termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    pub at: DateTime<Utc>,
}

/// `GET /api/v1/processes/{name}`; env is redacted before serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub summary: ProcessSummary,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<ExitInfo>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub health_output: String,
}

/// `GET /api/v1/logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
    /// Entries ever written to the ring, not just those returned
    pub total: u64,
}

/// `GET /api/v1/proxy/requests`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsResponse {
    pub requests: Vec<RequestRecord>,
    pub count: usize,
}
