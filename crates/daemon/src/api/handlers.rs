// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers for `/api/v1`.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use prox_core::{
    BodyStorage, LogFilter, LogsResponse, ProcessDetail, ProcessSummary, RequestFilter,
    RequestRecord, RequestsResponse, StatusResponse,
};

use super::{ApiError, ApiState, API_VERSION};

/// Default and maximum `lines` for log queries.
const DEFAULT_LOG_LINES: usize = 100;
const MAX_LOG_LINES: usize = 10_000;

/// Default and maximum `limit` for request queries.
const DEFAULT_REQUEST_LIMIT: usize = 100;
const MAX_REQUEST_LIMIT: usize = 1000;

pub(super) async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        config_file: state.config_file.clone(),
        api_version: API_VERSION.to_string(),
    })
}

pub(super) async fn list_processes(State(state): State<ApiState>) -> Json<Vec<ProcessSummary>> {
    Json(state.supervisor.processes())
}

pub(super) async fn process_detail(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ProcessDetail>, ApiError> {
    Ok(Json(state.supervisor.process(&name)?))
}

pub(super) async fn start_process(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.supervisor.start_process(&name).await?;
    Ok(Json(json!({"status": "started", "process": name})))
}

pub(super) async fn stop_process(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.supervisor.stop_process(&name).await?;
    Ok(Json(json!({"status": "stopped", "process": name})))
}

pub(super) async fn restart_process(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.supervisor.restart_process(&name).await?;
    Ok(Json(json!({"status": "restarted", "process": name})))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct LogsQuery {
    process: Option<String>,
    pattern: Option<String>,
    regex: Option<String>,
    lines: Option<String>,
}

impl LogsQuery {
    pub(super) fn filter(&self) -> LogFilter {
        LogFilter {
            processes: self
                .process
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
            pattern: self.pattern.clone().filter(|p| !p.is_empty()),
            regex: parse_flag(self.regex.as_deref()),
        }
    }
}

pub(super) async fn logs(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let lines = parse_lines(query.lines.as_deref());
    let (entries, total) = state.supervisor.logbuf().query_last(&query.filter(), lines)?;
    Ok(Json(LogsResponse { entries, total }))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RequestsQuery {
    subdomain: Option<String>,
    method: Option<String>,
    min_status: Option<String>,
    max_status: Option<String>,
    since: Option<String>,
    limit: Option<String>,
}

impl RequestsQuery {
    pub(super) fn filter(&self) -> RequestFilter {
        RequestFilter {
            subdomain: self.subdomain.clone().filter(|s| !s.is_empty()),
            method: self.method.clone().filter(|s| !s.is_empty()),
            min_status: parse_status(self.min_status.as_deref()),
            max_status: parse_status(self.max_status.as_deref()),
            since: self
                .since
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.to_utc()),
            limit: parse_limit(self.limit.as_deref()),
        }
    }
}

pub(super) async fn requests(
    State(state): State<ApiState>,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<RequestsResponse>, ApiError> {
    let tracker = state.tracker.as_ref().ok_or_else(ApiError::proxy_not_enabled)?;

    // Listing stays light: capture details live on the detail endpoint.
    let requests: Vec<RequestRecord> = tracker
        .recent(&query.filter())
        .into_iter()
        .map(|mut r| {
            r.details = None;
            r
        })
        .collect();
    let count = requests.len();
    Ok(Json(RequestsResponse { requests, count }))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RequestDetailQuery {
    include: Option<String>,
}

pub(super) async fn request_detail(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<RequestDetailQuery>,
) -> Result<Json<RequestRecord>, ApiError> {
    let tracker = state.tracker.as_ref().ok_or_else(ApiError::proxy_not_enabled)?;
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::missing_request_id());
    }

    let mut record = tracker.get_by_id(id).ok_or_else(|| ApiError::request_not_found(id))?;

    let include_body = query.include.as_deref() == Some("body");
    if let Some(details) = record.details.as_mut() {
        for body in [details.request_body.as_mut(), details.response_body.as_mut()]
            .into_iter()
            .flatten()
        {
            if include_body {
                if let Some(capture) = state.capture.as_ref() {
                    match capture.load_body(body) {
                        Ok(bytes) => body.storage = BodyStorage::Inline(bytes),
                        Err(e) => warn!(id, "failed to load captured body: {}", e),
                    }
                }
            } else if let BodyStorage::Inline(bytes) = &mut body.storage {
                // Metadata only unless bodies were asked for.
                bytes.clear();
            }
        }
    }

    Ok(Json(record))
}

pub(super) async fn shutdown(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    if *state.shutdown.borrow() {
        return Err(ApiError::shutdown_in_progress());
    }
    // Acknowledge first; the daemon loop tears down after this response.
    state.shutdown.send_replace(true);
    Ok(Json(json!({"status": "shutting down"})))
}

/// `lines`: non-integers and values ≤ 0 fall back to the default; large
/// values clamp.
pub(super) fn parse_lines(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| (n as usize).min(MAX_LOG_LINES))
        .unwrap_or(DEFAULT_LOG_LINES)
}

pub(super) fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| (n as usize).min(MAX_REQUEST_LIMIT))
        .unwrap_or(DEFAULT_REQUEST_LIMIT)
}

fn parse_status(raw: Option<&str>) -> u16 {
    raw.and_then(|s| s.parse::<u16>().ok()).unwrap_or(0)
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some(v) if v.eq_ignore_ascii_case("true") || v == "1")
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
