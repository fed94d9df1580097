// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed client for the control API.

use std::path::Path;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use prox_core::{
    DaemonState, ErrorBody, LogEntry, LogsResponse, ProcessDetail, ProcessSummary, RequestRecord,
    RequestsResponse, StatusResponse,
};

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no daemon running in {0} (state file missing or stale)")]
    NotRunning(std::path::PathBuf),

    #[error("api error ({status}): {message} [{code}]")]
    Api { status: u16, code: String, message: String },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Query options for log history and streaming.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
}

/// Query options for request history and streaming.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Query value for endpoints that take none.
const NO_QUERY: &[(&str, &str)] = &[];

/// HTTP + SSE client for one daemon.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Self {
        Self { base: base.into(), token, http: reqwest::Client::new() }
    }

    /// Find the daemon serving `dir` via its state file, picking up the
    /// shared token when one exists.
    pub fn discover(dir: &Path) -> Result<Self, ClientError> {
        let state_path = dir.join(".prox").join("prox.state");
        let bytes = std::fs::read(&state_path)
            .map_err(|_| ClientError::NotRunning(dir.to_path_buf()))?;
        let state: DaemonState = serde_json::from_slice(&bytes)?;
        Ok(Self::new(state.api_url(), prox_core::token::read_token()))
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// `GET /health`, unauthenticated. True on `200 ok`.
    pub async fn health(&self) -> bool {
        match self.http.get(format!("{}/health", self.base)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        self.get_json("/api/v1/status", NO_QUERY).await
    }

    pub async fn processes(&self) -> Result<Vec<ProcessSummary>, ClientError> {
        self.get_json("/api/v1/processes", NO_QUERY).await
    }

    pub async fn process(&self, name: &str) -> Result<ProcessDetail, ClientError> {
        self.get_json(&format!("/api/v1/processes/{name}"), NO_QUERY).await
    }

    pub async fn start_process(&self, name: &str) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/v1/processes/{name}/start")).await
    }

    pub async fn stop_process(&self, name: &str) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/v1/processes/{name}/stop")).await
    }

    pub async fn restart_process(&self, name: &str) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/v1/processes/{name}/restart")).await
    }

    pub async fn logs(&self, params: &LogsParams) -> Result<LogsResponse, ClientError> {
        self.get_json("/api/v1/logs", params).await
    }

    pub async fn requests(&self, params: &RequestsParams) -> Result<RequestsResponse, ClientError> {
        self.get_json("/api/v1/proxy/requests", params).await
    }

    pub async fn request(
        &self,
        id: &str,
        include_body: bool,
    ) -> Result<RequestRecord, ClientError> {
        let path = if include_body {
            format!("/api/v1/proxy/requests/{id}?include=body")
        } else {
            format!("/api/v1/proxy/requests/{id}")
        };
        self.get_json(&path, NO_QUERY).await
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.post_unit("/api/v1/shutdown").await
    }

    /// Live log entries; ends when the daemon closes the stream.
    pub async fn stream_logs(
        &self,
        params: &LogsParams,
    ) -> Result<impl Stream<Item = Result<LogEntry, ClientError>>, ClientError> {
        self.stream("/api/v1/logs/stream", params).await
    }

    /// Live request records.
    pub async fn stream_requests(
        &self,
        params: &RequestsParams,
    ) -> Result<impl Stream<Item = Result<RequestRecord, ClientError>>, ClientError> {
        self.stream("/api/v1/proxy/requests/stream", params).await
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ClientError> {
        let builder = self.http.get(format!("{}{}", self.base, path)).query(query);
        let response = self.authorize(builder).send().await?;
        decode(response).await
    }

    async fn post_unit(&self, path: &str) -> Result<(), ClientError> {
        let builder = self.http.post(format!("{}{}", self.base, path));
        let response = self.authorize(builder).send().await?;
        decode::<serde_json::Value>(response).await.map(|_| ())
    }

    async fn stream<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<impl Stream<Item = Result<T, ClientError>>, ClientError> {
        let builder = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(query)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = self.authorize(builder).send().await?;

        if !response.status().is_success() {
            return Err(into_api_error(response).await);
        }

        // Comments (the `: connected` preamble, keep-alives) never surface
        // as events, so every event carries JSON data.
        let stream = response.bytes_stream().eventsource().filter_map(|event| async move {
            match event {
                Ok(event) => Some(serde_json::from_str::<T>(&event.data).map_err(ClientError::from)),
                Err(eventsource_stream::EventStreamError::Transport(e)) => {
                    Some(Err(ClientError::Http(e)))
                }
                Err(_) => None,
            }
        });
        Ok(stream)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    Err(into_api_error(response).await)
}

async fn into_api_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    match response.json::<ErrorBody>().await {
        Ok(body) => ClientError::Api {
            status,
            code: body.code.as_str().to_string(),
            message: body.error,
        },
        Err(e) => ClientError::Http(e),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
