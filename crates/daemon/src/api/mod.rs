// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control API the CLI consumes: REST under `/api/v1`, SSE streams,
//! bearer auth, and localhost-only CORS. `/health` stays outside the
//! authenticated router.

pub mod auth;
pub mod cors;
mod error;
mod handlers;
mod sse;

pub use auth::ensure_token;
pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::sync::watch;

use prox_proxy::{CaptureManager, RequestTracker};
use prox_supervisor::Supervisor;

pub const API_VERSION: &str = "v1";

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    /// Present only when the proxy is enabled
    pub tracker: Option<Arc<RequestTracker>>,
    pub capture: Option<Arc<CaptureManager>>,
    pub config_file: String,
    pub started_at: Instant,
    /// `None` disables authentication
    pub token: Option<Arc<String>>,
    /// Flipped by the shutdown endpoint; the daemon loop watches it
    pub shutdown: watch::Sender<bool>,
}

pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/status", get(handlers::status))
        .route("/processes", get(handlers::list_processes))
        .route("/processes/:name", get(handlers::process_detail))
        .route("/processes/:name/start", post(handlers::start_process))
        .route("/processes/:name/stop", post(handlers::stop_process))
        .route("/processes/:name/restart", post(handlers::restart_process))
        .route("/logs", get(handlers::logs))
        .route("/logs/stream", get(sse::logs_stream))
        .route("/proxy/requests", get(handlers::requests))
        .route("/proxy/requests/:id", get(handlers::request_detail))
        .route("/proxy/requests/stream", get(sse::requests_stream))
        .route("/shutdown", post(handlers::shutdown))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .layer(middleware::from_fn(cors::localhost_cors))
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
