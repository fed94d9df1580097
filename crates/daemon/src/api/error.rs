// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mapping of internal errors onto the JSON error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use prox_core::{ErrorBody, ErrorCode};
use prox_supervisor::{LogError, SupervisorError};

/// An error ready to leave the API: status plus envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self { status, body: ErrorBody::new(code, message) }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "authentication required")
    }

    pub fn proxy_not_enabled() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ErrorCode::ProxyNotEnabled,
            "the reverse proxy is not enabled",
        )
    }

    pub fn request_not_found(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ErrorCode::RequestNotFound,
            format!("no request with id `{id}`"),
        )
    }

    pub fn missing_request_id() -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::MissingRequestId, "request id is required")
    }

    pub fn shutdown_in_progress() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ErrorCode::ShutdownInProgress,
            "shutdown already in progress",
        )
    }

    /// Generic 500; the real error is logged once, not echoed.
    pub fn internal(context: &str, err: &dyn std::fmt::Display) -> Self {
        error!("{context}: {err}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            "internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        match &err {
            SupervisorError::ProcessNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, ErrorCode::ProcessNotFound, err.to_string())
            }
            SupervisorError::AlreadyRunning(_) => {
                Self::new(StatusCode::CONFLICT, ErrorCode::ProcessAlreadyRunning, err.to_string())
            }
            SupervisorError::NotRunning(_) => {
                Self::new(StatusCode::CONFLICT, ErrorCode::ProcessNotRunning, err.to_string())
            }
            SupervisorError::Config(_) | SupervisorError::Runner(_) => {
                Self::internal("supervisor operation failed", &err)
            }
        }
    }
}

impl From<LogError> for ApiError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::InvalidPattern(_) => {
                Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidPattern, err.to_string())
            }
        }
    }
}
