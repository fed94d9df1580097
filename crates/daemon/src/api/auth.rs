// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication middleware and token bootstrap.

use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use constant_time_eq::constant_time_eq;
use rand::RngCore;
use tracing::info;

use super::{ApiError, ApiState};

/// Require `Authorization: Bearer <token>` when a token is configured.
/// Comparison is constant-time; failures carry the `UNAUTHORIZED` envelope.
pub async fn require_bearer(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            next.run(req).await
        }
        _ => ApiError::unauthorized().into_response(),
    }
}

/// Read `~/.prox/token`, creating a fresh 32-byte hex token (`0600`, dir
/// `0700`) when absent.
pub fn ensure_token() -> std::io::Result<String> {
    let path = prox_core::token::token_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "cannot determine home directory")
    })?;

    if let Some(token) = prox_core::token::read_token() {
        return Ok(token);
    }

    if let Some(parent) = path.parent() {
        match std::fs::DirBuilder::new().recursive(true).mode(0o700).create(parent) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)?;
    writeln!(file, "{token}")?;
    info!(path = %path.display(), "generated api token");

    Ok(token)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
