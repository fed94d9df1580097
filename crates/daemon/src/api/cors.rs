// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Localhost-only CORS.
//!
//! Only exact localhost origins are echoed back; suffix look-alikes such
//! as `localhost.evil.com` get no CORS headers at all.

use axum::extract::Request;
use axum::http::header::{HeaderValue, ORIGIN, VARY};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Authorization, Content-Type";

/// Exact-match check: `http(s)://localhost[:port]`, `http(s)://127.0.0.1[:port]`,
/// `http(s)://[::1][:port]`.
pub fn origin_allowed(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };

    if let Some(after) = rest.strip_prefix("[::1]") {
        return after.is_empty() || is_port_suffix(after);
    }

    let (name, suffix) = match rest.find(':') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    (suffix.is_empty() || is_port_suffix(suffix)) && matches!(name, "localhost" | "127.0.0.1")
}

fn is_port_suffix(s: &str) -> bool {
    let Some(port) = s.strip_prefix(':') else {
        return false;
    };
    !port.is_empty() && port.len() <= 5 && port.bytes().all(|b| b.is_ascii_digit())
}

/// Echo CORS headers for allowed origins; answer preflights directly.
pub async fn localhost_cors(req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let allowed = origin.as_deref().map(origin_allowed).unwrap_or(false);

    if req.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        if allowed {
            apply_cors(&mut response, origin.as_deref());
        }
        return response;
    }

    let mut response = next.run(req).await;
    if allowed {
        apply_cors(&mut response, origin.as_deref());
    }
    response
}

fn apply_cors(response: &mut Response, origin: Option<&str>) {
    let Some(origin) = origin else {
        return;
    };
    let Ok(value) = HeaderValue::from_str(origin) else {
        return;
    };
    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", value);
    headers.insert("access-control-allow-methods", HeaderValue::from_static(ALLOW_METHODS));
    headers.insert("access-control-allow-headers", HeaderValue::from_static(ALLOW_HEADERS));
    headers.append(VARY, HeaderValue::from_static("Origin"));
}

#[cfg(test)]
#[path = "cors_tests.rs"]
mod tests;
