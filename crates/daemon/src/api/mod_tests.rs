// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use futures_util::StreamExt;
use tower::ServiceExt;

use prox_core::{ApiConfig, Config, ProcessDefinition, RequestRecord, Settings};
use prox_supervisor::LogBuffer;

use super::*;

fn test_config(processes: &[(&str, &str)]) -> Config {
    Config {
        env_file: None,
        processes: processes
            .iter()
            .map(|(name, command)| {
                (
                    name.to_string(),
                    ProcessDefinition {
                        name: name.to_string(),
                        command: command.to_string(),
                        env: BTreeMap::new(),
                        env_file: None,
                        cwd: None,
                        health: None,
                    },
                )
            })
            .collect(),
        proxy: None,
        api: ApiConfig::default(),
        settings: Settings::default(),
        path: PathBuf::from("/tmp/prox.toml"),
    }
}

fn test_state(processes: &[(&str, &str)], token: Option<&str>) -> (ApiState, Arc<RequestTracker>) {
    let supervisor =
        Arc::new(Supervisor::new(test_config(processes), Arc::new(LogBuffer::new(200))));
    let tracker = Arc::new(RequestTracker::new(100));
    let (shutdown, _) = watch::channel(false);
    let state = ApiState {
        supervisor,
        tracker: Some(Arc::clone(&tracker)),
        capture: None,
        config_file: "/tmp/prox.toml".to_string(),
        started_at: Instant::now(),
        token: token.map(|t| Arc::new(t.to_string())),
        shutdown,
    };
    (state, tracker)
}

fn sample_record(id: &str, subdomain: &str) -> RequestRecord {
    RequestRecord {
        id: id.to_string(),
        timestamp: Utc::now(),
        method: "GET".to_string(),
        url: format!("https://{subdomain}.local.dev/"),
        subdomain: subdomain.to_string(),
        status: 200,
        duration_ms: 2,
        client_ip: "127.0.0.1".to_string(),
        details: None,
    }
}

async fn call(
    router: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, serde_json::Value, axum::http::HeaderMap) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let response =
        router.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()));
    (status, value, headers)
}

#[tokio::test]
async fn health_bypasses_auth() {
    let (state, _) = test_state(&[], Some("t"));
    let router = router(state);

    let (status, body, headers) = call(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::Value::String("ok".to_string()));
    assert!(!headers.contains_key("www-authenticate"));
}

#[tokio::test]
async fn missing_or_wrong_token_is_401() {
    let (state, _) = test_state(&[], Some("secret"));
    let router = router(state);

    for token in [None, Some("wrong")] {
        let (status, body, _) = call(&router, "GET", "/api/v1/status", token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn status_reports_api_version() {
    let (state, _) = test_state(&[], Some("secret"));
    let router = router(state);

    let (status, body, _) = call(&router, "GET", "/api/v1/status", Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_version"], "v1");
    assert_eq!(body["config_file"], "/tmp/prox.toml");
}

#[tokio::test]
async fn auth_disabled_when_no_token() {
    let (state, _) = test_state(&[], None);
    let router = router(state);

    let (status, _, _) = call(&router, "GET", "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn double_start_returns_conflict_envelope() {
    let (state, _) = test_state(&[("p", "sleep 30")], None);
    let supervisor = Arc::clone(&state.supervisor);
    let router = router(state);

    let (status, _, _) = call(&router, "POST", "/api/v1/processes/p/start", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = call(&router, "POST", "/api/v1/processes/p/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PROCESS_ALREADY_RUNNING");

    supervisor.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn unknown_process_is_404() {
    let (state, _) = test_state(&[], None);
    let router = router(state);

    let (status, body, _) = call(&router, "GET", "/api/v1/processes/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROCESS_NOT_FOUND");

    let (status, body, _) = call(&router, "POST", "/api/v1/processes/ghost/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROCESS_NOT_FOUND");
}

#[tokio::test]
async fn stop_when_stopped_is_409() {
    let (state, _) = test_state(&[("p", "sleep 30")], None);
    let router = router(state);

    let (status, body, _) = call(&router, "POST", "/api/v1/processes/p/stop", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PROCESS_NOT_RUNNING");
}

#[tokio::test]
async fn invalid_regex_is_400() {
    let (state, _) = test_state(&[], None);
    let router = router(state);

    let (status, body, _) =
        call(&router, "GET", "/api/v1/logs?regex=true&pattern=%5B", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PATTERN");
}

#[tokio::test]
async fn logs_returns_entries_and_total() {
    let (state, _) = test_state(&[], None);
    state.supervisor.system_log("hello from the supervisor");
    let router = router(state);

    let (status, body, _) = call(&router, "GET", "/api/v1/logs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["stream"], "system");
}

#[tokio::test]
async fn requests_list_strips_details() {
    let (state, tracker) = test_state(&[], None);
    let mut record = sample_record("abc1234", "web");
    record.details = Some(prox_core::RequestDetails::default());
    tracker.record(record);
    let router = router(state);

    let (status, body, _) = call(&router, "GET", "/api/v1/proxy/requests", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert!(body["requests"][0]["details"].is_null());
}

#[tokio::test]
async fn request_detail_and_not_found() {
    let (state, tracker) = test_state(&[], None);
    tracker.record(sample_record("abc1234", "web"));
    let router = router(state);

    let (status, body, _) = call(&router, "GET", "/api/v1/proxy/requests/abc1234", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "abc1234");

    let (status, body, _) = call(&router, "GET", "/api/v1/proxy/requests/zzz", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "REQUEST_NOT_FOUND");
}

#[tokio::test]
async fn proxy_endpoints_require_proxy_enabled() {
    let (mut state, _) = test_state(&[], None);
    state.tracker = None;
    let router = router(state);

    for uri in ["/api/v1/proxy/requests", "/api/v1/proxy/requests/abc1234"] {
        let (status, body, _) = call(&router, "GET", uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "PROXY_NOT_ENABLED");
    }
}

#[tokio::test]
async fn shutdown_acknowledges_then_conflicts() {
    let (state, _) = test_state(&[], None);
    let mut shutdown_rx = state.shutdown.subscribe();
    let router = router(state);

    let (status, body, _) = call(&router, "POST", "/api/v1/shutdown", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "shutting down");
    assert!(shutdown_rx.changed().await.is_ok());

    let (status, body, _) = call(&router, "POST", "/api/v1/shutdown", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SHUTDOWN_IN_PROGRESS");
}

#[tokio::test]
async fn cors_echoes_allowed_origin_only() {
    let (state, _) = test_state(&[], None);
    let router = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("origin", "http://localhost.evil.com")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn request_stream_filters_by_subdomain() {
    let (state, tracker) = test_state(&[], None);
    let router = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/proxy/requests/stream?subdomain=match")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let mut body = response.into_body().into_data_stream();

    let first = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&first).contains(": connected"));

    tracker.record(sample_record("aaaaaaa", "other"));
    tracker.record(sample_record("bbbbbbb", "match"));

    let frame = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&frame).into_owned();
    assert!(text.starts_with("data:"), "frame: {text}");
    assert!(text.contains("\"subdomain\":\"match\""));

    // The filtered-out record must not produce a second data frame.
    let extra = tokio::time::timeout(Duration::from_millis(300), body.next()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn log_stream_emits_connected_then_entries() {
    let (state, _) = test_state(&[], None);
    let supervisor = Arc::clone(&state.supervisor);
    let router = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/logs/stream")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let mut body = response.into_body().into_data_stream();

    let first = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&first).contains(": connected"));

    supervisor.system_log("streamed line");
    let frame = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&frame).contains("streamed line"));
}
