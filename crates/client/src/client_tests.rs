// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::watch;

use prox_core::{ApiConfig, Config, ProcessDefinition, Settings};
use prox_daemon::api::{router, ApiState};
use prox_supervisor::{LogBuffer, Supervisor};

use super::*;

async fn spawn_api(processes: &[(&str, &str)], token: Option<&str>) -> (String, Arc<Supervisor>) {
    let config = Config {
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
    };
    let supervisor = Arc::new(Supervisor::new(config, Arc::new(LogBuffer::new(100))));
    let (shutdown, _) = watch::channel(false);
    let state = ApiState {
        supervisor: Arc::clone(&supervisor),
        tracker: None,
        capture: None,
        config_file: "/tmp/prox.toml".to_string(),
        started_at: Instant::now(),
        token: token.map(|t| Arc::new(t.to_string())),
        shutdown,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    (format!("http://{addr}"), supervisor)
}

#[tokio::test]
async fn health_and_status_round_trip() {
    let (base, _sup) = spawn_api(&[], None).await;
    let client = ApiClient::new(&base, None);

    assert!(client.health().await);
    let status = client.status().await.unwrap();
    assert_eq!(status.api_version, "v1");
    assert_eq!(status.status, "running");
}

#[tokio::test]
async fn auth_errors_surface_as_api_errors() {
    let (base, _sup) = spawn_api(&[], Some("secret")).await;

    let unauthenticated = ApiClient::new(&base, None);
    let err = unauthenticated.status().await.unwrap_err();
    assert!(matches!(&err, ClientError::Api { status: 401, code, .. } if code == "UNAUTHORIZED"));

    let authenticated = ApiClient::new(&base, Some("secret".to_string()));
    assert!(authenticated.status().await.is_ok());
}

#[tokio::test]
async fn process_lifecycle_through_client() {
    let (base, sup) = spawn_api(&[("p", "sleep 30")], None).await;
    let client = ApiClient::new(&base, None);

    client.start_process("p").await.unwrap();
    let detail = client.process("p").await.unwrap();
    assert_eq!(detail.summary.state, "running");

    let err = client.start_process("p").await.unwrap_err();
    assert!(
        matches!(&err, ClientError::Api { status: 409, code, .. } if code == "PROCESS_ALREADY_RUNNING")
    );

    client.stop_process("p").await.unwrap();
    let summaries = client.processes().await.unwrap();
    assert_eq!(summaries[0].state, "stopped");

    sup.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn unknown_process_maps_to_not_found() {
    let (base, _sup) = spawn_api(&[], None).await;
    let client = ApiClient::new(&base, None);

    let err = client.process("ghost").await.unwrap_err();
    assert!(matches!(&err, ClientError::Api { status: 404, code, .. } if code == "PROCESS_NOT_FOUND"));
}

#[tokio::test]
async fn proxy_disabled_maps_to_api_error() {
    let (base, _sup) = spawn_api(&[], None).await;
    let client = ApiClient::new(&base, None);

    let err = client.requests(&RequestsParams::default()).await.unwrap_err();
    assert!(matches!(&err, ClientError::Api { code, .. } if code == "PROXY_NOT_ENABLED"));
}

#[tokio::test]
async fn log_stream_decodes_entries() {
    let (base, sup) = spawn_api(&[], None).await;
    let client = ApiClient::new(&base, None);

    let stream = client.stream_logs(&LogsParams::default()).await.unwrap();
    tokio::pin!(stream);

    sup.system_log("line over sse");
    let entry = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(entry.line, "line over sse");
    assert_eq!(entry.process, "prox");
}

#[tokio::test]
async fn discover_reads_state_file() {
    let tmp = tempfile::tempdir().unwrap();
    let state_dir = tmp.path().join(".prox");
    std::fs::create_dir_all(&state_dir).unwrap();
    let state = prox_core::DaemonState {
        pid: std::process::id(),
        host: "127.0.0.1".to_string(),
        port: 4777,
        started_at: chrono::Utc::now(),
        config_file: PathBuf::from("/w/prox.toml"),
    };
    std::fs::write(state_dir.join("prox.state"), serde_json::to_vec(&state).unwrap()).unwrap();

    let client = ApiClient::discover(tmp.path()).unwrap();
    assert_eq!(client.base_url(), "http://127.0.0.1:4777");

    let missing = tempfile::tempdir().unwrap();
    assert!(matches!(
        ApiClient::discover(missing.path()),
        Err(ClientError::NotRunning(_))
    ));
}
