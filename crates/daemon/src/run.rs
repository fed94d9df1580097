// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One daemon run: acquire the lock, publish state, start the children,
//! bring up the proxy and the control API, and tear everything down in
//! order on shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use prox_core::Config;
use prox_proxy::{CaptureConfig, CaptureManager, Proxy, ProxyError, RequestTracker};
use prox_supervisor::{LogBuffer, Supervisor};

use crate::api::{self, ApiState};
use crate::lifecycle::{self, LifecycleError, PidFile, StateDir};

/// Daemon run errors
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("failed to bind api listener on {0}: {1}")]
    ApiBind(String, #[source] std::io::Error),

    #[error("failed to prepare capture directory: {0}")]
    Capture(#[from] prox_proxy::CaptureError),

    #[error("failed to prepare api token: {0}")]
    Token(#[source] std::io::Error),
}

/// Run the daemon until a signal or the shutdown endpoint stops it.
///
/// `base_dir` is the working directory the state dir hangs off; it is the
/// config file's directory in normal operation.
pub async fn run_daemon(config: Config, base_dir: &Path) -> Result<(), RunError> {
    let state_dir = StateDir::new(base_dir);
    state_dir.ensure().map_err(LifecycleError::from)?;

    // Recover leftovers from a crashed run, then take the lock. Files from
    // a live daemon survive recovery and the lock attempt fails cleanly.
    lifecycle::recover_stale(&state_dir);
    let mut pidfile = PidFile::acquire(&state_dir.pid_path())?;

    let result = run_locked(&config, &state_dir).await;

    lifecycle::remove_state(&state_dir.state_path());
    pidfile.release();
    result
}

async fn run_locked(config: &Config, state_dir: &StateDir) -> Result<(), RunError> {
    let started_at = Instant::now();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Supervisor over the shared log ring.
    let logbuf = Arc::new(LogBuffer::new(config.settings.log_buffer_size));
    let supervisor = Arc::new(Supervisor::new(config.clone(), Arc::clone(&logbuf)));

    // Proxy side, when configured.
    let mut tracker = None;
    let mut capture = None;
    let mut proxy_tasks = Vec::new();
    if let Some(proxy_config) = &config.proxy {
        let t = Arc::new(RequestTracker::new(config.settings.request_buffer_size));

        if proxy_config.capture {
            let manager = Arc::new(CaptureManager::new(CaptureConfig::new(
                state_dir.captures_dir(),
                proxy_config.max_body_bytes,
            ))?);
            let for_eviction = Arc::clone(&manager);
            t.set_eviction_callback(move |id| for_eviction.cleanup(id));
            capture = Some(manager);
        }

        let proxy = Arc::new(Proxy::new(proxy_config, Arc::clone(&t), capture.clone()));
        proxy_tasks = proxy.spawn_listeners(proxy_config, shutdown_rx.clone()).await?;
        tracker = Some(t);
    }

    // Control API.
    let token = if config.api.auth {
        Some(Arc::new(api::ensure_token().map_err(RunError::Token)?))
    } else {
        None
    };
    let api_addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = TcpListener::bind(&api_addr)
        .await
        .map_err(|e| RunError::ApiBind(api_addr.clone(), e))?;
    let local_addr = listener.local_addr().map_err(|e| RunError::ApiBind(api_addr.clone(), e))?;

    let api_state = ApiState {
        supervisor: Arc::clone(&supervisor),
        tracker: tracker.clone(),
        capture: capture.clone(),
        config_file: config.path.display().to_string(),
        started_at,
        token,
        shutdown: shutdown_tx.clone(),
    };
    let router = api::router(api_state);

    let (api_stop_tx, mut api_stop_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = api_stop_rx.changed().await;
        });
        if let Err(e) = serve.await {
            error!("api server error: {}", e);
        }
    });

    // State file only after the lock is held and the port is bound.
    let state_file =
        lifecycle::new_state(config.api.host.clone(), local_addr.port(), config.path.clone());
    lifecycle::write_state(&state_file, &state_dir.state_path())?;

    info!(addr = %local_addr, "control api listening");
    supervisor.system_log(format!("daemon started (pid {})", std::process::id()));

    // Children last: everything they log is already observable.
    let report = supervisor.start().await;
    for (name, message) in &report.failed {
        warn!(process = %name, "failed to start: {}", message);
    }

    wait_for_shutdown(shutdown_rx).await;
    info!("shutting down");

    // Teardown order: children, then proxy, then the API listener.
    let grace = Duration::from_secs(config.settings.grace_seconds);
    supervisor.system_log("daemon stopping");
    supervisor.stop(grace).await;
    logbuf.close();

    let _ = shutdown_tx.send(true);
    for task in proxy_tasks {
        let _ = task.await;
    }
    if let Some(tracker) = tracker {
        tracker.close();
    }
    if let Some(capture) = capture {
        capture.cleanup_all();
    }

    let _ = api_stop_tx.send(true);
    let _ = server.await;

    info!("shutdown complete");
    Ok(())
}

/// First of: SIGTERM, SIGINT, or the shutdown endpoint.
async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            let _ = shutdown_rx.changed().await;
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGINT handler: {}", e);
            let _ = shutdown_rx.changed().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
        _ = shutdown_rx.changed() => info!("shutdown requested via api"),
    }
}
