// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command implementations, all thin veneers over `prox-client`.

mod logs;
mod requests;
mod up;

pub use logs::logs;
pub use requests::{request, requests};
pub use up::{down, up};

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use prox_client::ApiClient;
use prox_core::HealthStatus;

/// The directory the daemon state hangs off: the config file's directory
/// when it exists, the current directory otherwise.
pub(crate) fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .canonicalize()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Client for the daemon serving this config, or a friendly failure.
pub(crate) fn connect(config_path: &Path) -> Result<ApiClient> {
    match ApiClient::discover(&base_dir(config_path)) {
        Ok(client) => Ok(client),
        Err(prox_client::ClientError::NotRunning(dir)) => {
            bail!("no daemon running in {} (try `prox up -d`)", dir.display())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn status(config_path: &Path) -> Result<()> {
    let client = connect(config_path)?;
    let status = client.status().await?;
    println!("status:  {}", status.status);
    println!("uptime:  {}s", status.uptime_seconds);
    println!("config:  {}", status.config_file);
    println!("api:     {} ({})", client.base_url(), status.api_version);
    Ok(())
}

pub async fn ps(config_path: &Path) -> Result<()> {
    let client = connect(config_path)?;
    let processes = client.processes().await?;
    if processes.is_empty() {
        println!("no processes configured");
        return Ok(());
    }

    println!("{:<16} {:<12} {:>8} {:>9} {:<10}", "NAME", "STATE", "PID", "RESTARTS", "HEALTH");
    for p in processes {
        let health = match p.health {
            HealthStatus::Unknown => "-",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        };
        let pid = if p.pid == 0 { "-".to_string() } else { p.pid.to_string() };
        println!("{:<16} {:<12} {:>8} {:>9} {:<10}", p.name, p.state, pid, p.restarts, health);
    }
    Ok(())
}

pub async fn process_action(config_path: &Path, action: &str, name: &str) -> Result<()> {
    let client = connect(config_path)?;
    let done = match action {
        "start" => {
            client.start_process(name).await?;
            "started"
        }
        "stop" => {
            client.stop_process(name).await?;
            "stopped"
        }
        "restart" => {
            client.restart_process(name).await?;
            "restarted"
        }
        _ => bail!("unknown action `{action}`"),
    };
    println!("{done} {name}");
    Ok(())
}
