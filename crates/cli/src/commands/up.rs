// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `prox up` / `prox down` - daemon lifecycle from the CLI side.

use std::path::Path;

use anyhow::{bail, Context, Result};

use prox_core::Config;
use prox_daemon::StateDir;

use super::{base_dir, connect};

pub async fn up(config_path: &Path, detach: bool) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let base = base_dir(config_path);

    // The re-exec'd child carries the marker and the identical argv; it
    // runs the daemon loop no matter which flags it was re-launched with.
    if prox_daemon::should_run_as_daemon() {
        let state_dir = StateDir::new(&base);
        state_dir.ensure()?;
        prox_daemon::redirect_stdio(&state_dir.log_path())?;
        return Ok(prox_daemon::run_daemon(config, &base).await?);
    }

    if detach {
        if prox_daemon::is_running(&StateDir::new(&base)) {
            bail!("prox is already running in {}", base.display());
        }
        let pid = prox_daemon::detach()?;
        println!("started (pid {pid})");
        return Ok(());
    }

    Ok(prox_daemon::run_daemon(config, &base).await?)
}

pub async fn down(config_path: &Path) -> Result<()> {
    let client = connect(config_path)?;
    client.shutdown().await?;
    println!("shutting down");
    Ok(())
}
