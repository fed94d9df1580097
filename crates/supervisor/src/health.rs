// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic health checks for processes that declare them.
//!
//! A check runs the configured shell command with the child's environment.
//! After `retries` consecutive failures the process is reported unhealthy;
//! any success resets it to healthy. Health state never triggers a restart
//! on its own.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use prox_core::{HealthSpec, HealthStatus};

use crate::record::ProcessRecord;

/// Keep only this much of the check output on the record.
const OUTPUT_TAIL: usize = 4 * 1024;

/// Spawn the checker loop for one running process.
///
/// The returned handle is aborted by the supervisor when the process
/// stops; there is nothing to clean up.
pub fn spawn_checker(
    spec: HealthSpec,
    env: BTreeMap<String, String>,
    record: Arc<Mutex<ProcessRecord>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut failures: u32 = 0;
        let mut ticker = tokio::time::interval(Duration::from_secs(spec.interval.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the child has one
        // interval to come up before the first probe.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let (ok, output) = run_check(&spec, &env).await;
            if ok {
                failures = 0;
            } else {
                failures = failures.saturating_add(1);
            }

            let mut rec = record.lock();
            rec.health_output = output;
            rec.health = if ok {
                HealthStatus::Healthy
            } else if failures >= spec.retries {
                if rec.health != HealthStatus::Unhealthy {
                    warn!(process = %rec.name, failures, "health check unhealthy");
                }
                HealthStatus::Unhealthy
            } else {
                debug!(process = %rec.name, failures, "health check failed");
                rec.health
            };
        }
    })
}

/// Run one check: success is exit code 0 within the timeout.
async fn run_check(spec: &HealthSpec, env: &BTreeMap<String, String>) -> (bool, String) {
    let result = tokio::time::timeout(
        Duration::from_secs(spec.timeout.max(1)),
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&spec.command)
            .envs(env)
            .stdin(Stdio::null())
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (output.status.success(), tail(&text))
        }
        Ok(Err(e)) => (false, format!("health command failed to run: {e}")),
        Err(_) => (false, format!("health check timed out after {}s", spec.timeout)),
    }
}

/// Last `OUTPUT_TAIL` bytes of `text`, on a char boundary.
fn tail(text: &str) -> String {
    if text.len() <= OUTPUT_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - OUTPUT_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
