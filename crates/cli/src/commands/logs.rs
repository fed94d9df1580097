// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `prox logs` - history and follow mode.

use std::path::Path;

use anyhow::Result;
use futures_util::StreamExt;

use prox_client::LogsParams;
use prox_core::LogEntry;

use super::connect;

pub async fn logs(
    config_path: &Path,
    process: Option<String>,
    pattern: Option<String>,
    regex: bool,
    lines: Option<usize>,
    follow: bool,
) -> Result<()> {
    let client = connect(config_path)?;
    let params = LogsParams { process, pattern, regex: regex.then_some(true), lines };

    if follow {
        let stream = client.stream_logs(&params).await?;
        tokio::pin!(stream);
        while let Some(entry) = stream.next().await {
            print_entry(&entry?);
        }
        return Ok(());
    }

    let response = client.logs(&params).await?;
    // History arrives newest-first; read it the way it happened.
    for entry in response.entries.iter().rev() {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &LogEntry) {
    println!(
        "{} [{}] {} {}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        entry.process,
        entry.stream,
        entry.line
    );
}
