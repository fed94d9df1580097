// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `prox requests` / `prox request` - proxied request history.

use std::path::Path;

use anyhow::Result;
use futures_util::StreamExt;

use prox_client::RequestsParams;
use prox_core::RequestRecord;

use super::connect;

pub async fn requests(
    config_path: &Path,
    subdomain: Option<String>,
    method: Option<String>,
    min_status: Option<u16>,
    max_status: Option<u16>,
    limit: Option<usize>,
    follow: bool,
) -> Result<()> {
    let client = connect(config_path)?;
    let params = RequestsParams { subdomain, method, min_status, max_status, since: None, limit };

    if follow {
        let stream = client.stream_requests(&params).await?;
        tokio::pin!(stream);
        while let Some(record) = stream.next().await {
            print_record(&record?);
        }
        return Ok(());
    }

    let response = client.requests(&params).await?;
    for record in response.requests.iter().rev() {
        print_record(record);
    }
    Ok(())
}

pub async fn request(config_path: &Path, id: &str, body: bool) -> Result<()> {
    let client = connect(config_path)?;
    let record = client.request(id, body).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn print_record(record: &RequestRecord) {
    println!(
        "{} {} {:<6} {} {:>4}ms {:<12} {}",
        record.id,
        record.timestamp.format("%H:%M:%S"),
        record.method,
        record.status,
        record.duration_ms,
        record.subdomain,
        record.url
    );
}
