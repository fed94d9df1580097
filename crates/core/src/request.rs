// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy request records, capture payloads, and the short-id rule.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derive the 7-hex-char request id from `nanos:method:url`.
///
/// Deterministic for the tuple; global uniqueness is not required, the
/// tracker stores whatever it is handed.
pub fn request_id(nanos: i64, method: &str, url: &str) -> String {
    let digest = Sha256::digest(format!("{nanos}:{method}:{url}").as_bytes());
    hex::encode(digest)[..7].to_string()
}

/// Where a captured body lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyStorage {
    /// Small bodies are kept in memory, base64 on the wire
    Inline(#[serde(with = "body_base64")] Vec<u8>),
    /// Larger bodies spill to a file under the capture directory
    File(PathBuf),
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// A captured request or response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedBody {
    /// Bytes observed on the wire, including any discarded past the cap
    pub size: u64,
    /// True when bytes beyond the capture cap were discarded
    pub truncated: bool,
    pub content_type: String,
    pub binary: bool,
    pub storage: BodyStorage,
}

/// Headers and optional bodies, present only when capture is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<CapturedBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<CapturedBody>,
}

/// One proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub subdomain: String,
    pub status: u16,
    pub duration_ms: u64,
    pub client_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<RequestDetails>,
}

/// Tracker history/subscription filter.
///
/// `min_status`/`max_status` of 0 mean "no bound on that side"; `since` is a
/// lower bound on the record timestamp; `limit` of 0 means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub min_status: u16,
    #[serde(default)]
    pub max_status: u16,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: usize,
}

impl RequestFilter {
    /// True when the record passes every configured predicate.
    pub fn matches(&self, record: &RequestRecord) -> bool {
        if let Some(ref sub) = self.subdomain {
            if record.subdomain != *sub {
                return false;
            }
        }
        if let Some(ref method) = self.method {
            if !record.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if self.min_status != 0 && record.status < self.min_status {
            return false;
        }
        if self.max_status != 0 && record.status > self.max_status {
            return false;
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
