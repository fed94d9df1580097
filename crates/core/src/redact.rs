// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redaction of sensitive environment variables in API responses.

use std::collections::BTreeMap;

/// Substrings (of the uppercased name) that mark a variable as sensitive.
const SENSITIVE_MARKERS: &[&str] = &[
    "PASSWORD",
    "SECRET",
    "KEY",
    "TOKEN",
    "CREDENTIAL",
    "PRIVATE",
    "AUTH",
    "API_KEY",
    "APIKEY",
    "ACCESS_KEY",
    "ACCESSKEY",
];

const REDACTED: &str = "[REDACTED]";

/// Returns a copy of `env` with sensitive values replaced by `"[REDACTED]"`.
pub fn redact_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(k, v)| {
            let upper = k.to_ascii_uppercase();
            let value = if SENSITIVE_MARKERS.iter().any(|m| upper.contains(m)) {
                REDACTED.to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
