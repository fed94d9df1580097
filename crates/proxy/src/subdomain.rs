// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subdomain extraction from the `Host` header.

/// Extract the leftmost label preceding `.{domain}` from a host header.
///
/// The suffix match requires the literal dot, so `evillocal.dev` does not
/// pass for domain `local.dev`. Returns `None` for the bare domain, a
/// non-matching host, or an empty label.
pub fn extract(host: &str, domain: &str) -> Option<String> {
    let host = strip_port(host);
    let prefix = host.strip_suffix(domain)?.strip_suffix('.')?;
    let label = prefix.split('.').next()?;
    if label.is_empty() {
        return None;
    }
    Some(label.to_string())
}

/// Drop a trailing `:port`, handling bracketed IPv6 literals.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
        return host;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
#[path = "subdomain_tests.rs"]
mod tests;
