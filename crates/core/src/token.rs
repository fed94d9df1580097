// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Location and reading of the shared bearer token.
//!
//! The daemon generates the token on first use; the CLI reads it back.

use std::path::PathBuf;

/// `~/.prox/token`
pub fn token_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".prox").join("token"))
}

/// Read the token, trimming trailing whitespace. `None` when absent or
/// unreadable.
pub fn read_token() -> Option<String> {
    let path = token_path()?;
    let text = std::fs::read_to_string(path).ok()?;
    let token = text.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
