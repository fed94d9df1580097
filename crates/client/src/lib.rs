// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! prox-client: HTTP + SSE transport for the control API.
//!
//! The CLI (and any other frontend) talks to the daemon exclusively
//! through [`ApiClient`]. Discovery reads the daemon's published state
//! file; authentication reads the shared token file.

mod client;

pub use client::{ApiClient, ClientError, LogsParams, RequestsParams};
