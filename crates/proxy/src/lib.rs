// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! prox-proxy: the local HTTPS reverse proxy.
//!
//! Routes `<service>.<domain>` requests to configured local ports, records
//! every request in a bounded [`tracker::RequestTracker`], and optionally
//! captures headers and bodies through the [`capture::CaptureManager`].

pub mod capture;
pub mod server;
pub mod subdomain;
pub mod tracker;

pub use capture::{CaptureBuf, CaptureConfig, CaptureError, CaptureManager};
pub use server::{Proxy, ProxyError};
pub use tracker::{RequestTracker, TrackerSubscription};
