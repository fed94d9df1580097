// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-Sent Events endpoints for live logs and request records.
//!
//! Each connection owns one subscription; a drop guard unsubscribes when
//! the client goes away. The first frame is a `: connected` comment, then
//! one `data:` frame per JSON-encoded event.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use prox_proxy::RequestTracker;
use prox_supervisor::LogBuffer;

use super::handlers::{LogsQuery, RequestsQuery};
use super::{ApiError, ApiState};

/// Unsubscribes on drop, whichever stream owned it.
enum SubscriptionGuard {
    Logs { logbuf: Arc<LogBuffer>, id: u64 },
    Requests { tracker: Arc<RequestTracker>, id: u64 },
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        match self {
            SubscriptionGuard::Logs { logbuf, id } => logbuf.unsubscribe(*id),
            SubscriptionGuard::Requests { tracker, id } => tracker.unsubscribe(*id),
        }
    }
}

pub(super) async fn logs_stream(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let logbuf = Arc::clone(state.supervisor.logbuf());
    let sub = logbuf.subscribe(query.filter())?;
    let guard = SubscriptionGuard::Logs { logbuf, id: sub.id };
    Ok(sse_response(sub.rx, guard))
}

pub(super) async fn requests_stream(
    State(state): State<ApiState>,
    Query(query): Query<RequestsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tracker = Arc::clone(state.tracker.as_ref().ok_or_else(ApiError::proxy_not_enabled)?);
    let sub = tracker.subscribe(query.filter());
    let guard = SubscriptionGuard::Requests { tracker, id: sub.id };
    Ok(sse_response(sub.rx, guard))
}

fn sse_response<T: Serialize + Send + 'static>(
    rx: mpsc::Receiver<T>,
    guard: SubscriptionGuard,
) -> impl IntoResponse {
    let headers = [("x-accel-buffering", "no"), ("cache-control", "no-cache")];
    (headers, Sse::new(event_stream(rx, guard)).keep_alive(KeepAlive::default()))
}

fn event_stream<T: Serialize + Send + 'static>(
    rx: mpsc::Receiver<T>,
    guard: SubscriptionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let connected = stream::once(async { Ok(Event::default().comment("connected")) });
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let item = rx.recv().await?;
        let event = Event::default()
            .json_data(&item)
            .unwrap_or_else(|_| Event::default().comment("serialization failed"));
        Some((Ok(event), (rx, guard)))
    });
    connected.chain(events)
}
