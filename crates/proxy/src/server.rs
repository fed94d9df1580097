// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse proxy core: subdomain routing, header rewriting, request
//! recording, and the HTTPS/HTTP listeners.
//!
//! Every request is recorded exactly once with its final status, even when
//! the client disconnects mid-body; a drop guard on the relayed body stream
//! carries the obligation. Upstream transport failures map to 502.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use axum::{Extension, Router};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::PrivateKeyDer;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use prox_core::{request_id, ProxyConfig, RequestDetails, RequestRecord, ServiceTarget};

use crate::capture::{BodyKind, CaptureBuf, CaptureManager};
use crate::subdomain;
use crate::tracker::RequestTracker;

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind proxy listener on port {0}: {1}")]
    Bind(u16, #[source] std::io::Error),

    #[error("failed to read TLS material from {0}: {1}")]
    TlsRead(PathBuf, #[source] std::io::Error),

    #[error("invalid TLS configuration: {0}")]
    Tls(String),
}

/// Peer address, injected per accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub SocketAddr);

#[derive(Clone)]
struct ProxyCtx {
    proxy: Arc<Proxy>,
    scheme: &'static str,
}

/// The routing table and shared upstream client.
pub struct Proxy {
    domain: String,
    services: BTreeMap<String, ServiceTarget>,
    client: reqwest::Client,
    tracker: Arc<RequestTracker>,
    capture: Option<Arc<CaptureManager>>,
}

impl Proxy {
    pub fn new(
        config: &ProxyConfig,
        tracker: Arc<RequestTracker>,
        capture: Option<Arc<CaptureManager>>,
    ) -> Self {
        // One pooled transport shared by every upstream call.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .connect_timeout(std::time::Duration::from_secs(10))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();

        Self {
            domain: config.domain.clone(),
            services: config.services.clone(),
            client,
            tracker,
            capture,
        }
    }

    /// Router for one listener; `scheme` feeds `X-Forwarded-Proto` and the
    /// recorded url.
    pub fn router(self: &Arc<Self>, scheme: &'static str) -> Router {
        let ctx = ProxyCtx { proxy: Arc::clone(self), scheme };
        Router::new().fallback(handle).with_state(ctx)
    }

    /// Bind the HTTPS listener (and the plain one when configured) and
    /// spawn their accept loops. Bind and TLS errors surface here.
    pub async fn spawn_listeners(
        self: &Arc<Self>,
        config: &ProxyConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, ProxyError> {
        let acceptor = load_tls(&config.cert_file, &config.key_file)?;
        let mut handles = Vec::new();

        let https = TcpListener::bind(("127.0.0.1", config.https_port))
            .await
            .map_err(|e| ProxyError::Bind(config.https_port, e))?;
        info!(port = config.https_port, domain = %self.domain, "proxy listening (https)");
        handles.push(tokio::spawn(accept_loop(
            https,
            Some(acceptor),
            self.router("https"),
            shutdown.clone(),
        )));

        if let Some(port) = config.http_port {
            let http = TcpListener::bind(("127.0.0.1", port))
                .await
                .map_err(|e| ProxyError::Bind(port, e))?;
            info!(port, "proxy listening (http)");
            handles.push(tokio::spawn(accept_loop(http, None, self.router("http"), shutdown)));
        }

        Ok(handles)
    }

    async fn proxy_request(&self, scheme: &'static str, req: Request) -> Response {
        let start = Instant::now();
        let timestamp = Utc::now();

        let method = req.method().clone();
        let host = req
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let path_q = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let url = format!("{scheme}://{host}{path_q}");
        let id = request_id(
            timestamp.timestamp_nanos_opt().unwrap_or_default(),
            method.as_str(),
            &url,
        );
        let client_ip = client_ip(req.headers(), req.extensions().get::<PeerAddr>());

        let mut pending = PendingRecord {
            tracker: Arc::clone(&self.tracker),
            capture: self.capture.clone(),
            id,
            timestamp,
            method: method.to_string(),
            url,
            subdomain: String::new(),
            status: 0,
            client_ip,
            start,
            details: None,
            request_ct: content_type_of(req.headers()),
            response_ct: String::new(),
            request_buf: None,
            response_buf: None,
        };

        let Some(sub) = subdomain::extract(&host, &self.domain) else {
            return pending.reject(StatusCode::NOT_FOUND, "No subdomain specified");
        };
        pending.subdomain = sub.clone();

        let Some(target) = self.services.get(&sub) else {
            debug!(subdomain = %sub, "no service mapped");
            return pending.reject(StatusCode::NOT_FOUND, "Unknown service");
        };

        if self.capture.is_some() {
            pending.details = Some(RequestDetails {
                request_headers: headers_to_map(req.headers()),
                ..Default::default()
            });
        }

        let response = self.forward(target, scheme, &host, &path_q, req, &mut pending).await;
        match response {
            Ok(response) => response,
            Err(e) => {
                let target = format!("{}:{}", target.host, target.port);
                warn!(subdomain = %sub, target = %target, "upstream error: {}", e);
                pending.reject(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }

    async fn forward(
        &self,
        target: &ServiceTarget,
        scheme: &'static str,
        host: &str,
        path_q: &str,
        req: Request,
        pending: &mut PendingRecord,
    ) -> Result<Response, reqwest::Error> {
        let (parts, body) = req.into_parts();

        let mut headers = HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            if !is_hop_by_hop(name) && name != HOST && name != CONTENT_LENGTH {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.insert("x-forwarded-host", best_effort_value(host));
        headers.insert("x-forwarded-proto", HeaderValue::from_static(scheme));
        headers.insert("x-real-ip", best_effort_value(&pending.client_ip));

        let target_url = format!("http://{}:{}{}", target.host, target.port, path_q);
        let mut builder = self.client.request(parts.method.clone(), &target_url).headers(headers);

        if request_has_body(&parts.method, &parts.headers) {
            let buf = self.capture.as_ref().map(|mgr| Arc::new(Mutex::new(mgr.buffer())));
            pending.request_buf = buf.clone();

            let stream = body.into_data_stream().map(move |chunk| {
                if let (Ok(bytes), Some(buf)) = (&chunk, &buf) {
                    buf.lock().extend(bytes);
                }
                chunk.map_err(std::io::Error::other)
            });
            builder = builder.body(reqwest::Body::wrap_stream(stream));
        }

        let upstream = builder.send().await?;

        let status = upstream.status();
        pending.status = status.as_u16();
        pending.response_ct = content_type_of(upstream.headers());
        if let Some(details) = pending.details.as_mut() {
            details.response_headers = headers_to_map(upstream.headers());
        }

        let mut response_headers = HeaderMap::new();
        for (name, value) in upstream.headers().iter() {
            if !is_hop_by_hop(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }

        let response_buf = self.capture.as_ref().map(|mgr| Arc::new(Mutex::new(mgr.buffer())));
        pending.response_buf = response_buf.clone();

        // The record is emitted when the relayed body finishes, or from
        // the guard's Drop when the client walks away first.
        let guard = pending.take_guard();
        let relay = RelayState { upstream: upstream.bytes_stream(), guard, buf: response_buf };
        let stream = futures_util::stream::unfold(relay, |mut st| async move {
            match st.upstream.next().await {
                Some(Ok(chunk)) => {
                    if let Some(buf) = &st.buf {
                        buf.lock().extend(&chunk);
                    }
                    Some((Ok(chunk), st))
                }
                Some(Err(e)) => {
                    st.guard.finish();
                    Some((Err(std::io::Error::other(e)), st))
                }
                None => {
                    st.guard.finish();
                    None
                }
            }
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

struct RelayState<S> {
    upstream: S,
    guard: RecordGuard,
    buf: Option<Arc<Mutex<CaptureBuf>>>,
}

async fn handle(State(ctx): State<ProxyCtx>, req: Request) -> Response {
    ctx.proxy.proxy_request(ctx.scheme, req).await
}

/// Everything needed to emit the record once the outcome is known.
struct PendingRecord {
    tracker: Arc<RequestTracker>,
    capture: Option<Arc<CaptureManager>>,
    id: String,
    timestamp: DateTime<Utc>,
    method: String,
    url: String,
    subdomain: String,
    status: u16,
    client_ip: String,
    start: Instant,
    details: Option<RequestDetails>,
    request_ct: String,
    response_ct: String,
    request_buf: Option<Arc<Mutex<CaptureBuf>>>,
    response_buf: Option<Arc<Mutex<CaptureBuf>>>,
}

impl PendingRecord {
    /// Short-circuit: record with `status` and return a plain-text error.
    fn reject(mut self, status: StatusCode, message: &'static str) -> Response {
        self.status = status.as_u16();
        self.take_guard().finish();
        plain_response(status, message)
    }

    fn take_guard(&mut self) -> RecordGuard {
        RecordGuard {
            inner: Some(RecordData {
                tracker: Arc::clone(&self.tracker),
                capture: self.capture.clone(),
                id: std::mem::take(&mut self.id),
                timestamp: self.timestamp,
                method: std::mem::take(&mut self.method),
                url: std::mem::take(&mut self.url),
                subdomain: std::mem::take(&mut self.subdomain),
                status: self.status,
                client_ip: std::mem::take(&mut self.client_ip),
                start: self.start,
                details: self.details.take(),
                request_ct: std::mem::take(&mut self.request_ct),
                response_ct: std::mem::take(&mut self.response_ct),
                request_buf: self.request_buf.take(),
                response_buf: self.response_buf.take(),
            }),
        }
    }
}

struct RecordData {
    tracker: Arc<RequestTracker>,
    capture: Option<Arc<CaptureManager>>,
    id: String,
    timestamp: DateTime<Utc>,
    method: String,
    url: String,
    subdomain: String,
    status: u16,
    client_ip: String,
    start: Instant,
    details: Option<RequestDetails>,
    request_ct: String,
    response_ct: String,
    request_buf: Option<Arc<Mutex<CaptureBuf>>>,
    response_buf: Option<Arc<Mutex<CaptureBuf>>>,
}

/// Emits the record exactly once: explicitly at stream end, or from `Drop`
/// when the body never completes.
struct RecordGuard {
    inner: Option<RecordData>,
}

impl RecordGuard {
    fn finish(&mut self) {
        let Some(mut data) = self.inner.take() else {
            return;
        };

        if let (Some(details), Some(capture)) = (data.details.as_mut(), data.capture.as_ref()) {
            if let Some(buf) = data.request_buf.take() {
                let buf = take_buf(&buf);
                details.request_body = capture.finalize(&data.id, BodyKind::Request, buf, &data.request_ct);
            }
            if let Some(buf) = data.response_buf.take() {
                let buf = take_buf(&buf);
                details.response_body =
                    capture.finalize(&data.id, BodyKind::Response, buf, &data.response_ct);
            }
        }

        data.tracker.record(RequestRecord {
            id: data.id,
            timestamp: data.timestamp,
            method: data.method,
            url: data.url,
            subdomain: data.subdomain,
            status: data.status,
            duration_ms: data.start.elapsed().as_millis() as u64,
            client_ip: data.client_ip,
            details: data.details,
        });
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

fn take_buf(buf: &Arc<Mutex<CaptureBuf>>) -> CaptureBuf {
    std::mem::replace(&mut *buf.lock(), CaptureBuf::empty())
}

/// Best-effort client ip: first `X-Forwarded-For` element, else
/// `X-Real-IP`, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<&PeerAddr>) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real.is_empty() {
            return real.to_string();
        }
    }
    peer.map(|p| p.0.ip().to_string()).unwrap_or_else(|| "-".to_string())
}

fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (name, value) in headers.iter() {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn request_has_body(method: &Method, headers: &HeaderMap) -> bool {
    if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return headers.contains_key(CONTENT_LENGTH) || headers.contains_key(TRANSFER_ENCODING);
    }
    true
}

fn best_effort_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn plain_response(status: StatusCode, message: &'static str) -> Response {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Accept connections until shutdown, serving each on its own task.
async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            },
        };

        let svc = router.clone().layer(Extension(PeerAddr(peer)));
        let tls = tls.clone();
        tokio::spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(tls_stream, svc).await,
                    Err(e) => debug!(%peer, "tls handshake failed: {}", e),
                },
                None => serve_connection(stream, svc).await,
            }
        });
    }
}

async fn serve_connection<S>(stream: S, svc: Router)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let hyper_svc = hyper::service::service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let svc = svc.clone();
        async move { svc.oneshot(req.map(Body::new)).await }
    });

    if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(stream), hyper_svc)
        .await
    {
        debug!("connection closed with error: {}", e);
    }
}

/// Load PEM cert/key into a TLS acceptor speaking h2 and http/1.1.
fn load_tls(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ProxyError> {
    let cert_file = std::fs::File::open(cert_path)
        .map_err(|e| ProxyError::TlsRead(cert_path.to_path_buf(), e))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| ProxyError::TlsRead(cert_path.to_path_buf(), e))?;
    if certs.is_empty() {
        return Err(ProxyError::Tls(format!("no certificates in {}", cert_path.display())));
    }

    let key_file = std::fs::File::open(key_path)
        .map_err(|e| ProxyError::TlsRead(key_path.to_path_buf(), e))?;
    let key: PrivateKeyDer = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .map_err(|e| ProxyError::TlsRead(key_path.to_path_buf(), e))?
        .ok_or_else(|| ProxyError::Tls(format!("no private key in {}", key_path.display())))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
