// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP listener in front of the worker pool.
//!
//! Every path is routed to the pool. The listener only translates between
//! HTTP and [`RequestEnvelope`] / [`Response`]; routing by `path_info` is the
//! container's job.

use std::net::SocketAddr;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::pool::PoolHandle;
use crate::request::{PATH_INFO, REQUEST_METHOD, RequestEnvelope};
use crate::response::Response;

/// Shared state for the listener.
#[derive(Debug, Clone)]
pub struct ServerState {
    pool: PoolHandle,
    server_port: u16,
}

impl ServerState {
    /// State dispatching to `pool`, reporting `server_port` to the container.
    pub fn new(pool: PoolHandle, server_port: u16) -> Self {
        Self { pool, server_port }
    }
}

/// Catch-all router with a request body limit of `body_limit` bytes.
pub fn router(state: ServerState, body_limit: usize) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` flips to `true`.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn run_http_server_with_shutdown(
    listener: TcpListener,
    state: ServerState,
    body_limit: usize,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "HTTP listener started");

    let app = router(state, body_limit);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    })
    .await?;

    info!(addr = %addr, "HTTP listener stopped");
    Ok(())
}

async fn handle_request(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let envelope = build_envelope(&method, &uri, version, &headers, body, peer, state.server_port);

    match state.pool.dispatch(envelope).await {
        Ok(response) => into_http_response(response),
        Err(e) => {
            warn!(error = %e, path = %uri.path(), "Request could not be served");
            into_http_response(Response::error(503, "SERVICE_UNAVAILABLE", e))
        }
    }
}

/// Build the envelope a worker sees for one HTTP request.
///
/// Header names are lowercased; repeated headers are joined with `", "`.
pub fn build_envelope(
    method: &Method,
    uri: &Uri,
    version: Version,
    headers: &HeaderMap,
    body: Bytes,
    peer: SocketAddr,
    server_port: u16,
) -> RequestEnvelope {
    let mut envelope = RequestEnvelope::new(body);

    for name in headers.keys() {
        let value = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        envelope.header.insert(name.as_str().to_ascii_lowercase(), value);
    }

    envelope = envelope
        .with_server(REQUEST_METHOD, method.as_str())
        .with_server("request_uri", uri.path())
        .with_server(PATH_INFO, uri.path())
        .with_server("server_protocol", format!("{:?}", version))
        .with_server("server_port", server_port.to_string())
        .with_server("remote_addr", peer.ip().to_string())
        .with_server("remote_port", peer.port().to_string())
        .with_server("request_time", chrono::Utc::now().timestamp().to_string());
    if let Some(query) = uri.query() {
        envelope = envelope.with_server("query_string", query);
    }
    envelope
}

fn into_http_response(response: Response) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = axum::response::Response::new(Body::from(response.content));
    *http.status_mut() = status;
    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }
    http
}
