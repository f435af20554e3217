//! Built-in edge proxy: `GET /proxy?target=<url>`.
//!
//! Forwards the GET, caches 2xx bodies per target for a short TTL and adds
//! permissive CORS headers so a browser client can reach the provider.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::fetcher::transport::redact;
use crate::fetcher::Transport;
use crate::state::{cache_key, EdgeCache};

const CACHE_HEADER: &str = "x-proxy-cache";

pub struct EdgeProxy {
    transport: Arc<dyn Transport>,
    cache: EdgeCache,
    ttl: Duration,
}

#[derive(Deserialize)]
pub struct ProxyQuery {
    pub target: Option<String>,
}

impl EdgeProxy {
    pub fn new(transport: Arc<dyn Transport>, cache: EdgeCache, ttl: Duration) -> Self {
        Self { transport, cache, ttl }
    }

    /// Drop expired cached responses; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub async fn handle(&self, target: Option<&str>) -> Response {
        let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) else {
            return (StatusCode::BAD_REQUEST, "Missing target URL").into_response();
        };

        let key = cache_key(target);
        if let Some(body) = self.cache.get(&key) {
            debug!("[PROXY] HIT {}", redact(target));
            return json_response(StatusCode::OK, body, "HIT");
        }

        match self.transport.get(target).await {
            Ok(resp) => {
                let status =
                    StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
                if status.is_success() {
                    self.cache.put(&key, resp.body.clone(), self.ttl);
                }
                debug!(status = resp.status, "[PROXY] MISS {}", redact(target));
                json_response(status, resp.body, "MISS")
            }
            Err(e) => {
                warn!("[PROXY] {} failed: {e}", redact(target));
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Proxy Error: {e}")).into_response()
            }
        }
    }
}

fn with_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,HEAD,POST,OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
}

fn json_response(status: StatusCode, body: Vec<u8>, cache: &'static str) -> Response {
    let mut resp = (status, body).into_response();
    let headers = resp.headers_mut();
    with_cors(headers);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_HEADER, HeaderValue::from_static(cache));
    resp
}

/// CORS preflight. Echoes the requested headers back as allowed.
pub fn preflight(requested: Option<&HeaderValue>) -> Response {
    let mut resp = StatusCode::OK.into_response();
    let headers = resp.headers_mut();
    with_cors(headers);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        requested.cloned().unwrap_or_else(|| HeaderValue::from_static("")),
    );
    resp
}

async fn proxy_get(State(proxy): State<Arc<EdgeProxy>>, Query(q): Query<ProxyQuery>) -> Response {
    proxy.handle(q.target.as_deref()).await
}

async fn proxy_options(headers: HeaderMap) -> Response {
    preflight(headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS))
}

pub fn router(proxy: Arc<EdgeProxy>) -> Router {
    Router::new()
        .route("/proxy", get(proxy_get).options(proxy_options))
        .with_state(proxy)
}
