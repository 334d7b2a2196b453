// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-target reverse proxy.
//!
//! Every request that passes the interceptor is replayed against the target
//! URL: the request path is appended to the target path, queries are merged,
//! and the upstream status, headers and body are passed back.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    middleware,
    response::Response,
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use url::Url;

use crate::auth::error::ConfigError;
use crate::auth::middleware::authorize;
use crate::error::ProxyError;
use crate::state::AppState;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that only describe the current hop.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Replays requests against the target.
#[derive(Debug, Clone)]
pub struct Forwarder {
    target: Url,
    client: reqwest::Client,
}

impl Forwarder {
    /// `allow_insecure` skips certificate verification for the target.
    pub fn new(target: Url, allow_insecure: bool) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(allow_insecure)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self { target, client })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Upstream URL for a request path and query.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.target.clone();

        let base = self.target.path().trim_end_matches('/');
        if path.starts_with('/') {
            url.set_path(&format!("{base}{path}"));
        } else {
            url.set_path(&format!("{base}/{path}"));
        }

        let merged = match (self.target.query(), query) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{a}&{b}")),
            (Some(a), _) if !a.is_empty() => Some(a.to_string()),
            (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
            _ => None,
        };
        url.set_query(merged.as_deref());
        url
    }

    /// Send `request` upstream and convert the answer.
    pub async fn forward(&self, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let url = self.upstream_url(parts.uri.path(), parts.uri.query());

        let body = to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ProxyError::bad_request(format!("unable to read request body: {e}")))?;

        let mut headers = strip_hop_by_hop(parts.headers);
        headers.remove(header::HOST);

        debug!(method = %parts.method, %url, "forwarding request");
        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "upstream request failed");
                ProxyError::bad_gateway("")
            })?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers().clone());
        let bytes = upstream.bytes().await.map_err(|e| {
            warn!(error = %e, "failed to read upstream body");
            ProxyError::bad_gateway("")
        })?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    // Connection may name further per-hop headers.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

/// Fallback handler: forward everything that reached it.
pub async fn forward(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ProxyError> {
    state.forwarder.forward(request).await
}

pub fn router(state: AppState) -> Router {
    let interceptor = Arc::clone(&state.interceptor);

    Router::new()
        .fallback(forward)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(interceptor, authorize)),
        )
        .with_state(state)
}
