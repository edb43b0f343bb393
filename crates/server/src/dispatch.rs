//! Terminal handlers for proxied requests.
//!
//! ### Cached search
//! - Key = fingerprint of the path (plus query) and, for POST/PUT/PATCH, the request body
//! - Hit: stored bytes are served with `200` and no upstream call
//! - Miss: the upstream response is captured and decoded, relayed to the caller, and stored
//!   tagged with the index name when it is a `200` with a non-empty body
//! - Store failures never fail the request: lookups degrade to a miss, writes are logged
//!
//! ### Purge
//! - `POST` only; `/purge` clears everything, `/purge/{index}` drops one index's entries
//! - Bearer token checked against the caller's original `Authorization` header
//! - Refused with `500` when the upstream cannot be reached
//!
//! ### Pass-through
//! Streamed both ways, no buffering and no cache involvement.

use std::net::{IpAddr, SocketAddr};

use axum::Json;
use axum::body::{Body, HttpBody, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use meiliproxy_client::upstream::end_to_end;
use meiliproxy_client::{CapturedResponse, UpstreamRequest};
use meiliproxy_core::route::{self, RouteClass};
use meiliproxy_core::Error;
use meiliproxy_core::cache::compute_cache_key;
use serde::Serialize;

use crate::error::ApiError;
use crate::pipeline::{ClientAuthorization, bearer_matches};
use crate::state::AppState;

/// Marks whether a cached-search response came from the store.
pub const X_PROXY_CACHE: &str = "x-proxy-cache";

/// Route the request to exactly one terminal handler.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let result = match route::classify(request.uri().path()) {
        RouteClass::CachedSearch => search(&state, request).await,
        RouteClass::Purge => purge(&state, request).await,
        RouteClass::PassThrough => pass_through(&state, request).await,
    };

    result.unwrap_or_else(|err| {
        tracing::warn!(status = %err.status(), error = %err, "request failed");
        err.into_response()
    })
}

async fn search(state: &AppState, request: Request) -> Result<Response, ApiError> {
    let client_ip = peer_ip(&request);
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_owned();
    let index = route::index_name(&path).map(str::to_owned);

    let body = to_bytes(body, state.config.max_body_bytes)
        .await
        .map_err(|e| ApiError::internal(Error::BodyRead(e.to_string())))?;
    let hashed_body = carries_body(&parts.method).then_some(body.as_ref());
    let key = compute_cache_key(&cache_target(&parts.uri), hashed_body);
    let index_field = index.as_deref().unwrap_or_default();

    match state.store.get(&key).await {
        Ok(Some(cached)) => {
            tracing::info!(index = index_field, path = %path, key = %key, "cache hit");
            return Ok(cached_response(cached));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(index = index_field, key = %key, error = %e, "cache lookup failed, treating as miss");
        }
    }

    tracing::info!(index = index_field, path = %path, key = %key, "cache miss");

    let captured = state.upstream.capture(upstream_request(parts, Body::from(body), client_ip)).await?;

    if captured.is_cacheable() {
        let tags: Vec<String> = index.iter().cloned().collect();
        if let Err(e) = state.store.set(&key, captured.body.clone(), &tags).await {
            tracing::error!(index = index_field, key = %key, error = %e, "failed to store response in cache");
        } else {
            tracing::debug!(index = index_field, key = %key, "stored response in cache");
        }
    } else {
        tracing::debug!(
            index = index_field,
            key = %key,
            status = %captured.status,
            "response not cached"
        );
    }

    Ok(captured_response(captured))
}

#[derive(Debug, Serialize)]
struct PurgeOutcome<'a> {
    purged: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
}

async fn purge(state: &AppState, request: Request) -> Result<Response, ApiError> {
    if request.method() != Method::POST {
        return Ok((StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "POST")]).into_response());
    }

    let index = route::index_name(request.uri().path());
    tracing::info!(index = index.unwrap_or_default(), "cache purge request received");

    if let Some(token) = state.config.purge_token.as_deref().filter(|t| !t.is_empty()) {
        let presented = match request.extensions().get::<ClientAuthorization>() {
            Some(ClientAuthorization(original)) => original.as_ref(),
            None => request.headers().get(header::AUTHORIZATION),
        };
        if !bearer_matches(presented, token) {
            tracing::error!("unauthorized purge request");
            return Err(Error::Unauthorized("invalid purge token".into()).into());
        }
    }

    state.upstream.probe().await.map_err(|e| {
        tracing::error!(error = %e, "refusing purge, upstream is unreachable");
        ApiError::internal(e)
    })?;

    let outcome = match index {
        Some(index) => state
            .store
            .invalidate(&[index.to_owned()])
            .await
            .map(|()| PurgeOutcome { purged: "index", index: Some(index) }),
        None => state.store.clear().await.map(|()| PurgeOutcome { purged: "all", index: None }),
    }
    .map_err(|e| {
        tracing::error!(error = %e, "error purging cache");
        ApiError::internal(e)
    })?;

    tracing::info!(
        index = outcome.index.unwrap_or_default(),
        engine = %state.store.engine(),
        "cache purged"
    );
    Ok((StatusCode::OK, Json(outcome)).into_response())
}

async fn pass_through(state: &AppState, request: Request) -> Result<Response, ApiError> {
    let client_ip = peer_ip(&request);
    let (parts, body) = request.into_parts();
    tracing::debug!(method = %parts.method, path = %parts.uri.path(), "forwarding request");

    let upstream = state.upstream.send(upstream_request(parts, body, client_ip)).await?;

    let status = upstream.status();
    let headers = end_to_end(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn upstream_request(parts: Parts, body: Body, client_ip: Option<IpAddr>) -> UpstreamRequest {
    UpstreamRequest {
        method: parts.method,
        path: parts.uri.path().to_owned(),
        query: parts.uri.query().map(str::to_owned),
        headers: parts.headers,
        body: outbound_body(body),
        client_ip,
    }
}

/// Known-empty bodies go out without chunked framing.
fn outbound_body(body: Body) -> meiliproxy_client::Body {
    if body.size_hint().exact() == Some(0) {
        meiliproxy_client::Body::from(Bytes::new())
    } else {
        meiliproxy_client::Body::wrap_stream(body.into_data_stream())
    }
}

fn peer_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Path plus query, so GET searches with different parameters get distinct keys.
fn cache_target(uri: &Uri) -> String {
    match uri.query() {
        Some(query) => format!("{}?{query}", uri.path()),
        None => uri.path().to_owned(),
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn cached_response(body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(X_PROXY_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn captured_response(captured: CapturedResponse) -> Response {
    let mut response = Response::new(Body::from(captured.body));
    *response.status_mut() = captured.status;
    *response.headers_mut() = captured.headers;
    response.headers_mut().insert(X_PROXY_CACHE, HeaderValue::from_static("MISS"));
    response
}
