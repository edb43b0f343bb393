//! Ordered request stages wrapped around the dispatcher.
//!
//! - [`header_policy`] runs first. It answers `OPTIONS` preflights with `204` and stamps
//!   CORS and no-store headers on every response, including error responses from inner stages.
//! - [`auth_overlay`] runs second. In override mode it rejects callers that do not present the
//!   proxy key and swaps in the upstream master key. It always records the caller's original
//!   `Authorization` header as a [`ClientAuthorization`] extension for the purge check.

use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use meiliproxy_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Meilisearch-Client";
const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// `Authorization` header as presented by the caller, before any rewrite.
#[derive(Debug, Clone, Default)]
pub struct ClientAuthorization(pub Option<HeaderValue>);

/// Uniform response headers and preflight short-circuit.
pub async fn header_policy(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    apply_headers(response.headers_mut());
    response
}

fn apply_headers(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers
        .entry(header::CONTENT_TYPE)
        .or_insert_with(|| HeaderValue::from_static("application/json"));
}

/// Master-key override.
pub async fn auth_overlay(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let presented = request.headers().get(header::AUTHORIZATION).cloned();

    if state.config.master_key_override {
        let expected = state.config.proxy_master_key.as_deref().unwrap_or_default();
        if !bearer_matches(presented.as_ref(), expected) {
            tracing::warn!(path = %request.uri().path(), "rejected request without the proxy master key");
            return ApiError::from(Error::Unauthorized("invalid master key".into())).into_response();
        }

        let upstream_key = state.config.upstream_master_key.as_deref().unwrap_or_default();
        match HeaderValue::try_from(format!("Bearer {upstream_key}")) {
            Ok(value) => {
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }
            Err(e) => {
                let reason = format!("upstream master key is not a valid header: {e}");
                return ApiError::internal(Error::InvalidInput(reason)).into_response();
            }
        }
    }

    request.extensions_mut().insert(ClientAuthorization(presented));
    next.run(request).await
}

/// Whether `presented` is exactly `Bearer <token>`.
pub(crate) fn bearer_matches(presented: Option<&HeaderValue>, token: &str) -> bool {
    presented
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|candidate| candidate == token)
}
