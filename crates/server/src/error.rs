//! HTTP rendering of proxy errors.
//!
//! Every failure leaves the proxy as `{"code": "...", "message": "..."}`
//! with a status derived from the error kind.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meiliproxy_core::Error;
use serde::Serialize;

/// A core error paired with the status it is reported under.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct ApiError {
    status: StatusCode,
    source: Error,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    /// Report `source` under an explicit status.
    pub fn with_status(status: StatusCode, source: Error) -> Self {
        Self { status, source }
    }

    /// Report `source` as a 500 regardless of its kind.
    pub fn internal(source: Error) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, source)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(source: Error) -> Self {
        let status = match &source {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamUnreachable(_) | Error::Upstream(_) | Error::Decompression(_) => StatusCode::BAD_GATEWAY,
            Error::BodyRead(_) | Error::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { code: self.source.code(), message: self.source.message() };
        (self.status, Json(body)).into_response()
    }
}
