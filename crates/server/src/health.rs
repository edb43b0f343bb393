//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// `200` while healthy, `503` once the configured restart interval has elapsed.
pub async fn health(State(state): State<AppState>) -> StatusCode {
    match state.config.auto_restart_interval() {
        Some(interval) if state.started_at.elapsed() > interval => {
            tracing::warn!(interval_secs = interval.as_secs(), "restart interval elapsed, failing health check");
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::OK,
    }
}
