//! Router assembly and the listen loop.

use std::net::SocketAddr;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::dispatch::dispatch;
use crate::health::health;
use crate::pipeline::{auth_overlay, header_policy};
use crate::state::AppState;

/// Build the full router.
///
/// `/health` sits outside the credential overlay; everything else goes through
/// the overlay into the dispatcher.
pub fn build_app(state: AppState) -> Router {
    let proxied = Router::new()
        .fallback(dispatch)
        .layer(from_fn_with_state(state.clone(), auth_overlay))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .fallback_service(proxied)
        .layer(from_fn(header_policy))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured port and serve until Ctrl+C.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, upstream = %state.config.upstream_url, engine = %state.store.engine(), "proxy listening");

    axum::serve(listener, build_app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
