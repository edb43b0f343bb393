//! meilisearch-proxy entry point.
//!
//! Boots the caching reverse proxy. Logs are JSON on stderr.

use anyhow::{Context, Result};
use meiliproxy_client::{UpstreamClient, UpstreamConfig};
use meiliproxy_core::{AppConfig, cache};
use meiliproxy_server::{AppState, serve};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .json()
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let config = AppConfig::load().context("invalid configuration")?;
    let upstream = UpstreamClient::new(UpstreamConfig::from_app(&config)?)?;

    if config.skip_startup_probe {
        tracing::info!("startup probe skipped");
    } else {
        upstream
            .probe()
            .await
            .with_context(|| format!("upstream {} is not reachable", config.upstream_url))?;
        tracing::info!(upstream = %config.upstream_url, "upstream reachable");
    }

    if let Some(interval) = config.auto_restart_interval() {
        tracing::info!(interval_secs = interval.as_secs(), "auto restart interval set");
    }

    let store = cache::connect(&config.cache, config.probe_timeout()).await;
    serve(AppState::new(config, store, upstream)).await?;

    Ok(())
}

/// `RUST_LOG`, else the legacy `LOG_LEVEL`, else `info`.
fn env_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
