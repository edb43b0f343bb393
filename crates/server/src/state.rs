//! Shared handler state.

use std::sync::Arc;
use std::time::Instant;

use meiliproxy_client::UpstreamClient;
use meiliproxy_core::{AppConfig, SharedStore};

/// Dependencies handed to every request handler.
///
/// Cloned per request; every field is either `Arc`-backed or cheap to copy.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SharedStore,
    pub upstream: UpstreamClient,
    /// Process start, for the auto-restart health check.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, store: SharedStore, upstream: UpstreamClient) -> Self {
        Self { config: Arc::new(config), store, upstream, started_at: Instant::now() }
    }
}
