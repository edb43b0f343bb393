//! HTTP surface of the meilisearch proxy.
//!
//! Request flow, outermost first:
//! 1. `TraceLayer` opens a span per request
//! 2. header policy (CORS, no-store, preflight short-circuit)
//! 3. `/health`, served without credentials
//! 4. credential overlay
//! 5. dispatcher: cached search, purge, or pass-through

pub mod dispatch;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_app, serve};
pub use state::AppState;
