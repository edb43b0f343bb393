//! Core types and shared functionality for the meilisearch proxy.
//!
//! This crate provides:
//! - Cache store abstraction with memory and redis backends
//! - Request fingerprinting and route classification
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod route;

pub use cache::{CacheStore, Fingerprint, SharedStore};
pub use config::{AppConfig, CacheConfig, CacheEngine, ConfigError};
pub use error::Error;
pub use route::RouteClass;
