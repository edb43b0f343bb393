//! Cache store abstraction with pluggable backends.
//!
//! This module provides the uniform get/set/invalidate/clear contract used by
//! the request pipeline, plus two backends:
//!
//! - `memory`: bounded in-process cache, always available
//! - `redis`: networked cache shared between proxy instances
//!
//! Backend selection happens once at startup. A redis backend that fails its
//! reachability probe is replaced by the memory backend for the lifetime of
//! the process.

pub mod hash;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Error;
use crate::config::{CacheConfig, CacheEngine};

pub use hash::{Fingerprint, compute_cache_key};
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Uniform contract over every cache backend.
///
/// Implementations synchronize internally; callers share one instance across
/// all in-flight requests without extra locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a value. `Ok(None)` is the ordinary "not cached" outcome.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error>;

    /// Store a value with the configured TTL, replacing any existing entry.
    async fn set(&self, key: &str, value: Bytes, tags: &[String]) -> Result<(), Error>;

    /// Remove every entry carrying at least one of `tags`. No tags removes nothing.
    async fn invalidate(&self, tags: &[String]) -> Result<(), Error>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), Error>;

    /// The engine actually serving requests.
    fn engine(&self) -> CacheEngine;
}

/// Shared handle to the selected backend.
pub type SharedStore = Arc<dyn CacheStore>;

/// Build the configured backend, falling back to memory when redis is unreachable.
pub async fn connect(config: &CacheConfig, probe_timeout: Duration) -> SharedStore {
    tracing::info!(engine = %config.engine, ttl_secs = config.ttl, "creating cache store");

    match config.engine {
        CacheEngine::Memory => Arc::new(MemoryStore::new(config)),
        CacheEngine::Redis => match RedisStore::connect(config, probe_timeout).await {
            Ok(store) => {
                tracing::info!(prefix = %config.key_prefix, "using redis cache");
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!(error = %e, "redis not available, falling back to memory cache");
                Arc::new(MemoryStore::new(config))
            }
        },
    }
}
