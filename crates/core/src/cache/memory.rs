//! Bounded in-process cache backend.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;

use super::CacheStore;
use crate::Error;
use crate::config::{CacheConfig, CacheEngine};

#[derive(Debug, Clone)]
struct CachedValue {
    body: Bytes,
    tags: Arc<[String]>,
}

/// In-memory store backed by moka.
///
/// Capacity is bounded by entry count and every entry expires after the
/// configured TTL. Tag invalidation registers a predicate; matching entries
/// stop being served immediately and are evicted in the background.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, CachedValue>,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .time_to_live(config.ttl())
            .max_capacity(config.max_entries)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        Ok(self.cache.get(key).await.map(|value| value.body))
    }

    async fn set(&self, key: &str, value: Bytes, tags: &[String]) -> Result<(), Error> {
        let value = CachedValue { body: value, tags: tags.into() };
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn invalidate(&self, tags: &[String]) -> Result<(), Error> {
        if tags.is_empty() {
            return Ok(());
        }

        let tags = tags.to_vec();
        self.cache
            .invalidate_entries_if(move |_, value| value.tags.iter().any(|tag| tags.contains(tag)))
            .map_err(|e| Error::Cache(format!("failed to register invalidation: {e}")))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.cache.invalidate_all();
        Ok(())
    }

    fn engine(&self) -> CacheEngine {
        CacheEngine::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> MemoryStore {
        MemoryStore::new(&CacheConfig::default())
    }

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = store();
        store.set("key", Bytes::from_static(b"value"), &[]).await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some(Bytes::from_static(b"value")));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = store();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = store();
        store.set("key", Bytes::from_static(br#"{"old":1}"#), &[]).await.unwrap();
        store.set("key", Bytes::from_static(br#"{"new":2}"#), &[]).await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some(Bytes::from_static(br#"{"new":2}"#)));
    }

    #[tokio::test]
    async fn test_invalidate_by_tag() {
        let store = store();
        store.set("a", Bytes::from_static(b"1"), &tags(&["products"])).await.unwrap();
        store.set("b", Bytes::from_static(b"2"), &tags(&["articles"])).await.unwrap();
        store.set("c", Bytes::from_static(b"3"), &tags(&["products", "articles"])).await.unwrap();

        store.invalidate(&tags(&["products"])).await.unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("c").await.unwrap().is_none());
        assert_eq!(store.get("b").await.unwrap(), Some(Bytes::from_static(b"2")));
    }

    #[tokio::test]
    async fn test_invalidate_without_tags_is_noop() {
        let store = store();
        store.set("a", Bytes::from_static(b"1"), &tags(&["products"])).await.unwrap();
        store.set("b", Bytes::from_static(b"2"), &[]).await.unwrap();

        store.invalidate(&[]).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_entries_written_after_invalidation_survive() {
        let store = store();
        store.set("a", Bytes::from_static(b"old"), &tags(&["products"])).await.unwrap();
        store.invalidate(&tags(&["products"])).await.unwrap();
        store.set("a", Bytes::from_static(b"new"), &tags(&["products"])).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = store();
        store.set("a", Bytes::from_static(b"1"), &tags(&["products"])).await.unwrap();
        store.set("b", Bytes::from_static(b"2"), &[]).await.unwrap();

        store.clear().await.unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new(&CacheConfig { ttl: 1, ..Default::default() });
        store.set("expiring", Bytes::from_static(b"{}"), &[]).await.unwrap();
        assert!(store.get("expiring").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(store.get("expiring").await.unwrap().is_none());
    }
}
