//! Networked cache backend on Redis.
//!
//! Layout under the configured prefix:
//!
//! - `<prefix><key>`: cached body, written with `SET .. EX ttl`
//! - `<prefix>tag:<tag>`: sorted set of entry keys carrying the tag
//! - `<prefix>keys` / `<prefix>tags`: sorted-set registries of every entry key and tag set
//!   written, so `clear` removes only our own keys without `KEYS` or `FLUSHALL`
//!
//! Index members are scored with their expiry time (unix seconds). Every write prunes
//! members whose entry has already expired and pushes the index's own `EXPIRE` out to
//! the entry TTL, so the indexes stay bounded by the live entries and vanish once idle.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::CacheStore;
use crate::Error;
use crate::config::{CacheConfig, CacheEngine};

/// Key naming under a shared prefix.
#[derive(Debug, Clone)]
struct Keyspace {
    prefix: String,
}

impl Keyspace {
    fn entry(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn tag(&self, tag: &str) -> String {
        format!("{}tag:{}", self.prefix, tag)
    }

    fn key_registry(&self) -> String {
        format!("{}keys", self.prefix)
    }

    fn tag_registry(&self) -> String {
        format!("{}tags", self.prefix)
    }
}

/// Redis store with a self-healing connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    keys: Keyspace,
    ttl_secs: u64,
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

impl RedisStore {
    /// Connect and probe the server once.
    ///
    /// The probe is a single connection attempt bounded by `probe_timeout`, so an
    /// unreachable server fails fast instead of entering the manager's retry loop.
    pub async fn connect(config: &CacheConfig, probe_timeout: Duration) -> Result<Self, Error> {
        let url = config
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::Cache("redis engine requires a connection url".into()))?;

        let client = redis::Client::open(url)?;

        let conn = tokio::time::timeout(probe_timeout, async {
            client.get_multiplexed_async_connection().await?;
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|_| Error::Cache(format!("redis probe timed out after {}ms", probe_timeout.as_millis())))??;

        Ok(Self { conn, keys: Keyspace { prefix: config.key_prefix.clone() }, ttl_secs: config.ttl })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(self.keys.entry(key)).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, tags: &[String]) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let entry = self.keys.entry(key);
        let now = unix_now();
        let expires_at = now + self.ttl_secs;
        let index_ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);

        let mut pipe = redis::pipe();
        pipe.atomic().set_ex(&entry, value.as_ref(), self.ttl_secs).ignore();
        index_member(&mut pipe, &self.keys.key_registry(), &entry, expires_at, now, index_ttl);

        for tag in tags {
            let tag_key = self.keys.tag(tag);
            index_member(&mut pipe, &tag_key, &entry, expires_at, now, index_ttl);
            index_member(&mut pipe, &self.keys.tag_registry(), &tag_key, expires_at, now, index_ttl);
        }

        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn invalidate(&self, tags: &[String]) -> Result<(), Error> {
        let mut conn = self.conn.clone();

        for tag in tags {
            let tag_key = self.keys.tag(tag);
            let members: Vec<String> = conn.zrange(&tag_key, 0, -1).await?;

            if !members.is_empty() {
                conn.del::<_, ()>(&members).await?;
                conn.zrem::<_, _, ()>(self.keys.key_registry(), &members).await?;
            }

            conn.del::<_, ()>(&tag_key).await?;
            conn.zrem::<_, _, ()>(self.keys.tag_registry(), &tag_key).await?;

            tracing::debug!(tag = %tag, entries = members.len(), "redis tag invalidated");
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut conn = self.conn.clone();

        let mut doomed: Vec<String> = conn.zrange(self.keys.key_registry(), 0, -1).await?;
        let tag_sets: Vec<String> = conn.zrange(self.keys.tag_registry(), 0, -1).await?;
        doomed.extend(tag_sets);
        doomed.push(self.keys.key_registry());
        doomed.push(self.keys.tag_registry());

        conn.del::<_, ()>(&doomed).await?;

        tracing::debug!(keys = doomed.len(), "redis cache cleared");
        Ok(())
    }

    fn engine(&self) -> CacheEngine {
        CacheEngine::Redis
    }
}

/// Add `member` to the index at `index`, drop members already expired at `now`,
/// and keep the index itself alive for one more TTL.
fn index_member(pipe: &mut redis::Pipeline, index: &str, member: &str, expires_at: u64, now: u64, ttl: i64) {
    pipe.zadd(index, member, expires_at)
        .ignore()
        .zrembyscore(index, "-inf", now)
        .ignore()
        .expire(index, ttl)
        .ignore();
}
