/// Token revocation blacklist
///
/// Records blacklisted token identifiers until their natural expiry. Entries
/// are keyed by SHA-256 hash so raw tokens never land in the store, and the
/// TTL equals the token's remaining validity, which bounds store growth: a
/// revocation entry never outlives the token it blocks.
///
/// Store failure surfaces as `DependencyUnavailable` so the orchestrator can
/// fail closed during verification instead of treating "unknown" as "not
/// revoked".
use crate::error::Result;
use crate::redis_pool::SharedConnectionManager;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// TTL-capable key-value blacklist
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `key` for `ttl_seconds`. A non-positive TTL is a no-op (there
    /// is nothing left to block). Idempotent.
    async fn put(&self, key: &str, ttl_seconds: i64) -> Result<()>;

    /// O(1) membership check
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Hash a token for storage
///
/// Prevents token leakage in store dumps or logs; hex-encoded SHA-256.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Redis-backed blacklist shared across stateless instances
pub struct RedisRevocationStore {
    redis: SharedConnectionManager,
}

impl RedisRevocationStore {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    fn key(key: &str) -> String {
        format!("boxoffice:revoked:{key}")
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn put(&self, key: &str, ttl_seconds: i64) -> Result<()> {
        if ttl_seconds <= 0 {
            return Ok(());
        }

        let mut conn = self.redis.lock().await.clone();
        redis::cmd("SET")
            .arg(Self::key(key))
            .arg("1")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::info!(ttl_seconds, "Token revoked, blacklist entry expires with the token");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.redis.lock().await.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(key))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }
}

/// In-memory blacklist for tests and single-process deployments
///
/// Entries carry their deadline and are evicted lazily on lookup.
#[derive(Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn put(&self, key: &str, ttl_seconds: i64) -> Result<()> {
        if ttl_seconds <= 0 {
            return Ok(());
        }
        let deadline = Utc::now() + Duration::seconds(ttl_seconds);
        self.entries.insert(key.to_string(), deadline);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.entries.get(key) {
            if *entry.value() > Utc::now() {
                return Ok(true);
            }
            drop(entry);
            self.entries.remove(key);
        }
        Ok(false)
    }
}
