use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::fingerprint::CacheFingerprint;
use crate::models::CrawlResult;
use crate::normalizer;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("cache store unreachable: {0}")]
    Unreachable(String),
}

/// A key-value store with expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> std::result::Result<(), CacheError>;
    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> std::result::Result<bool, CacheError>;
    async fn ping(&self) -> std::result::Result<(), CacheError>;
}

/// Redis behind a connection manager. A dropped socket fails the call in flight
/// and is reopened in the background for the calls after it.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens a connection and checks it with a PING.
    pub async fn connect(url: &str) -> std::result::Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Unreachable(format!("connect timed out after {:?}", CONNECT_TIMEOUT)))??;

        let store = Self { conn };
        store.ping().await?;
        Ok(store)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> std::result::Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> std::result::Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> std::result::Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

/// Crawl results keyed by fingerprint.
///
/// Reads and writes degrade silently when the store is missing or failing: a read
/// is a miss, a write is dropped. Only [`ResultCache::delete`] reports the outage,
/// since there is no safe fallback for it.
#[derive(Clone)]
pub struct ResultCache {
    store: Option<Arc<dyn CacheStore>>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A cache with no backing store; every read misses.
    pub fn disconnected() -> Self {
        Self { store: None }
    }

    /// Connects to redis, falling back to a disconnected cache if that fails.
    pub async fn connect_redis(url: &str) -> Self {
        match RedisStore::connect(url).await {
            Ok(store) => {
                info!("Cache store connected successfully");
                Self::new(Arc::new(store))
            }
            Err(e) => {
                tracing::error!("Cache store connection failed: {}", e);
                Self::disconnected()
            }
        }
    }

    pub async fn get(&self, key: &CacheFingerprint) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(key.as_str()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, "Cache retrieval error: {}", e);
                None
            }
        }
    }

    pub async fn set(&self, key: &CacheFingerprint, value: &str, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.set_ex(key.as_str(), value, ttl).await {
            warn!(key = %key, "Cache storage error: {}", e);
        }
    }

    pub async fn delete(&self, key: &CacheFingerprint) -> Result<bool> {
        let store = self.store.as_ref().ok_or(AppError::CacheUnavailable)?;
        store.delete(key.as_str()).await.map_err(|e| {
            warn!(key = %key, "Cache delete error: {}", e);
            AppError::CacheUnavailable
        })
    }

    /// Probes the store; used by the health check.
    pub async fn is_connected(&self) -> bool {
        match &self.store {
            Some(store) => store.ping().await.is_ok(),
            None => false,
        }
    }

    /// Reads and re-normalizes a stored result. Undecodable entries count as a miss.
    pub async fn get_result(&self, key: &CacheFingerprint) -> Option<CrawlResult> {
        let cached = self.get(key).await?;
        match normalizer::from_cached(&cached) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(key = %key, "Discarding undecodable cache entry: {}", e);
                None
            }
        }
    }

    pub async fn put_result(&self, key: &CacheFingerprint, result: &CrawlResult, ttl: Duration) {
        match serde_json::to_string(result) {
            Ok(json) => self.set(key, &json, ttl).await,
            Err(e) => warn!(key = %key, "Failed to serialize crawl result: {}", e),
        }
    }
}
