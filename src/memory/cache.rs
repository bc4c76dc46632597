//! Short-lived result cache
//!
//! Key layouts:
//! - `ledger_cache:{user_id}:{question}` → cached result rows
//! - `manual_cache:{user_id}:{sha256(question)}` → manually saved analysis

use crate::error::OrchestrationError;
use crate::models::Row;
use crate::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Plain string key/value store with expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if Instant::now() < *expires_at => {
                    return Ok(Some(value.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // expired
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        // reads only evict the key they look up
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}

pub struct RedisCacheStore {
    client: redis::Client,
}

impl RedisCacheStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OrchestrationError::CacheError(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| OrchestrationError::CacheError(e.to_string()))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| OrchestrationError::CacheError(e.to_string()))
    }
}

/// Key layouts and payload encoding over a [`CacheStore`].
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn query_key(user_id: &str, question: &str) -> String {
        format!("ledger_cache:{}:{}", user_id, question.trim())
    }

    pub fn manual_key(user_id: &str, question: &str) -> String {
        let digest = Sha256::digest(question.trim().as_bytes());
        format!("manual_cache:{}:{}", user_id, hex::encode(digest))
    }

    /// Cached rows for this user and literal question. Undecodable entries count as misses.
    pub async fn lookup_rows(&self, user_id: &str, question: &str) -> Result<Option<Vec<Row>>> {
        let key = Self::query_key(user_id, question);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Vec<Row>>(&raw) {
            Ok(rows) => {
                debug!(key = %key, rows = rows.len(), "Cache hit");
                Ok(Some(rows))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn store_rows(&self, user_id: &str, question: &str, rows: &[Row]) -> Result<()> {
        let payload = serde_json::to_string(rows)?;
        self.store
            .set_with_ttl(&Self::query_key(user_id, question), payload, self.ttl)
            .await
    }

    /// Persist an analysis and its chart; returns the key used.
    pub async fn save_manual(
        &self,
        user_id: &str,
        question: &str,
        analysis: &str,
        chart_data: &Value,
    ) -> Result<String> {
        let key = Self::manual_key(user_id, question);
        let payload = json!({
            "analysis": analysis,
            "chart_data": chart_data,
        });
        self.store
            .set_with_ttl(&key, payload.to_string(), self.ttl)
            .await?;
        Ok(key)
    }

    pub async fn load_manual(&self, user_id: &str, question: &str) -> Result<Option<Value>> {
        match self.store.get(&Self::manual_key(user_id, question)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ResultCache {
        ResultCache::new(Arc::new(InMemoryCacheStore::new()))
    }

    fn rows() -> Vec<Row> {
        vec![json!({"amount": 1000.0}).as_object().cloned().unwrap()]
    }

    #[test]
    fn test_key_layouts() {
        assert_eq!(
            ResultCache::query_key("u1", " 식비 내역 "),
            "ledger_cache:u1:식비 내역"
        );
        let manual = ResultCache::manual_key("u1", "식비 내역");
        assert!(manual.starts_with("manual_cache:u1:"));
        assert_eq!(manual.len(), "manual_cache:u1:".len() + 64);
    }

    #[tokio::test]
    async fn test_rows_round_trip_per_user() {
        let cache = cache();
        cache.store_rows("u1", "식비 내역", &rows()).await.unwrap();

        let hit = cache.lookup_rows("u1", "식비 내역").await.unwrap().unwrap();
        assert_eq!(hit[0]["amount"], json!(1000.0));
        assert!(cache.lookup_rows("u2", "식비 내역").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = cache().with_ttl(Duration::from_millis(20));
        cache.store_rows("u1", "q", &rows()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.lookup_rows("u1", "q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged_on_write() {
        let store = InMemoryCacheStore::new();
        for i in 0..1000 {
            store
                .set_with_ttl(&format!("manual_cache:u1:{}", i), "x".into(), Duration::from_millis(1))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.set_with_ttl("fresh", "y".into(), CACHE_TTL).await.unwrap();

        assert_eq!(store.entries.read().await.len(), 1);
        assert_eq!(store.get("fresh").await.unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(InMemoryCacheStore::new());
        store
            .set_with_ttl(&ResultCache::query_key("u1", "q"), "not json".into(), CACHE_TTL)
            .await
            .unwrap();

        let cache = ResultCache::new(store);
        assert!(cache.lookup_rows("u1", "q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_manual() {
        let cache = cache();
        let key = cache
            .save_manual("u1", "q", "분석", &json!({"data": []}))
            .await
            .unwrap();
        assert!(key.starts_with("manual_cache:u1:"));

        let saved = cache.load_manual("u1", "q").await.unwrap().unwrap();
        assert_eq!(saved["analysis"], "분석");
    }
}
