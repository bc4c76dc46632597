//! Session history and result cache
//!
//! Both come with an in-memory backend for development and a Redis backend
//! sharing one client.

pub mod cache;
pub mod history;

pub use cache::{CacheStore, InMemoryCacheStore, RedisCacheStore, ResultCache, CACHE_TTL};
pub use history::{
    summarize_exchange, HistoryStore, InMemoryHistoryStore, RedisHistoryStore, HISTORY_CAP,
};

use crate::config::Settings;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Open a Redis client and check that the server answers.
pub async fn connect_redis(url: &str) -> Result<redis::Client> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
    info!("Connected to redis");
    Ok(client)
}

/// History and cache stores for the configured backend.
///
/// Without `REDIS_URL` both live in process memory.
pub async fn stores_from_settings(
    settings: &Settings,
) -> Result<(Arc<dyn HistoryStore>, Arc<dyn CacheStore>)> {
    match &settings.redis_url {
        Some(url) => {
            let client = connect_redis(url).await?;
            Ok((
                Arc::new(RedisHistoryStore::new(client.clone())),
                Arc::new(RedisCacheStore::new(client)),
            ))
        }
        None => {
            warn!("REDIS_URL not set, history and cache are kept in memory");
            Ok((
                Arc::new(InMemoryHistoryStore::new()),
                Arc::new(InMemoryCacheStore::new()),
            ))
        }
    }
}
