//! Per-session Q/A history
//!
//! One bounded list per session, newest entry first. The oldest entries
//! fall off once the cap is reached.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Entries kept per session.
pub const HISTORY_CAP: usize = 10;

/// Answer characters kept in a history entry.
const ANSWER_PREFIX_CHARS: usize = 100;

pub fn history_key(session_id: &str) -> String {
    format!("chat_history:{}", session_id)
}

/// Compact `Q:/A:` record of one completed exchange.
pub fn summarize_exchange(question: &str, answer: &str) -> String {
    let prefix: String = answer.chars().take(ANSWER_PREFIX_CHARS).collect();
    format!("Q: {}\nA: {}...", question, prefix)
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, session_id: &str, entry: String) -> Result<()>;

    /// Newest first, at most [`HISTORY_CAP`] entries.
    async fn recent(&self, session_id: &str) -> Result<Vec<String>>;
}

/// In-memory history for development
pub struct InMemoryHistoryStore {
    histories: Arc<RwLock<HashMap<String, VecDeque<String>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            histories: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, session_id: &str, entry: String) -> Result<()> {
        let mut histories = self.histories.write().await;
        let list = histories.entry(history_key(session_id)).or_default();
        list.push_front(entry);
        list.truncate(HISTORY_CAP);
        Ok(())
    }

    async fn recent(&self, session_id: &str) -> Result<Vec<String>> {
        let histories = self.histories.read().await;
        Ok(histories
            .get(&history_key(session_id))
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Redis list per session: LPUSH + LTRIM.
pub struct RedisHistoryStore {
    client: redis::Client,
}

impl RedisHistoryStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OrchestrationError::HistoryError(e.to_string()))
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append(&self, session_id: &str, entry: String) -> Result<()> {
        let key = history_key(session_id);
        let mut conn = self.connection().await?;

        redis::pipe()
            .atomic()
            .lpush(&key, entry)
            .ignore()
            .ltrim(&key, 0, HISTORY_CAP as isize - 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| OrchestrationError::HistoryError(e.to_string()))
    }

    async fn recent(&self, session_id: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        conn.lrange(history_key(session_id), 0, HISTORY_CAP as isize - 1)
            .await
            .map_err(|e| OrchestrationError::HistoryError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_exchange_truncates_by_chars() {
        let answer = "가".repeat(150);
        let entry = summarize_exchange("이번 달 식비 얼마야?", &answer);

        assert!(entry.starts_with("Q: 이번 달 식비 얼마야?\nA: "));
        assert!(entry.ends_with("..."));
        assert_eq!(entry.matches('가').count(), 100);
    }

    #[test]
    fn test_short_answer_kept_whole() {
        assert_eq!(summarize_exchange("q", "short"), "Q: q\nA: short...");
    }

    #[tokio::test]
    async fn test_history_is_capped_newest_first() {
        let store = InMemoryHistoryStore::new();
        for i in 0..25 {
            store.append("sess-1", format!("entry {}", i)).await.unwrap();
        }

        let recent = store.recent("sess-1").await.unwrap();
        assert_eq!(recent.len(), HISTORY_CAP);
        assert_eq!(recent[0], "entry 24");
        assert_eq!(recent[9], "entry 15");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = InMemoryHistoryStore::new();
        store.append("a", "one".into()).await.unwrap();

        assert_eq!(store.recent("a").await.unwrap().len(), 1);
        assert!(store.recent("b").await.unwrap().is_empty());
    }
}
