//! Redis-backed conversation store.
//!
//! Each conversation is a Redis list of JSON-encoded history items under the
//! policy key. Appends push to the tail, refresh the key's expiry and pop
//! from the head until the list fits the cap.

use async_trait::async_trait;
use ragrelay_core::conversation::{ConversationStore, HistoryPolicy};
use ragrelay_core::error::StoreError;
use ragrelay_core::history::{HistoryItem, HistoryItems};
use ragrelay_core::message::ConversationId;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{info, warn};

pub struct RedisConversationStore {
    conn: ConnectionManager,
    policy: HistoryPolicy,
}

impl RedisConversationStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str, policy: HistoryPolicy) -> Result<Self, StoreError> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Storage(format!("Invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to connect to Redis: {e}")))?;
        info!("Redis conversation store connected");
        Ok(Self { conn, policy })
    }
}

fn query_failed(e: redis::RedisError) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn append(&self, id: &ConversationId, item: &HistoryItem) -> Result<usize, StoreError> {
        let key = self.policy.key_for(id);
        let data = serde_json::to_string(item)
            .map_err(|e| StoreError::Storage(format!("Failed to encode history item: {e}")))?;
        let mut conn = self.conn.clone();

        let mut len: usize = conn.rpush(&key, &data).await.map_err(query_failed)?;
        let _: () = conn
            .expire(&key, self.policy.ttl.as_secs() as i64)
            .await
            .map_err(query_failed)?;

        while len > self.policy.max_items {
            let _: Option<String> = conn.lpop(&key, None).await.map_err(query_failed)?;
            len -= 1;
        }
        Ok(len)
    }

    async fn list(&self, id: &ConversationId) -> Result<HistoryItems, StoreError> {
        let key = self.policy.key_for(id);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await.map_err(query_failed)?;

        Ok(raw
            .iter()
            .filter_map(|line| match serde_json::from_str::<HistoryItem>(line) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping corrupted history item");
                    None
                }
            })
            .collect())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), StoreError> {
        let key = self.policy.key_for(id);
        let mut conn = self.conn.clone();
        let _: () = conn.del(&key).await.map_err(query_failed)?;
        Ok(())
    }
}
