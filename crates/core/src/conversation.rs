//! Conversation persistence: a bounded, expiring list per conversation id.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::history::{HistoryItem, HistoryItems};
use crate::message::ConversationId;

/// Key prefix, length cap and idle TTL applied to every conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub key_prefix: String,
    pub max_items: usize,
    pub ttl: Duration,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            key_prefix: "convs-".into(),
            max_items: 25,
            ttl: Duration::from_secs(86_400),
        }
    }
}

impl HistoryPolicy {
    /// The storage key of a conversation.
    pub fn key_for(&self, id: &ConversationId) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

/// The conversation store trait.
///
/// `append` enforces the cap (dropping the oldest item) and refreshes the TTL;
/// both happen on every append.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g., "memory", "redis").
    fn name(&self) -> &str;

    /// Append an item; returns the list length after truncation.
    async fn append(&self, id: &ConversationId, item: &HistoryItem) -> Result<usize, StoreError>;

    /// All items of a conversation, oldest first. Unknown or expired ids yield an empty list.
    async fn list(&self, id: &ConversationId) -> Result<HistoryItems, StoreError>;

    /// Remove a conversation entirely.
    async fn clear(&self, id: &ConversationId) -> Result<(), StoreError>;
}

/// One permanent question/answer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogRecord {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub question: String,
    pub answer: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Append-only audit log of answered questions.
#[async_trait]
pub trait ChatLog: Send + Sync {
    fn name(&self) -> &str;

    async fn record(&self, record: ChatLogRecord) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_prefix() {
        let policy = HistoryPolicy::default();
        assert_eq!(policy.key_for(&ConversationId::from("c1")), "convs-c1");
        assert_eq!(policy.max_items, 25);
        assert_eq!(policy.ttl, Duration::from_secs(86_400));
    }
}
