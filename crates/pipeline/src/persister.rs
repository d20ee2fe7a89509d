//! Turn persistence.
//!
//! A finished turn becomes one history item. The chat-log write runs on a
//! detached task; neither write can fail the turn.

use std::sync::Arc;

use chrono::Utc;
use ragrelay_core::conversation::{ChatLog, ChatLogRecord, ConversationStore};
use ragrelay_core::history::HistoryItem;
use ragrelay_core::message::ConversationId;
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct TurnPersister {
    conversations: Arc<dyn ConversationStore>,
    chat_log: Option<Arc<dyn ChatLog>>,
}

impl TurnPersister {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            conversations,
            chat_log: None,
        }
    }

    pub fn with_chat_log(mut self, chat_log: Arc<dyn ChatLog>) -> Self {
        self.chat_log = Some(chat_log);
        self
    }

    /// Store the turn. Returns whether a history item was appended; an empty
    /// answer stores nothing.
    pub async fn persist(
        &self,
        id: &ConversationId,
        pending: HistoryItem,
        answer: &str,
        meta: Map<String, Value>,
    ) -> bool {
        if answer.is_empty() {
            debug!(conversation = %id, "Empty answer, nothing to persist");
            return false;
        }

        let question = pending.user_text().to_string();
        let item = pending.with_answer(answer);
        let appended = match self.conversations.append(id, &item).await {
            Ok(len) => {
                debug!(conversation = %id, len, "Turn appended to history");
                true
            }
            Err(e) => {
                warn!(conversation = %id, error = %e, "Failed to append history");
                false
            }
        };

        if let Some(log) = &self.chat_log {
            let log = log.clone();
            let record = ChatLogRecord {
                chat_id: id.to_string(),
                question,
                answer: answer.to_string(),
                created: Utc::now().timestamp(),
                meta,
            };
            tokio::spawn(async move {
                if let Err(e) = log.record(record).await {
                    warn!(log = log.name(), error = %e, "Failed to save chat log");
                }
            });
        }

        appended
    }
}
