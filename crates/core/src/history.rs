//! Conversation history records.
//!
//! A [`HistoryItem`] is one finished exchange. Items are appended on turn
//! completion and never mutated afterwards; they leave the store by TTL
//! expiry or by cap truncation.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The user/assistant pair of a finished turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryChatItem {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub assistant: String,
}

/// One stored exchange (or one raw utterance).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Unix seconds at creation.
    pub time: i64,

    /// Raw text with its stop mark, used by text-completion mode.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<HistoryChatItem>,
}

/// Chronological (oldest first) history of one conversation.
pub type HistoryItems = Vec<HistoryItem>;

impl HistoryItem {
    /// A pending item for a new turn: the user text is known, the answer is not.
    pub fn pending(user: impl Into<String>) -> Self {
        Self {
            time: Utc::now().timestamp(),
            chat: Some(HistoryChatItem {
                user: user.into(),
                assistant: String::new(),
            }),
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.chat.get_or_insert_with(HistoryChatItem::default).assistant = answer.into();
        self
    }

    pub fn user_text(&self) -> &str {
        self.chat.as_ref().map(|c| c.user.as_str()).unwrap_or("")
    }

    pub fn assistant_text(&self) -> &str {
        self.chat.as_ref().map(|c| c.assistant.as_str()).unwrap_or("")
    }

    /// Size proxy used for history budgeting: characters of every text field.
    pub fn cost(&self) -> usize {
        self.text.chars().count()
            + self.user_text().chars().count()
            + self.assistant_text().chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_counts_characters_not_bytes() {
        let item = HistoryItem::pending("héllo").with_answer("ok");
        assert_eq!(item.cost(), 7);
    }

    #[test]
    fn serializes_without_empty_fields() {
        let item = HistoryItem {
            time: 1,
            chat: Some(HistoryChatItem {
                user: "q".into(),
                assistant: "a".into(),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"time": 1, "chat": {"user": "q", "assistant": "a"}}));
    }

    #[test]
    fn parses_stored_json() {
        let raw = r#"{"time":1700000000,"text":"","uid":"u1","chat":{"user":"hi","assistant":"hello"}}"#;
        let item: HistoryItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.uid, "u1");
        assert_eq!(item.assistant_text(), "hello");
    }
}
