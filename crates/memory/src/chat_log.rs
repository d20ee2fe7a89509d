//! File and no-op chat logs.

use std::path::PathBuf;

use async_trait::async_trait;
use ragrelay_core::conversation::{ChatLog, ChatLogRecord};
use ragrelay_core::error::StoreError;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Appends one JSON object per record to a file.
pub struct JsonlChatLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlChatLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ChatLog for JsonlChatLog {
    fn name(&self) -> &str {
        "file"
    }

    async fn record(&self, record: ChatLogRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&record)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize chat record: {e}")))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create chat log directory: {e}"))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open chat log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write chat log: {e}")))?;

        debug!(chat_id = %record.chat_id, "Chat log record written");
        Ok(())
    }
}

/// Discards every record.
pub struct NoopChatLog;

#[async_trait]
impl ChatLog for NoopChatLog {
    fn name(&self) -> &str {
        "none"
    }

    async fn record(&self, _record: ChatLogRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(q: &str) -> ChatLogRecord {
        ChatLogRecord {
            chat_id: "c1".into(),
            question: q.into(),
            answer: "answer".into(),
            created: 1_700_000_000,
            meta: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlChatLog::new(dir.path().join("logs").join("chat.jsonl"));
        log.record(record("one")).await.unwrap();
        log.record(record("two")).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ChatLogRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.question, "one");
        assert!(lines[1].contains("\"chatId\":\"c1\""));
    }

    #[tokio::test]
    async fn noop_accepts_everything() {
        assert!(NoopChatLog.record(record("x")).await.is_ok());
    }
}
