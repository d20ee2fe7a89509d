//! SQLite chat log.
//!
//! One table, `chat_logs`, holding every answered question. Records are
//! insert-only.

use std::str::FromStr;

use async_trait::async_trait;
use ragrelay_core::conversation::{ChatLog, ChatLogRecord};
use ragrelay_core::error::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::info;

pub struct SqliteChatLog {
    pool: SqlitePool,
}

impl SqliteChatLog {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A single connection keeps in-memory databases shared across queries
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let log = Self { pool };
        log.run_migrations().await?;
        info!("SQLite chat log initialized at {path}");
        Ok(log)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_logs (
                iid       INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id   TEXT NOT NULL,
                question  TEXT NOT NULL,
                answer    TEXT NOT NULL,
                created   INTEGER NOT NULL,
                meta      TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("chat_logs table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_logs_chat_id ON chat_logs(chat_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("chat_logs index: {e}")))?;

        Ok(())
    }

    /// Records of one conversation, oldest first.
    pub async fn records_for(&self, chat_id: &str) -> Result<Vec<ChatLogRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT chat_id, question, answer, created, meta FROM chat_logs WHERE chat_id = ?1 ORDER BY iid",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let meta: String = row.get("meta");
                Ok(ChatLogRecord {
                    chat_id: row.get("chat_id"),
                    question: row.get("question"),
                    answer: row.get("answer"),
                    created: row.get("created"),
                    meta: serde_json::from_str(&meta)
                        .map_err(|e| StoreError::Corrupt(format!("chat log meta: {e}")))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChatLog for SqliteChatLog {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record(&self, record: ChatLogRecord) -> Result<(), StoreError> {
        let meta = serde_json::to_string(&record.meta)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize meta: {e}")))?;

        sqlx::query(
            "INSERT INTO chat_logs (chat_id, question, answer, created, meta) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.chat_id)
        .bind(&record.question)
        .bind(&record.answer)
        .bind(record.created)
        .bind(&meta)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reads_back() {
        let log = SqliteChatLog::new("sqlite::memory:").await.unwrap();
        let mut meta = serde_json::Map::new();
        meta.insert("uid".into(), "u1".into());

        log.record(ChatLogRecord {
            chat_id: "c1".into(),
            question: "refund?".into(),
            answer: "30 days".into(),
            created: 1_700_000_000,
            meta,
        })
        .await
        .unwrap();
        log.record(ChatLogRecord {
            chat_id: "c2".into(),
            question: "other".into(),
            answer: "x".into(),
            created: 1_700_000_001,
            meta: serde_json::Map::new(),
        })
        .await
        .unwrap();

        let records = log.records_for("c1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].answer, "30 days");
        assert_eq!(records[0].meta["uid"], "u1");
    }
}
