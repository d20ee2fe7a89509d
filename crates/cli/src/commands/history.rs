//! `ragrelay history`: inspect or forget a stored conversation.
//!
//! Opens the configured conversation backend directly. With the in-memory
//! backend there is nothing to see outside a running server.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ragrelay_config::{AppConfig, ConversationBackend};
use ragrelay_core::conversation::ConversationStore;
use ragrelay_core::history::HistoryItem;
use ragrelay_core::message::ConversationId;
use ragrelay_gateway::bootstrap::build_conversation_store;

fn render(item: &HistoryItem) -> String {
    let when = DateTime::<Utc>::from_timestamp(item.time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| item.time.to_string());
    if item.chat.is_some() {
        format!(
            "[{when}] user: {}\n[{when}] assistant: {}",
            item.user_text(),
            item.assistant_text()
        )
    } else {
        format!("[{when}] {}", item.text)
    }
}

async fn open(config: &AppConfig) -> anyhow::Result<Arc<dyn ConversationStore>> {
    if config.storage.conversations == ConversationBackend::Memory {
        println!("(conversations = \"memory\": history only lives inside a running server)");
    }
    build_conversation_store(config)
        .await
        .context("Failed to open conversation store")
}

pub async fn show(cid: &str) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let store = open(&config).await?;

    let items = store.list(&ConversationId::from(cid)).await?;
    if items.is_empty() {
        println!("No history for conversation {cid}");
        return Ok(());
    }

    println!("Conversation {cid} ({} items)", items.len());
    for item in &items {
        println!("{}", render(item));
    }
    Ok(())
}

pub async fn clear(cid: &str) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let store = open(&config).await?;
    store.clear(&ConversationId::from(cid)).await?;
    println!("Cleared conversation {cid}");
    Ok(())
}
