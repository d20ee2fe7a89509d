//! Build the chat pipeline and its stores from configuration.

use std::sync::Arc;
use std::time::Duration;

use ragrelay_config::{AppConfig, ChatLogBackend, ConversationBackend};
use ragrelay_core::conversation::{ChatLog, ConversationStore, HistoryPolicy};
use ragrelay_core::error::StoreError;
use ragrelay_memory::{InMemoryConversationStore, JsonlChatLog, VectorDocumentStore};
use ragrelay_pipeline::{ChatPipeline, PipelineSettings};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Storage backend '{0}' is not compiled in, rebuild with feature '{0}'")]
    MissingFeature(&'static str),

    #[error("redis_url must be set when conversations = \"redis\"")]
    MissingRedisUrl,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// History retention from the `[chat]` section.
pub fn history_policy(config: &AppConfig) -> HistoryPolicy {
    HistoryPolicy {
        max_items: config.chat.history_cap,
        ttl: Duration::from_secs(config.chat.history_ttl_secs),
        ..HistoryPolicy::default()
    }
}

/// Open the configured conversation store.
pub async fn build_conversation_store(
    config: &AppConfig,
) -> Result<Arc<dyn ConversationStore>, BootstrapError> {
    let policy = history_policy(config);
    match config.storage.conversations {
        ConversationBackend::Memory => Ok(Arc::new(InMemoryConversationStore::new(policy))),
        ConversationBackend::Redis => {
            let url = config
                .storage
                .redis_url
                .as_deref()
                .ok_or(BootstrapError::MissingRedisUrl)?;
            open_redis(url, policy).await
        }
    }
}

#[cfg(feature = "redis")]
async fn open_redis(
    url: &str,
    policy: HistoryPolicy,
) -> Result<Arc<dyn ConversationStore>, BootstrapError> {
    let store = ragrelay_memory::RedisConversationStore::connect(url, policy).await?;
    info!("Conversations stored in Redis");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(
    _url: &str,
    _policy: HistoryPolicy,
) -> Result<Arc<dyn ConversationStore>, BootstrapError> {
    Err(BootstrapError::MissingFeature("redis"))
}

async fn build_chat_log(config: &AppConfig) -> Result<Option<Arc<dyn ChatLog>>, BootstrapError> {
    if !config.chat.chat_log {
        return Ok(None);
    }
    let path = &config.storage.chat_log_path;
    let log: Arc<dyn ChatLog> = match config.storage.chat_log_backend {
        ChatLogBackend::File => Arc::new(JsonlChatLog::new(path.clone())),
        ChatLogBackend::Sqlite => open_sqlite(&path.to_string_lossy()).await?,
    };
    info!(path = %path.display(), backend = ?config.storage.chat_log_backend, "Chat log enabled");
    Ok(Some(log))
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(path: &str) -> Result<Arc<dyn ChatLog>, BootstrapError> {
    Ok(Arc::new(ragrelay_memory::SqliteChatLog::new(path).await?))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_path: &str) -> Result<Arc<dyn ChatLog>, BootstrapError> {
    Err(BootstrapError::MissingFeature("sqlite"))
}

/// Wire provider, stores and tools into a [`ChatPipeline`].
pub async fn build_pipeline(config: &AppConfig) -> Result<ChatPipeline, BootstrapError> {
    let providers = ragrelay_providers::build_from_config(config);
    let provider = providers.chat();

    let documents = match &config.storage.documents_file {
        Some(path) => VectorDocumentStore::open(path.clone()),
        None => {
            warn!("No documents_file configured, the knowledge base lives in memory only");
            VectorDocumentStore::in_memory()
        }
    };
    let documents =
        Arc::new(documents.with_embedder(providers.embeddings(), &config.embedding_model));

    let conversations = build_conversation_store(config).await?;
    let tools = Arc::new(ragrelay_tools::default_registry(
        documents.clone(),
        reqwest::Client::new(),
    ));

    let mut pipeline = ChatPipeline::new(
        provider,
        conversations,
        documents,
        tools,
        PipelineSettings::from_config(config),
    );
    if let Some(log) = build_chat_log(config).await? {
        pipeline = pipeline.with_chat_log(log);
    }

    info!(
        provider = pipeline.provider_name(),
        model = %pipeline.settings().model,
        retrieval = ?pipeline.settings().retrieval,
        "Chat pipeline ready"
    );
    Ok(pipeline)
}
