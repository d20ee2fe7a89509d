//! Storage backends for ragrelay: conversation history, the knowledge-base
//! document store and the permanent chat log.

pub mod chat_log;
pub mod conversations;
pub mod documents;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use chat_log::{JsonlChatLog, NoopChatLog};
pub use conversations::InMemoryConversationStore;
pub use documents::VectorDocumentStore;
pub use vector::{cosine_similarity, keyword_search, reciprocal_rank_fusion, vector_search};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChatLog;

#[cfg(feature = "redis")]
pub use redis_store::RedisConversationStore;
