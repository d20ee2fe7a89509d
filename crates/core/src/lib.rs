//! # ragrelay core
//!
//! Domain types, traits, and error definitions for the retrieval-augmented chat
//! relay. This crate has **no framework dependencies**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: completions, streaming, embeddings
//! - [`DocumentStore`]: retrieval and knowledge-base writes
//! - [`ConversationStore`] / [`ChatLog`]: turn persistence
//! - [`Tool`]: capabilities the model can call mid-turn
//!
//! Implementations live in their respective crates and are injected by the
//! process entry point.

pub mod conversation;
pub mod document;
pub mod error;
pub mod history;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use conversation::{ChatLog, ChatLogRecord, ConversationStore, HistoryPolicy};
pub use document::{Document, DocumentStore, MatchSpec, NewDocument};
pub use error::{Error, Result};
pub use history::{HistoryChatItem, HistoryItem, HistoryItems};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Actor, Tool, ToolContent, ToolContext, ToolRegistry, ToolSpec};
