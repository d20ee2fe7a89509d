//! Prompt assembly.
//!
//! The message order is fixed: the leading system message, the tool-use
//! policy (only when tools are offered), one user/assistant pair per
//! retrieved document, the trimmed history, then the current user message.

use chrono::Local;
use ragrelay_core::document::{Document, DocumentStore, MatchSpec};
use ragrelay_core::history::HistoryItem;
use ragrelay_core::message::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer as concisely as possible.";

pub const DEFAULT_TOOLS_PROMPT: &str = "You can call the provided tools when they help answer \
    the user. Prefer tool results over assumptions, and say so when a tool fails.";

/// The static parts of a prompt.
#[derive(Debug, Clone)]
pub struct PromptSetup {
    pub system_prompt: String,
    pub tools_prompt: String,
    /// Appended to the system prompt on its own line when set.
    pub date_stamp: Option<String>,
}

impl Default for PromptSetup {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            tools_prompt: DEFAULT_TOOLS_PROMPT.into(),
            date_stamp: None,
        }
    }
}

/// A human-readable stamp of the current local time.
pub fn date_stamp() -> String {
    Local::now().format("Current date: %Y-%m-%d %A, %H:%M %Z").to_string()
}

/// Build the ordered message sequence for one turn.
pub fn assemble(
    setup: &PromptSetup,
    docs: &[Document],
    history: &[HistoryItem],
    has_tools: bool,
    user_text: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(3 + docs.len() * 2 + history.len() * 2);

    let system = match &setup.date_stamp {
        Some(stamp) => format!("{}\n{}", setup.system_prompt, stamp),
        None => setup.system_prompt.clone(),
    };
    messages.push(Message::system(system));

    if has_tools {
        messages.push(Message::system(setup.tools_prompt.clone()));
    }

    for doc in docs {
        messages.push(Message::user(doc.heading.clone()));
        messages.push(Message::assistant(doc.content.clone()));
    }

    for item in history {
        if !item.user_text().is_empty() {
            messages.push(Message::user(item.user_text()));
        }
        if !item.assistant_text().is_empty() {
            messages.push(Message::assistant(item.assistant_text()));
        }
    }

    messages.push(Message::user(user_text));
    messages
}

/// Retrieve documents for the question. Failures degrade to no documents.
pub async fn gather_documents(
    store: &dyn DocumentStore,
    spec: &MatchSpec,
    cancel: &CancellationToken,
) -> Vec<Document> {
    let matched = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Retrieval cancelled");
            return Vec::new();
        }
        matched = store.match_documents(spec) => matched,
    };

    match matched {
        Ok(docs) => {
            info!(docs = docs.len(), store = store.name(), "Matched documents");
            for doc in &docs {
                debug!(id = %doc.id, heading = %doc.heading, similarity = doc.similarity, "hit");
            }
            docs
        }
        Err(e) => {
            warn!(error = %e, "Document match failed, continuing without retrieval");
            Vec::new()
        }
    }
}
