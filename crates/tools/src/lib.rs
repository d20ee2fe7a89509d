//! Built-in tool implementations for ragrelay.
//!
//! Tools give the model access to the knowledge base (search and create
//! documents) and to the web (fetch a URL as text).

pub mod fetch;
mod html;
pub mod kb;

use std::sync::Arc;

use ragrelay_core::document::DocumentStore;
use ragrelay_core::tool::ToolRegistry;

pub use fetch::FetchTool;
pub use kb::{KbCreateTool, KbSearchTool};

/// Create the default tool registry: `kb_search`, `kb_create` and `fetch`.
pub fn default_registry(store: Arc<dyn DocumentStore>, client: reqwest::Client) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(KbSearchTool::new(store.clone())));
    registry.register(Box::new(KbCreateTool::new(store)));
    registry.register(Box::new(FetchTool::new(client)));
    registry
}
