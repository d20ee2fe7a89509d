//! Knowledge-base tools: search matching documents and create new ones.

use std::sync::Arc;

use async_trait::async_trait;
use ragrelay_core::document::{Document, DocumentStore, MatchSpec, NewDocument};
use ragrelay_core::error::ToolError;
use ragrelay_core::tool::{ParamMap, Tool, ToolContent, ToolContext, ToolInputSchema, required_str};
use serde_json::json;
use tracing::{info, warn};

const SEARCH_LIMIT: usize = 5;

/// Render matched documents as a markdown listing.
pub fn markdown_listing(docs: &[Document]) -> String {
    let mut out = String::new();
    for doc in docs {
        out.push_str(&format!(
            "---ID: {}\n\n## {}\n\n### {}\n\n{}\n\n",
            doc.id, doc.title, doc.heading, doc.content
        ));
    }
    out
}

pub struct KbSearchTool {
    store: Arc<dyn DocumentStore>,
}

impl KbSearchTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for KbSearchTool {
    fn name(&self) -> &str {
        "kb_search"
    }

    fn description(&self) -> &str {
        "Search documents in knowledge base with keywords or subject"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::new().property(
            "subject",
            json!({"type": "string", "description": "text of keywords or subject"}),
            true,
        )
    }

    async fn execute(&self, params: &ParamMap, _ctx: &ToolContext) -> Result<ToolContent, ToolError> {
        let subject = required_str(params, "subject")?;

        let spec = MatchSpec {
            skip_keywords: true,
            ..MatchSpec::new(subject).with_limit(SEARCH_LIMIT)
        };
        let docs = self
            .store
            .match_documents(&spec)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        info!(subject = %subject, matched = docs.len(), "kb_search");
        if docs.is_empty() {
            return Ok(ToolContent::text("No relevant information found"));
        }
        Ok(ToolContent::text(markdown_listing(&docs)))
    }
}

pub struct KbCreateTool {
    store: Arc<dyn DocumentStore>,
}

impl KbCreateTool {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for KbCreateTool {
    fn name(&self) -> &str {
        "kb_create"
    }

    fn description(&self) -> &str {
        "Create new document of knowledge base. Note, this is a write operation, all parameters are required."
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::new()
            .property(
                "title",
                json!({"type": "string", "description": "title of document, like a main name or topic"}),
                true,
            )
            .property(
                "heading",
                json!({"type": "string", "description": "heading of document, like a sub name or property"}),
                true,
            )
            .property(
                "content",
                json!({"type": "string", "description": "long text of content of document"}),
                true,
            )
    }

    async fn execute(&self, params: &ParamMap, ctx: &ToolContext) -> Result<ToolContent, ToolError> {
        let Some(actor) = &ctx.actor else {
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: "only admin can create document".into(),
            });
        };

        let title = required_str(params, "title")?;
        let heading = required_str(params, "heading")?;
        let content = required_str(params, "content")?;

        let mut meta = serde_json::Map::new();
        meta.insert("creator".into(), json!(actor.name));

        let created = self
            .store
            .create_document(NewDocument {
                title: title.into(),
                heading: heading.into(),
                content: content.into(),
                meta,
            })
            .await;

        match created {
            Ok(doc) => {
                info!(id = %doc.id, creator = %actor.uid, "kb_create");
                Ok(ToolContent::text(format!("Created KB document with ID {}", doc.id)))
            }
            Err(e) => {
                warn!(title = %title, heading = %heading, content_len = content.len(), error = %e, "Create document failed");
                Ok(ToolContent::text(format!(
                    "Create KB document with title {title:?} and heading {heading:?} is failed, {e}"
                )))
            }
        }
    }
}
