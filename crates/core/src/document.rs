//! Document store abstraction: the knowledge base behind retrieval.
//!
//! The pipeline only needs matching and creation; ranking is opaque to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A stored knowledge-base document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub heading: String,
    pub content: String,

    /// Similarity to the query; only meaningful on match results.
    #[serde(default)]
    pub similarity: f32,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Input for creating a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub heading: String,
    pub content: String,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// A retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    pub question: String,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Rank by embeddings only.
    #[serde(default)]
    pub skip_keywords: bool,
}

fn default_threshold() -> f32 {
    0.16
}

fn default_limit() -> usize {
    4
}

impl MatchSpec {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            threshold: default_threshold(),
            limit: default_limit(),
            skip_keywords: false,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// The document store trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name (e.g., "vector", "file").
    fn name(&self) -> &str;

    /// Rank stored documents against the question, best first.
    async fn match_documents(&self, spec: &MatchSpec) -> Result<Vec<Document>, StoreError>;

    /// Store a new document and return it with its assigned id.
    async fn create_document(&self, doc: NewDocument) -> Result<Document, StoreError>;

    /// Fetch one document by id.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Number of stored documents.
    async fn count(&self) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_spec_defaults() {
        let spec = MatchSpec::new("refund policy");
        assert!((spec.threshold - 0.16).abs() < f32::EPSILON);
        assert_eq!(spec.limit, 4);
        assert_eq!(spec.with_limit(5).limit, 5);
    }

    #[test]
    fn document_meta_omitted_when_empty() {
        let doc = Document {
            id: "d1".into(),
            title: "Policies".into(),
            heading: "Refunds".into(),
            content: "30 days".into(),
            similarity: 0.0,
            meta: serde_json::Map::new(),
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("meta"));
    }
}
