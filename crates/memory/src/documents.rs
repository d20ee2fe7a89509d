//! Knowledge-base document store with hybrid (vector + keyword) matching.
//!
//! Documents are held in memory and optionally persisted as JSON lines, one
//! [`StoredDocument`] per line, rewritten on every mutation. Embeddings come
//! from a [`Provider`]; without one the store ranks by keywords only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ragrelay_core::document::{Document, DocumentStore, MatchSpec, NewDocument};
use ragrelay_core::error::StoreError;
use ragrelay_core::provider::{EmbeddingRequest, Provider};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::vector;

/// RRF smoothing constant.
const RRF_K: u32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    #[serde(flatten)]
    doc: Document,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
}

pub struct VectorDocumentStore {
    embedder: Option<Arc<dyn Provider>>,
    embedding_model: String,
    path: Option<PathBuf>,
    docs: Arc<RwLock<Vec<StoredDocument>>>,
}

impl VectorDocumentStore {
    /// An empty, non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            embedder: None,
            embedding_model: String::new(),
            path: None,
            docs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A store backed by a JSONL file. Existing documents are loaded; a
    /// missing file starts empty and is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let docs = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = docs.len(), "Document store loaded");
        Self {
            path: Some(path),
            docs: Arc::new(RwLock::new(docs)),
            ..Self::in_memory()
        }
    }

    /// Use `provider` to embed documents and questions.
    pub fn with_embedder(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.embedder = Some(provider);
        self.embedding_model = model.into();
        self
    }

    fn load_from_disk(path: &Path) -> Vec<StoredDocument> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<StoredDocument>(line) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted document entry");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let docs = self.docs.read().await;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create document directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for doc in docs.iter() {
            let line = serde_json::to_string(doc)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize document: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write document file: {e}")))
    }

    async fn embed_one(&self, text: String) -> Result<Option<Vec<f32>>, StoreError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        let response = embedder
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![text],
            })
            .await
            .map_err(|e| StoreError::EmbeddingFailed(e.to_string()))?;
        response
            .embeddings
            .into_iter()
            .next()
            .map(Some)
            .ok_or_else(|| StoreError::EmbeddingFailed("provider returned no embedding".into()))
    }
}

#[async_trait]
impl DocumentStore for VectorDocumentStore {
    fn name(&self) -> &str {
        "vector"
    }

    async fn match_documents(&self, spec: &MatchSpec) -> Result<Vec<Document>, StoreError> {
        if spec.limit == 0 || spec.question.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_one(spec.question.clone()).await?;
        let docs = self.docs.read().await;

        let vector_results = match &query_embedding {
            Some(q) => vector::vector_search(
                docs.iter().map(|d| (&d.doc, d.embedding.as_deref())),
                q,
                spec.limit,
                spec.threshold,
            ),
            None => Vec::new(),
        };

        let results = if query_embedding.is_some() && spec.skip_keywords {
            vector_results
        } else {
            let keyword_results =
                vector::keyword_search(docs.iter().map(|d| &d.doc), &spec.question, spec.limit);
            if vector_results.is_empty() {
                keyword_results
            } else {
                vector::reciprocal_rank_fusion(&keyword_results, &vector_results, RRF_K, spec.limit)
            }
        };

        debug!(question = %spec.question, matched = results.len(), "Matched documents");
        Ok(results)
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError> {
        let embedding = self
            .embed_one(format!("{}\n{}\n{}", new.title, new.heading, new.content))
            .await?;

        let mut meta = new.meta;
        meta.entry("created")
            .or_insert_with(|| serde_json::Value::from(Utc::now().timestamp()));

        let doc = Document {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            heading: new.heading,
            content: new.content,
            similarity: 0.0,
            meta,
        };

        self.docs.write().await.push(StoredDocument {
            doc: doc.clone(),
            embedding,
        });
        self.flush().await?;
        Ok(doc)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|d| d.doc.id == id).map(|d| d.doc.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut docs = self.docs.write().await;
            let before = docs.len();
            docs.retain(|d| d.doc.id != id);
            docs.len() < before
        };
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.docs.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragrelay_core::error::ProviderError;
    use ragrelay_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    /// Embeds text onto two axes: "refund" and "shipping".
    struct AxisEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Provider for AxisEmbedder {
        fn name(&self) -> &str {
            "axis"
        }

        async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("axis".into()))
        }

        async fn embed(&self, r: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::Network("embedding service down".into()));
            }
            let embeddings = r
                .inputs
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("refund") { 1.0 } else { 0.0 },
                        if t.contains("ship") { 1.0 } else { 0.0 },
                    ]
                })
                .collect();
            Ok(EmbeddingResponse {
                embeddings,
                model: r.model,
                usage: None,
            })
        }
    }

    fn new_doc(heading: &str, content: &str) -> NewDocument {
        NewDocument {
            title: "Policies".into(),
            heading: heading.into(),
            content: content.into(),
            meta: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = VectorDocumentStore::in_memory();
        let doc = store.create_document(new_doc("Refunds", "30 days")).await.unwrap();
        assert!(!doc.id.is_empty());
        assert!(doc.meta.contains_key("created"));
        assert_eq!(store.get(&doc.id).await.unwrap().unwrap().heading, "Refunds");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn keyword_matching_without_embedder() {
        let store = VectorDocumentStore::in_memory();
        store.create_document(new_doc("Refunds", "Refund within 30 days")).await.unwrap();
        store.create_document(new_doc("Shipping", "Ships in 5 days")).await.unwrap();

        let hits = store.match_documents(&MatchSpec::new("refund rules")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].heading, "Refunds");
    }

    #[tokio::test]
    async fn vector_matching_respects_threshold_and_limit() {
        let store = VectorDocumentStore::in_memory()
            .with_embedder(Arc::new(AxisEmbedder { fail: false }), "axis-1");
        store.create_document(new_doc("Refunds", "Refund within 30 days")).await.unwrap();
        store.create_document(new_doc("Shipping", "Ships in 5 days")).await.unwrap();
        store.create_document(new_doc("Both", "Refund shipping costs")).await.unwrap();

        let spec = MatchSpec::new("refund").with_limit(1);
        let hits = store.match_documents(&spec).await.unwrap();
        assert_eq!(hits.len(), 1);

        let spec = MatchSpec {
            skip_keywords: true,
            ..MatchSpec::new("shipping")
        };
        let hits = store.match_documents(&spec).await.unwrap();
        let headings: Vec<_> = hits.iter().map(|d| d.heading.as_str()).collect();
        assert!(headings.contains(&"Shipping"));
        assert!(!headings.contains(&"Refunds"));
    }

    #[tokio::test]
    async fn embedding_failure_is_an_error() {
        let store = VectorDocumentStore::in_memory()
            .with_embedder(Arc::new(AxisEmbedder { fail: true }), "axis-1");
        let err = store.match_documents(&MatchSpec::new("refund")).await.unwrap_err();
        assert!(matches!(err, StoreError::EmbeddingFailed(_)));
        assert!(store.create_document(new_doc("Refunds", "x")).await.is_err());
    }

    #[tokio::test]
    async fn persists_to_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb").join("documents.jsonl");

        let id = {
            let store = VectorDocumentStore::open(&path);
            let doc = store.create_document(new_doc("Refunds", "30 days")).await.unwrap();
            store.create_document(new_doc("Shipping", "5 days")).await.unwrap();
            doc.id
        };

        let reopened = VectorDocumentStore::open(&path);
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert!(reopened.delete(&id).await.unwrap());

        let again = VectorDocumentStore::open(&path);
        assert_eq!(again.count().await.unwrap(), 1);
        assert!(again.get(&id).await.unwrap().is_none());
    }
}
