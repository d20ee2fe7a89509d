//! Legacy prompt-in, text-out completions over the knowledge base.
//!
//! The prompt is a fixed header, the matched documents as `* heading: content`
//! lines and a `Q:`/`A:` tail. Unlike chat, a retrieval failure fails the
//! request.

use ragrelay_core::document::{Document, MatchSpec};
use ragrelay_core::error::{Error, Result};
use ragrelay_core::message::ConversationId;
use ragrelay_core::provider::{ChunkReceiver, TextCompletionRequest};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::relay::{RelayOutcome, RelayState};
use crate::turn::{ChatPipeline, TurnStream};
use crate::wire::{FrameEncoder, WireFrame, WireMode};

const SECTION_SEPARATOR: &str = "\n* ";

/// A non-streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReply {
    pub conversation_id: ConversationId,
    pub text: String,
    pub created: i64,
}

/// Build the completion prompt from matched documents.
pub fn completion_prompt(header: &str, docs: &[Document], question: &str) -> String {
    let mut prompt = format!("{header}\n\nContext:\n");
    for doc in docs {
        prompt.push_str(SECTION_SEPARATOR);
        prompt.push_str(&doc.heading);
        prompt.push_str(": ");
        prompt.push_str(&doc.content.replace('\n', " "));
    }
    prompt.push_str("\n\nQ: ");
    prompt.push_str(question);
    prompt.push_str("\nA:");
    prompt
}

impl ChatPipeline {
    async fn completion_request(&self, question: &str) -> Result<TextCompletionRequest> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidRequest("invalid prompt".into()));
        }

        let docs = self
            .documents
            .match_documents(&MatchSpec::new(question))
            .await?;
        info!(docs = docs.len(), "Matched documents for completion");

        Ok(TextCompletionRequest {
            model: self.settings.completion_model.clone(),
            prompt: completion_prompt(&self.settings.completion_header, &docs, question),
            max_tokens: Some(self.settings.completion_max_tokens),
            temperature: self.settings.temperature,
            stop: self.settings.stop.clone(),
            user: None,
        })
    }

    /// Answer a question with one text completion.
    pub async fn complete_text(
        &self,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<CompletionReply> {
        let conversation_id = ConversationId::or_new(conversation_id);
        let request = self.completion_request(question).await?;
        let completion = self.provider.complete_text(request).await?;
        debug!(finish_reason = ?completion.finish_reason, "Completion done");

        Ok(CompletionReply {
            conversation_id,
            text: completion.text.trim().to_string(),
            created: completion.created,
        })
    }

    /// Stream a text completion as event-stream frames ending with `[DONE]`.
    pub async fn stream_text(
        &self,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<TurnStream> {
        let conversation_id = ConversationId::or_new(conversation_id);
        let request = self.completion_request(question).await?;
        let chunks = self.provider.stream_text(request).await?;

        let encoder = FrameEncoder::new(
            WireMode::EventStream,
            conversation_id.to_string(),
            conversation_id.to_string(),
        );
        let (tx, frames) = mpsc::channel(64);
        let handle = tokio::spawn(relay_text(chunks, encoder, tx));

        Ok(TurnStream {
            conversation_id,
            mode: WireMode::EventStream,
            frames,
            handle,
        })
    }
}

/// Forward a single text stream; there are no tool calls to merge.
async fn relay_text(
    mut chunks: ChunkReceiver,
    mut encoder: FrameEncoder,
    tx: mpsc::Sender<WireFrame>,
) -> RelayOutcome {
    let mut answer = String::new();
    let mut idx: u64 = 0;

    let state = loop {
        idx += 1;
        match chunks.recv().await {
            None => break RelayState::Done,
            Some(Err(e)) => {
                warn!(error = %e, "Completion stream failed");
                break RelayState::Error;
            }
            Some(Ok(chunk)) => {
                let delta = chunk.content.as_deref().unwrap_or_default();
                answer.push_str(delta);
                let frame = encoder.chunk(idx, delta, chunk.finish_reason.as_deref(), &[]);
                if tx.send(frame).await.is_err() {
                    debug!("Client disconnected from completion stream");
                    break RelayState::Error;
                }
                if chunk.finish_reason.is_some() {
                    break RelayState::Done;
                }
            }
        }
    };

    if state == RelayState::Done
        && let Some(frame) = encoder.done(idx + 1)
    {
        let _ = tx.send(frame).await;
    }
    info!(answer_len = answer.len(), state = ?state, "Completion stream finished");

    RelayOutcome {
        state,
        answer,
        passes: 1,
        tool_results: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::turn::PipelineSettings;
    use ragrelay_core::provider::Provider;
    use ragrelay_core::tool::ToolRegistry;
    use ragrelay_memory::{InMemoryConversationStore, VectorDocumentStore};
    use std::sync::Arc;

    fn doc(heading: &str, content: &str) -> Document {
        Document {
            id: heading.into(),
            title: "Policies".into(),
            heading: heading.into(),
            content: content.into(),
            similarity: 0.0,
            meta: Default::default(),
        }
    }

    #[test]
    fn prompt_layout() {
        let prompt = completion_prompt(
            "Header.",
            &[doc("Refunds", "30 days\nfrom purchase"), doc("Shipping", "2 days")],
            "refund window?",
        );
        assert_eq!(
            prompt,
            "Header.\n\nContext:\n\n* Refunds: 30 days from purchase\n* Shipping: 2 days\n\nQ: refund window?\nA:"
        );
    }

    fn pipeline(provider: Arc<dyn Provider>) -> ChatPipeline {
        ChatPipeline::new(
            provider,
            Arc::new(InMemoryConversationStore::default()),
            Arc::new(VectorDocumentStore::in_memory()),
            Arc::new(ToolRegistry::new()),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn text_completion_is_trimmed() {
        let provider = Arc::new(ScriptedProvider::default().with_texts(vec!["  30 days.  "]));
        let reply = pipeline(provider.clone())
            .complete_text("refund window?", Some("c1"))
            .await
            .unwrap();
        assert_eq!(reply.text, "30 days.");
        assert_eq!(reply.conversation_id.as_str(), "c1");
        assert!(provider.prompts()[0].ends_with("Q: refund window?\nA:"));
    }

    #[tokio::test]
    async fn streamed_completion_ends_with_done() {
        let provider = Arc::new(ScriptedProvider::default().with_texts(vec!["thirty days"]));
        let mut stream = pipeline(provider).stream_text("refund?", None).await.unwrap();

        let mut frames = Vec::new();
        while let Some(frame) = stream.frames.recv().await {
            frames.push(frame);
        }
        assert!(frames.last().unwrap().is_done());
        assert_eq!(stream.handle.await.unwrap().answer, "thirty days");
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let err = pipeline(Arc::new(ScriptedProvider::default()))
            .complete_text(" ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
