//! Scripted provider for exercising the pipeline without a network.
//!
//! Each chat call (streaming or not) pops the next [`ScriptedCall`]; an
//! exhausted script answers `NotConfigured`. Every request is recorded so
//! tests can assert on the assembled prompts.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use ragrelay_core::error::ProviderError;
use ragrelay_core::message::{Message, MessageToolCall};
use ragrelay_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, TextCompletion,
    TextCompletionRequest, ToolCallDelta,
};
use tokio::sync::mpsc;

/// One scripted answer to a chat call.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    /// Stream these items, then close the channel.
    Stream(Vec<Result<StreamChunk, ProviderError>>),
    /// Fail to open the stream (or the non-streaming call).
    OpenError(ProviderError),
    /// Answer a non-streaming call.
    Complete(ProviderResponse),
}

#[derive(Default)]
pub struct ScriptedProvider {
    calls: Mutex<VecDeque<ScriptedCall>>,
    texts: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(calls: Vec<ScriptedCall>) -> Self {
        Self {
            calls: Mutex::new(calls.into()),
            ..Default::default()
        }
    }

    /// Queue text-completion answers.
    pub fn with_texts(self, texts: Vec<&str>) -> Self {
        *lock(&self.texts) = texts.into_iter().map(str::to_string).collect();
        self
    }

    /// Chat requests seen so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }

    /// Text-completion prompts seen so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.calls).len()
    }

    fn next(&self, request: ProviderRequest) -> Result<ScriptedCall, ProviderError> {
        lock(&self.requests).push(request);
        lock(&self.calls)
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn replay(items: Vec<Result<StreamChunk, ProviderError>>) -> ChunkReceiver {
    let (tx, rx) = mpsc::channel(items.len().max(1));
    tokio::spawn(async move {
        for item in items {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request)? {
            ScriptedCall::Complete(response) => Ok(response),
            ScriptedCall::OpenError(e) => Err(e),
            ScriptedCall::Stream(_) => Err(ProviderError::NotConfigured(
                "expected a non-streaming call".into(),
            )),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        match self.next(request)? {
            ScriptedCall::Stream(items) => Ok(replay(items)),
            ScriptedCall::OpenError(e) => Err(e),
            ScriptedCall::Complete(_) => Err(ProviderError::NotConfigured(
                "expected a streaming call".into(),
            )),
        }
    }

    async fn complete_text(
        &self,
        request: TextCompletionRequest,
    ) -> Result<TextCompletion, ProviderError> {
        lock(&self.prompts).push(request.prompt);
        let text = lock(&self.texts)
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("no text completion scripted".into()))?;
        Ok(TextCompletion {
            id: "cmpl-scripted".into(),
            text,
            finish_reason: Some("stop".into()),
            model: request.model,
            created: 0,
        })
    }

    async fn stream_text(
        &self,
        request: TextCompletionRequest,
    ) -> Result<ChunkReceiver, ProviderError> {
        let completion = self.complete_text(request).await?;
        let mut items: Vec<_> = completion
            .text
            .split_inclusive(' ')
            .map(|w| Ok(StreamChunk::text(w)))
            .collect();
        items.push(Ok(StreamChunk::finished("stop")));
        Ok(replay(items))
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["scripted-model".into()])
    }
}

/// A streamed plain-text answer: one chunk per delta plus a `stop` chunk.
pub fn text_chunks(deltas: &[&str]) -> Vec<Result<StreamChunk, ProviderError>> {
    let mut items: Vec<_> = deltas.iter().map(|d| Ok(StreamChunk::text(*d))).collect();
    items.push(Ok(StreamChunk::finished("stop")));
    items
}

/// A streamed tool-call request: each `(index, id, name, argument pieces)`
/// entry is split over several deltas, followed by a `tool_calls` finish.
pub fn tool_call_chunks(
    calls: &[(u32, &str, &str, &[&str])],
) -> Vec<Result<StreamChunk, ProviderError>> {
    let mut items = Vec::new();
    for (index, id, name, pieces) in calls {
        items.push(Ok(StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index: *index,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: None,
            }],
            ..Default::default()
        }));
        for piece in pieces.iter() {
            items.push(Ok(StreamChunk {
                tool_calls: vec![ToolCallDelta {
                    index: *index,
                    arguments: Some(piece.to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }));
        }
    }
    items.push(Ok(StreamChunk::finished("tool_calls")));
    items
}

/// A non-streaming text answer.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        id: "chatcmpl-scripted".into(),
        message: Message::assistant(text),
        finish_reason: Some("stop".into()),
        usage: None,
        model: "scripted-model".into(),
        created: 0,
    }
}

/// A non-streaming tool-call answer.
pub fn tool_call_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        id: "chatcmpl-scripted".into(),
        message: Message::assistant_tool_calls("", calls),
        finish_reason: Some("tool_calls".into()),
        usage: None,
        model: "scripted-model".into(),
        created: 0,
    }
}
