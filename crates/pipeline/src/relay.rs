//! Streaming relay state machine.
//!
//! ```text
//! Init ──open──▶ Streaming{1} ──end, no calls──▶ Done
//!                     │
//!                     └─end, calls──▶ ToolCallPending ──▶ ToolExecuting ──results──▶ Streaming{2} ──▶ Done
//!                                                                    └──no results──▶ Done
//! any receive error, failed re-open, cancellation or client loss ──▶ Error
//! ```
//!
//! The relay owns the answer buffer and the tool-call fragments of one turn.
//! Content deltas are forwarded to the client as soon as they arrive, and so
//! are tool-call deltas in event-stream mode. A pass ends on a finish reason
//! or when the provider closes the stream.
//! Tool-call fragments are keyed by index and only parsed once their pass
//! has ended. A turn gets at most one extra completion round.

use std::sync::Arc;

use ragrelay_core::error::ProviderError;
use ragrelay_core::message::{Message, MessageToolCall};
use ragrelay_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta};
use ragrelay_core::tool::ToolContext;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::invoker::ToolInvoker;
use crate::wire::{FrameEncoder, WireFrame, WireMode};

/// Streaming passes per turn: the first plus one re-entry after tools.
pub const MAX_PASSES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Init,
    Streaming { pass: u8 },
    ToolCallPending,
    ToolExecuting,
    Done,
    Error,
}

/// One tool call being assembled from streamed deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallFragment {
    pub fn to_call(&self) -> MessageToolCall {
        MessageToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Fold deltas into fragments: a new index opens a fragment, a seen index
/// appends to its argument text. Fragments keep first-seen order.
pub fn merge_fragments(fragments: &mut Vec<ToolCallFragment>, deltas: &[ToolCallDelta]) {
    for delta in deltas {
        let fragment = match fragments.iter_mut().position(|f| f.index == delta.index) {
            Some(i) => &mut fragments[i],
            None => {
                fragments.push(ToolCallFragment {
                    index: delta.index,
                    ..Default::default()
                });
                let last = fragments.len() - 1;
                &mut fragments[last]
            }
        };
        if let Some(id) = &delta.id
            && fragment.id.is_empty()
        {
            fragment.id = id.clone();
        }
        if let Some(name) = &delta.name
            && fragment.name.is_empty()
        {
            fragment.name = name.clone();
        }
        if let Some(args) = &delta.arguments {
            fragment.arguments.push_str(args);
        }
    }
}

/// What a finished relay reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub state: RelayState,
    /// Every content delta sent, across both passes.
    pub answer: String,
    pub passes: u8,
    /// Tool calls that produced a result (including failure messages).
    pub tool_results: usize,
}

enum PassEnd {
    Finished,
    Failed,
}

pub struct Relay {
    provider: Arc<dyn Provider>,
    invoker: ToolInvoker,
    request: ProviderRequest,
    ctx: ToolContext,
    encoder: FrameEncoder,
    tx: mpsc::Sender<WireFrame>,

    state: RelayState,
    answer: String,
    pass_text: String,
    chunk_idx: u64,
    fragments: Vec<ToolCallFragment>,
    passes: u8,
    tool_results: usize,
}

impl Relay {
    pub fn new(
        provider: Arc<dyn Provider>,
        invoker: ToolInvoker,
        request: ProviderRequest,
        ctx: ToolContext,
        encoder: FrameEncoder,
        tx: mpsc::Sender<WireFrame>,
    ) -> Self {
        Self {
            provider,
            invoker,
            request,
            ctx,
            encoder,
            tx,
            state: RelayState::Init,
            answer: String::new(),
            pass_text: String::new(),
            chunk_idx: 0,
            fragments: Vec::new(),
            passes: 0,
            tool_results: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Open the next streaming pass.
    pub async fn open(&mut self) -> Result<ChunkReceiver, ProviderError> {
        let mut request = self.request.clone();
        request.stream = true;

        let opened = tokio::select! {
            _ = self.ctx.cancel.cancelled() => Err(ProviderError::Cancelled),
            opened = self.provider.stream(request) => opened,
        };
        match opened {
            Ok(rx) => {
                self.passes += 1;
                self.state = RelayState::Streaming { pass: self.passes };
                Ok(rx)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), pass = self.passes + 1, error = %e, "Failed to open stream");
                self.state = RelayState::Error;
                Err(e)
            }
        }
    }

    /// Drive the turn to `Done` or `Error`, starting from an opened first pass.
    pub async fn run(mut self, first: ChunkReceiver) -> RelayOutcome {
        let mut rx = first;

        loop {
            match self.pump(&mut rx).await {
                PassEnd::Failed => {
                    self.state = RelayState::Error;
                    break;
                }
                PassEnd::Finished if self.fragments.is_empty() => {
                    self.state = RelayState::Done;
                    break;
                }
                PassEnd::Finished if self.passes >= MAX_PASSES => {
                    debug!(calls = self.fragments.len(), "Ignoring tool calls after re-entry");
                    self.state = RelayState::Done;
                    break;
                }
                PassEnd::Finished => self.state = RelayState::ToolCallPending,
            }

            if self.execute_tools().await == 0 {
                self.state = RelayState::Done;
                break;
            }

            rx = match self.open().await {
                Ok(rx) => rx,
                Err(_) => break,
            };
        }

        if self.state == RelayState::Done
            && let Some(frame) = self.encoder.done(self.chunk_idx + 1)
        {
            let _ = self.tx.send(frame).await;
        }

        info!(
            state = ?self.state,
            passes = self.passes,
            tool_results = self.tool_results,
            answer_len = self.answer.len(),
            "Relay finished"
        );
        RelayOutcome {
            state: self.state,
            answer: self.answer,
            passes: self.passes,
            tool_results: self.tool_results,
        }
    }

    /// Forward one pass until it ends, fails or the client goes away.
    async fn pump(&mut self, rx: &mut ChunkReceiver) -> PassEnd {
        self.pass_text.clear();
        self.fragments.clear();

        loop {
            let next = tokio::select! {
                _ = self.ctx.cancel.cancelled() => {
                    debug!("Relay cancelled");
                    return PassEnd::Failed;
                }
                next = rx.recv() => next,
            };

            let chunk = match next {
                None => return PassEnd::Finished,
                Some(Err(e)) => {
                    warn!(error = %e, answer_len = self.answer.len(), "Stream receive failed");
                    return PassEnd::Failed;
                }
                Some(Ok(chunk)) => chunk,
            };

            self.chunk_idx += 1;
            if !self.forward(&chunk).await {
                return PassEnd::Failed;
            }
            if chunk.finish_reason.is_some() {
                debug!(reason = ?chunk.finish_reason, "Pass finished");
                return PassEnd::Finished;
            }
        }
    }

    /// Record one chunk and send its frame. Returns false when the client is gone.
    async fn forward(&mut self, chunk: &StreamChunk) -> bool {
        merge_fragments(&mut self.fragments, &chunk.tool_calls);

        let delta = chunk.content.as_deref().unwrap_or_default();
        self.answer.push_str(delta);
        self.pass_text.push_str(delta);

        // Event frames carry tool-call deltas, chunked lines only carry text
        let carries_calls =
            !chunk.tool_calls.is_empty() && self.encoder.mode() == WireMode::EventStream;
        if delta.is_empty() && chunk.finish_reason.is_none() && !carries_calls {
            return true;
        }

        let frame = self.encoder.chunk(
            self.chunk_idx,
            delta,
            chunk.finish_reason.as_deref(),
            &chunk.tool_calls,
        );
        if self.tx.send(frame).await.is_err() {
            debug!("Client disconnected, cancelling turn");
            self.ctx.cancel.cancel();
            return false;
        }
        true
    }

    /// Run the pass's tool calls and queue their results for the next pass.
    /// Returns how many calls produced a result.
    async fn execute_tools(&mut self) -> usize {
        self.state = RelayState::ToolExecuting;

        let calls: Vec<MessageToolCall> = self.fragments.drain(..).map(|f| f.to_call()).collect();
        info!(calls = calls.len(), "Executing tool calls");

        let mut messages = vec![Message::assistant_tool_calls(
            std::mem::take(&mut self.pass_text),
            calls.clone(),
        )];
        for call in &calls {
            if let Some(content) = self.invoker.dispatch(call, &self.ctx).await {
                messages.push(Message::tool_result(&call.id, content.to_message_content()));
            }
        }

        let results = messages.len() - 1;
        self.tool_results += results;
        if results > 0 {
            self.request.messages.extend(messages);
        }
        results
    }
}
