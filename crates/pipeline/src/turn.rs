//! One chat turn, end to end.
//!
//! [`ChatPipeline::prepare`] builds the provider request: trimmed history,
//! retrieved documents, tool schema and the current prompt. The prepared turn
//! is then either streamed through a [`Relay`] task ([`ChatPipeline::stream`])
//! or answered in one call ([`ChatPipeline::complete`]). Both paths persist
//! the answer and cancel the turn's token when they finish.

use std::sync::Arc;
use std::time::Duration;

use ragrelay_config::{AppConfig, RetrievalMode};
use ragrelay_core::conversation::{ChatLog, ConversationStore};
use ragrelay_core::document::{DocumentStore, MatchSpec};
use ragrelay_core::error::{Error, ProviderError, Result};
use ragrelay_core::history::{HistoryItem, HistoryItems};
use ragrelay_core::message::{ConversationId, Message};
use ragrelay_core::provider::{Provider, ProviderRequest, ProviderResponse};
use ragrelay_core::tool::{Actor, ToolContext, ToolRegistry, ToolSpec};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::{self, DEFAULT_SYSTEM_PROMPT, DEFAULT_TOOLS_PROMPT, PromptSetup};
use crate::invoker::{DEFAULT_TOOL_TIMEOUT, ToolInvoker};
use crate::persister::TurnPersister;
use crate::relay::{Relay, RelayOutcome};
use crate::schema;
use crate::trimmer;
use crate::wire::{FrameEncoder, WireFrame, WireMode};

pub const DEFAULT_WELCOME: &str = "Hello, how can I help you?";

pub const DEFAULT_COMPLETION_HEADER: &str =
    "Answer the question as truthfully as possible using the provided context.";

/// Frames buffered between the relay task and the HTTP body.
const FRAME_BUFFER: usize = 64;

/// Per-deployment knobs of the pipeline, resolved from config and preset.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub system_prompt: String,
    pub tools_prompt: String,
    pub date_in_context: bool,
    pub history_budget: usize,
    pub retrieval: RetrievalMode,
    pub match_limit: usize,
    pub match_threshold: f32,
    pub user_tag_prefix: String,
    pub turn_timeout: Duration,
    pub tool_timeout: Duration,
    pub welcome: String,
    pub completion_header: String,
    pub completion_model: String,
    pub completion_max_tokens: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let preset = &config.preset;
        Self {
            model: config.chat_model().to_string(),
            temperature: preset.temperature.unwrap_or(config.default_temperature),
            max_tokens: preset.max_tokens.or(config.default_max_tokens),
            stop: preset.stop.clone(),
            system_prompt: preset
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into()),
            tools_prompt: preset
                .tools_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_TOOLS_PROMPT.into()),
            date_in_context: config.chat.date_in_context,
            history_budget: config.chat.history_budget,
            retrieval: config.chat.retrieval,
            match_limit: config.chat.match_limit,
            match_threshold: config.chat.match_threshold,
            user_tag_prefix: config.chat.user_tag_prefix.clone(),
            turn_timeout: Duration::from_secs(config.chat.turn_timeout_secs),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            welcome: preset.welcome.clone().unwrap_or_else(|| DEFAULT_WELCOME.into()),
            completion_header: preset
                .completion_header
                .clone()
                .unwrap_or_else(|| DEFAULT_COMPLETION_HEADER.into()),
            completion_model: preset
                .completion_model
                .clone()
                .unwrap_or_else(|| config.completion_model.clone()),
            completion_max_tokens: 1024,
        }
    }

    fn prompt_setup(&self) -> PromptSetup {
        PromptSetup {
            system_prompt: self.system_prompt.clone(),
            tools_prompt: self.tools_prompt.clone(),
            date_stamp: self.date_in_context.then(assembler::date_stamp),
        }
    }
}

/// An inbound chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub prompt: String,
    pub conversation_id: Option<String>,
    pub actor: Option<Actor>,
    pub client_ip: Option<String>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn in_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Everything a turn needs once its prompt is assembled.
#[derive(Debug)]
pub struct PreparedTurn {
    pub conversation_id: ConversationId,
    pub request: ProviderRequest,
    pub pending: HistoryItem,
    pub actor: Option<Actor>,
    /// Chat-log metadata (`ip`, `uid`).
    pub meta: Map<String, Value>,
    pub cancel: CancellationToken,
}

/// A running streamed turn.
#[derive(Debug)]
pub struct TurnStream {
    pub conversation_id: ConversationId,
    pub mode: WireMode,
    pub frames: mpsc::Receiver<WireFrame>,
    /// Resolves after the answer has been persisted.
    pub handle: JoinHandle<RelayOutcome>,
}

/// A non-streamed answer.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub conversation_id: ConversationId,
    pub response: ProviderResponse,
}

impl ChatReply {
    pub fn text(&self) -> &str {
        &self.response.message.content
    }
}

#[derive(Clone)]
pub struct ChatPipeline {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) conversations: Arc<dyn ConversationStore>,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) invoker: ToolInvoker,
    pub(crate) persister: TurnPersister,
    pub(crate) settings: Arc<PipelineSettings>,
}

impl ChatPipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        conversations: Arc<dyn ConversationStore>,
        documents: Arc<dyn DocumentStore>,
        tools: Arc<ToolRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provider,
            persister: TurnPersister::new(conversations.clone()),
            conversations,
            documents,
            invoker: ToolInvoker::new(tools).with_timeout(settings.tool_timeout),
            settings: Arc::new(settings),
        }
    }

    pub fn with_chat_log(mut self, chat_log: Arc<dyn ChatLog>) -> Self {
        self.persister = self.persister.with_chat_log(chat_log);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Assemble the provider request for one turn.
    ///
    /// The returned turn owns a cancellation token armed with the turn
    /// timeout; it is cancelled when the turn ends.
    pub async fn prepare(&self, req: ChatRequest) -> Result<PreparedTurn> {
        let prompt = req.prompt.trim();
        if prompt.is_empty() {
            return Err(Error::InvalidRequest("prompt is empty".into()));
        }

        let conversation_id = ConversationId::or_new(req.conversation_id.as_deref());
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let stored = match self.conversations.list(&conversation_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "Failed to load history");
                Vec::new()
            }
        };
        let history = trimmer::trim(&stored, self.settings.history_budget);

        let has_tools = self.invoker.has_tools();
        let retrieve = match self.settings.retrieval {
            RetrievalMode::Always => true,
            RetrievalMode::Auto => !has_tools,
            RetrievalMode::Never => false,
        };
        let docs = if retrieve {
            let spec = MatchSpec::new(prompt)
                .with_limit(self.settings.match_limit)
                .with_threshold(self.settings.match_threshold);
            assembler::gather_documents(self.documents.as_ref(), &spec, &cancel).await
        } else {
            Vec::new()
        };

        let tools = if has_tools {
            schema::to_provider_schema(&self.invoker.registry().specs())?
        } else {
            Vec::new()
        };

        let messages = assembler::assemble(
            &self.settings.prompt_setup(),
            &docs,
            &history,
            has_tools,
            prompt,
        );

        let mut request = ProviderRequest::new(self.settings.model.clone(), messages);
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;
        request.stop = self.settings.stop.clone();
        request.tools = tools;
        request.user = req
            .actor
            .as_ref()
            .map(|a| format!("{}{}", self.settings.user_tag_prefix, a.uid));

        let mut pending = HistoryItem::pending(prompt);
        let mut meta = Map::new();
        if let Some(ip) = &req.client_ip {
            meta.insert("ip".into(), Value::String(ip.clone()));
        }
        if let Some(actor) = &req.actor {
            pending = pending.with_uid(&actor.uid);
            meta.insert("uid".into(), Value::String(actor.uid.clone()));
        }

        info!(
            conversation = %conversation_id,
            msgs = request.messages.len(),
            history = history.len(),
            stored = stored.len(),
            docs = docs.len(),
            tools = request.tools.len(),
            "Prepared chat turn"
        );

        let cancel = guard.disarm();
        spawn_turn_timer(cancel.clone(), self.settings.turn_timeout);

        Ok(PreparedTurn {
            conversation_id,
            request,
            pending,
            actor: req.actor,
            meta,
            cancel,
        })
    }

    /// Open the first streaming pass and hand the rest of the turn to a task.
    ///
    /// An error here means nothing has been sent to the client yet.
    pub async fn stream(&self, turn: PreparedTurn, mode: WireMode) -> Result<TurnStream> {
        let PreparedTurn {
            conversation_id,
            request,
            pending,
            actor,
            meta,
            cancel,
        } = turn;

        let encoder = FrameEncoder::new(
            mode,
            uuid::Uuid::new_v4().simple().to_string(),
            conversation_id.to_string(),
        );
        let (tx, frames) = mpsc::channel(FRAME_BUFFER);
        let ctx = ToolContext::new(actor, cancel.clone());
        let mut relay = Relay::new(
            self.provider.clone(),
            self.invoker.clone(),
            request,
            ctx,
            encoder,
            tx,
        );

        let first = match relay.open().await {
            Ok(rx) => rx,
            Err(e) => {
                cancel.cancel();
                return Err(e.into());
            }
        };

        let persister = self.persister.clone();
        let id = conversation_id.clone();
        let handle = tokio::spawn(async move {
            let outcome = relay.run(first).await;
            persister.persist(&id, pending, &outcome.answer, meta).await;
            cancel.cancel();
            outcome
        });

        Ok(TurnStream {
            conversation_id,
            mode,
            frames,
            handle,
        })
    }

    /// Answer the turn without streaming, allowing one tool round.
    pub async fn complete(&self, turn: PreparedTurn) -> Result<ChatReply> {
        let PreparedTurn {
            conversation_id,
            mut request,
            pending,
            actor,
            meta,
            cancel,
        } = turn;
        request.stream = false;

        let ctx = ToolContext::new(actor, cancel.clone());
        let result = self.complete_with_tools(&mut request, &ctx).await;
        cancel.cancel();
        let response = result?;

        self.persister
            .persist(&conversation_id, pending, &response.message.content, meta)
            .await;

        Ok(ChatReply {
            conversation_id,
            response,
        })
    }

    async fn complete_with_tools(
        &self,
        request: &mut ProviderRequest,
        ctx: &ToolContext,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let response = self.complete_once(request.clone(), ctx).await?;
        let calls = &response.message.tool_calls;
        if calls.is_empty() {
            return Ok(response);
        }

        info!(calls = calls.len(), "Executing tool calls");
        let mut results = Vec::new();
        for call in calls {
            if let Some(content) = self.invoker.dispatch(call, ctx).await {
                results.push(Message::tool_result(&call.id, content.to_message_content()));
            }
        }
        if results.is_empty() {
            debug!("No usable tool results, returning first answer");
            return Ok(response);
        }

        request.messages.push(Message::assistant_tool_calls(
            response.message.content.clone(),
            calls.clone(),
        ));
        request.messages.extend(results);
        self.complete_once(request.clone(), ctx).await
    }

    async fn complete_once(
        &self,
        request: ProviderRequest,
        ctx: &ToolContext,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ProviderError::Cancelled),
            response = self.provider.complete(request) => response,
        }
    }

    /// Stored history of a conversation, oldest first.
    pub async fn history(&self, id: &ConversationId) -> Result<HistoryItems> {
        Ok(self.conversations.list(id).await?)
    }

    pub async fn clear_history(&self, id: &ConversationId) -> Result<()> {
        self.conversations.clear(id).await?;
        info!(conversation = %id, "History cleared");
        Ok(())
    }

    /// The tool catalog offered to the model.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.invoker.registry().specs()
    }

    /// The welcome message and a fresh conversation id.
    pub fn welcome(&self) -> (String, ConversationId) {
        (self.settings.welcome.clone(), ConversationId::new())
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.provider.list_models().await?)
    }
}

/// Cancel the turn when it outlives `limit`; ends early once the turn does.
fn spawn_turn_timer(cancel: CancellationToken, limit: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(limit) => {
                warn!(limit_secs = limit.as_secs(), "Turn timed out");
                cancel.cancel();
            }
        }
    });
}
