//! HTTP API: chat, completions and read endpoints.
//!
//! Endpoints (all under `/api`):
//!
//! - `POST /chat`               Answer as JSON, or stream with `stream: true`
//! - `POST /chat-sse`           Stream as server-sent events
//! - `POST /chat-process`       Stream as JSON lines
//! - `POST /completions`        Knowledge-base text completion
//! - `GET  /welcome`            Welcome message and a fresh conversation id
//! - `GET  /history/{cid}`      Stored history of a conversation
//! - `DELETE /history/{cid}`    Forget a conversation
//! - `GET  /tools`              Tool catalog offered to the model
//! - `GET  /models`             Models of the configured provider
//! - `GET  /me`                 The authenticated user

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderValue, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use ragrelay_core::message::ConversationId;
use ragrelay_pipeline::completion::CompletionReply;
use ragrelay_pipeline::schema::to_provider_schema;
use ragrelay_pipeline::{ChatReply, ChatRequest, TurnStream, WireFrame, WireMode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::SharedState;
use crate::auth::Caller;
use crate::error::ApiError;

pub const CONVERSATION_ID_HEADER: &str = "conversation-id";

// ── Envelope ──────────────────────────────────────────────────────────────

/// Success envelope of the read endpoints: `{status: 0, data, count?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiOk<T> {
    pub status: i32,
    pub data: T,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn ok<T: Serialize>(data: T) -> Json<ApiOk<T>> {
    Json(ApiOk {
        status: 0,
        data,
        count: 0,
    })
}

fn ok_count<T: Serialize>(data: T, count: usize) -> Json<ApiOk<T>> {
    Json(ApiOk {
        status: 0,
        data,
        count,
    })
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, rename = "conversationId")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
    /// Return the full completion detail instead of `{id, text}`.
    #[serde(default)]
    pub full: bool,
    /// Web clients that send the id nested in `options`.
    #[serde(default)]
    pub options: Option<ChatOptions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatOptions {
    #[serde(default, rename = "conversationId")]
    pub conversation_id: Option<String>,
}

impl ChatBody {
    fn conversation_id(&self) -> Option<String> {
        self.conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.options.as_ref().and_then(|o| o.conversation_id.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatRoute {
    Plain,
    EventStream,
    Process,
}

impl ChatRoute {
    /// Wire mode of the response; `None` answers with one JSON body.
    fn mode(self, stream: bool) -> Option<WireMode> {
        match self {
            _ if stream => Some(WireMode::EventStream),
            ChatRoute::EventStream => Some(WireMode::EventStream),
            ChatRoute::Process => Some(WireMode::Chunked),
            ChatRoute::Plain => None,
        }
    }
}

/// `POST /api/chat`
pub async fn chat_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    handle_chat(state, caller, body, ChatRoute::Plain).await
}

/// `POST /api/chat-sse`
pub async fn chat_sse_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    handle_chat(state, caller, body, ChatRoute::EventStream).await
}

/// `POST /api/chat-process`
pub async fn chat_process_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    handle_chat(state, caller, body, ChatRoute::Process).await
}

async fn handle_chat(
    state: SharedState,
    caller: Caller,
    body: ChatBody,
    route: ChatRoute,
) -> Result<Response, ApiError> {
    let mode = route.mode(body.stream);
    let request = ChatRequest {
        conversation_id: body.conversation_id(),
        prompt: body.prompt,
        actor: caller.actor,
        client_ip: caller.ip,
    };
    info!(
        conversation = ?request.conversation_id,
        mode = ?mode,
        ip = ?request.client_ip,
        prompt_len = request.prompt.len(),
        "Chat request"
    );

    let turn = state.pipeline.prepare(request).await?;
    match mode {
        Some(mode) => {
            let stream = state.pipeline.stream(turn, mode).await?;
            Ok(stream_response(stream))
        }
        None => {
            let reply = state.pipeline.complete(turn).await?;
            Ok(reply_response(&reply, body.full))
        }
    }
}

fn to_sse(frame: WireFrame) -> SseEvent {
    match frame {
        WireFrame::Event { id, data } => SseEvent::default().id(id).data(data),
        WireFrame::Line(line) => SseEvent::default().data(line),
    }
}

/// Turn relay frames into a streaming body with the chat headers.
fn stream_response(stream: TurnStream) -> Response {
    let TurnStream {
        conversation_id,
        mode,
        frames,
        ..
    } = stream;
    let frames = ReceiverStream::new(frames);

    let mut response = match mode {
        WireMode::EventStream => {
            Sse::new(frames.map(|f| Ok::<_, Infallible>(to_sse(f)))).into_response()
        }
        WireMode::Chunked => {
            let lines = frames.map(|f| {
                let line = match f {
                    WireFrame::Line(line) => line,
                    WireFrame::Event { data, .. } => data,
                };
                Ok::<_, Infallible>(format!("{line}\n"))
            });
            Body::from_stream(lines).into_response()
        }
    };

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mode.content_type()));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    set_conversation_header(&mut response, &conversation_id);
    response
}

fn set_conversation_header(response: &mut Response, id: &ConversationId) {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(CONVERSATION_ID_HEADER, value);
    }
}

#[derive(Serialize)]
struct BriefReply<'a> {
    id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<&'a str>,
}

fn reply_response(reply: &ChatReply, full: bool) -> Response {
    let response = &reply.response;
    let finish_reason = response.finish_reason.as_deref();

    let body = if full {
        let usage = response.usage.clone().unwrap_or_default();
        json!({
            "conversationId": reply.conversation_id,
            "detail": {
                "id": response.id,
                "object": "chat.completion",
                "created": response.created,
                "model": response.model,
                "choices": [{
                    "text": reply.text(),
                    "index": 0,
                    "finish_reason": finish_reason.unwrap_or_default(),
                }],
                "usage": {
                    "prompt_tokens": usage.prompt_tokens,
                    "completion_tokens": usage.completion_tokens,
                    "total_tokens": usage.total_tokens,
                },
            },
        })
    } else {
        json!(BriefReply {
            id: reply.conversation_id.as_str(),
            text: reply.text(),
            finish_reason: finish_reason.filter(|r| *r != "stop"),
        })
    };

    let mut out = Json(body).into_response();
    set_conversation_header(&mut out, &reply.conversation_id);
    out
}

// ── Completions ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CompletionBody {
    #[serde(default)]
    pub prompt: Value,
    #[serde(default, rename = "conversationId")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Serialize)]
struct CompletionData<'a> {
    id: &'a str,
    text: &'a str,
    time: i64,
}

/// `POST /api/completions`
pub async fn completions_handler(
    State(state): State<SharedState>,
    body: Result<Json<CompletionBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let Some(prompt) = body.prompt.as_str() else {
        return Err(ApiError::BadRequest("invalid prompt".into()));
    };
    let cid = body.conversation_id.as_deref();
    info!(stream = body.stream, prompt_len = prompt.len(), "Completion request");

    if body.stream {
        let stream = state
            .pipeline
            .stream_text(prompt, cid)
            .await
            .map_err(ApiError::from_retrieval)?;
        return Ok(stream_response(stream));
    }

    let CompletionReply {
        conversation_id,
        text,
        created,
    } = state
        .pipeline
        .complete_text(prompt, cid)
        .await
        .map_err(ApiError::from_retrieval)?;

    let mut response = ok(CompletionData {
        id: conversation_id.as_str(),
        text: &text,
        time: created,
    })
    .into_response();
    set_conversation_header(&mut response, &conversation_id);
    Ok(response)
}

// ── Read endpoints ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeDto {
    pub id: String,
    pub content: String,
}

/// `GET /api/welcome`
pub async fn welcome_handler(State(state): State<SharedState>) -> Json<ApiOk<WelcomeDto>> {
    let (content, id) = state.pipeline.welcome();
    ok(WelcomeDto {
        id: id.to_string(),
        content,
    })
}

/// `GET /api/history/{cid}`
pub async fn history_handler(
    State(state): State<SharedState>,
    Path(cid): Path<String>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    let items = state.pipeline.history(&ConversationId::from(cid)).await?;
    let count = items.len();
    Ok(ok_count(serde_json::to_value(items).map_err(ragrelay_core::Error::from)?, count))
}

/// `DELETE /api/history/{cid}`
pub async fn clear_history_handler(
    State(state): State<SharedState>,
    Path(cid): Path<String>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    let id = ConversationId::from(cid);
    state.pipeline.clear_history(&id).await?;
    Ok(ok(json!({ "conversationId": id })))
}

/// `GET /api/tools`
pub async fn tools_handler(State(state): State<SharedState>) -> Result<Json<ApiOk<Value>>, ApiError> {
    let defs = to_provider_schema(&state.pipeline.tool_specs())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let count = defs.len();
    Ok(ok_count(json!(defs), count))
}

/// `GET /api/models`
pub async fn models_handler(
    State(state): State<SharedState>,
) -> Result<Json<ApiOk<Vec<String>>>, ApiError> {
    let models = state.pipeline.list_models().await?;
    let count = models.len();
    Ok(ok_count(models, count))
}

/// `GET /api/me`
pub async fn me_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    match caller.actor {
        Some(actor) => Ok(ok(json!(actor))),
        None if state.auth_required => Err(ApiError::Unauthorized("not login".into())),
        None => Ok(ok(json!({}))),
    }
}
