//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions`, `/completions` and `/embeddings`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling, streamed as raw per-index deltas
//! - Legacy text completions
//! - Embeddings and model listing

use async_trait::async_trait;
use ragrelay_core::error::ProviderError;
use ragrelay_core::message::{Message, MessageToolCall};
use ragrelay_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::sse;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(120))
    }

    /// Create a provider whose requests (including streamed bodies) are bounded by `timeout`.
    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn chat_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        if let Some(user) = &request.user {
            body["user"] = serde_json::json!(user);
        }

        body
    }

    fn text_body(request: &TextCompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "temperature": request.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }
        if let Some(user) = &request.user {
            body["user"] = serde_json::json!(user);
        }
        body
    }

    /// POST a JSON body and map non-success statuses to provider errors.
    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if streaming {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        check_status(response).await
    }
}

/// Map HTTP status codes to provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status == 404 {
        let error_body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ModelNotFound(error_body));
    }

    if !(200..300).contains(&status) {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Parse one chat-completion SSE payload into a raw delta chunk.
fn parse_chat_chunk(data: &str) -> Result<Option<StreamChunk>, ProviderError> {
    let resp: StreamResponse =
        serde_json::from_str(data).map_err(|e| ProviderError::MalformedChunk(e.to_string()))?;

    let usage = resp.usage.map(ApiUsage::into_usage);
    let Some(choice) = resp.choices.into_iter().next() else {
        return Ok(usage.map(|u| StreamChunk {
            usage: Some(u),
            ..Default::default()
        }));
    };

    let tool_calls: Vec<ToolCallDelta> = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();

    let content = choice.delta.content.filter(|c| !c.is_empty());
    if content.is_none() && tool_calls.is_empty() && choice.finish_reason.is_none() && usage.is_none() {
        return Ok(None);
    }

    Ok(Some(StreamChunk {
        content,
        tool_calls,
        finish_reason: choice.finish_reason,
        usage,
    }))
}

/// Parse one text-completion SSE payload.
fn parse_text_chunk(data: &str) -> Result<Option<StreamChunk>, ProviderError> {
    let resp: TextApiResponse =
        serde_json::from_str(data).map_err(|e| ProviderError::MalformedChunk(e.to_string()))?;
    let Some(choice) = resp.choices.into_iter().next() else {
        return Ok(None);
    };
    let content = Some(choice.text).filter(|t| !t.is_empty());
    if content.is_none() && choice.finish_reason.is_none() {
        return Ok(None);
    }
    Ok(Some(StreamChunk {
        content,
        finish_reason: choice.finish_reason,
        ..Default::default()
    }))
}

#[async_trait]
impl ragrelay_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .post("chat/completions", &Self::chat_body(&request, false), false)
            .await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let message =
            Message::assistant_tool_calls(choice.message.content.unwrap_or_default(), tool_calls);

        Ok(ProviderResponse {
            id: api_response.id,
            message,
            finish_reason: choice.finish_reason,
            usage: api_response.usage.map(ApiUsage::into_usage),
            model: api_response.model,
            created: api_response.created,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let mut body = Self::chat_body(&request, true);
        body["stream_options"] = serde_json::json!({ "include_usage": true });
        let response = self.post("chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and forward raw deltas
        tokio::spawn(async move {
            let body = Box::pin(response.bytes_stream());
            sse::pump(provider_name, body, tx, parse_chat_chunk).await;
        });

        Ok(rx)
    }

    async fn complete_text(
        &self,
        request: TextCompletionRequest,
    ) -> Result<TextCompletion, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending text completion request");

        let response = self
            .post("completions", &Self::text_body(&request, false), false)
            .await?;
        let api: TextApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;
        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(TextCompletion {
            id: api.id,
            text: choice.text,
            finish_reason: choice.finish_reason,
            model: api.model,
            created: api.created,
        })
    }

    async fn stream_text(
        &self,
        request: TextCompletionRequest,
    ) -> Result<ChunkReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming text completion");

        let response = self
            .post("completions", &Self::text_body(&request, true), true)
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();
        tokio::spawn(async move {
            let body = Box::pin(response.bytes_stream());
            sse::pump(provider_name, body, tx, parse_text_chunk).await;
        });

        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post("embeddings", &body, false).await?;

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        let embeddings = api_resp.data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Text completion types ---

#[derive(Debug, Deserialize)]
struct TextApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<TextChoice>,
}

#[derive(Debug, Deserialize)]
struct TextChoice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragrelay_core::Provider;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url().contains("api.openai.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://localhost:8000/v1/", "k");
        assert_eq!(provider.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "kb_search".into(),
            description: "Search the knowledge base".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "kb_search");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn chat_body_carries_user_tag_and_tools() {
        let mut request = ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        request.user = Some("ragrelay-uid-u1".into());
        request.tools = vec![ToolDefinition {
            name: "fetch".into(),
            description: "Fetch a URL".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = OpenAiCompatProvider::chat_body(&request, true);
        assert_eq!(body["user"], "ragrelay-uid-u1");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "fetch");
        assert!(body.get("max_tokens").is_none());
    }

    // --- SSE chunk parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let chunk = parse_chat_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Hello"));
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn parse_stream_finish_chunk() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk = parse_chat_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
        assert!(chunk.content.is_none());
    }

    #[test]
    fn parse_stream_tool_call_delta() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"kb_search","arguments":""}}]},"finish_reason":null}]}"#;
        let chunk = parse_chat_chunk(data).unwrap().unwrap();
        let tc = &chunk.tool_calls[0];
        assert_eq!(tc.index, 0);
        assert_eq!(tc.id.as_deref(), Some("call_abc"));
        assert_eq!(tc.name.as_deref(), Some("kb_search"));
    }

    #[test]
    fn parse_stream_tool_call_arguments_delta() {
        // Arguments arrive incrementally as fragments
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"subject\""}}]},"finish_reason":null}]}"#;
        let chunk = parse_chat_chunk(data).unwrap().unwrap();
        let tc = &chunk.tool_calls[0];
        assert!(tc.id.is_none()); // ID only in first delta
        assert_eq!(tc.arguments.as_deref(), Some("{\"subject\""));
    }

    #[test]
    fn parse_multiple_tool_calls_in_stream() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"kb_search","arguments":""}},{"index":1,"id":"call_b","function":{"name":"fetch","arguments":""}}]},"finish_reason":null}]}"#;
        let chunk = parse_chat_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.tool_calls.len(), 2);
        assert_eq!(chunk.tool_calls[1].index, 1);
    }

    #[test]
    fn parse_stream_usage() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let chunk = parse_chat_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_empty_delta_is_skipped() {
        let data = r#"{"choices":[{"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#;
        assert!(parse_chat_chunk(data).unwrap().is_none());
    }

    #[test]
    fn parse_malformed_chunk_errors() {
        let err = parse_chat_chunk("{not json").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedChunk(_)));
    }

    #[test]
    fn parse_text_completion_chunk() {
        let data = r#"{"id":"cmpl-1","object":"text_completion","created":1,"model":"m","choices":[{"text":" 30","index":0,"finish_reason":null}]}"#;
        let chunk = parse_text_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some(" 30"));
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_tool_calls(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "kb_search".into(),
                arguments: r#"{"subject":"refunds"}"#.into(),
            }],
        );
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "kb_search");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0},
                {"embedding": [0.4, 0.5, 0.6], "index": 1}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].embedding, vec![0.4, 0.5, 0.6]);
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 8);
    }
}
