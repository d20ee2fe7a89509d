//! HTTP-level tests of the gateway router with a scripted provider.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ragrelay_config::{AppConfig, TokenConfig};
use ragrelay_core::document::{DocumentStore, NewDocument};
use ragrelay_core::tool::ToolRegistry;
use ragrelay_gateway::{GatewayState, build_router};
use ragrelay_memory::{InMemoryConversationStore, VectorDocumentStore};
use ragrelay_pipeline::testing::{ScriptedCall, ScriptedProvider, text_chunks, text_response};
use ragrelay_pipeline::{ChatPipeline, PipelineSettings};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app_with(config: AppConfig, provider: ScriptedProvider) -> Router {
    let documents = Arc::new(VectorDocumentStore::in_memory());
    documents
        .create_document(NewDocument {
            title: "Policies".into(),
            heading: "Refunds".into(),
            content: "30 days".into(),
            meta: Default::default(),
        })
        .await
        .unwrap();

    let pipeline = ChatPipeline::new(
        Arc::new(provider),
        Arc::new(InMemoryConversationStore::default()),
        documents,
        Arc::new(ToolRegistry::new()),
        PipelineSettings::from_config(&config),
    );
    let state = Arc::new(GatewayState::new(pipeline, &config));
    build_router(state, &config.gateway)
}

async fn app(calls: Vec<ScriptedCall>) -> Router {
    app_with(AppConfig::default(), ScriptedProvider::new(calls)).await
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn ping_answers_pong() {
    let app = app(vec![]).await;
    let response = app.oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Pong\n");
}

#[tokio::test]
async fn health_reports_provider() {
    let app = app(vec![]).await;
    let response = app.oneshot(get("/health")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "scripted");
}

#[tokio::test]
async fn plain_chat_returns_id_and_text() {
    let app = app(vec![ScriptedCall::Complete(text_response("You have 30 days."))]).await;
    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({"prompt": "What is the refund policy?", "conversationId": "c1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["Conversation-ID"], "c1");
    let body = body_json(response).await;
    assert_eq!(body, json!({"id": "c1", "text": "You have 30 days."}));
}

#[tokio::test]
async fn full_chat_returns_completion_detail() {
    let app = app(vec![ScriptedCall::Complete(text_response("Yes."))]).await;
    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({"prompt": "refund?", "full": true, "options": {"conversationId": "c9"}}),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["conversationId"], "c9");
    assert_eq!(body["detail"]["choices"][0]["text"], "Yes.");
    assert_eq!(body["detail"]["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["detail"]["usage"]["total_tokens"], 0);
}

#[tokio::test]
async fn blank_prompt_is_a_bad_request() {
    let app = app(vec![]).await;
    let response = app
        .oneshot(post_json("/api/chat", json!({"prompt": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn malformed_chat_body_gets_json_error() {
    let app = app(vec![]).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("Content-Type", "application/json")
        .body(Body::from("{\"prompt\": "))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chat_body_without_content_type_gets_json_error() {
    let app = app(vec![]).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat-sse")
        .body(Body::from(json!({"prompt": "hi"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].as_str().unwrap().contains("Content-Type"));
}

#[tokio::test]
async fn sse_chat_streams_events_until_done() {
    let app = app(vec![ScriptedCall::Stream(text_chunks(&["You have ", "30 days."]))]).await;
    let response = app
        .oneshot(post_json(
            "/api/chat-sse",
            json!({"prompt": "refund?", "conversationId": "c2"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["Conversation-ID"], "c2");

    let text = body_text(response).await;
    assert!(text.contains("\"delta\":\"You have \""));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn stream_flag_on_plain_route_uses_event_stream() {
    let app = app(vec![ScriptedCall::Stream(text_chunks(&["ok"]))]).await;
    let response = app
        .oneshot(post_json("/api/chat", json!({"prompt": "hi", "stream": true})))
        .await
        .unwrap();
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert!(body_text(response).await.contains("[DONE]"));
}

#[tokio::test]
async fn process_chat_streams_json_lines() {
    let app = app(vec![ScriptedCall::Stream(text_chunks(&["You have ", "30 days."]))]).await;
    let response = app
        .oneshot(post_json(
            "/api/chat-process",
            json!({"prompt": "refund?", "conversationId": "c3"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.headers()["content-type"], "application/octet-stream");
    let text = body_text(response).await;
    let last: Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
    assert_eq!(last["text"], "You have 30 days.");
    assert_eq!(last["conversationId"], "c3");
}

#[tokio::test]
async fn history_lists_persisted_turns() {
    let app = app(vec![ScriptedCall::Complete(text_response("30 days."))]).await;
    app.clone()
        .oneshot(post_json(
            "/api/chat",
            json!({"prompt": "refund?", "conversationId": "c4"}),
        ))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/api/history/c4")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], 0);
    assert_eq!(body["count"], 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/api/history/c4")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(delete).await.unwrap().status(), StatusCode::OK);

    let body = body_json(app.oneshot(get("/api/history/c4")).await.unwrap()).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn welcome_mints_conversation_id() {
    let app = app(vec![]).await;
    let body = body_json(app.oneshot(get("/api/welcome")).await.unwrap()).await;
    assert_eq!(body["status"], 0);
    assert!(!body["data"]["content"].as_str().unwrap().is_empty());
    assert_eq!(body["data"]["id"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn completion_rejects_non_string_prompt() {
    let app = app(vec![]).await;
    let response = app
        .oneshot(post_json("/api/completions", json!({"prompt": ["a", "b"]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "invalid prompt");
}

#[tokio::test]
async fn completion_with_wrongly_typed_field_gets_json_error() {
    let app = app(vec![]).await;
    let response = app
        .oneshot(post_json("/api/completions", json!({"prompt": "hi", "stream": "yes"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], 400);
}

#[tokio::test]
async fn completion_returns_trimmed_text() {
    let provider = ScriptedProvider::default().with_texts(vec!["  30 days.\n"]);
    let app = app_with(AppConfig::default(), provider).await;
    let response = app
        .oneshot(post_json(
            "/api/completions",
            json!({"prompt": "refund?", "conversationId": "c7"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.headers()["Conversation-ID"], "c7");
    let body = body_json(response).await;
    assert_eq!(body["status"], 0);
    assert_eq!(body["data"]["text"], "30 days.");
    assert_eq!(body["data"]["time"], 0);
}

#[tokio::test]
async fn streamed_completion_uses_conversation_id_as_event_id() {
    let provider = ScriptedProvider::default().with_texts(vec!["30 days."]);
    let app = app_with(AppConfig::default(), provider).await;
    let response = app
        .oneshot(post_json(
            "/api/completions",
            json!({"prompt": "refund?", "conversationId": "c8", "stream": true}),
        ))
        .await
        .unwrap();

    let text = body_text(response).await;
    assert!(text.contains("\"id\":\"c8\""));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

fn auth_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.required = true;
    config.auth.tokens = vec![TokenConfig {
        token: "secret".into(),
        uid: "u1".into(),
        name: "Ada".into(),
    }];
    config
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = app_with(auth_config(), ScriptedProvider::default()).await;
    let response = app.oneshot(get("/api/me")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"status": "Unauthorized", "message": "Please authenticate."})
    );
}

#[tokio::test]
async fn known_token_resolves_the_user() {
    let app = app_with(auth_config(), ScriptedProvider::default()).await;
    let request = Request::builder()
        .uri("/api/me")
        .header("Authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let body = body_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(body["data"]["uid"], "u1");
    assert_eq!(body["data"]["name"], "Ada");
}

#[tokio::test]
async fn liveness_routes_skip_authentication() {
    let app = app_with(auth_config(), ScriptedProvider::default()).await;
    let response = app.oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_routes_are_rate_limited() {
    let mut config = AppConfig::default();
    config.gateway.rate_limit.max_requests = 1;
    let provider = ScriptedProvider::new(vec![ScriptedCall::Complete(text_response("ok"))]);
    let app = app_with(config, provider).await;

    let first = app
        .clone()
        .oneshot(post_json("/api/chat", json!({"prompt": "hi"})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(post_json("/api/chat", json!({"prompt": "hi"})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    // read endpoints are outside the limited group
    let welcome = app.oneshot(get("/api/welcome")).await.unwrap();
    assert_eq!(welcome.status(), StatusCode::OK);
}
