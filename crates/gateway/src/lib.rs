//! HTTP gateway for ragrelay.
//!
//! Exposes the chat pipeline over REST and streaming endpoints under `/api`,
//! plus `/ping` and `/health` for liveness checks.
//!
//! Security layers applied:
//! - Bearer token authentication on all `/api` routes (when required)
//! - Sliding-window rate limiting on the chat and completion routes
//! - CORS with a configurable origin list
//! - Request body size limit
//! - HTTP trace logging

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod rate_limit;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{Router, middleware};
use chrono::{DateTime, Utc};
use ragrelay_config::{AppConfig, ConfigError, GatewayConfig};
use ragrelay_core::tool::Actor;
use ragrelay_pipeline::ChatPipeline;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::bootstrap::BootstrapError;
use crate::rate_limit::RateLimiter;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build chat pipeline: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: ChatPipeline,
    pub auth_required: bool,
    /// Bearer token to user.
    pub tokens: HashMap<String, Actor>,
    pub rate_limiter: Option<RateLimiter>,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(pipeline: ChatPipeline, config: &AppConfig) -> Self {
        let tokens = config
            .auth
            .tokens
            .iter()
            .map(|t| {
                (
                    t.token.clone(),
                    Actor {
                        uid: t.uid.clone(),
                        name: t.name.clone(),
                    },
                )
            })
            .collect();

        let limits = &config.gateway.rate_limit;
        let rate_limiter = limits.enabled.then(|| {
            RateLimiter::new(limits.max_requests, Duration::from_secs(limits.window_secs))
        });

        Self {
            pipeline,
            auth_required: config.auth.required,
            tokens,
            rate_limiter,
            started_at: Utc::now(),
        }
    }
}

/// Build the full router.
pub fn build_router(state: SharedState, gateway: &GatewayConfig) -> Router {
    let limited = Router::new()
        .route("/chat", post(api::chat_handler))
        .route("/chat-sse", post(api::chat_sse_handler))
        .route("/chat-process", post(api::chat_process_handler))
        .route("/completions", post(api::completions_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ));

    let api = Router::new()
        .route("/welcome", get(api::welcome_handler))
        .route(
            "/history/{cid}",
            get(api::history_handler).delete(api::clear_history_handler),
        )
        .route("/tools", get(api::tools_handler))
        .route("/models", get(api::models_handler))
        .route("/me", get(api::me_handler))
        .merge(limited)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state.clone());

    let health = Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    health
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(gateway.body_limit_bytes))
        .layer(cors_layer(&gateway.cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let origin = if allowed.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::HeaderName::from_static("conversation-id")])
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    config.validate()?;
    let addr = config.gateway.listen_addr();

    let pipeline = bootstrap::build_pipeline(&config).await?;
    let state = Arc::new(GatewayState::new(pipeline, &config));
    if !state.auth_required {
        warn!("Authentication is disabled, every caller is anonymous");
    }
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// --- Liveness ---

async fn ping_handler() -> &'static str {
    "Pong\n"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    uptime_secs: i64,
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.pipeline.provider_name().to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
