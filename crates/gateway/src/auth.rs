//! Bearer-token authentication for the `/api` routes.
//!
//! Tokens come from `[auth]` in the config and map to an [`Actor`]. The
//! middleware always records who is calling (actor and client address) in a
//! [`Caller`] extension; when auth is required, requests without a known
//! token are rejected before reaching a handler.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use ragrelay_core::tool::Actor;
use serde_json::json;
use tracing::warn;

use crate::SharedState;

/// Who sent the request.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub actor: Option<Actor>,
    pub ip: Option<String>,
}

impl Caller {
    /// Key for per-client limits: the user when known, else the address.
    pub fn limit_key(&self) -> String {
        match (&self.actor, &self.ip) {
            (Some(actor), _) => format!("uid:{}", actor.uid),
            (None, Some(ip)) => format!("ip:{ip}"),
            (None, None) => "anonymous".into(),
        }
    }
}

pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let actor = bearer_token(req.headers())
        .and_then(|token| state.tokens.get(token))
        .cloned();

    if state.auth_required && actor.is_none() {
        warn!(path = %req.uri().path(), "Unauthorized request, missing or unknown bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "Unauthorized",
                "message": "Please authenticate.",
            })),
        )
            .into_response();
    }

    let ip = client_ip(&req);
    req.extensions_mut().insert(Caller { actor, ip });
    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The client address: first `X-Forwarded-For` hop, `X-Real-IP`, then the
/// socket peer.
fn client_ip(req: &Request) -> Option<String> {
    let headers = req.headers();
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return Some(first.to_string());
    }
    if let Some(real) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        return Some(real.trim().to_string());
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
