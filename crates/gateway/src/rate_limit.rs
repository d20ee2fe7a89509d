//! In-memory sliding-window rate limiting for the chat and completion routes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::SharedState;
use crate::auth::Caller;
use crate::error::ApiError;

/// Tracks request timestamps per client key.
///
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request; `false` when the client is over its limit.
    pub fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Evict idle clients once the map gets large
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(req).await;
    };

    let key = req
        .extensions()
        .get::<Caller>()
        .map(Caller::limit_key)
        .unwrap_or_else(|| "anonymous".into());

    if !limiter.check(&key) {
        warn!(client = %key, path = %req.uri().path(), "Rate limit exceeded");
        return ApiError::TooManyRequests("too many requests, slow down".into()).into_response();
    }

    next.run(req).await
}
