//! URL fetch tool.
//!
//! GETs a page and returns a window of its text. HTML is simplified to
//! markdown-ish text unless `raw` is set; other content types are returned
//! as-is behind a notice.

use async_trait::async_trait;
use ragrelay_core::error::ToolError;
use ragrelay_core::tool::{ParamMap, Tool, ToolContent, ToolContext, ToolInputSchema, required_str};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::html;

pub const USER_AGENT: &str =
    "ModelContextProtocol/1.0 (Autonomous; +https://github.com/modelcontextprotocol/servers)";

const DEFAULT_MAX_LENGTH: u64 = 5000;
const MAX_LENGTH_LIMIT: u64 = 1_000_000;

pub struct FetchTool {
    client: reqwest::Client,
}

impl FetchTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: reason.into(),
        }
    }

    /// Fetch `url`; returns the (possibly simplified) body and a prefix notice.
    async fn fetch(&self, url: &str, raw: bool) -> Result<(String, String), ToolError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| self.failed(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        debug!(url = %url, status = %status, content_type = %content_type, "Fetched URL");

        if status.as_u16() >= 400 {
            return Err(self.failed(format!(
                "failed to fetch {url} - status code {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.failed(format!("failed to read response body: {e}")))?;

        let is_html = content_type.contains("text/html") || body.contains("<html");
        if is_html && !raw {
            return Ok((html::simplify(&body), String::new()));
        }
        Ok((
            body,
            format!(
                "Content type {content_type} cannot be simplified to markdown, but here is the raw content:\n"
            ),
        ))
    }
}

fn optional_u64(params: &ParamMap, key: &str, default: u64) -> Result<u64, ToolError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("{key} argument must be a non-negative number"))
            }),
    }
}

/// Cut `content` to the `[start, start + max)` character window and append a
/// continuation hint when more remains.
fn window(content: &str, start: usize, max: usize) -> String {
    let total = content.chars().count();
    if start >= total {
        return "<error>No more content available.</error>".into();
    }
    let end = (start + max).min(total);
    let mut out: String = content.chars().skip(start).take(end - start).collect();
    if end < total {
        out.push_str(&format!(
            "\n\n<error>Content truncated. Call the fetch tool with a start_index of {end} to get more content.</error>"
        ));
    }
    out
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetches a URL from the internet and optionally extracts its contents as markdown"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::new()
            .property("url", json!({"type": "string", "description": "URL to fetch"}), true)
            .property(
                "max_length",
                json!({
                    "type": "number",
                    "description": "Maximum number of characters to return, default 5000",
                    "default": DEFAULT_MAX_LENGTH,
                    "minimum": 0,
                    "maximum": MAX_LENGTH_LIMIT,
                }),
                false,
            )
            .property(
                "start_index",
                json!({
                    "type": "number",
                    "description": "On return output starting at this character index, default 0",
                    "default": 0,
                    "minimum": 0,
                }),
                false,
            )
            .property(
                "raw",
                json!({
                    "type": "boolean",
                    "description": "Get the actual HTML content without simplification, default false",
                    "default": false,
                }),
                false,
            )
    }

    async fn execute(&self, params: &ParamMap, ctx: &ToolContext) -> Result<ToolContent, ToolError> {
        let url = required_str(params, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "url must start with http:// or https://".into(),
            ));
        }

        let max_length = optional_u64(params, "max_length", DEFAULT_MAX_LENGTH)?;
        if max_length == 0 || max_length >= MAX_LENGTH_LIMIT {
            return Err(ToolError::InvalidArguments(format!(
                "max_length must be between 1 and {}",
                MAX_LENGTH_LIMIT - 1
            )));
        }
        let start_index = optional_u64(params, "start_index", 0)?;
        let raw = params.get("raw").and_then(Value::as_bool).unwrap_or(false);

        let (content, prefix) = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(ToolError::Cancelled(self.name().into()));
            }
            fetched = self.fetch(url, raw) => fetched?,
        };

        info!(url = %url, len = content.len(), "fetch");
        let windowed = window(&content, start_index as usize, max_length as usize);
        Ok(ToolContent::text(format!("{prefix}Contents of {url}:\n{windowed}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::routing::get;

    /// Serve `app` on an ephemeral local port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn params(value: Value) -> ParamMap {
        value.as_object().cloned().unwrap()
    }

    async fn site() -> String {
        let app = Router::new()
            .route(
                "/page",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        "<html><body><h1>Refunds</h1><p>Within 30 days.</p></body></html>",
                    )
                }),
            )
            .route(
                "/data",
                get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{\"a\":1}") }),
            )
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        serve(app).await
    }

    #[test]
    fn window_adds_continuation_hint() {
        let out = window("abcdefghij", 2, 3);
        assert!(out.starts_with("cde"));
        assert!(out.contains("start_index of 5"));
        assert_eq!(window("abc", 0, 10), "abc");
        assert!(window("abc", 5, 10).contains("No more content"));
    }

    #[tokio::test]
    async fn simplifies_html() {
        let base = site().await;
        let tool = FetchTool::new(reqwest::Client::new());
        let url = format!("{base}/page");
        let out = tool
            .execute(&params(json!({"url": url})), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(
            out.as_text(),
            format!("Contents of {url}:\n# Refunds\n\nWithin 30 days.")
        );
    }

    #[tokio::test]
    async fn raw_html_keeps_markup() {
        let base = site().await;
        let tool = FetchTool::new(reqwest::Client::new());
        let out = tool
            .execute(
                &params(json!({"url": format!("{base}/page"), "raw": true})),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(out.as_text().starts_with("Content type text/html"));
        assert!(out.as_text().contains("<h1>Refunds</h1>"));
    }

    #[tokio::test]
    async fn non_html_is_prefixed() {
        let base = site().await;
        let tool = FetchTool::new(reqwest::Client::new());
        let out = tool
            .execute(&params(json!({"url": format!("{base}/data")})), &ToolContext::default())
            .await
            .unwrap();
        assert!(out.as_text().starts_with(
            "Content type application/json cannot be simplified to markdown, but here is the raw content:\n"
        ));
        assert!(out.as_text().ends_with("{\"a\":1}"));
    }

    #[tokio::test]
    async fn error_status_fails() {
        let base = site().await;
        let tool = FetchTool::new(reqwest::Client::new());
        let err = tool
            .execute(&params(json!({"url": format!("{base}/missing")})), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.is_reportable());
        assert!(err.to_string().contains("status code 404"));
    }

    #[tokio::test]
    async fn rejects_out_of_range_max_length() {
        let tool = FetchTool::new(reqwest::Client::new());
        for bad in [0, 1_000_000] {
            let err = tool
                .execute(
                    &params(json!({"url": "http://localhost/", "max_length": bad})),
                    &ToolContext::default(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }
}
