//! Tool dispatch for model-requested calls.
//!
//! Each call is isolated: a malformed argument string, an unknown tool or
//! invalid arguments drop that call, while handler failures the model can
//! react to (execution failure, timeout, permission) are turned into a
//! failure message used as the call's result.

use std::sync::Arc;
use std::time::Duration;

use ragrelay_core::error::ToolError;
use ragrelay_core::message::MessageToolCall;
use ragrelay_core::tool::{ParamMap, ToolContent, ToolContext, ToolRegistry};
use tracing::{debug, info, warn};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Run one tool by name, bounded by the timeout and the turn's cancellation.
    pub async fn invoke(
        &self,
        name: &str,
        params: &ParamMap,
        ctx: &ToolContext,
    ) -> Result<ToolContent, ToolError> {
        debug!(tool = %name, params = ?params, "Invoking tool");
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled(name.to_string())),
            result = tokio::time::timeout(self.timeout, self.registry.invoke(name, params, ctx)) => {
                result.unwrap_or_else(|_| Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }))
            }
        }
    }

    /// Dispatch one accumulated call; `None` means the call is skipped.
    pub async fn dispatch(&self, call: &MessageToolCall, ctx: &ToolContext) -> Option<ToolContent> {
        let params: ParamMap = match serde_json::from_str(&call.arguments) {
            Ok(params) => params,
            Err(e) => {
                warn!(tool = %call.name, id = %call.id, error = %e, "Skipping tool call with malformed arguments");
                return None;
            }
        };

        match self.invoke(&call.name, &params, ctx).await {
            Ok(content) => {
                info!(tool = %call.name, id = %call.id, "Tool call succeeded");
                Some(content)
            }
            Err(e) if e.is_reportable() => {
                warn!(tool = %call.name, id = %call.id, error = %e, "Tool call failed");
                Some(ToolContent::text(format!("Tool {} failed: {e}", call.name)))
            }
            Err(e) => {
                warn!(tool = %call.name, id = %call.id, error = %e, "Skipping tool call");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragrelay_core::tool::{Tool, ToolInputSchema, required_str};
    use serde_json::json;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::new().property("text", json!({"type": "string"}), true)
        }
        async fn execute(&self, params: &ParamMap, _ctx: &ToolContext) -> Result<ToolContent, ToolError> {
            Ok(ToolContent::text(required_str(params, "text")?.to_uppercase()))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::new()
        }
        async fn execute(&self, _params: &ParamMap, _ctx: &ToolContext) -> Result<ToolContent, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "backend offline".into(),
            })
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::new()
        }
        async fn execute(&self, _params: &ParamMap, _ctx: &ToolContext) -> Result<ToolContent, ToolError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(ToolContent::text("late"))
        }
    }

    fn invoker() -> ToolInvoker {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UpperTool));
        registry.register(Box::new(BrokenTool));
        registry.register(Box::new(SlowTool));
        ToolInvoker::new(Arc::new(registry)).with_timeout(Duration::from_secs(5))
    }

    fn call(name: &str, arguments: &str) -> MessageToolCall {
        MessageToolCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[tokio::test]
    async fn dispatches_case_insensitively() {
        let out = invoker()
            .dispatch(&call("UPPER", r#"{"text":"abc"}"#), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out.as_text(), "ABC");
    }

    #[tokio::test]
    async fn malformed_arguments_skip() {
        let out = invoker().dispatch(&call("upper", "{\"text\":"), &ToolContext::default()).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn unknown_and_invalid_calls_skip() {
        let inv = invoker();
        let ctx = ToolContext::default();
        assert!(inv.dispatch(&call("nope", "{}"), &ctx).await.is_none());
        assert!(inv.dispatch(&call("", "{}"), &ctx).await.is_none());
        assert!(inv.dispatch(&call("upper", r#"{"text":5}"#), &ctx).await.is_none());
    }

    #[tokio::test]
    async fn handler_failure_becomes_content() {
        let out = invoker().dispatch(&call("broken", "{}"), &ToolContext::default()).await.unwrap();
        assert!(out.as_text().starts_with("Tool broken failed: "));
        assert!(out.as_text().contains("backend offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported() {
        let out = invoker().dispatch(&call("slow", "{}"), &ToolContext::default()).await.unwrap();
        assert!(out.as_text().contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_turn_skips() {
        let ctx = ToolContext::default();
        ctx.cancel.cancel();
        assert!(invoker().dispatch(&call("slow", "{}"), &ctx).await.is_none());
    }
}
