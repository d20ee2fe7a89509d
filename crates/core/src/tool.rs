//! Tool trait: named capabilities the model may invoke mid-turn.
//!
//! Tools declare a structured input schema (or a raw pre-serialized JSON
//! schema), validate their own arguments and return text content. The
//! [`ToolRegistry`] is the dispatch table; lookups are case-insensitive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

/// Arguments of one tool call, parsed from the model's JSON text.
pub type ParamMap = Map<String, Value>;

/// The declared input of a tool: a property map plus the required keys.
///
/// Each property value is a JSON-Schema-like object (`type`, `description`,
/// `enum`, `properties`, `items`, ...). Conversion to the provider shape
/// happens in the schema adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property definition; `required` marks it as mandatory.
    pub fn property(mut self, name: &str, definition: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), definition);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Check required keys are present and declared primitive types match.
    pub fn validate(&self, params: &ParamMap) -> Result<(), ToolError> {
        for key in &self.required {
            if params.get(key).is_none_or(Value::is_null) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument: {key}"
                )));
            }
        }
        for (key, value) in params {
            let Some(expected) = self
                .properties
                .get(key)
                .and_then(|def| def.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if !json_type_matches(expected, value) {
                return Err(ToolError::InvalidArguments(format!(
                    "{key} argument must be a {expected}"
                )));
            }
        }
        Ok(())
    }
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

/// A catalog entry: everything the schema adapter needs about one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
    /// Pre-serialized JSON schema used verbatim when present.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "rawInputSchema")]
    pub raw_schema: Option<String>,
}

/// Text content returned by a tool, serialized as `{"type":"text","text":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            ToolContent::Text { text } => text,
        }
    }

    /// The JSON form placed in a tool-role message.
    pub fn to_message_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.as_text().to_string())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub uid: String,
    #[serde(default)]
    pub name: String,
}

/// Per-call execution context.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub actor: Option<Actor>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(actor: Option<Actor>, cancel: CancellationToken) -> Self {
        Self { actor, cancel }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "kb_search", "fetch").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Structured description of the accepted arguments.
    fn input_schema(&self) -> ToolInputSchema;

    /// A raw JSON schema that overrides [`Tool::input_schema`] for the provider.
    fn raw_schema(&self) -> Option<String> {
        None
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, params: &ParamMap, ctx: &ToolContext) -> Result<ToolContent, ToolError>;

    /// Convert this tool into a catalog entry.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            raw_schema: self.raw_schema(),
        }
    }
}

/// Fetch a required string argument.
pub fn required_str<'a>(params: &'a ParamMap, key: &str) -> Result<&'a str, ToolError> {
    let value = params
        .get(key)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument: {key}")))?;
    value
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} argument must be a string")))
}

/// A registry of available tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.position(tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tools
            .iter()
            .position(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Get a tool by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.position(name).map(|i| self.tools[i].as_ref())
    }

    /// Catalog entries for every registered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Validate and execute one call.
    pub async fn invoke(
        &self,
        name: &str,
        params: &ParamMap,
        ctx: &ToolContext,
    ) -> Result<ToolContent, ToolError> {
        if name.is_empty() {
            return Err(ToolError::NotFound("tool name is empty".into()));
        }
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.input_schema().validate(params)?;
        tool.execute(params, ctx).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::new().property("text", json!({"type": "string"}), true)
        }
        async fn execute(&self, params: &ParamMap, _ctx: &ToolContext) -> Result<ToolContent, ToolError> {
            Ok(ToolContent::text(required_str(params, "text")?))
        }
    }

    fn params(value: Value) -> ParamMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("ECHO").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.specs()[0].name, "Echo");
    }

    #[tokio::test]
    async fn registry_invoke_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let out = registry
            .invoke("echo", &params(json!({"text": "hello world"})), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out.as_text(), "hello world");
    }

    #[tokio::test]
    async fn registry_rejects_empty_and_unknown_names() {
        let registry = ToolRegistry::new();
        let ctx = ToolContext::default();
        let err = registry.invoke("", &ParamMap::new(), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("tool name is empty"));
        let err = registry.invoke("nope", &ParamMap::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn registry_validates_before_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let ctx = ToolContext::default();

        let err = registry.invoke("echo", &ParamMap::new(), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("missing required argument: text"));

        let err = registry
            .invoke("echo", &params(json!({"text": 42})), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn content_serializes_as_typed_text() {
        let content = ToolContent::text("found it");
        assert_eq!(content.to_message_content(), r#"{"type":"text","text":"found it"}"#);
    }
}
