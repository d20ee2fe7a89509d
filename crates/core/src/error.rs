//! Error types for the ragrelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ragrelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Tool schema conversion ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Request validation ---
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed stream chunk: {0}")]
    MalformedChunk(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of the conversation, document and chat-log backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool call cancelled: {0}")]
    Cancelled(String),
}

impl ToolError {
    /// Whether the failure should be reported back to the model as tool
    /// output instead of dropping the call.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            ToolError::ExecutionFailed { .. }
                | ToolError::Timeout { .. }
                | ToolError::PermissionDenied { .. }
        )
    }
}

/// Errors raised while converting the tool catalog to provider schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Malformed raw schema for tool {tool}: {reason}")]
    MalformedRaw { tool: String, reason: String },

    #[error("Invalid property {property} in tool {tool}: {reason}")]
    InvalidProperty {
        tool: String,
        property: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "kb_create".into(),
            reason: "only admin can create document".into(),
        });
        assert!(err.to_string().contains("kb_create"));
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn reportable_tool_errors() {
        assert!(
            ToolError::ExecutionFailed {
                tool_name: "fetch".into(),
                reason: "status 404".into()
            }
            .is_reportable()
        );
        assert!(!ToolError::NotFound("nope".into()).is_reportable());
        assert!(!ToolError::InvalidArguments("subject".into()).is_reportable());
    }

    #[test]
    fn schema_error_names_tool() {
        let err = Error::Schema(SchemaError::MalformedRaw {
            tool: "fetch".into(),
            reason: "expected value".into(),
        });
        assert!(err.to_string().contains("fetch"));
    }
}
