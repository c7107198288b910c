//! Error types for the SalesDesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type.

use thiserror::Error;

/// Failure of the language-model backend. Aborts the current turn.
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

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failure while dispatching a single tool invocation.
///
/// Never fatal to a turn: the dispatcher folds these back into the
/// conversation as structured error payloads.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

impl ToolError {
    /// Shorthand for a handler-level failure.
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    /// The structured payload folded back to the model for this error.
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::NotFound(name) => serde_json::json!({
                "error": "tool not implemented",
                "tool": name,
            }),
            Self::InvalidArguments(detail) => serde_json::json!({
                "error": "invalid arguments",
                "detail": detail,
            }),
            Self::ExecutionFailed { reason, .. } => serde_json::json!({
                "error": reason,
            }),
            Self::Timeout { timeout_secs, .. } => serde_json::json!({
                "error": format!("tool timed out after {timeout_secs}s"),
            }),
        }
    }
}

/// Failure of the guardrail (validation) backend. Always degrades to a
/// fail-open verdict.
#[derive(Debug, Clone, Error)]
pub enum GuardrailError {
    #[error("Guardrail not configured: {0}")]
    NotConfigured(String),

    #[error("Guardrail request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Malformed guardrail response: {0}")]
    MalformedResponse(String),

    #[error("Guardrail timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),
}
