//! Guardrail trait — post-hoc validation of a candidate answer.
//!
//! A guardrail sees the user query, the candidate response, the full history
//! and the tool catalog, and decides whether the answer may be shown.

use crate::error::GuardrailError;
use crate::message::Message;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a guardrail backend is shown for one answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailRequest {
    /// The user's question for this turn
    pub query: String,

    /// The model's candidate answer
    pub response: String,

    /// Full conversation history, including this turn's tool exchanges
    pub messages: Vec<Message>,

    /// Tool descriptors available to the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Correlation metadata (integration tag, thread id)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The normalized outcome of validating one answer.
///
/// Whatever shape the backend answers in, adapters reduce it to this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Replace the candidate with `substitute_answer`
    pub should_override: bool,

    /// Present whenever `should_override` is set (after normalization)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute_answer: Option<String>,

    /// Opaque backend scores, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub diagnostics: serde_json::Map<String, serde_json::Value>,

    /// Set when the backend failed and the verdict failed open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,

    /// The backend escalated the answer to a human expert
    #[serde(default)]
    pub escalated: bool,
}

impl ValidationVerdict {
    /// A passing verdict with no diagnostics.
    pub fn pass() -> Self {
        Self::default()
    }

    /// A passing verdict recording why validation could not run.
    pub fn fail_open(error: impl std::fmt::Display) -> Self {
        Self {
            backend_error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// An overriding verdict carrying a substitute.
    pub fn replace_with(substitute: impl Into<String>) -> Self {
        Self {
            should_override: true,
            substitute_answer: Some(substitute.into()),
            ..Self::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.backend_error.is_some()
    }
}

/// The core Guardrail trait.
///
/// Implementations talk to one backend and are the only place that tolerates
/// variability in its response shape.
#[async_trait]
pub trait Guardrail: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Judge one candidate answer.
    async fn validate(&self, request: GuardrailRequest) -> std::result::Result<ValidationVerdict, GuardrailError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_verdict_is_permissive() {
        let v = ValidationVerdict::pass();
        assert!(!v.should_override);
        assert!(v.substitute_answer.is_none());
        assert!(!v.is_degraded());
    }

    #[test]
    fn fail_open_records_error() {
        let v = ValidationVerdict::fail_open(GuardrailError::Timeout(10));
        assert!(!v.should_override);
        assert!(v.is_degraded());
        assert!(v.backend_error.unwrap().contains("10s"));
    }

    #[test]
    fn request_serializes_metadata() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("thread_id".into(), serde_json::json!("abc"));
        let req = GuardrailRequest {
            query: "q".into(),
            response: "r".into(),
            messages: vec![Message::user("q")],
            tools: vec![],
            metadata,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["metadata"]["thread_id"], "abc");
        assert!(json.get("tools").is_none());
    }
}
