//! Post-hoc validation of the final candidate answer.
//!
//! The gateway always yields a verdict: an absent, failing or slow backend
//! degrades to a permissive one with `backend_error` set.

use salesdesk_core::error::GuardrailError;
use salesdesk_core::guardrail::{Guardrail, GuardrailRequest, ValidationVerdict};
use salesdesk_core::message::{Message, ThreadId};
use salesdesk_core::tool::ToolCatalog;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shown when the backend blocks an answer without offering a substitute.
pub const SAFETY_FALLBACK: &str = "🛡️ **Safety Alert**: I cannot provide a response to this request as it has been flagged by our safety systems.";

pub struct ValidationGateway {
    backend: Option<Arc<dyn Guardrail>>,
    timeout: Duration,
    integration: String,
}

impl ValidationGateway {
    pub fn new(backend: Option<Arc<dyn Guardrail>>) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(15),
            integration: "salesdesk".into(),
        }
    }

    /// A gateway with no backend; every answer passes.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_integration(mut self, integration: impl Into<String>) -> Self {
        self.integration = integration.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn validate(
        &self,
        query: &str,
        candidate: &str,
        history: &[Message],
        catalog: &ToolCatalog,
        thread_id: &ThreadId,
    ) -> ValidationVerdict {
        let Some(backend) = &self.backend else {
            return ValidationVerdict::pass();
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("integration".into(), serde_json::json!(self.integration));
        metadata.insert("thread_id".into(), serde_json::json!(thread_id.0));

        let request = GuardrailRequest {
            query: query.to_string(),
            response: candidate.to_string(),
            messages: history.to_vec(),
            tools: catalog.definitions(),
            metadata,
        };

        let outcome = match tokio::time::timeout(self.timeout, backend.validate(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GuardrailError::Timeout(self.timeout.as_secs())),
        };

        match outcome {
            Ok(verdict) => {
                let verdict = normalize(verdict);
                if verdict.should_override {
                    info!(thread_id = %thread_id.short(), backend = backend.name(), "Answer overridden by guardrail");
                }
                verdict
            }
            Err(e) => {
                warn!(thread_id = %thread_id.short(), backend = backend.name(), error = %e, "Validation failed open");
                ValidationVerdict::fail_open(e)
            }
        }
    }
}

/// A substitute is present exactly when the answer is overridden.
fn normalize(mut verdict: ValidationVerdict) -> ValidationVerdict {
    if verdict.should_override {
        let usable = verdict
            .substitute_answer
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if !usable {
            verdict.substitute_answer = Some(SAFETY_FALLBACK.to_string());
        }
    } else {
        verdict.substitute_answer = None;
    }
    verdict
}
