//! HTTP JSON guardrail adapter.
//!
//! POSTs `{query, response, messages, tools, metadata}` to
//! `{base_url}/projects/{project_id}/validate` and reduces whatever comes
//! back to a [`ValidationVerdict`]. Backends disagree on field names, so
//! the decoder accepts the known aliases:
//!
//! | verdict field      | accepted response keys                          |
//! |--------------------|-------------------------------------------------|
//! | `should_override`  | `should_guardrail`, `should_override`, `guardrailed` |
//! | `substitute_answer`| `expert_answer`, `substitute_answer`            |
//! | `escalated`        | `escalated_to_sme`, `escalated`                 |
//! | `diagnostics`      | `eval_scores`, `scores`                         |
//!
//! A response without any override key is malformed.

use async_trait::async_trait;
use salesdesk_core::error::GuardrailError;
use salesdesk_core::guardrail::{Guardrail, GuardrailRequest, ValidationVerdict};
use salesdesk_core::message::{Message, Role};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const OVERRIDE_KEYS: &[&str] = &["should_guardrail", "should_override", "guardrailed"];
const SUBSTITUTE_KEYS: &[&str] = &["expert_answer", "substitute_answer"];
const ESCALATION_KEYS: &[&str] = &["escalated_to_sme", "escalated"];
const SCORE_KEYS: &[&str] = &["eval_scores", "scores"];

/// A guardrail reached over HTTP.
pub struct HttpGuardrail {
    base_url: String,
    api_key: String,
    project_id: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpGuardrail {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GuardrailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardrailError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            project_id: project_id.into(),
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/projects/{}/validate", self.base_url, self.project_id)
    }

    fn request_body(request: &GuardrailRequest) -> Value {
        let messages: Vec<WireMessage<'_>> = request.messages.iter().map(WireMessage::from).collect();
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        serde_json::json!({
            "query": request.query,
            "response": request.response,
            "context": "",
            "messages": messages,
            "tools": tools,
            "metadata": request.metadata,
        })
    }
}

/// Chat-format view of a message as the backend expects it.
#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            },
            content: m.content.as_deref(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {"name": tc.name, "arguments": tc.arguments},
                    })
                })
                .collect(),
            tool_call_id: m.tool_call_id.as_deref(),
        }
    }
}

fn first_bool(body: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| body.get(*k).and_then(Value::as_bool))
}

/// Reduce a backend response to a verdict.
///
/// Normalization of an override without substitute is left to the caller.
pub fn verdict_from_json(body: &Value) -> Result<ValidationVerdict, GuardrailError> {
    if !body.is_object() {
        return Err(GuardrailError::MalformedResponse(
            "expected a JSON object".into(),
        ));
    }

    let should_override = first_bool(body, OVERRIDE_KEYS).ok_or_else(|| {
        GuardrailError::MalformedResponse(format!(
            "missing override flag (one of {})",
            OVERRIDE_KEYS.join(", ")
        ))
    })?;

    let substitute_answer = SUBSTITUTE_KEYS
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let diagnostics = SCORE_KEYS
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_object))
        .cloned()
        .unwrap_or_default();

    Ok(ValidationVerdict {
        should_override,
        // A substitute only matters when the answer is replaced
        substitute_answer: substitute_answer.filter(|_| should_override),
        diagnostics,
        backend_error: None,
        escalated: first_bool(body, ESCALATION_KEYS).unwrap_or(false),
    })
}

#[async_trait]
impl Guardrail for HttpGuardrail {
    fn name(&self) -> &str {
        "http"
    }

    async fn validate(
        &self,
        request: GuardrailRequest,
    ) -> std::result::Result<ValidationVerdict, GuardrailError> {
        let body = Self::request_body(&request);
        debug!(
            project = %self.project_id,
            messages = request.messages.len(),
            "Sending validation request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GuardrailError::Timeout(self.timeout.as_secs())
                } else {
                    GuardrailError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Guardrail returned error");
            return Err(GuardrailError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| GuardrailError::MalformedResponse(e.to_string()))?;

        verdict_from_json(&json)
    }
}
