//! Tool dispatch: lookup, argument parsing, guarded execution.
//!
//! Every failure mode of a single call (unknown tool, bad arguments, error
//! return, panic, timeout) ends up as a structured payload in the tool
//! message. Nothing here can abort a turn.

use crate::turn::ToolAuditRecord;
use futures::FutureExt;
use salesdesk_core::error::ToolError;
use salesdesk_core::event::{DomainEvent, EventBus};
use salesdesk_core::message::{Message, MessageToolCall};
use salesdesk_core::tool::ToolCatalog;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SUMMARY_CHARS: usize = 160;

/// Normalized outcome of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed arguments, or the raw text when they were not valid JSON
    pub arguments: serde_json::Value,
    pub outcome: Result<serde_json::Value, ToolError>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The payload folded back to the model: the handler's result, or the
    /// error payload.
    pub fn payload(&self) -> serde_json::Value {
        match &self.outcome {
            Ok(value) => value.clone(),
            Err(e) => e.to_payload(),
        }
    }

    /// Serialized payload for the tool message.
    pub fn content(&self) -> String {
        self.payload().to_string()
    }

    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.tool_call_id, self.content())
    }

    pub fn summary(&self) -> String {
        match &self.outcome {
            Ok(value) => summarize(value),
            Err(e) => e.to_string(),
        }
    }

    pub fn audit_record(&self, step: usize) -> ToolAuditRecord {
        ToolAuditRecord {
            step,
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
            success: self.is_success(),
            result: self.payload(),
            summary: self.summary(),
            duration_ms: self.duration_ms,
        }
    }
}

/// Short human-readable form of a success payload.
fn summarize(value: &serde_json::Value) -> String {
    if let Some(count) = value.get("total_count").and_then(|v| v.as_u64()) {
        return format!("{count} result(s)");
    }
    if let Some(status) = value.get("status").and_then(|v| v.as_str()) {
        return status.to_string();
    }
    let text = value.to_string();
    match text.char_indices().nth(SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text,
    }
}

/// Parse the model's raw argument text. Blank text means no arguments.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(serde_json::json!({}));
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ToolError::InvalidArguments(format!("malformed JSON: {e}"))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// Runs requested tool calls against the catalog.
pub struct ToolDispatcher {
    catalog: ToolCatalog,
    timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(catalog: ToolCatalog) -> Self {
        Self {
            catalog,
            timeout: Duration::from_secs(30),
            event_bus: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Execute one call. Never fails; errors become the result's outcome.
    pub async fn execute(&self, call: &MessageToolCall) -> ToolResult {
        let start = Instant::now();
        let parsed = parse_arguments(&call.arguments);
        let arguments = match &parsed {
            Ok(value) => value.clone(),
            Err(_) => serde_json::Value::String(call.arguments.clone()),
        };

        let outcome = match (self.catalog.get(&call.name), parsed) {
            (None, _) => Err(ToolError::NotFound(call.name.clone())),
            (Some(_), Err(e)) => Err(e),
            (Some(tool), Ok(args)) => {
                let guarded = AssertUnwindSafe(tool.execute(args)).catch_unwind();
                match tokio::time::timeout(self.timeout, guarded).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(ToolError::failed(
                        &call.name,
                        format!("tool panicked: {}", panic_message(panic.as_ref())),
                    )),
                    Err(_) => Err(ToolError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_secs: self.timeout.as_secs(),
                    }),
                }
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => debug!(tool = %call.name, id = %call.id, duration_ms, "Tool succeeded"),
            Err(e) => warn!(tool = %call.name, id = %call.id, duration_ms, error = %e, "Tool failed"),
        }
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: outcome.is_ok(),
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments,
            outcome,
            duration_ms,
        }
    }

    /// Execute calls concurrently; results come back in request order.
    pub async fn execute_all(&self, calls: &[MessageToolCall]) -> Vec<ToolResult> {
        futures::future::join_all(calls.iter().map(|call| self.execute(call))).await
    }
}
