//! Scripted stand-ins for the model, the guardrail and tools.

use async_trait::async_trait;
use salesdesk_core::error::{GuardrailError, ProviderError, ToolError};
use salesdesk_core::guardrail::{Guardrail, GuardrailRequest, ValidationVerdict};
use salesdesk_core::message::{Message, MessageToolCall};
use salesdesk_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use salesdesk_core::tool::Tool;
use std::sync::Mutex;
use std::time::Duration;

/// Returns scripted responses in order. Once the script is exhausted the
/// last entry repeats.
pub struct ScriptedProvider {
    script: Vec<Result<ProviderResponse, ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        assert!(!script.is_empty(), "script must not be empty");
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            (requests.len() - 1).min(self.script.len() - 1)
        };
        self.script[index].clone()
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn tool_response(calls: Vec<MessageToolCall>, text: Option<&str>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_request(text.map(str::to_string), calls),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}

/// Returns one scripted verdict (or error) for every request.
pub struct ScriptedGuardrail {
    outcome: Result<ValidationVerdict, GuardrailError>,
    requests: Mutex<Vec<GuardrailRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGuardrail {
    pub fn new(outcome: Result<ValidationVerdict, GuardrailError>) -> Self {
        Self {
            outcome,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn passing() -> Self {
        Self::new(Ok(ValidationVerdict::pass()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<GuardrailRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Guardrail for ScriptedGuardrail {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn validate(&self, request: GuardrailRequest) -> Result<ValidationVerdict, GuardrailError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().unwrap().push(request);
        self.outcome.clone()
    }
}

/// Echoes its arguments after an optional delay; can be told to fail or panic.
pub struct StubTool {
    name: &'static str,
    delay: Duration,
    behavior: StubBehavior,
}

#[derive(Clone, Copy)]
pub enum StubBehavior {
    Echo,
    Fail,
    Panic,
}

impl StubTool {
    pub fn echo(name: &'static str) -> Self {
        Self {
            name,
            delay: Duration::ZERO,
            behavior: StubBehavior::Echo,
        }
    }

    pub fn with_behavior(mut self, behavior: StubBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            StubBehavior::Echo => Ok(serde_json::json!({"tool": self.name, "args": arguments})),
            StubBehavior::Fail => Err(ToolError::failed(self.name, "backend unavailable")),
            StubBehavior::Panic => panic!("{} exploded", self.name),
        }
    }
}
