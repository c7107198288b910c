//! One request/response exchange with the language model.

use salesdesk_core::error::ProviderError;
use salesdesk_core::message::{Message, MessageToolCall};
use salesdesk_core::provider::{Provider, ProviderRequest, Usage};
use salesdesk_core::tool::ToolCatalog;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What the model decided to do with one step.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// A natural-language answer; the turn moves on to validation
    FinalAnswer(String),
    /// Tool invocations, optionally with accompanying text
    ToolRequest {
        calls: Vec<MessageToolCall>,
        text: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ModelReply {
    pub turn: ModelTurn,
    pub usage: Option<Usage>,
    pub model: String,
}

/// Sends the history and tool catalog to the provider and normalizes the
/// answer into a [`ModelTurn`]. Never touches conversation state.
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one model call for `step` (1-based, used to mint missing ids).
    pub async fn complete(
        &self,
        history: &[Message],
        catalog: &ToolCatalog,
        step: usize,
    ) -> Result<ModelReply, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: history.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: catalog.definitions(),
            stop: vec![],
        };

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("no model response within {}s", self.timeout.as_secs()))
            })??;

        let turn = normalize(response.message, step)?;
        debug!(
            provider = self.provider.name(),
            step,
            tool_calls = match &turn {
                ModelTurn::ToolRequest { calls, .. } => calls.len(),
                ModelTurn::FinalAnswer(_) => 0,
            },
            "Model responded"
        );

        Ok(ModelReply {
            turn,
            usage: response.usage,
            model: response.model,
        })
    }
}

fn normalize(message: Message, step: usize) -> Result<ModelTurn, ProviderError> {
    if message.tool_calls.is_empty() {
        return message
            .content
            .filter(|c| !c.trim().is_empty())
            .map(ModelTurn::FinalAnswer)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("model returned neither text nor tool calls".into())
            });
    }

    // Text next to tool calls is kept verbatim
    Ok(ModelTurn::ToolRequest {
        calls: assign_ids(message.tool_calls, step),
        text: message.content.filter(|c| !c.is_empty()),
    })
}

/// Give every call a non-empty id that is unique within the message.
/// Ids the model supplied are kept; minted ones never reuse them.
fn assign_ids(mut calls: Vec<MessageToolCall>, step: usize) -> Vec<MessageToolCall> {
    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    for (index, call) in calls.iter().enumerate() {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            missing.push(index);
        }
    }

    for index in missing {
        let mut id = format!("call_{step}_{index}");
        let mut suffix = 1;
        while seen.contains(&id) {
            id = format!("call_{step}_{index}_{suffix}");
            suffix += 1;
        }
        seen.insert(id.clone());
        calls[index].id = id;
    }
    calls
}
