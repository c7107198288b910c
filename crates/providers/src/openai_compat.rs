//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any endpoint exposing a compatible
//! `/chat/completions` route (Azure proxies, vLLM, Ollama).
//!
//! Only non-streaming chat completions with function calling are used; the
//! agent needs whole replies to decide between answering and calling tools.

use async_trait::async_trait;
use salesdesk_core::error::ProviderError;
use salesdesk_core::message::{Message, MessageToolCall, Role};
use salesdesk_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible model backend.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            Duration::from_secs(60),
        )
    }

    /// Build the request body for `/chat/completions`.
    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages.iter().map(ApiMessage::from).collect::<Vec<_>>(),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools.iter().map(ApiToolDefinition::from).collect::<Vec<_>>());
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }

    /// Turn a decoded API response into our response type.
    fn from_api_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        // A text-only reply is the same message with no calls attached
        let message = Message::assistant_tool_request(choice.message.content, tool_calls);

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
        })
    }
}

#[async_trait]
impl salesdesk_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model backend returned error");
            return Err(status_error(status, retry_after, error_body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        Self::from_api_response(api_response)
    }
}

/// Map a non-success status to the matching error.
fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(5),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        let tool_calls = (!m.tool_calls.is_empty()).then(|| {
            m.tool_calls
                .iter()
                .map(|tc| ApiToolCall {
                    id: tc.id.clone(),
                    r#type: function_type(),
                    function: ApiFunction {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect()
        });
        Self {
            role: role.into(),
            content: m.content.clone(),
            tool_calls,
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for ApiToolDefinition {
    fn from(t: &ToolDefinition) -> Self {
        Self {
            r#type: function_type(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesdesk_core::Provider;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test").unwrap();
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url.contains("api.openai.com"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider =
            OpenAiCompatProvider::new("local", "http://localhost:11434/v1/", "x", Duration::from_secs(1))
                .unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn message_conversion_keeps_null_content_and_ids() {
        let call = MessageToolCall {
            id: "1".into(),
            name: "get_pipeline_report".into(),
            arguments: r#"{"close_date_filter":"next_month"}"#.into(),
        };
        let messages = vec![
            Message::system("You are a sales assistant"),
            Message::user("Pipeline next month?"),
            Message::assistant_tool_request(None, vec![call]),
            Message::tool_result("1", "{}"),
        ];
        let api_messages: Vec<ApiMessage> = messages.iter().map(ApiMessage::from).collect();
        assert_eq!(api_messages.len(), 4);
        assert_eq!(api_messages[0].role, "system");
        assert!(api_messages[2].content.is_none());
        assert_eq!(api_messages[2].tool_calls.as_ref().unwrap()[0].id, "1");
        assert_eq!(api_messages[3].tool_call_id.as_deref(), Some("1"));

        let json = serde_json::to_value(&api_messages[2]).unwrap();
        assert!(json["content"].is_null());
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "search_leads".into(),
            description: "Search leads".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools: Vec<ApiToolDefinition> = tools.iter().map(ApiToolDefinition::from).collect();
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "search_leads");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn request_body_omits_empty_optionals() {
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
            stop: vec![],
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], false);
        assert!(body.get("tools").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parse_tool_call_response() {
        let data = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "search_leads", "arguments": "{\"status\":\"Qualified\"}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "get_tasks", "arguments": "{}"}}
                    ]
                }
            }],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        }"#;
        let api: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::from_api_response(api).unwrap();
        assert!(response.message.content.is_none());
        let names: Vec<_> = response.message.tool_calls.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["search_leads", "get_tasks"]);
        assert_eq!(response.usage.unwrap().total_tokens, 120);
    }

    #[test]
    fn parse_text_response() {
        let data = r#"{"model":"gpt-4o","choices":[{"message":{"role":"assistant","content":"Hello"}}]}"#;
        let api: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::from_api_response(api).unwrap();
        assert_eq!(response.message.text(), "Hello");
        assert!(response.message.tool_calls.is_empty());
        assert!(response.usage.is_none());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, Some(12), String::new()),
            ProviderError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(matches!(
            status_error(429, None, String::new()),
            ProviderError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(status_error(401, None, String::new()), ProviderError::AuthenticationFailed(_)));
        assert!(matches!(
            status_error(500, None, "boom".into()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn empty_choices_is_malformed() {
        let api: ApiResponse = serde_json::from_str(r#"{"model":"gpt-4o","choices":[]}"#).unwrap();
        let err = OpenAiCompatProvider::from_api_response(api).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
