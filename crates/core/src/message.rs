//! Message and conversation state domain types.
//!
//! These are the value objects that flow through a turn:
//! user asks → model requests tools → tools answer → model answers → guardrail checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Stable identifier for a conversation thread (one per session).
///
/// Only used for external correlation and logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    /// First eight characters, for compact display.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The sales rep asking questions
    User,
    /// The assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content. `None` for assistant messages that only carry tool requests.
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (validation flags, step number, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that requests tools, with optional
    /// accompanying text ("Let me look that up").
    pub fn assistant_tool_request(content: Option<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        let mut message = Self::with_role(Role::Assistant, content);
        message.tool_calls = tool_calls;
        message
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::with_role(Role::Tool, Some(content.into()));
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// The text content, or an empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Attach a metadata entry (builder style).
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call within its message
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as the raw JSON string produced by the model
    pub arguments: String,
}

/// The per-session conversation: ordered history plus a stable thread id.
///
/// Appends are monotonic. The agent loop is the only writer; callers
/// serialize turns by holding `&mut ConversationState`, and start a new
/// thread by discarding the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    thread_id: ThreadId,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Start a new thread seeded with exactly one system message.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_thread_id(ThreadId::new(), system_prompt)
    }

    /// Start a thread with a caller-chosen id.
    pub fn with_thread_id(thread_id: ThreadId, system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            messages: vec![Message::system(system_prompt)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// The ordered history.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append a batch of messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.updated_at = Utc::now();
        self.messages.extend(messages);
    }

    /// Whether the last message is a user message with exactly this text.
    pub fn ends_with_user(&self, text: &str) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content.as_deref() == Some(text))
    }

    /// Ids of tool messages with no matching request in an earlier assistant message.
    ///
    /// Empty for every history the agent loop produces.
    pub fn orphaned_tool_results(&self) -> Vec<String> {
        let mut requested: HashSet<&str> = HashSet::new();
        let mut orphans = Vec::new();

        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    requested.extend(message.tool_calls.iter().map(|tc| tc.id.as_str()));
                }
                Role::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or("");
                    if !requested.contains(id) {
                        orphans.push(id.to_string());
                    }
                }
                _ => {}
            }
        }
        orphans
    }
}
