//! # SalesDesk Core
//!
//! Domain types, traits, and error definitions for the SalesDesk sales
//! assistant. This crate has **no framework dependencies**: it defines the
//! conversation model and the seams (model backend, tools, guardrail) that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each external collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping backends via configuration
//! - Testing the agent loop with scripted stand-ins
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod guardrail;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{GuardrailError, ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use guardrail::{Guardrail, GuardrailRequest, ValidationVerdict};
pub use message::{ConversationState, Message, MessageToolCall, Role, ThreadId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCatalog, ToolEffect, parse_args};
