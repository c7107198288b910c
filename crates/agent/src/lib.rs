//! The SalesDesk agent loop.
//!
//! A turn follows a **call model → run tools → call model … → validate**
//! cycle:
//!
//! 1. **Append** the user message (once, even when a turn is retried)
//! 2. **Call the model** with the full history and the tool catalog
//! 3. **If tool calls**: dispatch them, fold the results back, go to 2
//! 4. **If text**: pass it through the guardrail and show the effective answer
//!
//! The cycle is capped at a configured number of model calls; hitting the
//! cap ends the turn with a truncated answer instead of an error.

pub mod dispatcher;
pub mod loop_runner;
pub mod model_gateway;
pub mod system_prompt;
pub mod turn;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{ToolDispatcher, ToolResult};
pub use loop_runner::{AgentError, AgentLoop, DEFAULT_MAX_STEPS};
pub use model_gateway::{ModelGateway, ModelReply, ModelTurn};
pub use turn::{AgentTurnResult, ToolAuditRecord, TurnProgress};
pub use validation::{SAFETY_FALLBACK, ValidationGateway};
