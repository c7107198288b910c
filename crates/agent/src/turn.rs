//! Turn outcome and progress types.

use salesdesk_core::guardrail::ValidationVerdict;
use salesdesk_core::message::ThreadId;
use serde::{Deserialize, Serialize};

/// One dispatched tool call, as recorded for the turn's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAuditRecord {
    /// Model call (1-based) that requested the tool
    pub step: usize,
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed arguments, or the raw text when it was not valid JSON
    pub arguments: serde_json::Value,
    pub success: bool,
    /// Full structured result (the error payload on failure)
    pub result: serde_json::Value,
    /// One-line summary of `result`
    pub summary: String,
    pub duration_ms: u64,
}

/// Everything a caller needs after a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTurnResult {
    pub thread_id: ThreadId,
    /// The answer shown to the user (possibly substituted)
    pub final_text: String,
    pub was_overridden: bool,
    /// The step cap was hit while the model still wanted tools
    pub was_truncated: bool,
    pub tool_audit: Vec<ToolAuditRecord>,
    /// Number of model calls made this turn
    pub step_count: usize,
    /// `None` for truncated turns, which skip validation
    pub verdict: Option<ValidationVerdict>,
}

impl AgentTurnResult {
    /// Validation backend was configured but failed (answer shown unchecked).
    pub fn validation_degraded(&self) -> bool {
        self.verdict.as_ref().is_some_and(ValidationVerdict::is_degraded)
    }

    pub fn escalated(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.escalated)
    }
}

/// Intermediate progress of a running turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnProgress {
    /// A model call is about to be made
    Step { step: usize, max_steps: usize },
    /// The model asked for tools
    ToolsRequested { step: usize, tools: Vec<String> },
    ToolFinished {
        tool: String,
        success: bool,
        duration_ms: u64,
    },
    /// The final candidate answer is being validated
    Validating,
}

impl std::fmt::Display for TurnProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step { step, max_steps } => write!(f, "step {step} of {max_steps}"),
            Self::ToolsRequested { tools, .. } => write!(f, "calling {}", tools.join(", ")),
            Self::ToolFinished {
                tool,
                success,
                duration_ms,
            } => {
                let status = if *success { "ok" } else { "failed" };
                write!(f, "{tool} {status} ({duration_ms}ms)")
            }
            Self::Validating => write!(f, "validating answer"),
        }
    }
}
