//! Task tools: list and complete follow-ups.

use crate::{date_arg, filter, to_payload};
use async_trait::async_trait;
use salesdesk_core::error::ToolError;
use salesdesk_core::tool::{Tool, ToolEffect, parse_args};
use salesdesk_crm::{CrmStore, Task, TaskStatus};
use serde::Deserialize;
use std::sync::Arc;

/// Status filter accepted by `get_tasks`. `Overdue` is derived, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusFilter {
    Pending,
    Completed,
    Overdue,
}

impl StatusFilter {
    fn parse(tool: &str, raw: &str) -> Result<Self, ToolError> {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "overdue" => Ok(Self::Overdue),
            other => Err(ToolError::InvalidArguments(format!(
                "{tool}: unknown task status '{other}' (expected Pending, Completed or Overdue)"
            ))),
        }
    }

    fn matches(self, task: &Task, today: chrono::NaiveDate) -> bool {
        match self {
            Self::Pending => task.status == TaskStatus::Pending,
            Self::Completed => task.status == TaskStatus::Completed,
            Self::Overdue => task.is_overdue(today),
        }
    }
}

pub struct GetTasksTool {
    store: Arc<CrmStore>,
}

impl GetTasksTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct GetTasksArgs {
    #[serde(default)]
    lead_id: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl Tool for GetTasksTool {
    fn name(&self) -> &str {
        "get_tasks"
    }

    fn description(&self) -> &str {
        "Get scheduled tasks and follow-ups"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": {"type": "string", "description": "Filter by lead ID (optional)"},
                "due_date": {"type": "string", "description": "Filter by due date (YYYY-MM-DD)"},
                "status": {"type": "string", "description": "Filter by task status (Pending, Completed, Overdue)"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: GetTasksArgs = parse_args(self.name(), arguments)?;
        let lead_id = filter(&args.lead_id);
        let due_date = filter(&args.due_date)
            .map(|raw| date_arg(self.name(), raw))
            .transpose()?;
        let status = filter(&args.status)
            .map(|raw| StatusFilter::parse(self.name(), raw))
            .transpose()?;
        let today = self.store.today();

        let data = self.store.read().await;
        let tasks: Vec<&Task> = data
            .tasks
            .iter()
            .filter(|t| lead_id.is_none_or(|id| t.lead_id == id))
            .filter(|t| due_date.is_none_or(|d| t.due_date == d))
            .filter(|t| status.is_none_or(|s| s.matches(t, today)))
            .collect();

        Ok(serde_json::json!({
            "filters": {"lead_id": lead_id, "due_date": due_date, "status": filter(&args.status)},
            "tasks": to_payload(self.name(), &tasks)?,
            "total_count": tasks.len(),
        }))
    }
}

pub struct CompleteTaskTool {
    store: Arc<CrmStore>,
}

impl CompleteTaskTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct CompleteTaskArgs {
    task_id: String,
    #[serde(default)]
    completion_notes: Option<String>,
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Mark a task as completed"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "Task ID to complete"},
                "completion_notes": {"type": "string", "description": "Notes about task completion"}
            },
            "required": ["task_id"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: CompleteTaskArgs = parse_args(self.name(), arguments)?;
        let today = self.store.today();
        let notes = filter(&args.completion_notes).unwrap_or("Task completed");

        let mut data = self.store.write().await;
        let task = data
            .task_mut(args.task_id.trim())
            .ok_or_else(|| ToolError::failed(self.name(), "Task not found"))?;

        let previous = task.status;
        task.status = TaskStatus::Completed;
        task.notes = if task.notes.is_empty() {
            notes.to_string()
        } else {
            format!("{}; {notes}", task.notes)
        };
        tracing::info!(task_id = %task.task_id, ?previous, "Task completed");

        Ok(serde_json::json!({
            "task_id": task.task_id,
            "task": to_payload(self.name(), &*task)?,
            "status": "Completed",
            "completion_notes": notes,
            "completed_on": today,
        }))
    }
}
