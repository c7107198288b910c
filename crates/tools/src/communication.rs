//! Outreach tools: templated sales emails and follow-up scheduling.

use crate::{date_arg, filter, to_payload};
use async_trait::async_trait;
use salesdesk_core::error::ToolError;
use salesdesk_core::tool::{Tool, ToolEffect, parse_args};
use salesdesk_crm::{CrmStore, Lead, Task, TaskStatus, new_id};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmailKind {
    FollowUp,
    Proposal,
    Discovery,
}

impl EmailKind {
    /// Unknown kinds fall back to a follow-up.
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase().replace(['-', ' '], "_")).as_deref() {
            Some("proposal") => Self::Proposal,
            Some("discovery") => Self::Discovery,
            _ => Self::FollowUp,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::FollowUp => "follow_up",
            Self::Proposal => "proposal",
            Self::Discovery => "discovery",
        }
    }

    fn render(self, lead: &Lead) -> (String, String) {
        let (name, company) = (&lead.name, &lead.company);
        match self {
            Self::FollowUp => (
                format!("Following up on {company} - Next Steps"),
                format!(
                    "Hi {name},\n\nI hope this email finds you well. I wanted to follow up on our recent \
                     conversation about how our solution could benefit {company}.\n\nBased on what we \
                     discussed, I believe we can help you achieve your goals of [specific benefit].\n\n\
                     Would you be available for a 15-minute call this week to discuss this further?\n\n\
                     Best regards,\n[Your Name]\n[Your Title]\n[Company Name]"
                ),
            ),
            Self::Proposal => (
                format!("Proposal for {company} - Custom Solution"),
                format!(
                    "Hi {name},\n\nThank you for the opportunity to present a proposal for {company}.\n\n\
                     I've prepared a comprehensive solution that addresses your specific needs:\n\n\
                     • [Key Benefit 1]\n• [Key Benefit 2]\n• [Key Benefit 3]\n\nInvestment: ${}\n\n\
                     I'm available to walk through this proposal and answer any questions you may have.\n\n\
                     Best regards,\n[Your Name]",
                    thousands(lead.value)
                ),
            ),
            Self::Discovery => (
                format!("Discovery Call - Understanding {company}'s Needs"),
                format!(
                    "Hi {name},\n\nThank you for your interest in our solution. I'd love to learn more \
                     about {company} and how we can help you achieve your objectives.\n\nI've scheduled \
                     a 30-minute discovery call to understand:\n\n• Your current challenges\n\
                     • Your goals and objectives\n• How our solution can help\n\nPlease let me know if \
                     this time works for you.\n\nBest regards,\n[Your Name]"
                ),
            ),
        }
    }
}

/// `1234567` -> `1,234,567`
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub struct GenerateSalesEmailTool {
    store: Arc<CrmStore>,
}

impl GenerateSalesEmailTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct SalesEmailArgs {
    lead_id: String,
    #[serde(default)]
    email_type: Option<String>,
}

#[async_trait]
impl Tool for GenerateSalesEmailTool {
    fn name(&self) -> &str {
        "generate_sales_email"
    }

    fn description(&self) -> &str {
        "Generate personalized sales emails for leads"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": {"type": "string", "description": "Lead ID to generate email for"},
                "email_type": {"type": "string", "description": "Type of email (follow_up, proposal, discovery)"}
            },
            "required": ["lead_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: SalesEmailArgs = parse_args(self.name(), arguments)?;
        let kind = EmailKind::parse(filter(&args.email_type));

        let data = self.store.read().await;
        let lead = data
            .lead(args.lead_id.trim())
            .ok_or_else(|| ToolError::failed(self.name(), "Lead not found"))?;
        let (subject, body) = kind.render(lead);

        Ok(serde_json::json!({
            "lead_id": lead.lead_id,
            "lead_name": lead.name,
            "company": lead.company,
            "to": lead.email,
            "email_type": kind.as_str(),
            "subject": subject,
            "body": body,
        }))
    }
}

pub struct ScheduleFollowUpTool {
    store: Arc<CrmStore>,
}

impl ScheduleFollowUpTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct FollowUpArgs {
    lead_id: String,
    follow_up_date: String,
    #[serde(default)]
    notes: Option<String>,
}

#[async_trait]
impl Tool for ScheduleFollowUpTool {
    fn name(&self) -> &str {
        "schedule_follow_up"
    }

    fn description(&self) -> &str {
        "Schedule a follow-up task for a lead"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": {"type": "string", "description": "Lead ID to schedule follow-up for"},
                "follow_up_date": {"type": "string", "description": "Date for follow-up (YYYY-MM-DD)"},
                "notes": {"type": "string", "description": "Notes about the follow-up task"}
            },
            "required": ["lead_id", "follow_up_date"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: FollowUpArgs = parse_args(self.name(), arguments)?;
        let due_date = date_arg(self.name(), &args.follow_up_date)?;

        let mut data = self.store.write().await;
        let lead = data
            .lead(args.lead_id.trim())
            .ok_or_else(|| ToolError::failed(self.name(), "Lead not found"))?;

        let task = Task {
            task_id: new_id("TASK"),
            lead_id: lead.lead_id.clone(),
            lead_name: lead.name.clone(),
            company: lead.company.clone(),
            task_type: "Follow-up".into(),
            due_date,
            status: TaskStatus::Pending,
            notes: filter(&args.notes).unwrap_or("Follow-up scheduled").to_string(),
            assigned_to: data.owner_for_lead(&lead.lead_id).unwrap_or("Unassigned").to_string(),
            priority: "Medium".into(),
        };
        data.tasks.push(task.clone());
        tracing::info!(task_id = %task.task_id, lead_id = %task.lead_id, %due_date, "Follow-up scheduled");

        Ok(serde_json::json!({
            "task_id": task.task_id,
            "task": to_payload(self.name(), &task)?,
            "status": "Scheduled",
        }))
    }
}
