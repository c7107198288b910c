//! Lead management tools: search, create, update status.

use crate::{filter, to_payload};
use async_trait::async_trait;
use salesdesk_core::error::ToolError;
use salesdesk_core::tool::{Tool, ToolEffect, parse_args};
use salesdesk_crm::{CrmStore, Lead, new_id};
use serde::Deserialize;
use std::sync::Arc;

pub struct SearchLeadsTool {
    store: Arc<CrmStore>,
}

impl SearchLeadsTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct SearchLeadsArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[async_trait]
impl Tool for SearchLeadsTool {
    fn name(&self) -> &str {
        "search_leads"
    }

    fn description(&self) -> &str {
        "Search and filter leads in the CRM by name, company, status, or source"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query for name, company, or email"},
                "status": {"type": "string", "description": "Filter by lead status (New, Contacted, Qualified, etc.)"},
                "source": {"type": "string", "description": "Filter by lead source (Website, LinkedIn, Referral, etc.)"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: SearchLeadsArgs = parse_args(self.name(), arguments)?;
        let query = filter(&args.query).map(str::to_lowercase);
        let status = filter(&args.status);
        let source = filter(&args.source);

        let data = self.store.read().await;
        let results: Vec<&Lead> = data
            .leads
            .iter()
            .filter(|l| query.as_deref().is_none_or(|q| l.matches(q)))
            .filter(|l| status.is_none_or(|s| l.status.eq_ignore_ascii_case(s)))
            .filter(|l| source.is_none_or(|s| l.source.eq_ignore_ascii_case(s)))
            .collect();

        Ok(serde_json::json!({
            "query": args.query,
            "filters": {"status": status, "source": source},
            "total_count": results.len(),
            "results": to_payload(self.name(), &results)?,
        }))
    }
}

pub struct CreateLeadTool {
    store: Arc<CrmStore>,
}

impl CreateLeadTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct CreateLeadArgs {
    name: String,
    company: String,
    email: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    value: Option<u64>,
}

#[async_trait]
impl Tool for CreateLeadTool {
    fn name(&self) -> &str {
        "create_lead"
    }

    fn description(&self) -> &str {
        "Create a new lead in the CRM system"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Contact person's name"},
                "company": {"type": "string", "description": "Company name"},
                "email": {"type": "string", "description": "Contact email address"},
                "phone": {"type": "string", "description": "Contact phone number (optional)"},
                "source": {"type": "string", "description": "Lead source (Website, LinkedIn, Referral, etc.)"},
                "value": {"type": "integer", "description": "Estimated deal value in dollars"}
            },
            "required": ["name", "company", "email"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: CreateLeadArgs = parse_args(self.name(), arguments)?;
        if args.name.trim().is_empty() || args.company.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "create_lead: name and company must not be empty".into(),
            ));
        }

        let lead = Lead {
            lead_id: new_id("LEAD"),
            name: args.name.trim().to_string(),
            company: args.company.trim().to_string(),
            email: args.email.trim().to_string(),
            phone: filter(&args.phone).unwrap_or("Not provided").to_string(),
            status: "New".into(),
            value: args.value.unwrap_or(0),
            source: filter(&args.source).unwrap_or("Manual").to_string(),
            created: self.store.today(),
            industry: None,
            company_size: None,
            location: None,
            title: None,
            notes: None,
        };

        self.store.write().await.leads.push(lead.clone());
        tracing::info!(lead_id = %lead.lead_id, company = %lead.company, "Lead created");

        Ok(serde_json::json!({
            "lead_id": lead.lead_id,
            "lead": to_payload(self.name(), &lead)?,
            "status": "Created Successfully",
        }))
    }
}

pub struct UpdateLeadStatusTool {
    store: Arc<CrmStore>,
}

impl UpdateLeadStatusTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct UpdateLeadStatusArgs {
    lead_id: String,
    new_status: String,
    #[serde(default)]
    notes: Option<String>,
}

#[async_trait]
impl Tool for UpdateLeadStatusTool {
    fn name(&self) -> &str {
        "update_lead_status"
    }

    fn description(&self) -> &str {
        "Update the status of a lead and add notes"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": {"type": "string", "description": "Lead ID to update"},
                "new_status": {"type": "string", "description": "New status (New, Contacted, Qualified, Proposal, Closed Won, Closed Lost)"},
                "notes": {"type": "string", "description": "Notes about the status change"}
            },
            "required": ["lead_id", "new_status"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: UpdateLeadStatusArgs = parse_args(self.name(), arguments)?;
        let new_status = args.new_status.trim();
        if new_status.is_empty() {
            return Err(ToolError::InvalidArguments(
                "update_lead_status: new_status must not be empty".into(),
            ));
        }

        let mut data = self.store.write().await;
        let lead = data
            .lead_mut(args.lead_id.trim())
            .ok_or_else(|| ToolError::failed(self.name(), "Lead not found"))?;

        let old_status = std::mem::replace(&mut lead.status, new_status.to_string());
        if let Some(note) = filter(&args.notes) {
            lead.notes = Some(match lead.notes.take() {
                Some(existing) => format!("{existing}; {note}"),
                None => note.to_string(),
            });
        }

        Ok(serde_json::json!({
            "lead_id": lead.lead_id,
            "old_status": old_status,
            "new_status": lead.status,
            "notes": args.notes,
            "status": "Updated Successfully",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use serde_json::json;

    #[tokio::test]
    async fn search_by_status_is_case_insensitive() {
        let tool = SearchLeadsTool::new(test_store());
        let out = tool.execute(json!({"status": "qualified"})).await.unwrap();
        assert_eq!(out["total_count"], 9);
    }

    #[tokio::test]
    async fn search_by_query_matches_company() {
        let tool = SearchLeadsTool::new(test_store());
        let out = tool.execute(json!({"query": "techcorp"})).await.unwrap();
        assert_eq!(out["total_count"], 1);
        assert_eq!(out["results"][0]["lead_id"], "LEAD001");
    }

    #[tokio::test]
    async fn blank_filters_are_ignored() {
        let tool = SearchLeadsTool::new(test_store());
        let out = tool.execute(json!({"status": "", "source": null})).await.unwrap();
        assert_eq!(out["total_count"], 20);
    }

    #[tokio::test]
    async fn create_lead_appends_new_record() {
        let store = test_store();
        let tool = CreateLeadTool::new(store.clone());
        let out = tool
            .execute(json!({"name": "Ada Park", "company": "Orbit Labs", "email": "ada@orbit.io"}))
            .await
            .unwrap();

        let id = out["lead_id"].as_str().unwrap().to_string();
        assert!(id.starts_with("LEAD"));
        assert_eq!(out["lead"]["status"], "New");
        assert_eq!(out["lead"]["source"], "Manual");
        assert_eq!(out["lead"]["created"], "2024-03-10");

        let data = store.read().await;
        assert_eq!(data.leads.len(), 21);
        assert_eq!(data.lead(&id).unwrap().phone, "Not provided");
    }

    #[tokio::test]
    async fn create_lead_requires_email() {
        let tool = CreateLeadTool::new(test_store());
        let err = tool
            .execute(json!({"name": "Ada", "company": "Orbit"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn update_status_records_old_value() {
        let store = test_store();
        let tool = UpdateLeadStatusTool::new(store.clone());
        let out = tool
            .execute(json!({"lead_id": "LEAD005", "new_status": "Contacted", "notes": "Intro call"}))
            .await
            .unwrap();
        assert_eq!(out["old_status"], "New");
        assert_eq!(out["new_status"], "Contacted");
        let data = store.read().await;
        assert_eq!(data.lead("LEAD005").unwrap().notes.as_deref(),
            Some("Interested in supply chain optimization; Intro call"));
    }

    #[tokio::test]
    async fn update_unknown_lead_fails() {
        let tool = UpdateLeadStatusTool::new(test_store());
        let err = tool
            .execute(json!({"lead_id": "LEAD999", "new_status": "Qualified"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_payload()["error"], "Lead not found");
    }
}
