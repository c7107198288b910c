//! Opportunity tools: details, create, update.

use crate::{date_arg, filter, to_payload};
use async_trait::async_trait;
use salesdesk_core::error::ToolError;
use salesdesk_core::tool::{Tool, ToolEffect, parse_args};
use salesdesk_crm::{CrmStore, Opportunity, new_id};
use serde::Deserialize;
use std::sync::Arc;

fn check_probability(tool: &str, probability: Option<u8>) -> Result<(), ToolError> {
    match probability {
        Some(p) if p > 100 => Err(ToolError::InvalidArguments(format!(
            "{tool}: probability must be between 0 and 100, got {p}"
        ))),
        _ => Ok(()),
    }
}

pub struct GetOpportunityDetailsTool {
    store: Arc<CrmStore>,
}

impl GetOpportunityDetailsTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct OpportunityDetailsArgs {
    #[serde(default)]
    opportunity_id: Option<String>,
    #[serde(default)]
    lead_id: Option<String>,
}

#[async_trait]
impl Tool for GetOpportunityDetailsTool {
    fn name(&self) -> &str {
        "get_opportunity_details"
    }

    fn description(&self) -> &str {
        "Get detailed information about sales opportunities and their associated leads"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "opportunity_id": {"type": "string", "description": "Specific opportunity ID to look up"},
                "lead_id": {"type": "string", "description": "Lead ID to find all associated opportunities"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: OpportunityDetailsArgs = parse_args(self.name(), arguments)?;
        let opportunity_id = filter(&args.opportunity_id);
        let lead_id = filter(&args.lead_id);
        if opportunity_id.is_none() && lead_id.is_none() {
            return Err(ToolError::InvalidArguments(
                "get_opportunity_details: provide opportunity_id or lead_id".into(),
            ));
        }

        let data = self.store.read().await;

        if let Some(opp) = opportunity_id.and_then(|id| data.opportunity(id)) {
            return Ok(serde_json::json!({
                "opportunity_id": opp.opportunity_id,
                "opportunity": to_payload(self.name(), opp)?,
                "lead": to_payload(self.name(), &data.lead(&opp.lead_id))?,
            }));
        }

        if let Some(lead) = lead_id.and_then(|id| data.lead(id)) {
            let opportunities: Vec<&Opportunity> = data.opportunities_for_lead(&lead.lead_id).collect();
            return Ok(serde_json::json!({
                "lead_id": lead.lead_id,
                "lead": to_payload(self.name(), lead)?,
                "total_count": opportunities.len(),
                "opportunities": to_payload(self.name(), &opportunities)?,
            }));
        }

        Err(ToolError::failed(self.name(), "Opportunity or lead not found"))
    }
}

pub struct CreateOpportunityTool {
    store: Arc<CrmStore>,
}

impl CreateOpportunityTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct CreateOpportunityArgs {
    lead_id: String,
    name: String,
    stage: String,
    value: u64,
    #[serde(default)]
    probability: Option<u8>,
    #[serde(default)]
    close_date: Option<String>,
    #[serde(default)]
    owner: Option<String>,
}

#[async_trait]
impl Tool for CreateOpportunityTool {
    fn name(&self) -> &str {
        "create_opportunity"
    }

    fn description(&self) -> &str {
        "Create a new sales opportunity"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": {"type": "string", "description": "Associated lead ID"},
                "name": {"type": "string", "description": "Opportunity name"},
                "stage": {"type": "string", "description": "Sales stage (Discovery, Proposal, Negotiation, Closed Won, Closed Lost)"},
                "value": {"type": "integer", "description": "Deal value in dollars"},
                "probability": {"type": "integer", "description": "Probability percentage (0-100)"},
                "close_date": {"type": "string", "description": "Expected close date (YYYY-MM-DD)"},
                "owner": {"type": "string", "description": "Sales rep assigned"}
            },
            "required": ["lead_id", "name", "stage", "value"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: CreateOpportunityArgs = parse_args(self.name(), arguments)?;
        check_probability(self.name(), args.probability)?;
        let today = self.store.today();
        let close_date = match filter(&args.close_date) {
            Some(raw) => date_arg(self.name(), raw)?,
            None => today.checked_add_days(chrono::Days::new(30)).unwrap_or(today),
        };

        let mut data = self.store.write().await;
        if data.lead(args.lead_id.trim()).is_none() {
            return Err(ToolError::failed(self.name(), "Lead not found"));
        }

        let opportunity = Opportunity {
            opportunity_id: new_id("OPP"),
            lead_id: args.lead_id.trim().to_string(),
            name: args.name,
            stage: args.stage,
            value: args.value,
            probability: args.probability.unwrap_or(50),
            close_date,
            owner: filter(&args.owner).unwrap_or("Unassigned").to_string(),
            created: today,
            last_activity: Some(today),
            notes: None,
        };
        data.opportunities.push(opportunity.clone());
        tracing::info!(opportunity_id = %opportunity.opportunity_id, value = opportunity.value, "Opportunity created");

        Ok(serde_json::json!({
            "opportunity_id": opportunity.opportunity_id,
            "opportunity": to_payload(self.name(), &opportunity)?,
            "status": "Created Successfully",
        }))
    }
}

pub struct UpdateOpportunityTool {
    store: Arc<CrmStore>,
}

impl UpdateOpportunityTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct UpdateOpportunityArgs {
    opportunity_id: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    value: Option<u64>,
    #[serde(default)]
    probability: Option<u8>,
    #[serde(default)]
    close_date: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[async_trait]
impl Tool for UpdateOpportunityTool {
    fn name(&self) -> &str {
        "update_opportunity"
    }

    fn description(&self) -> &str {
        "Update opportunity details and stage"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "opportunity_id": {"type": "string", "description": "Opportunity ID to update"},
                "stage": {"type": "string", "description": "New sales stage"},
                "value": {"type": "integer", "description": "Updated deal value"},
                "probability": {"type": "integer", "description": "Updated probability percentage"},
                "close_date": {"type": "string", "description": "Updated close date"},
                "notes": {"type": "string", "description": "Update notes"}
            },
            "required": ["opportunity_id"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: UpdateOpportunityArgs = parse_args(self.name(), arguments)?;
        check_probability(self.name(), args.probability)?;
        let close_date = filter(&args.close_date)
            .map(|raw| date_arg(self.name(), raw))
            .transpose()?;
        let today = self.store.today();

        let mut data = self.store.write().await;
        let opp = data
            .opportunity_mut(args.opportunity_id.trim())
            .ok_or_else(|| ToolError::failed(self.name(), "Opportunity not found"))?;
        let old_values = opp.clone();

        if let Some(stage) = filter(&args.stage) {
            opp.stage = stage.to_string();
        }
        if let Some(value) = args.value {
            opp.value = value;
        }
        if let Some(probability) = args.probability {
            opp.probability = probability;
        }
        if let Some(date) = close_date {
            opp.close_date = date;
        }
        if let Some(note) = filter(&args.notes) {
            opp.notes = Some(note.to_string());
        }
        opp.last_activity = Some(today);

        Ok(serde_json::json!({
            "opportunity_id": opp.opportunity_id,
            "old_values": to_payload(self.name(), &old_values)?,
            "new_values": to_payload(self.name(), &*opp)?,
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
    async fn details_by_opportunity_include_lead() {
        let tool = GetOpportunityDetailsTool::new(test_store());
        let out = tool.execute(json!({"opportunity_id": "OPP007"})).await.unwrap();
        assert_eq!(out["opportunity"]["name"], "CloudTech Cloud Migration");
        assert_eq!(out["lead"]["company"], "CloudTech Solutions");
    }

    #[tokio::test]
    async fn details_by_lead_lists_opportunities() {
        let tool = GetOpportunityDetailsTool::new(test_store());
        let out = tool.execute(json!({"lead_id": "LEAD001"})).await.unwrap();
        assert_eq!(out["total_count"], 1);
        assert_eq!(out["opportunities"][0]["opportunity_id"], "OPP001");
    }

    #[tokio::test]
    async fn details_without_ids_is_invalid() {
        let tool = GetOpportunityDetailsTool::new(test_store());
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn details_for_unknown_ids_fail() {
        let tool = GetOpportunityDetailsTool::new(test_store());
        let err = tool.execute(json!({"opportunity_id": "OPP404"})).await.unwrap_err();
        assert_eq!(err.to_payload()["error"], "Opportunity or lead not found");
    }

    #[tokio::test]
    async fn create_defaults_close_date_and_owner() {
        let store = test_store();
        let tool = CreateOpportunityTool::new(store.clone());
        let out = tool
            .execute(json!({"lead_id": "LEAD005", "name": "Manufacturing Co Pilot", "stage": "Discovery", "value": 65000}))
            .await
            .unwrap();
        assert_eq!(out["opportunity"]["close_date"], "2024-04-09");
        assert_eq!(out["opportunity"]["owner"], "Unassigned");
        assert_eq!(out["opportunity"]["probability"], 50);
        assert_eq!(store.read().await.opportunities.len(), 16);
    }

    #[tokio::test]
    async fn create_for_unknown_lead_fails() {
        let tool = CreateOpportunityTool::new(test_store());
        let err = tool
            .execute(json!({"lead_id": "LEAD999", "name": "x", "stage": "Discovery", "value": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.to_payload()["error"], "Lead not found");
    }

    #[tokio::test]
    async fn create_rejects_bad_probability_and_date() {
        let tool = CreateOpportunityTool::new(test_store());
        let base = json!({"lead_id": "LEAD005", "name": "x", "stage": "Discovery", "value": 1});

        let mut args = base.clone();
        args["probability"] = json!(120);
        assert!(matches!(tool.execute(args).await, Err(ToolError::InvalidArguments(_))));

        let mut args = base;
        args["close_date"] = json!("next Tuesday");
        assert!(matches!(tool.execute(args).await, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let store = test_store();
        let tool = UpdateOpportunityTool::new(store.clone());
        let out = tool
            .execute(json!({"opportunity_id": "OPP003", "stage": "Proposal", "probability": 55}))
            .await
            .unwrap();
        assert_eq!(out["old_values"]["stage"], "Discovery");
        assert_eq!(out["new_values"]["stage"], "Proposal");
        assert_eq!(out["new_values"]["value"], 120000);

        let data = store.read().await;
        let opp = data.opportunity("OPP003").unwrap();
        assert_eq!(opp.probability, 55);
        assert_eq!(opp.last_activity, Some(store.today()));
    }
}
