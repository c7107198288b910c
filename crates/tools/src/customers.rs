//! Customer tools: search, details with next steps, closed-customer summary.

use crate::{filter, period_arg, round2, to_payload};
use async_trait::async_trait;
use salesdesk_core::error::ToolError;
use salesdesk_core::tool::{Tool, parse_args};
use salesdesk_crm::{CrmData, CrmStore, Customer, Opportunity, Task, TaskStatus};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Days without activity before a check-in is suggested.
const STALE_AFTER_DAYS: i64 = 30;

pub struct SearchCustomersTool {
    store: Arc<CrmStore>,
}

impl SearchCustomersTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct SearchCustomersArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl Tool for SearchCustomersTool {
    fn name(&self) -> &str {
        "search_customers"
    }

    fn description(&self) -> &str {
        "Search for existing customers in the CRM"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query for company name or contact"},
                "status": {"type": "string", "description": "Filter by customer status (Active, Inactive, Churned)"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: SearchCustomersArgs = parse_args(self.name(), arguments)?;
        let query = filter(&args.query).map(str::to_lowercase);
        let status = filter(&args.status);

        let data = self.store.read().await;
        let results: Vec<&Customer> = data
            .customers
            .iter()
            .filter(|c| query.as_deref().is_none_or(|q| c.matches(q)))
            .filter(|c| status.is_none_or(|s| c.status.eq_ignore_ascii_case(s)))
            .collect();

        Ok(serde_json::json!({
            "query": args.query,
            "filters": {"status": status},
            "total_count": results.len(),
            "results": to_payload(self.name(), &results)?,
        }))
    }
}

pub struct GetCustomerDetailsTool {
    store: Arc<CrmStore>,
}

impl GetCustomerDetailsTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct CustomerDetailsArgs {
    customer_id: String,
}

/// Opportunities and pending tasks tied to a customer through leads at the
/// same company.
fn related<'a>(data: &'a CrmData, customer: &Customer) -> (Vec<&'a Opportunity>, Vec<&'a Task>) {
    let lead_ids = data.lead_ids_for_company(&customer.name);
    let opportunities = data
        .opportunities
        .iter()
        .filter(|o| lead_ids.contains(&o.lead_id.as_str()))
        .collect();
    let mut tasks: Vec<&Task> = data
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| lead_ids.contains(&t.lead_id.as_str()) || t.company.eq_ignore_ascii_case(&customer.name))
        .collect();
    tasks.sort_by_key(|t| t.due_date);
    (opportunities, tasks)
}

fn stage_action(opp: &Opportunity) -> String {
    match opp.stage.to_ascii_lowercase().as_str() {
        "discovery" => format!("Complete discovery for {} and schedule a demo", opp.name),
        "qualification" => format!("Confirm budget and decision makers for {}", opp.name),
        "proposal" => format!("Follow up on the proposal for {}", opp.name),
        "negotiation" => format!("Finalize contract terms for {} before {}", opp.name, opp.close_date),
        _ => format!("Advance {} (currently {})", opp.name, opp.stage),
    }
}

fn next_steps(
    customer: &Customer,
    opportunities: &[&Opportunity],
    tasks: &[&Task],
    today: chrono::NaiveDate,
) -> Vec<String> {
    let mut steps = Vec::new();

    for task in tasks {
        let overdue = if task.is_overdue(today) { " [overdue]" } else { "" };
        steps.push(format!(
            "{} due {} ({}){}: {}",
            task.task_type, task.due_date, task.assigned_to, overdue, task.notes
        ));
    }

    steps.extend(opportunities.iter().filter(|o| o.is_active()).map(|o| stage_action(o)));

    if customer.status.eq_ignore_ascii_case("churned") {
        steps.push(format!("Plan a re-engagement conversation with {}", customer.contact));
    }

    let idle_days = (today - customer.last_activity).num_days();
    if idle_days > STALE_AFTER_DAYS {
        steps.push(format!(
            "Check in with {}: no activity since {}",
            customer.contact, customer.last_activity
        ));
    }

    if let Some(notes) = customer.notes.as_deref() {
        steps.push(format!("Review account notes: {notes}"));
    }

    if steps.is_empty() {
        steps.push(format!("Schedule a business review with {}", customer.contact));
    }
    steps
}

#[async_trait]
impl Tool for GetCustomerDetailsTool {
    fn name(&self) -> &str {
        "get_customer_details"
    }

    fn description(&self) -> &str {
        "Get detailed customer information and history: account manager, last activity, related opportunities, pending tasks and recommended next steps. Accepts a customer ID or company name."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "customer_id": {"type": "string", "description": "Customer ID (e.g. CUST001) or company name to look up"}
            },
            "required": ["customer_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: CustomerDetailsArgs = parse_args(self.name(), arguments)?;
        let today = self.store.today();

        let data = self.store.read().await;
        let customer = data
            .find_customer(&args.customer_id)
            .ok_or_else(|| ToolError::failed(self.name(), "Customer not found"))?;

        let (opportunities, tasks) = related(&data, customer);
        let total_value: u64 = opportunities.iter().map(|o| o.value).sum();
        let steps = next_steps(customer, &opportunities, &tasks, today);

        Ok(serde_json::json!({
            "customer_id": customer.customer_id,
            "customer": to_payload(self.name(), customer)?,
            "account_manager": customer.account_manager,
            "contact": customer.contact,
            "last_activity": customer.last_activity,
            "days_since_last_activity": (today - customer.last_activity).num_days(),
            "opportunities": to_payload(self.name(), &opportunities)?,
            "total_opportunities": opportunities.len(),
            "total_value": total_value,
            "pending_tasks": to_payload(self.name(), &tasks)?,
            "next_steps": steps,
        }))
    }
}

pub struct CustomersClosedSummaryTool {
    store: Arc<CrmStore>,
}

impl CustomersClosedSummaryTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct ClosedSummaryArgs {
    #[serde(default)]
    timeframe: Option<String>,
    #[serde(default)]
    include_revenue_breakdown: Option<bool>,
}

#[async_trait]
impl Tool for CustomersClosedSummaryTool {
    fn name(&self) -> &str {
        "get_customers_closed_summary"
    }

    fn description(&self) -> &str {
        "Summarize customers closed within a timeframe: count, total and average revenue, and a per-customer revenue breakdown"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timeframe": {
                    "type": "string",
                    "description": "Period to summarize (this_month, last_month, this_quarter, last_quarter, this_year). Default: last_month"
                },
                "include_revenue_breakdown": {"type": "boolean", "description": "Include revenue per customer (default: true)"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: ClosedSummaryArgs = parse_args(self.name(), arguments)?;
        let period = period_arg(self.name(), filter(&args.timeframe).unwrap_or("last_month"))?;
        let range = period
            .range(self.store.today())
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;

        let data = self.store.read().await;
        let closed: Vec<&Customer> = data
            .customers
            .iter()
            .filter(|c| range.contains(c.closed_date))
            .collect();

        let total_revenue: u64 = closed.iter().map(|c| c.revenue).sum();
        let average = if closed.is_empty() {
            0.0
        } else {
            round2(total_revenue as f64 / closed.len() as f64)
        };
        let breakdown: Option<BTreeMap<&str, u64>> = args
            .include_revenue_breakdown
            .unwrap_or(true)
            .then(|| closed.iter().map(|c| (c.name.as_str(), c.revenue)).collect());

        Ok(serde_json::json!({
            "timeframe": period,
            "period": range,
            "customers": to_payload(self.name(), &closed)?,
            "total_customers": closed.len(),
            "total_revenue": total_revenue,
            "average_revenue_per_customer": average,
            "revenue_breakdown": breakdown,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use serde_json::json;

    #[tokio::test]
    async fn search_by_status() {
        let tool = SearchCustomersTool::new(test_store());
        let out = tool.execute(json!({"status": "churned"})).await.unwrap();
        assert_eq!(out["total_count"], 1);
        assert_eq!(out["results"][0]["name"], "Future Tech");
    }

    #[tokio::test]
    async fn details_by_name_include_related_opportunities() {
        let tool = GetCustomerDetailsTool::new(test_store());
        let out = tool.execute(json!({"customer_id": "CloudTech"})).await.unwrap();
        assert_eq!(out["customer_id"], "CUST009");
        assert_eq!(out["account_manager"], "Alex Rodriguez");
        assert_eq!(out["total_opportunities"], 1);
        assert_eq!(out["total_value"], 180000);
        let steps = out["next_steps"].as_array().unwrap();
        assert!(steps[0].as_str().unwrap().starts_with("Finalize contract terms for CloudTech Cloud Migration"));
    }

    #[tokio::test]
    async fn details_surface_pending_tasks_first() {
        let tool = GetCustomerDetailsTool::new(test_store());
        let out = tool.execute(json!({"customer_id": "CUST006"})).await.unwrap();
        assert_eq!(out["pending_tasks"][0]["task_id"], "TASK005");
        let first = out["next_steps"][0].as_str().unwrap();
        assert!(first.starts_with("Contract Negotiation due 2024-02-15"));
        assert!(first.contains("[overdue]"));
    }

    #[tokio::test]
    async fn churned_customer_gets_reengagement_step() {
        let tool = GetCustomerDetailsTool::new(test_store());
        let out = tool.execute(json!({"customer_id": "CUST003"})).await.unwrap();
        let steps: Vec<&str> = out["next_steps"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s.as_str())
            .collect();
        assert!(steps.iter().any(|s| s.contains("re-engagement")));
        assert!(steps.iter().any(|s| s.contains("no activity since 2023-12-15")));
    }

    #[tokio::test]
    async fn unknown_customer_fails() {
        let tool = GetCustomerDetailsTool::new(test_store());
        let err = tool.execute(json!({"customer_id": "TechCorp"})).await.unwrap_err();
        assert_eq!(err.to_payload()["error"], "Customer not found");
    }

    #[tokio::test]
    async fn closed_last_month() {
        let tool = CustomersClosedSummaryTool::new(test_store());
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out["timeframe"], "last_month");
        assert_eq!(out["period"]["start"], "2024-02-01");
        assert_eq!(out["total_customers"], 2);
        assert_eq!(out["total_revenue"], 500000);
        assert_eq!(out["average_revenue_per_customer"], 250000.0);
        assert_eq!(out["revenue_breakdown"]["CloudTech Solutions"], 380000);
        assert_eq!(out["revenue_breakdown"]["Education First"], 120000);
    }

    #[tokio::test]
    async fn closed_last_quarter_without_breakdown() {
        let tool = CustomersClosedSummaryTool::new(test_store());
        let out = tool
            .execute(json!({"timeframe": "last_quarter", "include_revenue_breakdown": false}))
            .await
            .unwrap();
        assert_eq!(out["total_customers"], 2);
        assert_eq!(out["total_revenue"], 600000);
        assert!(out["revenue_breakdown"].is_null());
    }

    #[tokio::test]
    async fn empty_period_has_zero_average() {
        let tool = CustomersClosedSummaryTool::new(test_store());
        let out = tool.execute(json!({"timeframe": "next_month"})).await.unwrap();
        assert_eq!(out["total_customers"], 0);
        assert_eq!(out["average_revenue_per_customer"], 0.0);
    }

    #[tokio::test]
    async fn unknown_timeframe_is_invalid() {
        let tool = CustomersClosedSummaryTool::new(test_store());
        let err = tool.execute(json!({"timeframe": "fortnight"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
