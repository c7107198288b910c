//! Reporting tools: KPIs, pipeline breakdown, qualified-lead summary.

use crate::{filter, period_arg, round2, to_payload};
use async_trait::async_trait;
use salesdesk_core::error::ToolError;
use salesdesk_core::tool::{Tool, parse_args};
use salesdesk_crm::{CrmStore, DateRange, Lead, Opportunity, Period, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn resolve(tool: &str, period: Period, store: &CrmStore) -> Result<DateRange, ToolError> {
    period
        .range(store.today())
        .map_err(|e| ToolError::failed(tool, e.to_string()))
}

pub struct SalesAnalyticsTool {
    store: Arc<CrmStore>,
}

impl SalesAnalyticsTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct SalesAnalyticsArgs {
    #[serde(default)]
    timeframe: Option<String>,
}

#[async_trait]
impl Tool for SalesAnalyticsTool {
    fn name(&self) -> &str {
        "get_sales_analytics"
    }

    fn description(&self) -> &str {
        "Get sales analytics, KPIs, and pipeline metrics"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timeframe": {"type": "string", "description": "Timeframe for analytics (week, month, quarter, year)"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: SalesAnalyticsArgs = parse_args(self.name(), arguments)?;
        let data = self.store.read().await;

        let total_leads = data.leads.len();
        let qualified = data.leads.iter().filter(|l| l.is_qualified()).count();
        let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
        for lead in &data.leads {
            *by_status.entry(lead.status.as_str()).or_default() += 1;
        }

        let total_opps = data.opportunities.len();
        let active: Vec<&Opportunity> = data.opportunities.iter().filter(|o| o.is_active()).collect();
        let total_value: u64 = data.opportunities.iter().map(|o| o.value).sum();
        let active_value: u64 = active.iter().map(|o| o.value).sum();
        let weighted: f64 = active.iter().map(|o| o.weighted_value()).sum();

        let rate = if total_leads == 0 {
            0.0
        } else {
            round2(qualified as f64 / total_leads as f64 * 100.0)
        };
        let average = if total_opps == 0 {
            0.0
        } else {
            round2(total_value as f64 / total_opps as f64)
        };

        Ok(serde_json::json!({
            "timeframe": filter(&args.timeframe).unwrap_or("month"),
            "total_leads": total_leads,
            "qualified_leads": qualified,
            "qualification_rate": rate,
            "leads_by_status": by_status,
            "total_opportunities": total_opps,
            "active_opportunities": active.len(),
            "total_pipeline_value": total_value,
            "active_pipeline_value": active_value,
            "weighted_pipeline_value": round2(weighted),
            "average_deal_size": average,
        }))
    }
}

pub struct PipelineReportTool {
    store: Arc<CrmStore>,
}

impl PipelineReportTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct PipelineReportArgs {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    min_value: Option<u64>,
    #[serde(default)]
    max_value: Option<u64>,
    #[serde(default)]
    close_date_filter: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct StageTotals {
    count: usize,
    value: u64,
    weighted_value: f64,
}

#[async_trait]
impl Tool for PipelineReportTool {
    fn name(&self) -> &str {
        "get_pipeline_report"
    }

    fn description(&self) -> &str {
        "Get a pipeline report of active opportunities with stage breakdown, weighted value and next-month projection. Filter by owner, deal value range, or expected close period (e.g. next_month)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "owner": {"type": "string", "description": "Filter by sales rep (optional)"},
                "min_value": {"type": "integer", "description": "Minimum deal value filter"},
                "max_value": {"type": "integer", "description": "Maximum deal value filter"},
                "close_date_filter": {
                    "type": "string",
                    "description": "Only deals expected to close in this period (this_month, next_month, this_quarter, next_quarter, ...)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: PipelineReportArgs = parse_args(self.name(), arguments)?;
        let owner = filter(&args.owner);
        let close_period = filter(&args.close_date_filter)
            .map(|raw| period_arg(self.name(), raw))
            .transpose()?;
        let close_range = close_period
            .map(|p| resolve(self.name(), p, &self.store))
            .transpose()?;
        let next_month = resolve(self.name(), Period::NextMonth, &self.store)?;

        let data = self.store.read().await;
        let selected: Vec<&Opportunity> = data
            .opportunities
            .iter()
            .filter(|o| o.is_active())
            .filter(|o| owner.is_none_or(|name| o.owner.eq_ignore_ascii_case(name)))
            .filter(|o| args.min_value.is_none_or(|min| o.value >= min))
            .filter(|o| args.max_value.is_none_or(|max| o.value <= max))
            .filter(|o| close_range.is_none_or(|r| r.contains(o.close_date)))
            .collect();

        let mut stages: BTreeMap<&str, StageTotals> = BTreeMap::new();
        for opp in &selected {
            let totals = stages.entry(opp.stage.as_str()).or_default();
            totals.count += 1;
            totals.value += opp.value;
            totals.weighted_value += opp.weighted_value();
        }
        for totals in stages.values_mut() {
            totals.weighted_value = round2(totals.weighted_value);
        }

        let closing_next_month: Vec<&&Opportunity> =
            selected.iter().filter(|o| next_month.contains(o.close_date)).collect();

        tracing::debug!(matched = selected.len(), "Pipeline report built");

        Ok(serde_json::json!({
            "filters": {
                "owner": owner,
                "min_value": args.min_value,
                "max_value": args.max_value,
                "close_date_filter": close_period,
            },
            "close_period": close_range,
            "total_opportunities": selected.len(),
            "total_value": selected.iter().map(|o| o.value).sum::<u64>(),
            "weighted_value": round2(selected.iter().map(|o| o.weighted_value()).sum()),
            "stage_breakdown": to_payload(self.name(), &stages)?,
            "next_month_count": closing_next_month.len(),
            "next_month_value": closing_next_month.iter().map(|o| o.value).sum::<u64>(),
            "opportunities": to_payload(self.name(), &selected)?,
        }))
    }
}

pub struct QualifiedLeadsSummaryTool {
    store: Arc<CrmStore>,
}

impl QualifiedLeadsSummaryTool {
    pub fn new(store: Arc<CrmStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct QualifiedSummaryArgs {
    #[serde(default)]
    timeframe: Option<String>,
    #[serde(default)]
    include_revenue: Option<bool>,
    #[serde(default)]
    include_tasks: Option<bool>,
}

#[async_trait]
impl Tool for QualifiedLeadsSummaryTool {
    fn name(&self) -> &str {
        "get_qualified_leads_summary"
    }

    fn description(&self) -> &str {
        "Get comprehensive summary of qualified leads including revenue and pending tasks"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "timeframe": {"type": "string", "description": "Timeframe for leads (this_month, last_month, this_quarter)"},
                "include_revenue": {"type": "boolean", "description": "Include revenue calculations"},
                "include_tasks": {"type": "boolean", "description": "Include pending tasks for leads"}
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: QualifiedSummaryArgs = parse_args(self.name(), arguments)?;
        let period = period_arg(self.name(), filter(&args.timeframe).unwrap_or("this_month"))?;
        let range = resolve(self.name(), period, &self.store)?;
        let include_revenue = args.include_revenue.unwrap_or(true);
        let include_tasks = args.include_tasks.unwrap_or(true);

        let data = self.store.read().await;
        let leads: Vec<&Lead> = data
            .leads
            .iter()
            .filter(|l| l.is_qualified() && range.contains(l.created))
            .collect();
        let total_revenue: u64 = leads.iter().map(|l| l.value).sum();

        let breakdown = include_revenue.then(|| {
            let mut by_company: BTreeMap<&str, u64> = BTreeMap::new();
            for lead in &leads {
                *by_company.entry(lead.company.as_str()).or_default() += lead.value;
            }
            by_company
        });

        let tasks: Vec<&Task> = if include_tasks {
            data.tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .filter(|t| leads.iter().any(|l| l.lead_id == t.lead_id))
                .collect()
        } else {
            Vec::new()
        };

        let pending = if include_tasks {
            to_payload(self.name(), &tasks)?
        } else {
            serde_json::Value::Null
        };

        Ok(serde_json::json!({
            "timeframe": period,
            "period": range,
            "qualified_leads": to_payload(self.name(), &leads)?,
            "total_leads": leads.len(),
            "total_revenue": total_revenue,
            "revenue_breakdown": breakdown,
            "pending_tasks": pending,
            "total_pending_tasks": tasks.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use serde_json::json;

    #[tokio::test]
    async fn analytics_kpis() {
        let tool = SalesAnalyticsTool::new(test_store());
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out["timeframe"], "month");
        assert_eq!(out["total_leads"], 20);
        assert_eq!(out["qualified_leads"], 9);
        assert_eq!(out["qualification_rate"], 45.0);
        assert_eq!(out["leads_by_status"]["Contacted"], 6);
        assert_eq!(out["active_opportunities"], 15);
        assert_eq!(out["total_pipeline_value"], 1_405_000);
        assert_eq!(out["weighted_pipeline_value"], 777_750.0);
        assert_eq!(out["average_deal_size"], 93_666.67);
    }

    #[tokio::test]
    async fn closed_deals_leave_the_active_pipeline() {
        let store = test_store();
        store.write().await.opportunity_mut("OPP001").unwrap().stage = "Closed Won".into();
        let out = SalesAnalyticsTool::new(store).execute(json!({})).await.unwrap();
        assert_eq!(out["active_opportunities"], 14);
        assert_eq!(out["total_pipeline_value"], 1_405_000);
        assert_eq!(out["active_pipeline_value"], 1_355_000);
    }

    #[tokio::test]
    async fn pipeline_next_month() {
        let tool = PipelineReportTool::new(test_store());
        let out = tool.execute(json!({"close_date_filter": "next_month"})).await.unwrap();
        assert_eq!(out["filters"]["close_date_filter"], "next_month");
        assert_eq!(out["total_opportunities"], 5);
        assert_eq!(out["total_value"], 555_000);
        assert_eq!(out["weighted_value"], 188_000.0);
        assert_eq!(out["next_month_count"], 5);
        assert_eq!(out["stage_breakdown"]["Discovery"]["count"], 3);
    }

    #[tokio::test]
    async fn pipeline_stage_breakdown() {
        let tool = PipelineReportTool::new(test_store());
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out["total_opportunities"], 15);
        assert_eq!(out["stage_breakdown"]["Negotiation"]["value"], 435_000);
        assert_eq!(out["stage_breakdown"]["Negotiation"]["weighted_value"], 354_500.0);
        assert_eq!(out["next_month_value"], 555_000);
    }

    #[tokio::test]
    async fn pipeline_owner_and_value_filters() {
        let tool = PipelineReportTool::new(test_store());
        let out = tool
            .execute(json!({"owner": "alex rodriguez", "min_value": 90000, "max_value": 150000}))
            .await
            .unwrap();
        let ids: Vec<&str> = out["opportunities"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|o| o["opportunity_id"].as_str())
            .collect();
        assert_eq!(ids, ["OPP005", "OPP011"]);
    }

    #[tokio::test]
    async fn pipeline_rejects_unknown_period() {
        let tool = PipelineReportTool::new(test_store());
        let err = tool.execute(json!({"close_date_filter": "someday"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn qualified_this_month() {
        let tool = QualifiedLeadsSummaryTool::new(test_store());
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out["total_leads"], 3);
        assert_eq!(out["total_revenue"], 220_000);
        assert_eq!(out["revenue_breakdown"]["Insurance Partners"], 110_000);
        assert_eq!(out["total_pending_tasks"], 0);
    }

    #[tokio::test]
    async fn qualified_last_month_with_tasks() {
        let tool = QualifiedLeadsSummaryTool::new(test_store());
        let out = tool.execute(json!({"timeframe": "last month"})).await.unwrap();
        assert_eq!(out["timeframe"], "last_month");
        assert_eq!(out["total_leads"], 5);
        assert_eq!(out["total_revenue"], 470_000);
        assert_eq!(out["total_pending_tasks"], 3);
    }

    #[tokio::test]
    async fn qualified_without_optional_sections() {
        let tool = QualifiedLeadsSummaryTool::new(test_store());
        let out = tool
            .execute(json!({"include_revenue": false, "include_tasks": false}))
            .await
            .unwrap();
        assert!(out["revenue_breakdown"].is_null());
        assert!(out["pending_tasks"].is_null());
        assert_eq!(out["total_pending_tasks"], 0);
    }
}
