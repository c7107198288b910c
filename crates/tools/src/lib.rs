//! CRM tool implementations for SalesDesk.
//!
//! Every tool closes over one shared [`CrmStore`] and exposes a JSON
//! Schema for its arguments. Each handler deserializes only the fields it
//! declares and reports `InvalidArguments` on mismatch; domain misses
//! ("Lead not found") are execution failures.

pub mod analytics;
pub mod communication;
pub mod customers;
pub mod leads;
pub mod opportunities;
pub mod tasks;

use salesdesk_core::error::ToolError;
use salesdesk_core::tool::ToolCatalog;
use salesdesk_crm::{CrmStore, Period};
use std::sync::Arc;

/// Build the catalog of all CRM tools over `store`.
pub fn default_catalog(store: Arc<CrmStore>) -> ToolCatalog {
    ToolCatalog::new()
        .with(Arc::new(leads::SearchLeadsTool::new(store.clone())))
        .with(Arc::new(leads::CreateLeadTool::new(store.clone())))
        .with(Arc::new(leads::UpdateLeadStatusTool::new(store.clone())))
        .with(Arc::new(opportunities::GetOpportunityDetailsTool::new(store.clone())))
        .with(Arc::new(opportunities::CreateOpportunityTool::new(store.clone())))
        .with(Arc::new(opportunities::UpdateOpportunityTool::new(store.clone())))
        .with(Arc::new(customers::SearchCustomersTool::new(store.clone())))
        .with(Arc::new(customers::GetCustomerDetailsTool::new(store.clone())))
        .with(Arc::new(customers::CustomersClosedSummaryTool::new(store.clone())))
        .with(Arc::new(analytics::SalesAnalyticsTool::new(store.clone())))
        .with(Arc::new(analytics::PipelineReportTool::new(store.clone())))
        .with(Arc::new(analytics::QualifiedLeadsSummaryTool::new(store.clone())))
        .with(Arc::new(communication::GenerateSalesEmailTool::new(store.clone())))
        .with(Arc::new(communication::ScheduleFollowUpTool::new(store.clone())))
        .with(Arc::new(tasks::GetTasksTool::new(store.clone())))
        .with(Arc::new(tasks::CompleteTaskTool::new(store)))
}

/// Round a currency or percentage figure to two decimals.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub(crate) fn period_arg(tool: &str, raw: &str) -> Result<Period, ToolError> {
    raw.parse()
        .map_err(|e: salesdesk_crm::CrmError| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

pub(crate) fn date_arg(tool: &str, raw: &str) -> Result<chrono::NaiveDate, ToolError> {
    salesdesk_crm::parse_date(raw).map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

/// A filter argument, ignoring blanks the model sometimes sends.
pub(crate) fn filter(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn to_payload<T: serde::Serialize>(tool: &str, value: &T) -> Result<serde_json::Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::failed(tool, e.to_string()))
}

#[cfg(test)]
pub(crate) fn test_store() -> Arc<CrmStore> {
    let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    Arc::new(CrmStore::seeded_as_of(today).unwrap())
}
