//! The system message that seeds every new thread.

use chrono::NaiveDate;
use salesdesk_core::tool::ToolCatalog;
use std::fmt::Write;

/// Build the default system prompt: assistant role, reference date and the
/// tool catalog as `name: description` lines.
pub fn build(catalog: &ToolCatalog, today: NaiveDate) -> String {
    let mut prompt = String::from(
        "You are SalesDesk, a focused sales assistant and CRM expert. \
         You answer sales questions using the CRM tools below.\n",
    );
    let _ = writeln!(prompt, "\nToday's date is {today}.\n\nAvailable tools:");
    for tool in catalog.iter() {
        let _ = writeln!(prompt, "- {}: {}", tool.name(), tool.description());
    }
    prompt.push_str(
        "\nCommon questions:\n\
         1. \"Who are our customers closed last month?\" - use get_customers_closed_summary\n\
         2. \"What are next steps with customer Y?\" - use get_customer_details\n\
         3. \"Show the active pipeline projected to close next month\" - use get_pipeline_report with close_date_filter=next_month\n\
         \nInstructions:\n\
         - Pick the most specific tool for the question.\n\
         - Ground every figure in tool output; never invent records.\n\
         - Be concise. Include the relevant metrics and suggested next steps.\n",
    );
    prompt
}

/// The configured override when present, otherwise [`build`].
pub fn resolve(override_prompt: Option<&str>, catalog: &ToolCatalog, today: NaiveDate) -> String {
    match override_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(custom) => custom.to_string(),
        None => build(catalog, today),
    }
}
