//! CRM record types.
//!
//! Field names match the JSON the tools return, so records serialize
//! straight into tool payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A prospective buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: String,
    pub name: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    /// Open set: New, Contacted, Qualified, Proposal Sent, Closed Won, ...
    pub status: String,
    pub value: u64,
    pub source: String,
    pub created: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Lead {
    pub fn is_qualified(&self) -> bool {
        self.status.eq_ignore_ascii_case("qualified")
    }

    /// Case-insensitive substring match on name, company and email.
    pub fn matches(&self, needle_lower: &str) -> bool {
        [&self.name, &self.company, &self.email]
            .iter()
            .any(|f| f.to_lowercase().contains(needle_lower))
    }
}

/// A deal in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: String,
    pub lead_id: String,
    pub name: String,
    pub stage: String,
    pub value: u64,
    /// Win probability, 0–100
    pub probability: u8,
    pub close_date: NaiveDate,
    pub owner: String,
    pub created: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Opportunity {
    /// Still open (not Closed Won / Closed Lost).
    pub fn is_active(&self) -> bool {
        !self.stage.to_ascii_lowercase().starts_with("closed")
    }

    pub fn weighted_value(&self) -> f64 {
        self.value as f64 * f64::from(self.probability) / 100.0
    }
}

/// A closed account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub contact: String,
    pub email: String,
    pub phone: String,
    /// Active, Inactive, Churned
    pub status: String,
    pub revenue: u64,
    pub onboarding_date: NaiveDate,
    pub closed_date: NaiveDate,
    pub industry: String,
    pub company_size: String,
    pub location: String,
    pub account_manager: String,
    pub last_activity: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Customer {
    /// Case-insensitive substring match on name, contact and email.
    pub fn matches(&self, needle_lower: &str) -> bool {
        [&self.name, &self.contact, &self.email]
            .iter()
            .any(|f| f.to_lowercase().contains(needle_lower))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Completed,
}

/// A scheduled follow-up or action item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub lead_id: String,
    pub lead_name: String,
    pub company: String,
    pub task_type: String,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    #[serde(default)]
    pub notes: String,
    pub assigned_to: String,
    pub priority: String,
}

impl Task {
    /// Pending and past due.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == TaskStatus::Pending && self.due_date < today
    }
}

/// A logged touchpoint with a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub activity_id: String,
    pub lead_id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub date: NaiveDate,
    pub duration: String,
    pub notes: String,
    pub outcome: String,
}

/// A member of the sales team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRep {
    pub name: String,
    pub title: String,
    pub email: String,
    pub phone: String,
    pub territory: String,
    pub quota: u64,
    pub ytd_sales: u64,
    pub specialization: String,
}

impl SalesRep {
    /// Year-to-date attainment in percent.
    pub fn attainment(&self) -> f64 {
        if self.quota == 0 {
            return 0.0;
        }
        self.ytd_sales as f64 / self.quota as f64 * 100.0
    }
}
