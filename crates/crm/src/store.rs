//! The CRM store — an async-locked, in-memory dataset.

use crate::error::CrmError;
use crate::records::{Activity, Customer, Lead, Opportunity, SalesRep, Task};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Embedded demo dataset.
const SEED: &str = include_str!("../data/seed.json");

/// All CRM collections, in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmData {
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub sales_team: Vec<SalesRep>,
}

impl CrmData {
    /// Parse a dataset from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, CrmError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn lead(&self, id: &str) -> Option<&Lead> {
        self.leads.iter().find(|l| l.lead_id == id)
    }

    pub fn lead_mut(&mut self, id: &str) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|l| l.lead_id == id)
    }

    pub fn opportunity(&self, id: &str) -> Option<&Opportunity> {
        self.opportunities.iter().find(|o| o.opportunity_id == id)
    }

    pub fn opportunity_mut(&mut self, id: &str) -> Option<&mut Opportunity> {
        self.opportunities.iter_mut().find(|o| o.opportunity_id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_id == id)
    }

    /// Look a customer up by exact id, then by case-insensitive name
    /// (exact match first, substring second).
    pub fn find_customer(&self, id_or_name: &str) -> Option<&Customer> {
        let needle = id_or_name.trim();
        if let Some(c) = self.customers.iter().find(|c| c.customer_id.eq_ignore_ascii_case(needle)) {
            return Some(c);
        }
        let lower = needle.to_lowercase();
        if lower.is_empty() {
            return None;
        }
        self.customers
            .iter()
            .find(|c| c.name.to_lowercase() == lower)
            .or_else(|| self.customers.iter().find(|c| c.name.to_lowercase().contains(&lower)))
    }

    pub fn opportunities_for_lead<'a, 'b>(&'a self, lead_id: &'b str) -> impl Iterator<Item = &'a Opportunity> + 'b where 'a: 'b {
        self.opportunities.iter().filter(move |o| o.lead_id == lead_id)
    }

    /// Lead ids whose company name matches (case-insensitive).
    pub fn lead_ids_for_company(&self, company: &str) -> Vec<&str> {
        self.leads
            .iter()
            .filter(|l| l.company.eq_ignore_ascii_case(company))
            .map(|l| l.lead_id.as_str())
            .collect()
    }

    /// Owner of the most recently created opportunity on a lead.
    pub fn owner_for_lead(&self, lead_id: &str) -> Option<&str> {
        self.opportunities_for_lead(lead_id)
            .max_by_key(|o| o.created)
            .map(|o| o.owner.as_str())
    }
}

/// Mint a record id: prefix plus eight upper-case hex characters.
pub fn new_id(prefix: &str) -> String {
    let hex: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("{prefix}{}", hex.to_uppercase())
}

/// The shared CRM store.
///
/// Readers take the lock shared; mutating tools take it exclusively, so
/// there is a single writer at a time.
pub struct CrmStore {
    data: RwLock<CrmData>,
    today: NaiveDate,
}

impl CrmStore {
    pub fn new(data: CrmData, today: NaiveDate) -> Self {
        Self {
            data: RwLock::new(data),
            today,
        }
    }

    /// The embedded demo dataset, with today's date as reference.
    pub fn seeded() -> Result<Self, CrmError> {
        Self::seeded_as_of(chrono::Local::now().date_naive())
    }

    /// The embedded demo dataset with an explicit reference date.
    pub fn seeded_as_of(today: NaiveDate) -> Result<Self, CrmError> {
        let data = CrmData::from_json(SEED)?;
        tracing::debug!(
            leads = data.leads.len(),
            opportunities = data.opportunities.len(),
            customers = data.customers.len(),
            %today,
            "CRM store seeded"
        );
        Ok(Self::new(data, today))
    }

    /// Reference date for relative periods and new records.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CrmData> {
        self.data.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, CrmData> {
        self.data.write().await
    }
}

impl std::fmt::Debug for CrmStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmStore").field("today", &self.today).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn seed_loads_every_collection() {
        let store = CrmStore::seeded_as_of(today()).unwrap();
        let data = store.read().await;
        assert_eq!(data.leads.len(), 20);
        assert_eq!(data.opportunities.len(), 15);
        assert_eq!(data.customers.len(), 10);
        assert_eq!(data.tasks.len(), 6);
        assert_eq!(data.activities.len(), 5);
        assert_eq!(data.sales_team.len(), 4);
    }

    #[tokio::test]
    async fn customer_lookup_by_id_or_name() {
        let store = CrmStore::seeded_as_of(today()).unwrap();
        let data = store.read().await;
        assert_eq!(data.find_customer("CUST009").unwrap().name, "CloudTech Solutions");
        assert_eq!(data.find_customer("cloudtech").unwrap().customer_id, "CUST009");
        assert_eq!(data.find_customer("Retail Chain").unwrap().customer_id, "CUST007");
        assert!(data.find_customer("TechCorp").is_none());
        assert!(data.find_customer("  ").is_none());
    }

    #[tokio::test]
    async fn writes_are_visible_to_readers() {
        let store = CrmStore::seeded_as_of(today()).unwrap();
        store.write().await.lead_mut("LEAD005").unwrap().status = "Contacted".into();
        assert_eq!(store.read().await.lead("LEAD005").unwrap().status, "Contacted");
    }

    #[tokio::test]
    async fn lead_relationships() {
        let store = CrmStore::seeded_as_of(today()).unwrap();
        let data = store.read().await;
        assert_eq!(data.lead_ids_for_company("cloudtech solutions"), vec!["LEAD009"]);
        assert_eq!(data.owner_for_lead("LEAD009"), Some("Alex Rodriguez"));
        assert_eq!(data.owner_for_lead("LEAD005"), None);
    }

    #[test]
    fn minted_ids_have_expected_shape() {
        let id = new_id("OPP");
        assert_eq!(id.len(), 11);
        assert!(id.starts_with("OPP"));
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn malformed_dataset_is_seed_error() {
        assert!(matches!(CrmData::from_json("{\"leads\": 3}"), Err(CrmError::Seed(_))));
    }
}
