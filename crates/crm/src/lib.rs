//! # SalesDesk CRM
//!
//! The mock CRM dataset the sales tools query and mutate: leads,
//! opportunities, customers, tasks, activities and the sales team.
//!
//! The store is owned explicitly and shared behind an `Arc`; every tool
//! closes over the same instance at registration time.

pub mod error;
pub mod period;
pub mod records;
pub mod store;

pub use error::CrmError;
pub use period::{DateRange, Period, parse_date};
pub use records::{Activity, Customer, Lead, Opportunity, SalesRep, Task, TaskStatus};
pub use store::{CrmData, CrmStore, new_id};
