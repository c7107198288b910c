use thiserror::Error;

/// CRM store errors.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Failed to load seed data: {0}")]
    Seed(#[from] serde_json::Error),

    #[error("Unknown period '{0}' (expected this_month, last_month, next_month, this_quarter, last_quarter, next_quarter or this_year)")]
    UnknownPeriod(String),

    #[error("Invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Date out of range near {0}")]
    DateOutOfRange(chrono::NaiveDate),
}
