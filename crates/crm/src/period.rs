//! Relative reporting periods ("last month", "next quarter") resolved
//! against the store's reference date.

use crate::error::CrmError;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A named period relative to "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    ThisMonth,
    LastMonth,
    NextMonth,
    ThisQuarter,
    LastQuarter,
    NextQuarter,
    ThisYear,
}

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

fn month_start(date: NaiveDate) -> Result<NaiveDate, CrmError> {
    date.with_day(1).ok_or(CrmError::DateOutOfRange(date))
}

fn quarter_start(date: NaiveDate) -> Result<NaiveDate, CrmError> {
    let first_month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), first_month, 1).ok_or(CrmError::DateOutOfRange(date))
}

fn add(date: NaiveDate, months: u32) -> Result<NaiveDate, CrmError> {
    date.checked_add_months(Months::new(months))
        .ok_or(CrmError::DateOutOfRange(date))
}

fn sub(date: NaiveDate, months: u32) -> Result<NaiveDate, CrmError> {
    date.checked_sub_months(Months::new(months))
        .ok_or(CrmError::DateOutOfRange(date))
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThisMonth => "this_month",
            Self::LastMonth => "last_month",
            Self::NextMonth => "next_month",
            Self::ThisQuarter => "this_quarter",
            Self::LastQuarter => "last_quarter",
            Self::NextQuarter => "next_quarter",
            Self::ThisYear => "this_year",
        }
    }

    /// Resolve against a reference date.
    pub fn range(&self, today: NaiveDate) -> Result<DateRange, CrmError> {
        let (start, end) = match self {
            Self::ThisMonth => {
                let s = month_start(today)?;
                (s, add(s, 1)?)
            }
            Self::LastMonth => {
                let s = month_start(today)?;
                (sub(s, 1)?, s)
            }
            Self::NextMonth => {
                let s = add(month_start(today)?, 1)?;
                (s, add(s, 1)?)
            }
            Self::ThisQuarter => {
                let s = quarter_start(today)?;
                (s, add(s, 3)?)
            }
            Self::LastQuarter => {
                let s = quarter_start(today)?;
                (sub(s, 3)?, s)
            }
            Self::NextQuarter => {
                let s = add(quarter_start(today)?, 3)?;
                (s, add(s, 3)?)
            }
            Self::ThisYear => {
                let s = NaiveDate::from_ymd_opt(today.year(), 1, 1)
                    .ok_or(CrmError::DateOutOfRange(today))?;
                (s, add(s, 12)?)
            }
        };
        Ok(DateRange { start, end })
    }
}

impl FromStr for Period {
    type Err = CrmError;

    /// Accepts `last_month`, `last month`, `Last-Month`, and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "this_month" => Ok(Self::ThisMonth),
            "last_month" | "previous_month" => Ok(Self::LastMonth),
            "next_month" => Ok(Self::NextMonth),
            "this_quarter" => Ok(Self::ThisQuarter),
            "last_quarter" | "previous_quarter" => Ok(Self::LastQuarter),
            "next_quarter" => Ok(Self::NextQuarter),
            "this_year" => Ok(Self::ThisYear),
            _ => Err(CrmError::UnknownPeriod(s.to_string())),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, CrmError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| CrmError::InvalidDate(s.to_string()))
}
