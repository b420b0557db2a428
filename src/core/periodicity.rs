//! Symbolic reporting periodicities resolved into concrete date ranges.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    Custom,
    Monthly,
    Quarterly,
    Semestral,
    Annual,
}

impl Periodicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::Custom => "CUSTOM",
            Periodicity::Monthly => "MONTHLY",
            Periodicity::Quarterly => "QUARTERLY",
            Periodicity::Semestral => "SEMESTRAL",
            Periodicity::Annual => "ANNUAL",
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Periodicity {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CUSTOM" => Ok(Periodicity::Custom),
            "MONTHLY" => Ok(Periodicity::Monthly),
            "QUARTERLY" => Ok(Periodicity::Quarterly),
            "SEMESTRAL" => Ok(Periodicity::Semestral),
            "ANNUAL" => Ok(Periodicity::Annual),
            other => Err(PanelError::validation(format!("unknown periodicity: {}", other))),
        }
    }
}

/// Closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(PanelError::validation(format!(
                "range start {} is after range end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Inputs to [`resolve`]. Missing year and index default to the ones
/// containing `today`; the explicit bounds are read only for CUSTOM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicityQuery {
    pub periodicity: Periodicity,
    pub year: Option<i32>,
    pub index: Option<u32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl PeriodicityQuery {
    pub fn new(periodicity: Periodicity) -> Self {
        Self {
            periodicity,
            year: None,
            index: None,
            start: None,
            end: None,
        }
    }

    pub fn custom(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::new(Periodicity::Custom)
        }
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }
}

pub fn resolve(query: &PeriodicityQuery, today: NaiveDate) -> Result<DateRange> {
    let year = query.year.unwrap_or_else(|| today.year());

    match query.periodicity {
        Periodicity::Custom => match (query.start, query.end) {
            (Some(start), Some(end)) => DateRange::new(start, end),
            _ => Err(PanelError::validation(
                "start and end dates are required for CUSTOM periodicity",
            )),
        },
        Periodicity::Monthly => {
            let month = checked_index(query.index, today.month(), 12, "month")?;
            month_span(year, month, month)
        }
        Periodicity::Quarterly => {
            let quarter = checked_index(query.index, (today.month() - 1) / 3 + 1, 4, "quarter")?;
            let first = (quarter - 1) * 3 + 1;
            month_span(year, first, first + 2)
        }
        Periodicity::Semestral => {
            let semester = checked_index(query.index, (today.month() - 1) / 6 + 1, 2, "semester")?;
            let first = (semester - 1) * 6 + 1;
            month_span(year, first, first + 5)
        }
        Periodicity::Annual => month_span(year, 1, 12),
    }
}

fn checked_index(index: Option<u32>, current: u32, max: u32, unit: &str) -> Result<u32> {
    let index = index.unwrap_or(current);
    if (1..=max).contains(&index) {
        Ok(index)
    } else {
        Err(PanelError::validation(format!(
            "{} must be between 1 and {}, got {}",
            unit, max, index
        )))
    }
}

/// First day of `first_month` through the last day of `last_month`.
fn month_span(year: i32, first_month: u32, last_month: u32) -> Result<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, first_month, 1)
        .ok_or_else(|| PanelError::validation(format!("year {} is out of range", year)))?;
    let end = last_day_of_month(year, last_month)
        .ok_or_else(|| PanelError::validation(format!("year {} is out of range", year)))?;
    DateRange::new(start, end)
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}
