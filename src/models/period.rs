use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{PanelError, Result};

pub type SectorId = Uuid;
pub type PeriodId = Uuid;
pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    Open,
    Closed,
    Validated,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Open => "OPEN",
            PeriodStatus::Closed => "CLOSED",
            PeriodStatus::Validated => "VALIDATED",
        }
    }
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodStatus {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(PeriodStatus::Open),
            "CLOSED" => Ok(PeriodStatus::Closed),
            "VALIDATED" => Ok(PeriodStatus::Validated),
            other => Err(PanelError::Decode(format!("unknown period status: {}", other))),
        }
    }
}

/// Request to open a new reporting window for a sector.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPeriod {
    pub sector_id: SectorId,
    #[validate(range(min = 1, max = 12, message = "month must be between 1 and 12"))]
    pub month: u32,
    #[validate(range(min = 2000, message = "year must be 2000 or later"))]
    pub year: i32,
}

/// A sector's monthly reporting window.
///
/// Status only changes through the transition functions in
/// [`crate::core::lifecycle`], each of which returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub sector_id: SectorId,
    pub month: u32,
    pub year: i32,
    pub status: PeriodStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Period {
    /// Builds a fresh OPEN period from a validated request.
    pub fn open(request: &NewPeriod, at: DateTime<Utc>) -> Result<Self> {
        request.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            sector_id: request.sector_id,
            month: request.month,
            year: request.year,
            status: PeriodStatus::Open,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PeriodStatus::Open
    }

    /// Ordering key; equivalent to comparing first-of-month dates.
    pub fn month_key(&self) -> (i32, u32) {
        (self.year, self.month)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn summary(&self) -> PeriodSummary {
        PeriodSummary {
            id: self.id,
            month: self.month,
            year: self.year,
            status: self.status,
        }
    }
}

/// Compact reference to a period, listed on reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub id: PeriodId,
    pub month: u32,
    pub year: i32,
    pub status: PeriodStatus,
}

/// Month key of an arbitrary date, for month-resolution comparisons.
pub fn month_key_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn request(month: u32, year: i32) -> NewPeriod {
        NewPeriod {
            sector_id: Uuid::new_v4(),
            month,
            year,
        }
    }

    #[test]
    fn new_periods_start_open() {
        let period = Period::open(&request(3, 2024), Utc::now()).unwrap();
        assert_eq!(period.status, PeriodStatus::Open);
        assert_eq!(period.created_at, period.updated_at);
        assert_eq!(period.first_day(), NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test_case(0, 2024 ; "month zero")]
    #[test_case(13, 2024 ; "month thirteen")]
    #[test_case(6, 1999 ; "year before 2000")]
    fn malformed_periods_are_rejected(month: u32, year: i32) {
        let err = Period::open(&request(month, year), Utc::now()).unwrap_err();
        assert!(matches!(err, PanelError::Validation(_)), "{:?}", err);
    }

    #[test]
    fn status_round_trips_through_its_text_form() {
        for status in [PeriodStatus::Open, PeriodStatus::Closed, PeriodStatus::Validated] {
            assert_eq!(status.as_str().parse::<PeriodStatus>().unwrap(), status);
        }
        assert!("ARCHIVED".parse::<PeriodStatus>().is_err());
    }
}
