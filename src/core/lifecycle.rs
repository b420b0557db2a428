//! Period status transitions.
//!
//! Each transition is a pure function from the current period to either a
//! new period value or [`Transition::Unchanged`]. Persisting the result and
//! the one-open-period rule belong to the caller.

use chrono::{DateTime, Utc};

use crate::error::{PanelError, Result};
use crate::models::period::{Period, PeriodId, PeriodStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(Period),
    /// Already in the target state; nothing to write and no restamp.
    Unchanged,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

fn moved(period: &Period, status: PeriodStatus, at: DateTime<Utc>) -> Transition {
    Transition::Applied(Period {
        status,
        updated_at: at,
        ..period.clone()
    })
}

/// OPEN -> CLOSED. Closing a CLOSED or VALIDATED period is a no-op.
pub fn close(period: &Period, at: DateTime<Utc>) -> Result<Transition> {
    match period.status {
        PeriodStatus::Open => Ok(moved(period, PeriodStatus::Closed, at)),
        PeriodStatus::Closed | PeriodStatus::Validated => Ok(Transition::Unchanged),
    }
}

/// CLOSED -> VALIDATED. An OPEN period must be closed first.
pub fn validate(period: &Period, at: DateTime<Utc>) -> Result<Transition> {
    match period.status {
        PeriodStatus::Closed => Ok(moved(period, PeriodStatus::Validated, at)),
        PeriodStatus::Validated => Ok(Transition::Unchanged),
        PeriodStatus::Open => Err(PanelError::InvalidTransition {
            from: PeriodStatus::Open,
            action: "validate",
        }),
    }
}

/// CLOSED -> OPEN. VALIDATED is permanent, and an OPEN period already
/// holds its sector's single open slot.
pub fn reopen(period: &Period, at: DateTime<Utc>) -> Result<Transition> {
    match period.status {
        PeriodStatus::Closed => Ok(moved(period, PeriodStatus::Open, at)),
        PeriodStatus::Open => Err(PanelError::business_rule(format!(
            "period {} is already open",
            period.id
        ))),
        PeriodStatus::Validated => Err(PanelError::InvalidTransition {
            from: PeriodStatus::Validated,
            action: "reopen",
        }),
    }
}

/// Write guard outcome for a period looked up by id.
pub fn ensure_open(period_id: PeriodId, status: Option<PeriodStatus>) -> Result<()> {
    match status {
        Some(PeriodStatus::Open) => Ok(()),
        other => Err(write_rejection(period_id, other)),
    }
}

/// The error a rejected period-scoped write reports.
pub fn write_rejection(period_id: PeriodId, status: Option<PeriodStatus>) -> PanelError {
    match status {
        None => PanelError::period_not_found(period_id),
        Some(_) => PanelError::ClosedPeriod(period_id),
    }
}
