//! Error taxonomy for the Quality Panel core.
//!
//! Every error here is a deterministic consequence of input or stored state,
//! so nothing is retried internally. Callers decide what to surface.

use thiserror::Error;
use uuid::Uuid;

use crate::models::period::PeriodStatus;

pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Debug, Error)]
pub enum PanelError {
    /// Malformed input, always fixable by the caller.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Write attempted against a period that is not OPEN.
    #[error("period {0} is not open; reopen it before changing its data")]
    ClosedPeriod(Uuid),

    /// Cross-entity invariant violated (duplicate open period, duplicate month/year).
    #[error("business rule violated: {0}")]
    BusinessRule(String),

    #[error("cannot {action} a period in status {from}")]
    InvalidTransition {
        from: PeriodStatus,
        action: &'static str,
    },

    #[error("report generation was cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

impl PanelError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRule(message.into())
    }

    pub fn period_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "period", id }
    }

    /// Errors a boundary layer should report as a state conflict rather than
    /// a malformed request.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ClosedPeriod(_) | Self::BusinessRule(_) | Self::InvalidTransition { .. }
        )
    }
}

impl From<validator::ValidationErrors> for PanelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
