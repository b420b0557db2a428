//! Report shapes. Derived percentages are filled in here, at read time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::periodicity::{DateRange, Periodicity};
use crate::models::event::{AdverseEvent, Notification};
use crate::models::indicator::{
    ComplianceIndicator, FallRiskAssessment, HandHygieneAssessment, MedicationCompliance,
    MetaCompliance, PressureInjuryRiskAssessment, RiskPercentages, RiskRecord, SelfNotification,
};
use crate::models::period::{PeriodSummary, SectorId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandHygieneSummary {
    #[serde(flatten)]
    pub assessment: HandHygieneAssessment,
    pub compliance_percentage: Decimal,
}

impl From<HandHygieneAssessment> for HandHygieneSummary {
    fn from(assessment: HandHygieneAssessment) -> Self {
        Self {
            compliance_percentage: assessment.compliance_percentage(),
            assessment,
        }
    }
}

/// A risk assessment together with its tier shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary<T> {
    #[serde(flatten)]
    pub assessment: T,
    pub percentages: RiskPercentages,
}

impl<T: RiskRecord> From<T> for RiskSummary<T> {
    fn from(assessment: T) -> Self {
        Self {
            percentages: assessment.percentages(),
            assessment,
        }
    }
}

pub type FallRiskSummary = RiskSummary<FallRiskAssessment>;
pub type PressureInjurySummary = RiskSummary<PressureInjuryRiskAssessment>;

/// Everything recorded for one period, or the combination of several.
/// Absent indicators are `None`; the two lists may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelReport {
    pub compliance: Option<ComplianceIndicator>,
    pub hand_hygiene: Option<HandHygieneSummary>,
    pub fall_risk: Option<FallRiskSummary>,
    pub pressure_injury: Option<PressureInjurySummary>,
    pub self_notification: Option<SelfNotification>,
    pub meta_compliance: Option<MetaCompliance>,
    pub medication_compliance: Option<MedicationCompliance>,
    pub adverse_events: Vec<AdverseEvent>,
    pub notifications: Vec<Notification>,
}

impl PanelReport {
    pub fn is_empty(&self) -> bool {
        self.compliance.is_none()
            && self.hand_hygiene.is_none()
            && self.fall_risk.is_none()
            && self.pressure_injury.is_none()
            && self.self_notification.is_none()
            && self.meta_compliance.is_none()
            && self.medication_compliance.is_none()
            && self.adverse_events.is_empty()
            && self.notifications.is_empty()
    }
}

/// Snapshot of one period, as listed in a by-range report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub period: PeriodSummary,
    pub report: PanelReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeReport {
    pub sector_id: SectorId,
    pub periodicity: Periodicity,
    pub range: DateRange,
    /// Contributing periods, ascending by (year, month).
    pub periods: Vec<PeriodSummary>,
    pub report: PanelReport,
}
