//! Period-scoped indicator records.
//!
//! Only raw inputs are stored. Derived percentages (hand-hygiene compliance,
//! risk-tier shares) are computed on read through
//! [`crate::core::percentage::percentage`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::percentage::{is_percentage, percentage};
use crate::error::{PanelError, Result};
use crate::models::period::{PeriodId, SectorId, UserId};

/// Identity and stamps shared by every period-scoped record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub id: Uuid,
    pub period_id: PeriodId,
    pub sector_id: SectorId,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordHeader {
    pub fn new(period_id: PeriodId, sector_id: SectorId, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            period_id,
            sector_id,
            created_by: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Header for a record that combines several periods. Ids are nil; the
    /// sector comes from the first part and the stamps span all parts.
    pub fn aggregate<'a, I>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a RecordHeader>,
    {
        let mut parts = parts.into_iter();
        let first = parts.next()?;
        let (created_at, updated_at) = parts.fold(
            (first.created_at, first.updated_at),
            |(created, updated), h| (created.min(h.created_at), updated.max(h.updated_at)),
        );
        Some(Self {
            id: Uuid::nil(),
            period_id: Uuid::nil(),
            sector_id: first.sector_id,
            created_by: None,
            created_at,
            updated_at,
        })
    }

    /// Carries identity over from an existing record and restamps the update.
    pub fn revising(self, existing: &RecordHeader, at: DateTime<Utc>) -> Self {
        Self {
            id: existing.id,
            created_by: existing.created_by,
            created_at: existing.created_at,
            updated_at: at,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceIndicator {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub complete_wristband: Decimal,
    pub patient_communication: Decimal,
    pub medication_identified: Decimal,
    pub hand_hygiene_adherence: Decimal,
    pub fall_risk_assessment: Decimal,
    pub pressure_injury_risk_assessment: Decimal,
    pub total_patients: u32,
    pub observations: Option<String>,
}

impl ComplianceIndicator {
    pub fn percentages(&self) -> [Decimal; 6] {
        [
            self.complete_wristband,
            self.patient_communication,
            self.medication_identified,
            self.hand_hygiene_adherence,
            self.fall_risk_assessment,
            self.pressure_injury_risk_assessment,
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.percentages().iter().all(|p| is_percentage(*p)) {
            Ok(())
        } else {
            Err(PanelError::validation(
                "compliance percentages must lie between 0 and 100",
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandHygieneAssessment {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub total_observations: u32,
    pub compliant_observations: u32,
}

impl HandHygieneAssessment {
    pub fn compliance_percentage(&self) -> Decimal {
        percentage(self.total_observations, self.compliant_observations)
    }

    fn validate(&self) -> Result<()> {
        if self.compliant_observations > self.total_observations {
            return Err(PanelError::validation(
                "compliant observations cannot exceed total observations",
            ));
        }
        Ok(())
    }
}

/// Which risk instrument a set of tier counts belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskScale {
    Fall,
    PressureInjury,
}

impl RiskScale {
    /// Only the pressure-injury scale grades a very-high tier.
    pub fn has_very_high_tier(self) -> bool {
        matches!(self, RiskScale::PressureInjury)
    }
}

/// Raw patient counts of a risk assessment. Summable across periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    pub total_patients: u32,
    pub assessed_on_admission: u32,
    #[serde(default)]
    pub very_high: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub not_assessed: u32,
}

impl RiskCounts {
    pub fn percentages(&self, scale: RiskScale) -> RiskPercentages {
        let total = self.total_patients;
        RiskPercentages {
            assessment: percentage(total, self.assessed_on_admission),
            very_high: scale
                .has_very_high_tier()
                .then(|| percentage(total, self.very_high)),
            high: percentage(total, self.high),
            medium: percentage(total, self.medium),
            low: percentage(total, self.low),
            not_assessed: percentage(total, self.not_assessed),
        }
    }

    fn validate(&self, scale: RiskScale) -> Result<()> {
        if !scale.has_very_high_tier() && self.very_high != 0 {
            return Err(PanelError::validation(
                "fall-risk assessments have no very-high tier",
            ));
        }
        let parts = [
            self.assessed_on_admission,
            self.very_high,
            self.high,
            self.medium,
            self.low,
            self.not_assessed,
        ];
        if parts.iter().any(|p| *p > self.total_patients) {
            return Err(PanelError::validation(
                "risk counts cannot exceed the total number of patients",
            ));
        }
        Ok(())
    }

    /// Field-wise sum, `None` if any count overflows.
    pub fn checked_add(&self, rhs: &RiskCounts) -> Option<RiskCounts> {
        Some(RiskCounts {
            total_patients: self.total_patients.checked_add(rhs.total_patients)?,
            assessed_on_admission: self.assessed_on_admission.checked_add(rhs.assessed_on_admission)?,
            very_high: self.very_high.checked_add(rhs.very_high)?,
            high: self.high.checked_add(rhs.high)?,
            medium: self.medium.checked_add(rhs.medium)?,
            low: self.low.checked_add(rhs.low)?,
            not_assessed: self.not_assessed.checked_add(rhs.not_assessed)?,
        })
    }
}

/// Tier shares of the total patient count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPercentages {
    pub assessment: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub very_high: Option<Decimal>,
    pub high: Decimal,
    pub medium: Decimal,
    pub low: Decimal,
    pub not_assessed: Decimal,
}

/// Shared shape of the two risk assessments.
pub trait RiskRecord: Sized {
    const SCALE: RiskScale;

    fn from_parts(header: RecordHeader, counts: RiskCounts) -> Self;
    fn header(&self) -> &RecordHeader;
    fn counts(&self) -> &RiskCounts;

    fn percentages(&self) -> RiskPercentages {
        self.counts().percentages(Self::SCALE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallRiskAssessment {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(flatten)]
    pub counts: RiskCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureInjuryRiskAssessment {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(flatten)]
    pub counts: RiskCounts,
}

macro_rules! risk_record {
    ($ty:ty, $scale:expr) => {
        impl RiskRecord for $ty {
            const SCALE: RiskScale = $scale;

            fn from_parts(header: RecordHeader, counts: RiskCounts) -> Self {
                Self { header, counts }
            }

            fn header(&self) -> &RecordHeader {
                &self.header
            }

            fn counts(&self) -> &RiskCounts {
                &self.counts
            }
        }
    };
}

risk_record!(FallRiskAssessment, RiskScale::Fall);
risk_record!(PressureInjuryRiskAssessment, RiskScale::PressureInjury);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfNotification {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub quantity: u32,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaCompliance {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub goal_value: Decimal,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationCompliance {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorKind {
    Compliance,
    HandHygiene,
    FallRisk,
    PressureInjury,
    SelfNotification,
    MetaCompliance,
    MedicationCompliance,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 7] = [
        IndicatorKind::Compliance,
        IndicatorKind::HandHygiene,
        IndicatorKind::FallRisk,
        IndicatorKind::PressureInjury,
        IndicatorKind::SelfNotification,
        IndicatorKind::MetaCompliance,
        IndicatorKind::MedicationCompliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Compliance => "COMPLIANCE",
            IndicatorKind::HandHygiene => "HAND_HYGIENE",
            IndicatorKind::FallRisk => "FALL_RISK",
            IndicatorKind::PressureInjury => "PRESSURE_INJURY",
            IndicatorKind::SelfNotification => "SELF_NOTIFICATION",
            IndicatorKind::MetaCompliance => "META_COMPLIANCE",
            IndicatorKind::MedicationCompliance => "MEDICATION_COMPLIANCE",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        IndicatorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PanelError::Decode(format!("unknown indicator kind: {}", s)))
    }
}

/// Any of the seven indicator records, keyed by kind. At most one of each
/// kind exists per period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Indicator {
    Compliance(ComplianceIndicator),
    HandHygiene(HandHygieneAssessment),
    FallRisk(FallRiskAssessment),
    PressureInjury(PressureInjuryRiskAssessment),
    SelfNotification(SelfNotification),
    MetaCompliance(MetaCompliance),
    MedicationCompliance(MedicationCompliance),
}

impl Indicator {
    pub fn kind(&self) -> IndicatorKind {
        match self {
            Indicator::Compliance(_) => IndicatorKind::Compliance,
            Indicator::HandHygiene(_) => IndicatorKind::HandHygiene,
            Indicator::FallRisk(_) => IndicatorKind::FallRisk,
            Indicator::PressureInjury(_) => IndicatorKind::PressureInjury,
            Indicator::SelfNotification(_) => IndicatorKind::SelfNotification,
            Indicator::MetaCompliance(_) => IndicatorKind::MetaCompliance,
            Indicator::MedicationCompliance(_) => IndicatorKind::MedicationCompliance,
        }
    }

    pub fn header(&self) -> &RecordHeader {
        match self {
            Indicator::Compliance(i) => &i.header,
            Indicator::HandHygiene(i) => &i.header,
            Indicator::FallRisk(i) => &i.header,
            Indicator::PressureInjury(i) => &i.header,
            Indicator::SelfNotification(i) => &i.header,
            Indicator::MetaCompliance(i) => &i.header,
            Indicator::MedicationCompliance(i) => &i.header,
        }
    }

    /// Returns the record with its header replaced by `f(header)`.
    pub fn map_header(self, f: impl FnOnce(RecordHeader) -> RecordHeader) -> Self {
        match self {
            Indicator::Compliance(mut i) => {
                i.header = f(i.header);
                Indicator::Compliance(i)
            }
            Indicator::HandHygiene(mut i) => {
                i.header = f(i.header);
                Indicator::HandHygiene(i)
            }
            Indicator::FallRisk(mut i) => {
                i.header = f(i.header);
                Indicator::FallRisk(i)
            }
            Indicator::PressureInjury(mut i) => {
                i.header = f(i.header);
                Indicator::PressureInjury(i)
            }
            Indicator::SelfNotification(mut i) => {
                i.header = f(i.header);
                Indicator::SelfNotification(i)
            }
            Indicator::MetaCompliance(mut i) => {
                i.header = f(i.header);
                Indicator::MetaCompliance(i)
            }
            Indicator::MedicationCompliance(mut i) => {
                i.header = f(i.header);
                Indicator::MedicationCompliance(i)
            }
        }
    }

    /// Checks raw inputs before they are written.
    pub fn validate(&self) -> Result<()> {
        match self {
            Indicator::Compliance(i) => i.validate(),
            Indicator::HandHygiene(i) => i.validate(),
            Indicator::FallRisk(i) => i.counts.validate(RiskScale::Fall),
            Indicator::PressureInjury(i) => i.counts.validate(RiskScale::PressureInjury),
            Indicator::SelfNotification(i) => require_percentage("self-notification", i.percentage),
            Indicator::MetaCompliance(i) => {
                require_percentage("meta goal", i.goal_value)?;
                require_percentage("meta compliance", i.percentage)
            }
            Indicator::MedicationCompliance(i) => {
                require_percentage("medication compliance", i.percentage)
            }
        }
    }
}

fn require_percentage(field: &str, value: Decimal) -> Result<()> {
    if is_percentage(value) {
        Ok(())
    } else {
        Err(PanelError::validation(format!(
            "{} percentage must lie between 0 and 100, got {}",
            field, value
        )))
    }
}

/// Typed access to one variant of [`Indicator`].
pub trait IndicatorRecord: Sized + Send + 'static {
    const KIND: IndicatorKind;

    fn from_indicator(indicator: Indicator) -> Option<Self>;
}

macro_rules! indicator_record {
    ($ty:ty, $variant:ident) => {
        impl IndicatorRecord for $ty {
            const KIND: IndicatorKind = IndicatorKind::$variant;

            fn from_indicator(indicator: Indicator) -> Option<Self> {
                match indicator {
                    Indicator::$variant(record) => Some(record),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Indicator {
            fn from(record: $ty) -> Self {
                Indicator::$variant(record)
            }
        }
    };
}

indicator_record!(ComplianceIndicator, Compliance);
indicator_record!(HandHygieneAssessment, HandHygiene);
indicator_record!(FallRiskAssessment, FallRisk);
indicator_record!(PressureInjuryRiskAssessment, PressureInjury);
indicator_record!(SelfNotification, SelfNotification);
indicator_record!(MetaCompliance, MetaCompliance);
indicator_record!(MedicationCompliance, MedicationCompliance);
