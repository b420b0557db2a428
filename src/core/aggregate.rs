//! Combines per-period snapshots into one cumulative report.
//!
//! Every field is folded independently over the snapshots where it is
//! present. Raw counts are summed and their percentages recomputed; stored
//! percentages are averaged; lists are concatenated then sorted newest
//! first with a stable sort, so equal timestamps keep period order.

use rust_decimal::Decimal;

use crate::core::percentage::{mean, weighted_mean, SCALE};
use crate::error::{PanelError, Result};
use crate::models::event::{AdverseEvent, Notification};
use crate::models::indicator::{
    ComplianceIndicator, FallRiskAssessment, HandHygieneAssessment, MedicationCompliance,
    MetaCompliance, PressureInjuryRiskAssessment, RecordHeader, RiskCounts, RiskRecord,
    SelfNotification,
};
use crate::models::report::PanelReport;

pub const DEFAULT_OBSERVATION_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Placed between the observation texts of consecutive periods.
    pub observation_separator: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            observation_separator: DEFAULT_OBSERVATION_SEPARATOR.to_owned(),
        }
    }
}

/// A record type that can be folded across periods.
pub trait Aggregate: Sized {
    /// `Ok(None)` only when `parts` is empty. Fails when a summed count
    /// does not fit its field.
    fn combine(parts: &[&Self], options: &AggregateOptions) -> Result<Option<Self>>;
}

fn overflow(field: &str) -> PanelError {
    PanelError::validation(format!("combined {} exceeds the supported count", field))
}

fn checked_sum<I>(values: I, field: &str) -> Result<u32>
where
    I: IntoIterator<Item = u32>,
{
    values
        .into_iter()
        .try_fold(0u32, |acc, v| acc.checked_add(v))
        .ok_or_else(|| overflow(field))
}

fn header_of<T>(parts: &[&T], header: impl Fn(&T) -> &RecordHeader) -> Option<RecordHeader> {
    RecordHeader::aggregate(parts.iter().map(|p| header(*p)))
}

fn zero() -> Decimal {
    Decimal::new(0, SCALE)
}

/// Patient-weighted mean, or the plain mean when no period counted patients.
fn compliance_mean(pairs: &[(Decimal, u32)]) -> Decimal {
    weighted_mean(pairs.iter().copied())
        .or_else(|| mean(pairs.iter().map(|(value, _)| *value)))
        .unwrap_or_else(zero)
}

impl Aggregate for ComplianceIndicator {
    fn combine(parts: &[&Self], options: &AggregateOptions) -> Result<Option<Self>> {
        let Some(header) = header_of(parts, |p| &p.header) else {
            return Ok(None);
        };
        let field = |get: fn(&ComplianceIndicator) -> Decimal| {
            let pairs: Vec<(Decimal, u32)> =
                parts.iter().map(|p| (get(p), p.total_patients)).collect();
            compliance_mean(&pairs)
        };

        let observations: Vec<&str> = parts
            .iter()
            .filter_map(|p| p.observations.as_deref())
            .filter(|text| !text.trim().is_empty())
            .collect();

        Ok(Some(ComplianceIndicator {
            header,
            complete_wristband: field(|c| c.complete_wristband),
            patient_communication: field(|c| c.patient_communication),
            medication_identified: field(|c| c.medication_identified),
            hand_hygiene_adherence: field(|c| c.hand_hygiene_adherence),
            fall_risk_assessment: field(|c| c.fall_risk_assessment),
            pressure_injury_risk_assessment: field(|c| c.pressure_injury_risk_assessment),
            total_patients: checked_sum(parts.iter().map(|p| p.total_patients), "total patients")?,
            observations: (!observations.is_empty())
                .then(|| observations.join(&options.observation_separator)),
        }))
    }
}

impl Aggregate for HandHygieneAssessment {
    fn combine(parts: &[&Self], _: &AggregateOptions) -> Result<Option<Self>> {
        let Some(header) = header_of(parts, |p| &p.header) else {
            return Ok(None);
        };
        Ok(Some(HandHygieneAssessment {
            header,
            total_observations: checked_sum(
                parts.iter().map(|p| p.total_observations),
                "hand-hygiene observations",
            )?,
            compliant_observations: checked_sum(
                parts.iter().map(|p| p.compliant_observations),
                "compliant observations",
            )?,
        }))
    }
}

fn combine_risk<T: RiskRecord>(parts: &[&T]) -> Result<Option<T>> {
    let Some(header) = header_of(parts, |p| p.header()) else {
        return Ok(None);
    };
    let counts = parts
        .iter()
        .try_fold(RiskCounts::default(), |acc, p| acc.checked_add(p.counts()))
        .ok_or_else(|| overflow("risk counts"))?;
    Ok(Some(T::from_parts(header, counts)))
}

impl Aggregate for FallRiskAssessment {
    fn combine(parts: &[&Self], _: &AggregateOptions) -> Result<Option<Self>> {
        combine_risk(parts)
    }
}

impl Aggregate for PressureInjuryRiskAssessment {
    fn combine(parts: &[&Self], _: &AggregateOptions) -> Result<Option<Self>> {
        combine_risk(parts)
    }
}

impl Aggregate for SelfNotification {
    fn combine(parts: &[&Self], _: &AggregateOptions) -> Result<Option<Self>> {
        let Some(header) = header_of(parts, |p| &p.header) else {
            return Ok(None);
        };
        let percentage = weighted_mean(parts.iter().map(|p| (p.percentage, p.quantity)))
            .unwrap_or_else(zero);
        Ok(Some(SelfNotification {
            header,
            quantity: checked_sum(parts.iter().map(|p| p.quantity), "self-notification quantity")?,
            percentage,
        }))
    }
}

impl Aggregate for MetaCompliance {
    fn combine(parts: &[&Self], _: &AggregateOptions) -> Result<Option<Self>> {
        let combined = header_of(parts, |p| &p.header).and_then(|header| {
            Some(MetaCompliance {
                header,
                goal_value: mean(parts.iter().map(|p| p.goal_value))?,
                percentage: mean(parts.iter().map(|p| p.percentage))?,
            })
        });
        Ok(combined)
    }
}

impl Aggregate for MedicationCompliance {
    fn combine(parts: &[&Self], _: &AggregateOptions) -> Result<Option<Self>> {
        let combined = header_of(parts, |p| &p.header).and_then(|header| {
            Some(MedicationCompliance {
                header,
                percentage: mean(parts.iter().map(|p| p.percentage))?,
            })
        });
        Ok(combined)
    }
}

fn fold<'a, T, F>(reports: &'a [PanelReport], options: &AggregateOptions, field: F) -> Result<Option<T>>
where
    T: Aggregate + 'a,
    F: Fn(&'a PanelReport) -> Option<&'a T>,
{
    let present: Vec<&T> = reports.iter().filter_map(field).collect();
    T::combine(&present, options)
}

/// Concatenates in report order, then sorts newest first. Stable.
fn newest_first<'a, T, K, F, G>(reports: &'a [PanelReport], list: F, key: G) -> Vec<T>
where
    T: Clone + 'a,
    K: Ord,
    F: Fn(&'a PanelReport) -> &'a [T],
    G: Fn(&T) -> K,
{
    let mut items: Vec<T> = reports.iter().flat_map(|r| list(r).iter().cloned()).collect();
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

/// Folds snapshots given in ascending period order. An empty slice yields
/// an empty report. Fails only when a summed count overflows.
pub fn aggregate(reports: &[PanelReport], options: &AggregateOptions) -> Result<PanelReport> {
    Ok(PanelReport {
        compliance: fold(reports, options, |r| r.compliance.as_ref())?,
        hand_hygiene: fold(reports, options, |r| r.hand_hygiene.as_ref().map(|s| &s.assessment))?
            .map(Into::into),
        fall_risk: fold(reports, options, |r| r.fall_risk.as_ref().map(|s| &s.assessment))?
            .map(Into::into),
        pressure_injury: fold(reports, options, |r| {
            r.pressure_injury.as_ref().map(|s| &s.assessment)
        })?
        .map(Into::into),
        self_notification: fold(reports, options, |r| r.self_notification.as_ref())?,
        meta_compliance: fold(reports, options, |r| r.meta_compliance.as_ref())?,
        medication_compliance: fold(reports, options, |r| r.medication_compliance.as_ref())?,
        adverse_events: newest_first(reports, |r| r.adverse_events.as_slice(), |e: &AdverseEvent| {
            e.event_date
        }),
        notifications: newest_first(reports, |r| r.notifications.as_slice(), |n: &Notification| {
            n.header.created_at
        }),
    })
}
