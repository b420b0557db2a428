//! Single-period report assembly. Read-only.

use tracing::{debug, instrument};

use crate::core::periodicity::DateRange;
use crate::db::IndicatorRepository;
use crate::error::{PanelError, Result};
use crate::models::indicator::{
    ComplianceIndicator, FallRiskAssessment, HandHygieneAssessment, IndicatorRecord,
    MedicationCompliance, MetaCompliance, PressureInjuryRiskAssessment, SelfNotification,
};
use crate::models::period::{Period, PeriodId, SectorId};
use crate::models::report::PanelReport;

/// Reads one indicator of type `T`. Records filed under another sector are
/// treated as absent.
async fn fetch<T, S>(store: &S, period_id: PeriodId, sector_id: SectorId) -> Result<Option<T>>
where
    T: IndicatorRecord,
    S: IndicatorRepository + ?Sized,
{
    let Some(indicator) = store.get_indicator(period_id, T::KIND).await? else {
        return Ok(None);
    };
    if indicator.header().sector_id != sector_id {
        return Ok(None);
    }
    let found = indicator.kind();
    T::from_indicator(indicator).map(Some).ok_or_else(|| {
        PanelError::Decode(format!("expected a {} indicator, found {}", T::KIND, found))
    })
}

/// Pulls every indicator, event and notification of `period`. When
/// `event_window` is given, only adverse events dated inside it are kept.
#[instrument(skip(store, period), fields(period_id = %period.id, sector_id = %period.sector_id))]
pub async fn build_snapshot<S>(
    store: &S,
    period: &Period,
    event_window: Option<&DateRange>,
) -> Result<PanelReport>
where
    S: IndicatorRepository + ?Sized,
{
    let (id, sector) = (period.id, period.sector_id);

    let (
        compliance,
        hand_hygiene,
        fall_risk,
        pressure_injury,
        self_notification,
        meta_compliance,
        medication_compliance,
        mut adverse_events,
        notifications,
    ) = tokio::try_join!(
        fetch::<ComplianceIndicator, _>(store, id, sector),
        fetch::<HandHygieneAssessment, _>(store, id, sector),
        fetch::<FallRiskAssessment, _>(store, id, sector),
        fetch::<PressureInjuryRiskAssessment, _>(store, id, sector),
        fetch::<SelfNotification, _>(store, id, sector),
        fetch::<MetaCompliance, _>(store, id, sector),
        fetch::<MedicationCompliance, _>(store, id, sector),
        store.list_adverse_events(id, sector),
        store.list_notifications(id, sector),
    )?;

    if let Some(window) = event_window {
        adverse_events.retain(|event| window.contains(event.event_date));
    }

    let report = PanelReport {
        compliance,
        hand_hygiene: hand_hygiene.map(Into::into),
        fall_risk: fall_risk.map(Into::into),
        pressure_injury: pressure_injury.map(Into::into),
        self_notification,
        meta_compliance,
        medication_compliance,
        adverse_events,
        notifications,
    };
    debug!(empty = report.is_empty(), "Snapshot assembled");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockIndicatorRepository;
    use crate::models::event::{AdverseEvent, EventType};
    use crate::models::indicator::{Indicator, IndicatorKind, RecordHeader, RiskCounts};
    use crate::models::period::{NewPeriod, PeriodStatus};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn period() -> Period {
        let request = NewPeriod { sector_id: Uuid::new_v4(), month: 2, year: 2024 };
        Period { status: PeriodStatus::Closed, ..Period::open(&request, Utc::now()).unwrap() }
    }

    fn event(period: &Period, day: u32) -> AdverseEvent {
        AdverseEvent {
            header: RecordHeader::new(period.id, period.sector_id, Utc::now()),
            event_date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            event_type: EventType::Fall,
            description: "Fall from bed".into(),
            quantity_cases: 1,
            quantity_notifications: 1,
        }
    }

    fn store_with(period: &Period, indicators: Vec<Indicator>, events: Vec<AdverseEvent>) -> MockIndicatorRepository {
        let mut store = MockIndicatorRepository::new();
        store.expect_get_indicator().returning(move |_, kind| {
            Ok(indicators.iter().find(|i| i.kind() == kind).cloned())
        });
        let expected = (period.id, period.sector_id);
        store
            .expect_list_adverse_events()
            .withf(move |p, s| (*p, *s) == expected)
            .returning(move |_, _| Ok(events.clone()));
        store.expect_list_notifications().returning(|_, _| Ok(Vec::new()));
        store
    }

    #[tokio::test]
    async fn absent_indicators_stay_absent() {
        let period = period();
        let store = store_with(&period, Vec::new(), Vec::new());

        let report = build_snapshot(&store, &period, None).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn derives_percentages_on_read() {
        let period = period();
        let fall = Indicator::FallRisk(FallRiskAssessment {
            header: RecordHeader::new(period.id, period.sector_id, Utc::now()),
            counts: RiskCounts {
                total_patients: 50,
                assessed_on_admission: 45,
                high: 15,
                medium: 20,
                low: 10,
                ..RiskCounts::default()
            },
        });
        let hygiene = Indicator::HandHygiene(HandHygieneAssessment {
            header: RecordHeader::new(period.id, period.sector_id, Utc::now()),
            total_observations: 3,
            compliant_observations: 2,
        });
        let store = store_with(&period, vec![fall, hygiene], Vec::new());

        let report = build_snapshot(&store, &period, None).await.unwrap();
        let fall = report.fall_risk.unwrap();
        assert_eq!(fall.percentages.high, dec!(30.00));
        assert_eq!(fall.percentages.assessment, dec!(90.00));
        assert_eq!(report.hand_hygiene.unwrap().compliance_percentage, dec!(66.67));
        assert!(report.compliance.is_none());
    }

    #[tokio::test]
    async fn foreign_sector_records_are_ignored() {
        let period = period();
        let stray = Indicator::MetaCompliance(MetaCompliance {
            header: RecordHeader::new(period.id, Uuid::new_v4(), Utc::now()),
            goal_value: dec!(90),
            percentage: dec!(80),
        });
        let store = store_with(&period, vec![stray], Vec::new());

        let report = build_snapshot(&store, &period, None).await.unwrap();
        assert!(report.meta_compliance.is_none());
    }

    #[tokio::test]
    async fn event_window_filters_by_event_date() {
        let period = period();
        let events = vec![event(&period, 3), event(&period, 14), event(&period, 27)];
        let store = store_with(&period, Vec::new(), events);
        let window = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
        };

        let report = build_snapshot(&store, &period, Some(&window)).await.unwrap();
        assert_eq!(report.adverse_events.len(), 1);
        assert_eq!(report.adverse_events[0].event_date.to_string(), "2024-02-14");
    }

    #[tokio::test]
    async fn mismatched_payload_is_a_decode_error() {
        let period = period();
        let mut store = MockIndicatorRepository::new();
        let wrong = Indicator::MedicationCompliance(MedicationCompliance {
            header: RecordHeader::new(period.id, period.sector_id, Utc::now()),
            percentage: dec!(50),
        });
        store.expect_get_indicator().returning(move |_, kind| {
            Ok((kind == IndicatorKind::Compliance).then(|| wrong.clone()))
        });
        store.expect_list_adverse_events().returning(|_, _| Ok(Vec::new()));
        store.expect_list_notifications().returning(|_, _| Ok(Vec::new()));

        let err = build_snapshot(&store, &period, None).await.unwrap_err();
        assert!(matches!(err, PanelError::Decode(_)));
    }
}
