mod common;

use rust_decimal_macros::dec;
use uuid::Uuid;

use quality_panel::core::periodicity::{DateRange, Periodicity, PeriodicityQuery};
use quality_panel::db::PanelStore;
use quality_panel::models::{
    HandHygieneAssessment, Indicator, MedicationCompliance, MetaCompliance, NewPeriod, PeriodStatus,
    PressureInjuryRiskAssessment, RiskCounts, SelfNotification,
};
use quality_panel::{cancel_pair, CancelSignal, CumulativeRequest, PanelError, QualityPanel};

use common::{adverse_event, closed_month, compliance, date, fall_risk, header};

macro_rules! on_both_backends {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(super::common::memory_panel()).await
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(super::common::sqlite_panel().await).await
                }
            )*
        }
    };
}

on_both_backends!(
    fall_risk_is_summed_across_months,
    empty_range_yields_an_empty_report,
    quarter_selects_only_its_months,
    compliance_and_observations_combine_in_order,
    events_from_all_periods_are_listed_newest_first,
    snapshot_can_narrow_events_by_date,
    cancelled_build_is_abandoned,
    every_indicator_kind_is_combined,
);

fn custom(sector_id: Uuid, start: (u32, u32), end: (u32, u32)) -> CumulativeRequest {
    CumulativeRequest {
        sector_id,
        query: PeriodicityQuery::custom(date(2024, start.0, start.1), date(2024, end.0, end.1)),
    }
}

async fn fall_risk_is_summed_across_months<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    closed_month(&panel, sector, 1, |p| vec![fall_risk(p, 100, 10)]).await;
    closed_month(&panel, sector, 2, |p| vec![fall_risk(p, 50, 15)]).await;

    let report = panel
        .cumulative_report(custom(sector, (1, 1), (2, 29)), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.periods.len(), 2);
    assert_eq!(report.periodicity, Periodicity::Custom);
    let fall = report.report.fall_risk.unwrap();
    assert_eq!(fall.assessment.counts.total_patients, 150);
    assert_eq!(fall.assessment.counts.high, 25);
    assert_eq!(fall.percentages.high, dec!(16.67));
    assert!(fall.assessment.header.id.is_nil());

    // A single month reproduces its own shares
    let january = panel
        .cumulative_report(
            CumulativeRequest {
                sector_id: sector,
                query: PeriodicityQuery::new(Periodicity::Monthly).year(2024).index(1),
            },
            &CancelSignal::never(),
        )
        .await
        .unwrap();
    assert_eq!(january.report.fall_risk.unwrap().percentages.high, dec!(10.00));
}

async fn empty_range_yields_an_empty_report<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    closed_month(&panel, sector, 3, |p| vec![fall_risk(p, 10, 1)]).await;

    let report = panel
        .cumulative_report(custom(sector, (6, 1), (8, 31)), &CancelSignal::never())
        .await
        .unwrap();
    assert!(report.periods.is_empty());
    assert!(report.report.is_empty());

    let missing_bounds = CumulativeRequest {
        sector_id: sector,
        query: PeriodicityQuery::new(Periodicity::Custom),
    };
    let err = panel
        .cumulative_report(missing_bounds, &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::Validation(_)));
}

async fn quarter_selects_only_its_months<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    for month in [2, 3, 4, 6, 7] {
        closed_month(&panel, sector, month, |p| vec![fall_risk(p, 10, month)]).await;
    }

    let request = CumulativeRequest {
        sector_id: sector,
        query: PeriodicityQuery::new(Periodicity::Quarterly).year(2024).index(2),
    };
    let report = panel.cumulative_report(request, &CancelSignal::never()).await.unwrap();

    let months: Vec<u32> = report.periods.iter().map(|p| p.month).collect();
    assert_eq!(months, vec![4, 6]);
    assert_eq!(report.range, DateRange::new(date(2024, 4, 1), date(2024, 6, 30)).unwrap());
    assert_eq!(report.report.fall_risk.unwrap().assessment.counts.high, 10);
    assert!(report.periods.iter().all(|p| p.status == PeriodStatus::Closed));
}

async fn compliance_and_observations_combine_in_order<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    closed_month(&panel, sector, 1, |p| vec![compliance(p, dec!(100), 30, Some("January notes"))]).await;
    closed_month(&panel, sector, 2, |_| Vec::new()).await;
    closed_month(&panel, sector, 3, |p| vec![compliance(p, dec!(60), 10, Some("March notes"))]).await;

    let report = panel
        .cumulative_report(custom(sector, (1, 1), (3, 31)), &CancelSignal::never())
        .await
        .unwrap();

    let compliance = report.report.compliance.unwrap();
    assert_eq!(compliance.complete_wristband, dec!(90.00));
    assert_eq!(compliance.total_patients, 40);
    assert_eq!(compliance.observations.as_deref(), Some("January notes\n---\nMarch notes"));
    assert!(report.report.hand_hygiene.is_none());
}

async fn events_from_all_periods_are_listed_newest_first<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    let actor = Uuid::new_v4();

    for (month, days) in [(1u32, [5u32, 28]), (2, [2, 17])] {
        let period = panel
            .open_period(NewPeriod { sector_id: sector, month, year: 2024 })
            .await
            .unwrap();
        for day in days {
            let event = adverse_event(&period, date(2024, month, day), &format!("{}-{}", month, day));
            panel.record_adverse_event(actor, event).await.unwrap();
        }
        panel.close_period(period.id).await.unwrap();
    }

    let report = panel
        .cumulative_report(custom(sector, (1, 1), (2, 29)), &CancelSignal::never())
        .await
        .unwrap();
    let order: Vec<&str> = report.report.adverse_events.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(order, vec!["2-17", "2-2", "1-28", "1-5"]);

    let by_range = panel
        .reports_by_range(
            sector,
            DateRange::new(date(2024, 1, 1), date(2024, 2, 29)).unwrap(),
            &CancelSignal::never(),
        )
        .await
        .unwrap();
    assert_eq!(by_range.len(), 2);
    assert_eq!(by_range[0].period.month, 1);
    assert_eq!(by_range[0].report.adverse_events.len(), 2);
}

async fn snapshot_can_narrow_events_by_date<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    let period = panel
        .open_period(NewPeriod { sector_id: sector, month: 5, year: 2024 })
        .await
        .unwrap();
    for day in [2, 15, 30] {
        panel
            .record_adverse_event(Uuid::new_v4(), adverse_event(&period, date(2024, 5, day), "event"))
            .await
            .unwrap();
    }

    let window = DateRange::new(date(2024, 5, 10), date(2024, 5, 20)).unwrap();
    let narrowed = panel.snapshot_report(period.id, Some(window)).await.unwrap();
    assert_eq!(narrowed.report.adverse_events.len(), 1);
    assert_eq!(narrowed.period.id, period.id);

    let full = panel.snapshot_report(period.id, None).await.unwrap();
    assert_eq!(full.report.adverse_events.len(), 3);

    let err = panel.snapshot_report(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, PanelError::NotFound { .. }));
}

async fn cancelled_build_is_abandoned<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    closed_month(&panel, sector, 1, |p| vec![fall_risk(p, 10, 2)]).await;

    let (handle, signal) = cancel_pair();
    handle.cancel();

    let err = panel
        .cumulative_report(custom(sector, (1, 1), (12, 31)), &signal)
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::Cancelled));

    // Nothing was changed by the abandoned build
    let periods = panel.list_periods(sector).await.unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].status, PeriodStatus::Closed);
}

async fn every_indicator_kind_is_combined<S: PanelStore>(panel: QualityPanel<S>) {
    let sector = Uuid::new_v4();
    let months = [
        (1u32, dec!(80), 10u32, 8u32, 2u32, 2u32, dec!(50), dec!(90), dec!(70), dec!(97.5)),
        (2, dec!(90), 30, 21, 4, 6, dec!(90), dec!(80), dec!(75), dec!(92.5)),
    ];
    for (month, value, observed, compliant, very_high, reported, own, goal, met, medication) in months {
        closed_month(&panel, sector, month, |p| {
            vec![
                compliance(p, value, 10, None),
                Indicator::HandHygiene(HandHygieneAssessment {
                    header: header(p),
                    total_observations: observed,
                    compliant_observations: compliant,
                }),
                fall_risk(p, 20, 5),
                Indicator::PressureInjury(PressureInjuryRiskAssessment {
                    header: header(p),
                    counts: RiskCounts {
                        total_patients: 20,
                        assessed_on_admission: 18,
                        very_high,
                        high: 4,
                        medium: 6,
                        low: 6 - very_high / 2,
                        not_assessed: 2,
                    },
                }),
                Indicator::SelfNotification(SelfNotification {
                    header: header(p),
                    quantity: reported,
                    percentage: own,
                }),
                Indicator::MetaCompliance(MetaCompliance {
                    header: header(p),
                    goal_value: goal,
                    percentage: met,
                }),
                Indicator::MedicationCompliance(MedicationCompliance {
                    header: header(p),
                    percentage: medication,
                }),
            ]
        })
        .await;
    }

    let report = panel
        .cumulative_report(custom(sector, (1, 1), (2, 29)), &CancelSignal::never())
        .await
        .unwrap()
        .report;

    assert_eq!(report.compliance.unwrap().complete_wristband, dec!(85.00));

    let hygiene = report.hand_hygiene.unwrap();
    assert_eq!(hygiene.assessment.total_observations, 40);
    assert_eq!(hygiene.assessment.compliant_observations, 29);
    assert_eq!(hygiene.compliance_percentage, dec!(72.50));

    let fall = report.fall_risk.unwrap();
    assert_eq!(fall.assessment.counts.total_patients, 40);
    assert_eq!(fall.percentages.high, dec!(25.00));
    assert_eq!(fall.percentages.very_high, None);

    let pressure = report.pressure_injury.unwrap();
    assert_eq!(pressure.assessment.counts.very_high, 6);
    assert_eq!(pressure.assessment.counts.assessed_on_admission, 36);
    assert_eq!(pressure.percentages.very_high, Some(dec!(15.00)));
    assert_eq!(pressure.percentages.assessment, dec!(90.00));

    let own = report.self_notification.unwrap();
    assert_eq!(own.quantity, 8);
    assert_eq!(own.percentage, dec!(80.00));

    let meta = report.meta_compliance.unwrap();
    assert_eq!(meta.goal_value, dec!(85.00));
    assert_eq!(meta.percentage, dec!(72.50));

    assert_eq!(report.medication_compliance.unwrap().percentage, dec!(95.00));
}
