#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use quality_panel::config::DatabaseConfig;
use quality_panel::db::{Database, MemoryStore, PanelStore, SqliteStore};
use quality_panel::models::{
    AdverseEvent, ComplianceIndicator, EventType, FallRiskAssessment, Indicator, NewPeriod,
    Notification, Period, RecordHeader, RiskCounts,
};
use quality_panel::{PanelOptions, QualityPanel};

pub fn memory_panel() -> QualityPanel<MemoryStore> {
    QualityPanel::new(Arc::new(MemoryStore::new()), PanelOptions::default())
}

pub async fn sqlite_panel() -> QualityPanel<SqliteStore> {
    let config = DatabaseConfig {
        url: "sqlite::memory:".into(),
        max_connections: 1,
    };
    let database = Database::connect(&config).await.unwrap();
    QualityPanel::new(Arc::new(database.store()), PanelOptions::default())
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn header(period: &Period) -> RecordHeader {
    RecordHeader::new(period.id, period.sector_id, Utc::now())
}

pub fn fall_risk(period: &Period, total: u32, high: u32) -> Indicator {
    Indicator::FallRisk(FallRiskAssessment {
        header: header(period),
        counts: RiskCounts {
            total_patients: total,
            assessed_on_admission: total,
            high,
            low: total - high,
            ..RiskCounts::default()
        },
    })
}

pub fn compliance(period: &Period, value: Decimal, patients: u32, notes: Option<&str>) -> Indicator {
    Indicator::Compliance(ComplianceIndicator {
        header: header(period),
        complete_wristband: value,
        patient_communication: value,
        medication_identified: value,
        hand_hygiene_adherence: value,
        fall_risk_assessment: value,
        pressure_injury_risk_assessment: value,
        total_patients: patients,
        observations: notes.map(str::to_owned),
    })
}

pub fn adverse_event(period: &Period, event_date: NaiveDate, description: &str) -> AdverseEvent {
    AdverseEvent {
        header: header(period),
        event_date,
        event_type: EventType::Fall,
        description: description.into(),
        quantity_cases: 1,
        quantity_notifications: 1,
    }
}

pub fn notification(period: &Period, category: &str, description: &str) -> Notification {
    Notification {
        header: header(period),
        classification_id: None,
        classification_text: Some("Patient identification".into()),
        professional_category_id: None,
        professional_category_text: Some(category.into()),
        description: description.into(),
        quantity: 1,
    }
}

/// Opens a period for `month` of 2024, runs `fill` against it and closes it.
pub async fn closed_month<S, F>(panel: &QualityPanel<S>, sector_id: Uuid, month: u32, fill: F) -> Period
where
    S: PanelStore,
    F: FnOnce(&Period) -> Vec<Indicator>,
{
    let period = panel
        .open_period(NewPeriod { sector_id, month, year: 2024 })
        .await
        .unwrap();
    let actor = Uuid::new_v4();
    for indicator in fill(&period) {
        panel.record_indicator(actor, indicator).await.unwrap();
    }
    panel.close_period(period.id).await.unwrap()
}
