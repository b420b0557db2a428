use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::core::lifecycle::ensure_open;
use crate::core::periodicity::DateRange;
use crate::db::{IndicatorRepository, PeriodRepository, PeriodWrite};
use crate::error::{PanelError, Result};
use crate::models::{
    AdverseEvent, Indicator, IndicatorKind, Notification, Period, PeriodId, PeriodStatus,
    SectorId,
};

/// In-process store on `DashMap`s.
///
/// There are no transactions here, so guarded writes hold a per-period
/// mutex across the status check and the write, and status changes take the
/// same mutex. Period inserts and status changes are additionally serialised
/// store-wide so the one-open-period rule cannot race.
#[derive(Default)]
pub struct MemoryStore {
    periods: DashMap<PeriodId, Period>,
    period_changes: Mutex<()>,
    write_locks: DashMap<PeriodId, Arc<Mutex<()>>>,
    indicators: DashMap<(PeriodId, IndicatorKind), Indicator>,
    adverse_events: DashMap<Uuid, AdverseEvent>,
    notifications: DashMap<Uuid, Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_lock(&self, period_id: PeriodId) -> Arc<Mutex<()>> {
        self.write_locks.entry(period_id).or_default().clone()
    }

    fn open_period_of(&self, sector_id: SectorId, except: Option<PeriodId>) -> Option<PeriodId> {
        self.periods
            .iter()
            .find(|p| p.sector_id == sector_id && p.is_open() && Some(p.id) != except)
            .map(|p| p.id)
    }

    fn write_unlocked(&self, write: PeriodWrite) -> Result<()> {
        match write {
            PeriodWrite::PutIndicator(indicator) => {
                let key = (indicator.header().period_id, indicator.kind());
                self.indicators.insert(key, indicator);
            }
            PeriodWrite::PutAdverseEvent(event) => {
                let id = event.header.id;
                if let Some(existing) = self.adverse_events.get(&id) {
                    if existing.header.period_id != event.header.period_id {
                        return Err(PanelError::validation(format!(
                            "adverse event {} belongs to another period",
                            id
                        )));
                    }
                }
                self.adverse_events.insert(id, event);
            }
            PeriodWrite::PutNotification(notification) => {
                let id = notification.header.id;
                if let Some(existing) = self.notifications.get(&id) {
                    if existing.header.period_id != notification.header.period_id {
                        return Err(PanelError::validation(format!(
                            "notification {} belongs to another period",
                            id
                        )));
                    }
                }
                self.notifications.insert(id, notification);
            }
            PeriodWrite::DeleteAdverseEvent { period_id, id } => {
                self.adverse_events
                    .remove_if(&id, |_, e| e.header.period_id == period_id)
                    .ok_or(PanelError::NotFound { entity: "adverse event", id })?;
            }
            PeriodWrite::DeleteNotification { period_id, id } => {
                self.notifications
                    .remove_if(&id, |_, n| n.header.period_id == period_id)
                    .ok_or(PanelError::NotFound { entity: "notification", id })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeriodRepository for MemoryStore {
    async fn get_period(&self, id: PeriodId) -> Result<Option<Period>> {
        Ok(self.periods.get(&id).map(|p| p.clone()))
    }

    async fn list_periods(&self, sector_id: SectorId) -> Result<Vec<Period>> {
        let mut periods: Vec<Period> = self
            .periods
            .iter()
            .filter(|p| p.sector_id == sector_id)
            .map(|p| p.clone())
            .collect();
        periods.sort_by_key(Period::month_key);
        Ok(periods)
    }

    async fn search_periods(
        &self,
        sector_id: SectorId,
        status: Option<PeriodStatus>,
        year: Option<i32>,
    ) -> Result<Vec<Period>> {
        let mut periods: Vec<Period> = self
            .periods
            .iter()
            .filter(|p| p.sector_id == sector_id)
            .filter(|p| status.is_none() || status == Some(p.status))
            .filter(|p| year.is_none() || year == Some(p.year))
            .map(|p| p.clone())
            .collect();
        periods.sort_by_key(|p| std::cmp::Reverse(p.month_key()));
        Ok(periods)
    }

    async fn find_open_period(&self, sector_id: SectorId) -> Result<Option<Period>> {
        Ok(self
            .open_period_of(sector_id, None)
            .and_then(|id| self.periods.get(&id).map(|p| p.clone())))
    }

    async fn period_exists(&self, sector_id: SectorId, month: u32, year: i32) -> Result<bool> {
        Ok(self
            .periods
            .iter()
            .any(|p| p.sector_id == sector_id && p.month == month && p.year == year))
    }

    #[instrument(skip(self, period), fields(period_id = %period.id, sector_id = %period.sector_id))]
    async fn insert_period(&self, period: &Period) -> Result<()> {
        let _changes = self.period_changes.lock().await;

        if period.is_open() && self.open_period_of(period.sector_id, None).is_some() {
            return Err(PanelError::business_rule(format!(
                "sector {} already has an open period",
                period.sector_id
            )));
        }
        if self.period_exists(period.sector_id, period.month, period.year).await? {
            return Err(PanelError::business_rule(format!(
                "sector {} already has a period for {:02}/{}",
                period.sector_id, period.month, period.year
            )));
        }

        self.periods.insert(period.id, period.clone());
        debug!("Period inserted");
        Ok(())
    }

    #[instrument(skip(self, period), fields(period_id = %period.id, from = %from, to = %period.status))]
    async fn update_period(&self, period: &Period, from: PeriodStatus) -> Result<bool> {
        let _changes = self.period_changes.lock().await;
        let lock = self.write_lock(period.id);
        let _writes = lock.lock().await;

        let current = self.periods.get(&period.id).map(|p| p.status);
        if current != Some(from) {
            return Ok(false);
        }
        if period.is_open() && self.open_period_of(period.sector_id, Some(period.id)).is_some() {
            return Err(PanelError::business_rule(format!(
                "sector {} already has an open period",
                period.sector_id
            )));
        }

        self.periods.insert(period.id, period.clone());
        Ok(true)
    }
}

#[async_trait]
impl IndicatorRepository for MemoryStore {
    async fn get_indicator(
        &self,
        period_id: PeriodId,
        kind: IndicatorKind,
    ) -> Result<Option<Indicator>> {
        Ok(self.indicators.get(&(period_id, kind)).map(|i| i.clone()))
    }

    async fn get_adverse_event(&self, id: Uuid) -> Result<Option<AdverseEvent>> {
        Ok(self.adverse_events.get(&id).map(|e| e.clone()))
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.get(&id).map(|n| n.clone()))
    }

    async fn list_adverse_events(
        &self,
        period_id: PeriodId,
        sector_id: SectorId,
    ) -> Result<Vec<AdverseEvent>> {
        let mut events: Vec<AdverseEvent> = self
            .adverse_events
            .iter()
            .filter(|e| e.header.period_id == period_id && e.header.sector_id == sector_id)
            .map(|e| e.clone())
            .collect();
        events.sort_by_key(|e| (e.event_date, e.header.created_at));
        Ok(events)
    }

    async fn list_notifications(
        &self,
        period_id: PeriodId,
        sector_id: SectorId,
    ) -> Result<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.header.period_id == period_id && n.header.sector_id == sector_id)
            .map(|n| n.clone())
            .collect();
        notifications.sort_by_key(|n| n.header.created_at);
        Ok(notifications)
    }

    async fn adverse_events_between(
        &self,
        sector_id: SectorId,
        range: DateRange,
    ) -> Result<Vec<AdverseEvent>> {
        let mut events: Vec<AdverseEvent> = self
            .adverse_events
            .iter()
            .filter(|e| e.header.sector_id == sector_id && range.contains(e.event_date))
            .map(|e| e.clone())
            .collect();
        events.sort_by_key(|e| (e.event_date, e.header.created_at));
        Ok(events)
    }

    async fn notifications_between(
        &self,
        sector_id: SectorId,
        range: DateRange,
    ) -> Result<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.header.sector_id == sector_id && range.contains(n.header.created_at.date_naive()))
            .map(|n| n.clone())
            .collect();
        notifications.sort_by_key(|n| n.header.created_at);
        Ok(notifications)
    }

    #[instrument(skip(self, write), fields(period_id = %write.period_id(), write = write.describe()))]
    async fn apply(&self, write: PeriodWrite) -> Result<()> {
        let period_id = write.period_id();
        let lock = self.write_lock(period_id);
        let _guard = lock.lock().await;

        let status = self.periods.get(&period_id).map(|p| p.status);
        ensure_open(period_id, status)?;
        self.write_unlocked(write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::indicator::{HandHygieneAssessment, RecordHeader};
    use crate::models::NewPeriod;
    use chrono::Utc;

    fn period(sector_id: SectorId, month: u32) -> Period {
        Period::open(&NewPeriod { sector_id, month, year: 2024 }, Utc::now()).unwrap()
    }

    fn hygiene(period: &Period, compliant: u32) -> PeriodWrite {
        PeriodWrite::PutIndicator(Indicator::HandHygiene(HandHygieneAssessment {
            header: RecordHeader::new(period.id, period.sector_id, Utc::now()),
            total_observations: 10,
            compliant_observations: compliant,
        }))
    }

    #[tokio::test]
    async fn duplicate_month_is_a_business_rule() {
        let store = MemoryStore::new();
        let sector = Uuid::new_v4();
        let mut january = period(sector, 1);
        store.insert_period(&january).await.unwrap();
        january.status = PeriodStatus::Closed;
        store.update_period(&january, PeriodStatus::Open).await.unwrap();

        let again = period(sector, 1);
        assert!(matches!(
            store.insert_period(&again).await,
            Err(PanelError::BusinessRule(_))
        ));
    }

    #[tokio::test]
    async fn second_open_period_is_refused_on_reopen() {
        let store = MemoryStore::new();
        let sector = Uuid::new_v4();
        let mut january = period(sector, 1);
        store.insert_period(&january).await.unwrap();
        january.status = PeriodStatus::Closed;
        store.update_period(&january, PeriodStatus::Open).await.unwrap();
        store.insert_period(&period(sector, 2)).await.unwrap();

        january.status = PeriodStatus::Open;
        let err = store.update_period(&january, PeriodStatus::Closed).await.unwrap_err();
        assert!(matches!(err, PanelError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn upsert_replaces_the_indicator_of_a_kind() {
        let store = MemoryStore::new();
        let open = period(Uuid::new_v4(), 4);
        store.insert_period(&open).await.unwrap();

        store.apply(hygiene(&open, 4)).await.unwrap();
        store.apply(hygiene(&open, 9)).await.unwrap();

        match store.get_indicator(open.id, IndicatorKind::HandHygiene).await.unwrap() {
            Some(Indicator::HandHygiene(h)) => assert_eq!(h.compliant_observations, 9),
            other => panic!("unexpected indicator: {:?}", other),
        }
    }

    #[tokio::test]
    async fn concurrent_writes_and_close_never_land_after_close() {
        let store = Arc::new(MemoryStore::new());
        let open = period(Uuid::new_v4(), 9);
        store.insert_period(&open).await.unwrap();

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let write = hygiene(&open, i % 10);
                tokio::spawn(async move { store.apply(write).await })
            })
            .collect();

        let mut closed = open.clone();
        closed.status = PeriodStatus::Closed;
        assert!(store.update_period(&closed, PeriodStatus::Open).await.unwrap());

        for writer in writers {
            match writer.await.unwrap() {
                Ok(()) | Err(PanelError::ClosedPeriod(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert!(matches!(
            store.apply(hygiene(&open, 1)).await,
            Err(PanelError::ClosedPeriod(_))
        ));
    }
}
