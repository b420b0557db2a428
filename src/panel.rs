//! The quality panel service: period lifecycle, guarded writes and reports
//! over any [`PanelStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::config::ReportsConfig;
use crate::core::aggregate::{aggregate, AggregateOptions};
use crate::core::lifecycle::{self, ensure_open, Transition};
use crate::core::periodicity::{resolve, DateRange, PeriodicityQuery};
use crate::core::selector::periods_in_range;
use crate::core::snapshot::build_snapshot;
use crate::db::{PanelStore, PeriodWrite};
use crate::error::{PanelError, Result};
use crate::models::{
    AdverseEvent, CumulativeReport, EventType, Indicator, NewPeriod, Notification,
    NotificationFilter, Period, PeriodId, PeriodReport, PeriodStatus, RecordHeader, SectorId,
    UserId,
};

#[derive(Debug, Clone)]
pub struct PanelOptions {
    /// Upper bound on snapshot builds running at once for one report.
    pub max_concurrent_builds: usize,
    pub aggregate: AggregateOptions,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            max_concurrent_builds: 4,
            aggregate: AggregateOptions::default(),
        }
    }
}

impl From<&ReportsConfig> for PanelOptions {
    fn from(config: &ReportsConfig) -> Self {
        Self {
            max_concurrent_builds: config.max_concurrent_builds,
            aggregate: AggregateOptions {
                observation_separator: config.observation_separator.clone(),
            },
        }
    }
}

/// A cumulative report request: the sector plus the periodicity to resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CumulativeRequest {
    pub sector_id: SectorId,
    #[serde(flatten)]
    pub query: PeriodicityQuery,
}

pub struct QualityPanel<S> {
    store: Arc<S>,
    options: PanelOptions,
}

impl<S: PanelStore> QualityPanel<S> {
    pub fn new(store: Arc<S>, options: PanelOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn load(&self, period_id: PeriodId) -> Result<Period> {
        self.store
            .get_period(period_id)
            .await?
            .ok_or_else(|| PanelError::period_not_found(period_id))
    }

    // ===== Lifecycle =====

    #[instrument(skip(self, request), fields(sector_id = %request.sector_id, month = request.month, year = request.year))]
    pub async fn open_period(&self, request: NewPeriod) -> Result<Period> {
        let period = Period::open(&request, Utc::now())?;

        if let Some(open) = self.store.find_open_period(request.sector_id).await? {
            warn!(open_period = %open.id, "Sector already has an open period");
            return Err(PanelError::business_rule(format!(
                "sector {} already has an open period ({:02}/{})",
                request.sector_id, open.month, open.year
            )));
        }
        if self
            .store
            .period_exists(request.sector_id, request.month, request.year)
            .await?
        {
            warn!("Period already exists");
            return Err(PanelError::business_rule(format!(
                "sector {} already has a period for {:02}/{}",
                request.sector_id, request.month, request.year
            )));
        }

        self.store.insert_period(&period).await?;
        info!(period_id = %period.id, "Period opened");
        Ok(period)
    }

    /// Persists an applied transition, guarding against a concurrent one.
    async fn commit(&self, current: Period, transition: Transition, action: &'static str) -> Result<Period> {
        let next = match transition {
            Transition::Unchanged => {
                debug!(status = %current.status, "Period already {}", current.status);
                return Ok(current);
            }
            Transition::Applied(next) => next,
        };

        if !self.store.update_period(&next, current.status).await? {
            warn!(action, "Period status changed concurrently");
            return Err(PanelError::business_rule(format!(
                "period {} changed status while trying to {} it",
                current.id, action
            )));
        }
        info!(from = %current.status, to = %next.status, "Period transitioned");
        Ok(next)
    }

    async fn transition(
        &self,
        period_id: PeriodId,
        action: &'static str,
        step: fn(&Period, DateTime<Utc>) -> Result<Transition>,
    ) -> Result<Period> {
        let period = self.load(period_id).await?;
        let transition = step(&period, Utc::now()).map_err(|e| {
            warn!(error = %e, "Transition refused");
            e
        })?;
        self.commit(period, transition, action).await
    }

    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn close_period(&self, period_id: PeriodId) -> Result<Period> {
        self.transition(period_id, "close", lifecycle::close).await
    }

    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn validate_period(&self, period_id: PeriodId) -> Result<Period> {
        self.transition(period_id, "validate", lifecycle::validate).await
    }

    /// Reopens a CLOSED period, provided no other period of its sector is
    /// OPEN.
    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn reopen_period(&self, period_id: PeriodId) -> Result<Period> {
        let period = self.load(period_id).await?;
        let transition = lifecycle::reopen(&period, Utc::now())?;

        if transition.is_applied() {
            if let Some(open) = self.store.find_open_period(period.sector_id).await? {
                if open.id != period.id {
                    warn!(open_period = %open.id, "Another period is open");
                    return Err(PanelError::business_rule(format!(
                        "sector {} already has an open period ({:02}/{}); close it before reopening",
                        period.sector_id, open.month, open.year
                    )));
                }
            }
        }

        self.commit(period, transition, "reopen").await
    }

    /// Fails unless the period exists and is OPEN.
    pub async fn assert_open(&self, period_id: PeriodId) -> Result<()> {
        let status = self.store.get_period(period_id).await?.map(|p| p.status);
        ensure_open(period_id, status)
    }

    pub async fn list_periods(&self, sector_id: SectorId) -> Result<Vec<Period>> {
        self.store.list_periods(sector_id).await
    }

    /// Periods of a sector with the given status and year, newest first.
    pub async fn search_periods(
        &self,
        sector_id: SectorId,
        status: Option<PeriodStatus>,
        year: Option<i32>,
    ) -> Result<Vec<Period>> {
        self.store.search_periods(sector_id, status, year).await
    }

    // ===== Guarded writes =====

    /// Early rejection before any read-modify-write. The store repeats the
    /// status check atomically with the write.
    async fn writable(&self, header: &RecordHeader) -> Result<Period> {
        let period = self.load(header.period_id).await?;
        if period.sector_id != header.sector_id {
            return Err(PanelError::validation(format!(
                "record sector {} does not match sector {} of period {}",
                header.sector_id, period.sector_id, period.id
            )));
        }
        ensure_open(period.id, Some(period.status))?;
        Ok(period)
    }

    async fn apply(&self, write: PeriodWrite) -> Result<()> {
        self.store.apply(write).await.map_err(log_rejection)
    }

    /// Inserts or revises the period's indicator of this kind. A revision
    /// keeps the stored id, author and creation time.
    #[instrument(skip(self, indicator), fields(actor = %actor, period_id = %indicator.header().period_id, kind = %indicator.kind()))]
    pub async fn record_indicator(&self, actor: UserId, indicator: Indicator) -> Result<Indicator> {
        indicator.validate()?;
        let period = self.writable(indicator.header()).await.map_err(log_rejection)?;

        let existing = self.store.get_indicator(period.id, indicator.kind()).await?;
        let stamped = indicator.map_header(|h| stamp(h, existing.as_ref().map(|e| e.header()), actor));

        self.apply(PeriodWrite::PutIndicator(stamped.clone())).await?;
        info!("Indicator recorded");
        Ok(stamped)
    }

    #[instrument(skip(self, event), fields(actor = %actor, period_id = %event.header.period_id, event_type = %event.event_type))]
    pub async fn record_adverse_event(&self, actor: UserId, mut event: AdverseEvent) -> Result<AdverseEvent> {
        event.validate()?;
        self.writable(&event.header).await.map_err(log_rejection)?;

        let existing = self.store.get_adverse_event(event.header.id).await?;
        event.header = stamp(event.header, existing.as_ref().map(|e| &e.header), actor);
        self.apply(PeriodWrite::PutAdverseEvent(event.clone())).await?;
        info!(event_id = %event.header.id, "Adverse event recorded");
        Ok(event)
    }

    #[instrument(skip(self), fields(period_id = %period_id, event_id = %id))]
    pub async fn remove_adverse_event(&self, period_id: PeriodId, id: Uuid) -> Result<()> {
        self.apply(PeriodWrite::DeleteAdverseEvent { period_id, id }).await?;
        info!("Adverse event removed");
        Ok(())
    }

    #[instrument(skip(self, notification), fields(actor = %actor, period_id = %notification.header.period_id))]
    pub async fn record_notification(&self, actor: UserId, mut notification: Notification) -> Result<Notification> {
        notification.validate()?;
        self.writable(&notification.header).await.map_err(log_rejection)?;

        let existing = self.store.get_notification(notification.header.id).await?;
        notification.header = stamp(notification.header, existing.as_ref().map(|n| &n.header), actor);
        self.apply(PeriodWrite::PutNotification(notification.clone())).await?;
        info!(notification_id = %notification.header.id, "Notification recorded");
        Ok(notification)
    }

    #[instrument(skip(self), fields(period_id = %period_id, notification_id = %id))]
    pub async fn remove_notification(&self, period_id: PeriodId, id: Uuid) -> Result<()> {
        self.apply(PeriodWrite::DeleteNotification { period_id, id }).await?;
        info!("Notification removed");
        Ok(())
    }

    // ===== Record reads =====

    /// A period's adverse events, optionally of one type, newest first.
    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn list_adverse_events(
        &self,
        period_id: PeriodId,
        event_type: Option<EventType>,
    ) -> Result<Vec<AdverseEvent>> {
        let period = self.load(period_id).await?;
        let mut events = self.store.list_adverse_events(period.id, period.sector_id).await?;
        events.retain(|e| event_type.is_none() || event_type == Some(e.event_type));
        events.reverse();
        Ok(events)
    }

    /// A period's notifications matching `filter`, newest first.
    #[instrument(skip(self, filter), fields(period_id = %period_id))]
    pub async fn list_notifications(
        &self,
        period_id: PeriodId,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let period = self.load(period_id).await?;
        let mut notifications = self.store.list_notifications(period.id, period.sector_id).await?;
        notifications.retain(|n| filter.matches(n));
        notifications.reverse();
        Ok(notifications)
    }

    /// Adverse events of a sector dated inside `range`, whatever their
    /// period, oldest first.
    pub async fn adverse_events_between(&self, sector_id: SectorId, range: DateRange) -> Result<Vec<AdverseEvent>> {
        self.store.adverse_events_between(sector_id, range).await
    }

    /// Notifications of a sector created inside `range`, oldest first.
    pub async fn notifications_between(&self, sector_id: SectorId, range: DateRange) -> Result<Vec<Notification>> {
        self.store.notifications_between(sector_id, range).await
    }

    // ===== Reports =====

    /// Everything recorded for one period. `event_window` narrows the
    /// adverse events to those dated inside it.
    #[instrument(skip(self), fields(period_id = %period_id))]
    pub async fn snapshot_report(
        &self,
        period_id: PeriodId,
        event_window: Option<DateRange>,
    ) -> Result<PeriodReport> {
        let period = self.load(period_id).await?;
        let report = build_snapshot(self.store.as_ref(), &period, event_window.as_ref()).await?;
        Ok(PeriodReport {
            period: period.summary(),
            report,
        })
    }

    /// One snapshot per period of the sector inside `range`, ascending.
    #[instrument(skip(self, cancel), fields(sector_id = %sector_id, range = %range))]
    pub async fn reports_by_range(
        &self,
        sector_id: SectorId,
        range: DateRange,
        cancel: &CancelSignal,
    ) -> Result<Vec<PeriodReport>> {
        let periods = periods_in_range(self.store.as_ref(), sector_id, &range).await?;
        self.build_snapshots(periods, cancel).await
    }

    /// Builds snapshots concurrently, bounded by `max_concurrent_builds`,
    /// yielding them in the order of `periods`.
    async fn build_snapshots(&self, periods: Vec<Period>, cancel: &CancelSignal) -> Result<Vec<PeriodReport>> {
        let store = self.store.as_ref();
        let count = periods.len();
        let builds = stream::iter(periods)
            .map(|period| async move {
                let report = build_snapshot(store, &period, None).await?;
                Ok::<_, PanelError>(PeriodReport {
                    period: period.summary(),
                    report,
                })
            })
            .buffered(self.options.max_concurrent_builds.max(1))
            .try_collect::<Vec<_>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(periods = count, "Report build cancelled");
                Err(PanelError::Cancelled)
            }
            built = builds => built,
        }
    }

    /// Resolves the periodicity, selects the periods in range, snapshots
    /// each and folds them into one report.
    #[instrument(skip(self, request, cancel), fields(sector_id = %request.sector_id, periodicity = %request.query.periodicity))]
    pub async fn cumulative_report(
        &self,
        request: CumulativeRequest,
        cancel: &CancelSignal,
    ) -> Result<CumulativeReport> {
        let range = resolve(&request.query, Utc::now().date_naive())?;
        let snapshots = self.reports_by_range(request.sector_id, range, cancel).await?;

        let (periods, reports): (Vec<_>, Vec<_>) = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.period, snapshot.report))
            .unzip();
        let report = aggregate(&reports, &self.options.aggregate)?;
        info!(range = %range, periods = periods.len(), "Cumulative report built");

        Ok(CumulativeReport {
            sector_id: request.sector_id,
            periodicity: request.query.periodicity,
            range,
            periods,
            report,
        })
    }
}

/// A revision keeps the stored id, author and creation time. A new record
/// is authored by `actor` now.
fn stamp(header: RecordHeader, existing: Option<&RecordHeader>, actor: UserId) -> RecordHeader {
    let now = Utc::now();
    match existing {
        Some(existing) => header.revising(existing, now),
        None => RecordHeader {
            created_by: Some(actor),
            created_at: now,
            updated_at: now,
            ..header
        },
    }
}

fn log_rejection(err: PanelError) -> PanelError {
    match &err {
        PanelError::ClosedPeriod(id) => warn!(period_id = %id, "Write rejected: period is not open"),
        PanelError::NotFound { .. } | PanelError::Validation(_) => warn!(error = %err, "Write rejected"),
        _ => {}
    }
    err
}
