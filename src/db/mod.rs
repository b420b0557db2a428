//! Data-access layer for periods and period-scoped records.
//!
//! Two backends implement the repository traits: [`SqliteStore`] for real
//! deployments and [`MemoryStore`] for tests and embedding.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::core::periodicity::DateRange;
use crate::error::Result;
use crate::models::{
    AdverseEvent, Indicator, IndicatorKind, Notification, Period, PeriodId, PeriodStatus,
    SectorId,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeriodRepository: Send + Sync {
    async fn get_period(&self, id: PeriodId) -> Result<Option<Period>>;

    /// All periods of a sector, ascending by (year, month).
    async fn list_periods(&self, sector_id: SectorId) -> Result<Vec<Period>>;

    /// Periods of a sector narrowed by status and year, newest first.
    async fn search_periods(
        &self,
        sector_id: SectorId,
        status: Option<PeriodStatus>,
        year: Option<i32>,
    ) -> Result<Vec<Period>>;

    async fn find_open_period(&self, sector_id: SectorId) -> Result<Option<Period>>;

    async fn period_exists(&self, sector_id: SectorId, month: u32, year: i32) -> Result<bool>;

    /// Fails with `BusinessRule` when the sector already has an OPEN period
    /// or a period for the same month and year.
    async fn insert_period(&self, period: &Period) -> Result<()>;

    /// Stores `period` only if the stored status is still `from`. Returns
    /// `false` when another writer changed the status first.
    async fn update_period(&self, period: &Period, from: PeriodStatus) -> Result<bool>;
}

/// A mutation of period-scoped data. Every variant is guarded: it is applied
/// only while its period is OPEN.
#[derive(Debug, Clone, PartialEq)]
pub enum PeriodWrite {
    /// Insert or replace the period's indicator of this kind.
    PutIndicator(Indicator),
    PutAdverseEvent(AdverseEvent),
    DeleteAdverseEvent { period_id: PeriodId, id: Uuid },
    PutNotification(Notification),
    DeleteNotification { period_id: PeriodId, id: Uuid },
}

impl PeriodWrite {
    pub fn period_id(&self) -> PeriodId {
        match self {
            PeriodWrite::PutIndicator(indicator) => indicator.header().period_id,
            PeriodWrite::PutAdverseEvent(event) => event.header.period_id,
            PeriodWrite::PutNotification(notification) => notification.header.period_id,
            PeriodWrite::DeleteAdverseEvent { period_id, .. }
            | PeriodWrite::DeleteNotification { period_id, .. } => *period_id,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            PeriodWrite::PutIndicator(_) => "put indicator",
            PeriodWrite::PutAdverseEvent(_) => "put adverse event",
            PeriodWrite::DeleteAdverseEvent { .. } => "delete adverse event",
            PeriodWrite::PutNotification(_) => "put notification",
            PeriodWrite::DeleteNotification { .. } => "delete notification",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndicatorRepository: Send + Sync {
    async fn get_indicator(&self, period_id: PeriodId, kind: IndicatorKind)
        -> Result<Option<Indicator>>;

    async fn get_adverse_event(&self, id: Uuid) -> Result<Option<AdverseEvent>>;

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Ordered by event date, then creation time.
    async fn list_adverse_events(
        &self,
        period_id: PeriodId,
        sector_id: SectorId,
    ) -> Result<Vec<AdverseEvent>>;

    /// Ordered by creation time.
    async fn list_notifications(
        &self,
        period_id: PeriodId,
        sector_id: SectorId,
    ) -> Result<Vec<Notification>>;

    /// A sector's adverse events dated inside `range`, across periods.
    /// Ordered by event date, then creation time.
    async fn adverse_events_between(
        &self,
        sector_id: SectorId,
        range: DateRange,
    ) -> Result<Vec<AdverseEvent>>;

    /// A sector's notifications created on a day inside `range`, across
    /// periods. Ordered by creation time.
    async fn notifications_between(
        &self,
        sector_id: SectorId,
        range: DateRange,
    ) -> Result<Vec<Notification>>;

    /// Applies `write` atomically with the check that its period is OPEN.
    /// Fails with `NotFound` for a missing period and `ClosedPeriod` for one
    /// that is not OPEN.
    async fn apply(&self, write: PeriodWrite) -> Result<()>;
}

/// Everything the panel needs from a backend.
pub trait PanelStore: PeriodRepository + IndicatorRepository {}

impl<T: PeriodRepository + IndicatorRepository> PanelStore for T {}

/// SQLite connection pool with the panel schema in place.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        SqliteStore::initialize_schema(&pool).await?;
        info!(url = %config.url, "Database ready");

        Ok(Self { pool })
    }

    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(self.pool.clone())
    }
}
