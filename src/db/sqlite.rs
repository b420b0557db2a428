use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::core::lifecycle::write_rejection;
use crate::core::periodicity::DateRange;
use crate::db::{IndicatorRepository, PeriodRepository, PeriodWrite};
use crate::error::{PanelError, Result};
use crate::models::{
    AdverseEvent, Indicator, IndicatorKind, Notification, Period, PeriodId, PeriodStatus,
    SectorId,
};

/// `sqlx` SQLite backend. Records are stored as JSON payloads next to the
/// columns they are looked up and ordered by.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS periods (
                id TEXT PRIMARY KEY,
                sector_id TEXT NOT NULL,
                month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
                year INTEGER NOT NULL CHECK (year >= 2000),
                status TEXT NOT NULL CHECK (status IN ('OPEN', 'CLOSED', 'VALIDATED')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (sector_id, month, year)
            )",
        )
        .execute(pool)
        .await?;

        // At most one OPEN period per sector
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS periods_one_open_per_sector
             ON periods (sector_id) WHERE status = 'OPEN'",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indicators (
                period_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (period_id, kind),
                FOREIGN KEY (period_id) REFERENCES periods(id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS adverse_events (
                id TEXT PRIMARY KEY,
                period_id TEXT NOT NULL,
                sector_id TEXT NOT NULL,
                event_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                FOREIGN KEY (period_id) REFERENCES periods(id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                period_id TEXT NOT NULL,
                sector_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                FOREIGN KEY (period_id) REFERENCES periods(id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS adverse_events_by_period
             ON adverse_events (period_id, sector_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS notifications_by_period
             ON notifications (period_id, sector_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Takes the write lock on an OPEN period inside `tx`, or reports why
    /// the period cannot be written.
    async fn lock_open_period(tx: &mut Transaction<'_, Sqlite>, period_id: PeriodId) -> Result<()> {
        let touched = sqlx::query("UPDATE periods SET status = status WHERE id = ? AND status = 'OPEN'")
            .bind(period_id.to_string())
            .execute(&mut **tx)
            .await?
            .rows_affected();
        if touched > 0 {
            return Ok(());
        }

        let status = sqlx::query_scalar::<_, String>("SELECT status FROM periods WHERE id = ?")
            .bind(period_id.to_string())
            .fetch_optional(&mut **tx)
            .await?
            .map(|s| s.parse::<PeriodStatus>())
            .transpose()?;
        Err(write_rejection(period_id, status))
    }

    async fn write_locked(tx: &mut Transaction<'_, Sqlite>, write: PeriodWrite) -> Result<()> {
        match write {
            PeriodWrite::PutIndicator(indicator) => {
                let header = indicator.header();
                sqlx::query(
                    "INSERT INTO indicators (period_id, kind, payload, updated_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT (period_id, kind)
                     DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                )
                .bind(header.period_id.to_string())
                .bind(indicator.kind().as_str())
                .bind(serde_json::to_string(&indicator)?)
                .bind(header.updated_at)
                .execute(&mut **tx)
                .await?;
            }
            PeriodWrite::PutAdverseEvent(event) => {
                let stored = sqlx::query(
                    "INSERT INTO adverse_events (id, period_id, sector_id, event_date, created_at, payload)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT (id)
                     DO UPDATE SET event_date = excluded.event_date, payload = excluded.payload
                     WHERE adverse_events.period_id = excluded.period_id",
                )
                .bind(event.header.id.to_string())
                .bind(event.header.period_id.to_string())
                .bind(event.header.sector_id.to_string())
                .bind(event.event_date)
                .bind(event.header.created_at)
                .bind(serde_json::to_string(&event)?)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                if stored == 0 {
                    return Err(PanelError::validation(format!(
                        "adverse event {} belongs to another period",
                        event.header.id
                    )));
                }
            }
            PeriodWrite::PutNotification(notification) => {
                let stored = sqlx::query(
                    "INSERT INTO notifications (id, period_id, sector_id, created_at, payload)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT (id)
                     DO UPDATE SET payload = excluded.payload
                     WHERE notifications.period_id = excluded.period_id",
                )
                .bind(notification.header.id.to_string())
                .bind(notification.header.period_id.to_string())
                .bind(notification.header.sector_id.to_string())
                .bind(notification.header.created_at)
                .bind(serde_json::to_string(&notification)?)
                .execute(&mut **tx)
                .await?
                .rows_affected();
                if stored == 0 {
                    return Err(PanelError::validation(format!(
                        "notification {} belongs to another period",
                        notification.header.id
                    )));
                }
            }
            PeriodWrite::DeleteAdverseEvent { period_id, id } => {
                let deleted = sqlx::query("DELETE FROM adverse_events WHERE id = ? AND period_id = ?")
                    .bind(id.to_string())
                    .bind(period_id.to_string())
                    .execute(&mut **tx)
                    .await?
                    .rows_affected();
                if deleted == 0 {
                    return Err(PanelError::NotFound { entity: "adverse event", id });
                }
            }
            PeriodWrite::DeleteNotification { period_id, id } => {
                let deleted = sqlx::query("DELETE FROM notifications WHERE id = ? AND period_id = ?")
                    .bind(id.to_string())
                    .bind(period_id.to_string())
                    .execute(&mut **tx)
                    .await?
                    .rows_affected();
                if deleted == 0 {
                    return Err(PanelError::NotFound { entity: "notification", id });
                }
            }
        }
        Ok(())
    }
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| PanelError::Decode(format!("bad uuid {}: {}", text, e)))
}

fn period_from_row(row: &SqliteRow) -> Result<Period> {
    Ok(Period {
        id: parse_uuid(row.try_get("id")?)?,
        sector_id: parse_uuid(row.try_get("sector_id")?)?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payloads<T: serde::de::DeserializeOwned>(rows: Vec<SqliteRow>) -> Result<Vec<T>> {
    rows.iter()
        .map(|row| -> Result<T> {
            let payload: String = row.try_get("payload")?;
            Ok(serde_json::from_str(&payload)?)
        })
        .collect()
}

/// Maps a unique-constraint failure onto the business rule it enforces.
fn unique_violation(err: sqlx::Error, rule: impl FnOnce() -> String) -> PanelError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => PanelError::business_rule(rule()),
        _ => PanelError::Storage(err),
    }
}

const PERIOD_COLUMNS: &str = "id, sector_id, month, year, status, created_at, updated_at";

#[async_trait]
impl PeriodRepository for SqliteStore {
    #[instrument(skip(self), fields(period_id = %id))]
    async fn get_period(&self, id: PeriodId) -> Result<Option<Period>> {
        let row = sqlx::query(&format!("SELECT {} FROM periods WHERE id = ?", PERIOD_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(period_from_row).transpose()
    }

    #[instrument(skip(self), fields(sector_id = %sector_id))]
    async fn list_periods(&self, sector_id: SectorId) -> Result<Vec<Period>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM periods WHERE sector_id = ? ORDER BY year, month",
            PERIOD_COLUMNS
        ))
        .bind(sector_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(period_from_row).collect()
    }

    #[instrument(skip(self), fields(sector_id = %sector_id))]
    async fn search_periods(
        &self,
        sector_id: SectorId,
        status: Option<PeriodStatus>,
        year: Option<i32>,
    ) -> Result<Vec<Period>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(&format!(
            "SELECT {} FROM periods
             WHERE sector_id = ? AND (? IS NULL OR status = ?) AND (? IS NULL OR year = ?)
             ORDER BY year DESC, month DESC",
            PERIOD_COLUMNS
        ))
        .bind(sector_id.to_string())
        .bind(status)
        .bind(status)
        .bind(year)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(period_from_row).collect()
    }

    #[instrument(skip(self), fields(sector_id = %sector_id))]
    async fn find_open_period(&self, sector_id: SectorId) -> Result<Option<Period>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM periods WHERE sector_id = ? AND status = 'OPEN'",
            PERIOD_COLUMNS
        ))
        .bind(sector_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(period_from_row).transpose()
    }

    #[instrument(skip(self), fields(sector_id = %sector_id))]
    async fn period_exists(&self, sector_id: SectorId, month: u32, year: i32) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM periods WHERE sector_id = ? AND month = ? AND year = ?",
        )
        .bind(sector_id.to_string())
        .bind(month)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    #[instrument(skip(self, period), fields(period_id = %period.id, sector_id = %period.sector_id))]
    async fn insert_period(&self, period: &Period) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO periods ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            PERIOD_COLUMNS
        ))
        .bind(period.id.to_string())
        .bind(period.sector_id.to_string())
        .bind(period.month)
        .bind(period.year)
        .bind(period.status.as_str())
        .bind(period.created_at)
        .bind(period.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!(
                    "sector {} already has an open period or a period for {:02}/{}",
                    period.sector_id, period.month, period.year
                )
            })
        })?;
        debug!("Period row inserted");
        Ok(())
    }

    #[instrument(skip(self, period), fields(period_id = %period.id, from = %from, to = %period.status))]
    async fn update_period(&self, period: &Period, from: PeriodStatus) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE periods SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(period.status.as_str())
        .bind(period.updated_at)
        .bind(period.id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("sector {} already has an open period", period.sector_id)
            })
        })?
        .rows_affected();
        if updated == 0 {
            warn!("Period status changed concurrently");
        }
        Ok(updated > 0)
    }
}

#[async_trait]
impl IndicatorRepository for SqliteStore {
    #[instrument(skip(self), fields(period_id = %period_id, kind = %kind))]
    async fn get_indicator(
        &self,
        period_id: PeriodId,
        kind: IndicatorKind,
    ) -> Result<Option<Indicator>> {
        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM indicators WHERE period_id = ? AND kind = ?",
        )
        .bind(period_id.to_string())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        payload
            .map(|p| serde_json::from_str::<Indicator>(&p).map_err(PanelError::from))
            .transpose()
    }

    #[instrument(skip(self), fields(event_id = %id))]
    async fn get_adverse_event(&self, id: Uuid) -> Result<Option<AdverseEvent>> {
        let rows = sqlx::query("SELECT payload FROM adverse_events WHERE id = ?")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(payloads(rows)?.into_iter().next())
    }

    #[instrument(skip(self), fields(notification_id = %id))]
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        let rows = sqlx::query("SELECT payload FROM notifications WHERE id = ?")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(payloads(rows)?.into_iter().next())
    }

    #[instrument(skip(self), fields(period_id = %period_id, sector_id = %sector_id))]
    async fn list_adverse_events(
        &self,
        period_id: PeriodId,
        sector_id: SectorId,
    ) -> Result<Vec<AdverseEvent>> {
        let rows = sqlx::query(
            "SELECT payload FROM adverse_events WHERE period_id = ? AND sector_id = ?",
        )
        .bind(period_id.to_string())
        .bind(sector_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let mut events: Vec<AdverseEvent> = payloads(rows)?;
        events.sort_by_key(|e| (e.event_date, e.header.created_at));
        Ok(events)
    }

    #[instrument(skip(self), fields(period_id = %period_id, sector_id = %sector_id))]
    async fn list_notifications(
        &self,
        period_id: PeriodId,
        sector_id: SectorId,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT payload FROM notifications WHERE period_id = ? AND sector_id = ?",
        )
        .bind(period_id.to_string())
        .bind(sector_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let mut notifications: Vec<Notification> = payloads(rows)?;
        notifications.sort_by_key(|n| n.header.created_at);
        Ok(notifications)
    }

    #[instrument(skip(self), fields(sector_id = %sector_id, range = %range))]
    async fn adverse_events_between(
        &self,
        sector_id: SectorId,
        range: DateRange,
    ) -> Result<Vec<AdverseEvent>> {
        let rows = sqlx::query(
            "SELECT payload FROM adverse_events
             WHERE sector_id = ? AND event_date BETWEEN ? AND ?",
        )
        .bind(sector_id.to_string())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;
        let mut events: Vec<AdverseEvent> = payloads(rows)?;
        events.sort_by_key(|e| (e.event_date, e.header.created_at));
        Ok(events)
    }

    // created_at is stored as RFC 3339 text; the day is compared after decoding.
    #[instrument(skip(self), fields(sector_id = %sector_id, range = %range))]
    async fn notifications_between(
        &self,
        sector_id: SectorId,
        range: DateRange,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query("SELECT payload FROM notifications WHERE sector_id = ?")
            .bind(sector_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let mut notifications: Vec<Notification> = payloads::<Notification>(rows)?
            .into_iter()
            .filter(|n| range.contains(n.header.created_at.date_naive()))
            .collect();
        notifications.sort_by_key(|n| n.header.created_at);
        Ok(notifications)
    }

    #[instrument(skip(self, write), fields(period_id = %write.period_id(), write = write.describe()))]
    async fn apply(&self, write: PeriodWrite) -> Result<()> {
        let period_id = write.period_id();
        let mut tx = self.pool.begin().await?;

        if let Err(rejection) = Self::lock_open_period(&mut tx, period_id).await {
            tx.rollback().await?;
            return Err(rejection);
        }
        if let Err(failure) = Self::write_locked(&mut tx, write).await {
            tx.rollback().await?;
            return Err(failure);
        }

        tx.commit().await?;
        Ok(())
    }
}
