//! Quality Panel
//!
//! Command-line entry point over the SQLite-backed panel.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use quality_panel::core::periodicity::{DateRange, Periodicity, PeriodicityQuery};
use quality_panel::db::{Database, SqliteStore};
use quality_panel::models::{NewPeriod, PeriodStatus};
use quality_panel::{cancel_pair, config, telemetry, CumulativeRequest, PanelOptions, QualityPanel};

#[derive(Parser)]
#[command(name = "quality-panel", about = "Hospital quality indicator periods and panel reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Overrides `database.url` from configuration
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new reporting period for a sector
    OpenPeriod {
        sector_id: Uuid,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
    },
    ClosePeriod { period_id: Uuid },
    ValidatePeriod { period_id: Uuid },
    ReopenPeriod { period_id: Uuid },
    /// List a sector's periods, oldest first, or newest first when filtered
    Periods {
        sector_id: Uuid,
        /// OPEN, CLOSED or VALIDATED
        #[arg(long)]
        status: Option<PeriodStatus>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Print the full report of one period
    Snapshot {
        period_id: Uuid,
        /// Only adverse events dated on or after this day
        #[arg(long, requires = "events_to")]
        events_from: Option<NaiveDate>,
        #[arg(long, requires = "events_from")]
        events_to: Option<NaiveDate>,
    },
    /// Print the cumulative report of a sector over a periodicity
    Report {
        sector_id: Uuid,
        #[arg(long, default_value = "monthly")]
        periodicity: Periodicity,
        #[arg(long)]
        year: Option<i32>,
        /// Month, quarter or semester number
        #[arg(long)]
        index: Option<u32>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = config::load_config().context("Failed to load configuration")?;
    telemetry::init(&config.logging).map_err(|e| anyhow::anyhow!(e))?;

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let database = Database::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    let panel: QualityPanel<SqliteStore> =
        QualityPanel::new(Arc::new(database.store()), PanelOptions::from(&config.reports));

    match cli.command {
        Commands::OpenPeriod { sector_id, month, year } => {
            let period = panel.open_period(NewPeriod { sector_id, month, year }).await?;
            print_json(&period)?;
        }
        Commands::ClosePeriod { period_id } => print_json(&panel.close_period(period_id).await?)?,
        Commands::ValidatePeriod { period_id } => print_json(&panel.validate_period(period_id).await?)?,
        Commands::ReopenPeriod { period_id } => print_json(&panel.reopen_period(period_id).await?)?,
        Commands::Periods { sector_id, status: None, year: None } => {
            print_json(&panel.list_periods(sector_id).await?)?
        }
        Commands::Periods { sector_id, status, year } => {
            print_json(&panel.search_periods(sector_id, status, year).await?)?
        }
        Commands::Snapshot { period_id, events_from, events_to } => {
            let window = match (events_from, events_to) {
                (Some(start), Some(end)) => Some(DateRange::new(start, end)?),
                _ => None,
            };
            print_json(&panel.snapshot_report(period_id, window).await?)?;
        }
        Commands::Report { sector_id, periodicity, year, index, start, end } => {
            let request = CumulativeRequest {
                sector_id,
                query: PeriodicityQuery { periodicity, year, index, start, end },
            };

            let (handle, signal) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling report");
                    handle.cancel();
                }
            });

            let report = panel.cumulative_report(request, &signal).await?;
            info!(periods = report.periods.len(), "Report ready");
            print_json(&report)?;
        }
    }

    Ok(())
}
