use tracing::{debug, instrument};

use crate::core::periodicity::DateRange;
use crate::db::PeriodRepository;
use crate::error::Result;
use crate::models::period::{month_key_of, Period, SectorId};

/// Keeps the periods whose first day falls inside `range` with both bounds
/// truncated to their month, sorted ascending by (year, month).
pub fn select_periods(periods: Vec<Period>, range: &DateRange) -> Vec<Period> {
    let first = month_key_of(range.start);
    let last = month_key_of(range.end);

    let mut selected: Vec<Period> = periods
        .into_iter()
        .filter(|p| (first..=last).contains(&p.month_key()))
        .collect();
    selected.sort_by_key(Period::month_key);
    selected
}

#[instrument(skip(store), fields(sector_id = %sector_id, range = %range))]
pub async fn periods_in_range<S>(store: &S, sector_id: SectorId, range: &DateRange) -> Result<Vec<Period>>
where
    S: PeriodRepository + ?Sized,
{
    let periods = store.list_periods(sector_id).await?;
    let selected = select_periods(periods, range);
    debug!(count = selected.len(), "Periods selected");
    Ok(selected)
}
