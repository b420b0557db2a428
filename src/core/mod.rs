//! Pure engines behind the panel: percentages, lifecycle transitions,
//! periodicity resolution, period selection, snapshot assembly and
//! cumulative aggregation.

pub mod aggregate;
pub mod lifecycle;
pub mod percentage;
pub mod periodicity;
pub mod selector;
pub mod snapshot;
