/// Table construction for fetched forecasts.
///
/// Submodules:
/// - `series` — parses one raw payload into a typed `ForecastSeries`.
/// - `table` — merges series into a `MergedTable`, plus CSV export.

pub mod series;
pub mod table;
