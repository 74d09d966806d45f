//! Forecast streamflow for a station from the National Water Model.
//!
//! Short, medium and long range forecasts are fetched per series (a single
//! deterministic trace, or an ensemble mean plus numbered members) and
//! normalized into one time-indexed table with a column per series.
//!
//! Modules:
//! - `model` — ranges, series keys, the series cache and error types.
//! - `ingest` — URL construction, HTTP transport, cached fetching, fixtures.
//! - `analysis` — payload parsing and the outer-join table merge.
//! - `chart` — SVG line chart of a table.
//! - `request` — the public per-station request object.
//! - `config`, `logging` — service configuration and tracing helpers.

pub mod analysis;
pub mod chart;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod request;

pub use analysis::series::ForecastSeries;
pub use analysis::table::{Column, MergedTable};
pub use chart::{ChartRenderer, SvgLineChart};
pub use config::ServiceConfig;
pub use ingest::nwm::{ForecastFetcher, HttpFetcher, ReqwestFetcher};
pub use model::{
    EnsembleSelection, FetchError, ForecastError, Range, SeriesCache, SeriesKey, TablePolicy,
};
pub use request::{ForecastRequest, RequestOptions};
