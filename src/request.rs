//! Forecast requests: one station, one range, one memoized table.
//!
//! ```no_run
//! use nwm_forecast::{EnsembleSelection, ForecastRequest};
//!
//! let request = ForecastRequest::medium_range(22798751, true, EnsembleSelection::All, false)?;
//! let table = request.table()?;
//! println!("{}", table);
//! # Ok::<(), nwm_forecast::ForecastError>(())
//! ```

use std::cell::OnceCell;
use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use crate::analysis::table::MergedTable;
use crate::chart::{ChartRenderer, SvgLineChart};
use crate::config::ServiceConfig;
use crate::ingest::nwm::{ForecastFetcher, HttpFetcher, ReqwestFetcher};
use crate::logging::log_fetch_summary;
use crate::model::{EnsembleSelection, ForecastError, Range, SeriesCache, TablePolicy};

/// What to fetch for a request, beyond station and range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    /// Fetch the ensemble mean (medium and long range only).
    pub mean: bool,
    pub ensembles: EnsembleSelection,
    /// Read the bundled fixture instead of calling the service.
    pub offline: bool,
}

/// Forecast data for one station and range.
///
/// Construction validates the options and performs the initial fetch.
/// The merged table is computed on first use and then kept for the life
/// of the request; it is never invalidated, so series fetched after the
/// table was built do not appear in it.
#[derive(Debug)]
pub struct ForecastRequest {
    fetcher: ForecastFetcher,
    table: OnceCell<MergedTable>,
}

impl ForecastRequest {
    /// Short-range (deterministic) forecast.
    pub fn short_range(station_id: u64, offline: bool) -> Result<Self, ForecastError> {
        let options = RequestOptions {
            offline,
            ..RequestOptions::default()
        };
        Self::with_default_transport(station_id, Range::Short, options)
    }

    /// Medium-range ensemble forecast (members 1 through 7).
    pub fn medium_range(
        station_id: u64,
        mean: bool,
        ensembles: impl Into<EnsembleSelection>,
        offline: bool,
    ) -> Result<Self, ForecastError> {
        let options = RequestOptions {
            mean,
            ensembles: ensembles.into(),
            offline,
        };
        Self::with_default_transport(station_id, Range::Medium, options)
    }

    /// Long-range ensemble forecast (members 1 through 4).
    pub fn long_range(
        station_id: u64,
        mean: bool,
        ensembles: impl Into<EnsembleSelection>,
        offline: bool,
    ) -> Result<Self, ForecastError> {
        let options = RequestOptions {
            mean,
            ensembles: ensembles.into(),
            offline,
        };
        Self::with_default_transport(station_id, Range::Long, options)
    }

    fn with_default_transport(
        station_id: u64,
        range: Range,
        options: RequestOptions,
    ) -> Result<Self, ForecastError> {
        let config = ServiceConfig::default();
        let http = ReqwestFetcher::new(&config);
        Self::open(station_id, range, options, &config, Box::new(http))
    }

    /// Opens a request with an explicit configuration and transport.
    ///
    /// Offline requests take their series from the bundled fixture but
    /// otherwise fetch exactly what a live request would, so both produce
    /// tables of the same shape.
    ///
    /// # Errors
    /// - `ForecastError::Configuration` — the mean or an ensemble member
    ///   is requested on a range that does not publish it. Raised before
    ///   any network call.
    /// - `ForecastError::Fetch` — the initial fetch failed.
    pub fn open(
        station_id: u64,
        range: Range,
        options: RequestOptions,
        config: &ServiceConfig,
        http: Box<dyn HttpFetcher>,
    ) -> Result<Self, ForecastError> {
        if options.mean && !range.supports_mean() {
            return Err(ForecastError::Configuration(format!(
                "{} has no ensemble mean",
                range
            )));
        }
        let members = options.ensembles.resolve(range)?;

        let mut fetcher = ForecastFetcher::new(station_id, range, config, http);
        if options.offline {
            fetcher.fetch_example()?;
        }
        match range.table_policy() {
            TablePolicy::SingleSeries => {
                fetcher.fetch_point()?;
            }
            TablePolicy::OuterJoin => {
                if options.mean {
                    fetcher.fetch_mean()?;
                }
                for member in members {
                    fetcher.fetch_ensemble_member(member)?;
                }
            }
        }
        log_fetch_summary(station_id, range, fetcher.cache().len(), options.offline);

        Ok(Self {
            fetcher,
            table: OnceCell::new(),
        })
    }

    pub fn station_id(&self) -> u64 {
        self.fetcher.station_id()
    }

    pub fn range(&self) -> Range {
        self.fetcher.range()
    }

    /// Raw payloads fetched so far, keyed by series.
    pub fn data(&self) -> &SeriesCache {
        self.fetcher.cache()
    }

    /// URLs requested from the service, in order. Empty in offline mode.
    pub fn urls(&self) -> &[String] {
        self.fetcher.urls()
    }

    pub fn is_offline(&self) -> bool {
        self.fetcher.is_offline()
    }

    /// Fetches the ensemble mean on demand (cached per request).
    pub fn fetch_mean(&mut self) -> Result<&Value, ForecastError> {
        self.fetcher.fetch_mean()
    }

    /// Fetches one ensemble member on demand (cached per request).
    pub fn fetch_ensemble_member(&mut self, member: u8) -> Result<&Value, ForecastError> {
        self.fetcher.fetch_ensemble_member(member)
    }

    /// The merged, time-indexed table. Built on the first call; later
    /// calls return the same table without recomputation. A failed build
    /// is not cached.
    pub fn table(&self) -> Result<&MergedTable, ForecastError> {
        if let Some(table) = self.table.get() {
            debug!(station_id = self.station_id(), range = %self.range(), "table cache hit");
            return Ok(table);
        }

        let table = MergedTable::from_cache(self.fetcher.cache(), self.range().table_policy())?;
        info!(
            station_id = self.station_id(),
            range = %self.range(),
            rows = table.len(),
            columns = table.columns().len(),
            "forecast table built"
        );
        Ok(self.table.get_or_init(|| table))
    }

    /// The table as CSV text.
    pub fn to_csv(&self) -> Result<String, ForecastError> {
        self.table()?.to_csv_string()
    }

    /// Line chart of the table as an SVG document.
    pub fn plot(&self) -> Result<String, ForecastError> {
        self.plot_with(&SvgLineChart::default())
    }

    pub fn plot_with(&self, renderer: &dyn ChartRenderer) -> Result<String, ForecastError> {
        let title = format!("{} streamflow, station {}", self.range(), self.station_id());
        renderer.render(self.table()?, &title)
    }
}

/// The raw data as JSON, keyed by series label.
impl fmt::Display for ForecastRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data().to_json())
    }
}
