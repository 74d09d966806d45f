/// Structured logging for forecast retrieval.
///
/// Events carry the station id, forecast range and series as fields so a
/// failing member fetch can be traced back to its request. Library code
/// only emits `tracing` events; `init_logging` installs a console
/// subscriber for binaries and ad-hoc debugging.

use std::fmt;

use tracing::{Level, debug, error, info, warn};

use crate::model::{FetchError, Range, SeriesKey};

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs a fmt subscriber at `level`.
///
/// Safe to call more than once; later calls are ignored once a global
/// subscriber exists.
pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the station has no forecast for this product
    Expected,
    /// Unexpected failure - service degradation or a changed response format
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classifies a fetch failure.
///
/// A 404 means the service has no such station/product combination,
/// which happens routinely for reaches outside a product's domain.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::Status { status: 404, .. } => FailureType::Expected,
        FetchError::Status { .. } => FailureType::Unexpected,
        FetchError::Transport { .. } => FailureType::Unexpected,
        FetchError::InvalidJson { .. } => FailureType::Unexpected,
        FetchError::Fixture { .. } => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Logs a fetch failure at a level matching its classification.
pub fn log_fetch_failure(station_id: u64, range: Range, series: SeriesKey, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);

    match failure_type {
        FailureType::Expected => {
            debug!(station_id, %range, %series, %failure_type, "fetch failed: {}", err)
        }
        FailureType::Unexpected => {
            error!(station_id, %range, %series, %failure_type, "fetch failed: {}", err)
        }
        FailureType::Unknown => {
            warn!(station_id, %range, %series, %failure_type, "fetch failed: {}", err)
        }
    }
}

/// Logs a fixture that could not be loaded. Such a failure concerns the
/// whole range rather than one series.
pub fn log_fixture_failure(station_id: u64, range: Range, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    warn!(station_id, %range, %failure_type, "fixture load failed: {}", err);
}

/// Logs the outcome of the initial fetch of a request.
pub fn log_fetch_summary(station_id: u64, range: Range, series: usize, offline: bool) {
    let source = if offline { "fixture" } else { "service" };
    info!(station_id, %range, series, source, "forecast series loaded");
}
