/// National Water Model forecast API client.
///
/// Handles URL construction and per-series retrieval for the NWM data
/// service:
///   https://nwmdata.nohrsc.noaa.gov/latest/forecasts/
///
/// Every product is served as its own endpoint. Short range has a single
/// deterministic trace; medium and long range publish an ensemble mean
/// and numbered ensemble members, each fetched separately.

use std::cell::OnceCell;
use std::collections::btree_map::Entry;
use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, trace};

use crate::config::ServiceConfig;
use crate::ingest::fixtures;
use crate::logging::{log_fetch_failure, log_fixture_failure};
use crate::model::{FetchError, ForecastError, Range, SeriesCache, SeriesKey};

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// `{base}/{range}/streamflow?station_id={id}`
pub fn point_url(base: &str, range: Range, station_id: u64) -> String {
    format!("{}/{}/streamflow?station_id={}", base, range.product(), station_id)
}

/// `{base}/{range}_ensemble_mean/streamflow?station_id={id}`
pub fn mean_url(base: &str, range: Range, station_id: u64) -> String {
    format!(
        "{}/{}_ensemble_mean/streamflow?station_id={}",
        base,
        range.product(),
        station_id
    )
}

/// `{base}/{range}_ensemble_member_{n}/streamflow?station_id={id}`
pub fn member_url(base: &str, range: Range, station_id: u64, member: u8) -> String {
    format!(
        "{}/{}_ensemble_member_{}/streamflow?station_id={}",
        base,
        range.product(),
        member,
        station_id
    )
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Given a URL, returns the parsed JSON body or fails.
pub trait HttpFetcher {
    fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// Blocking HTTP transport used against the live service.
///
/// The client is built on the first request, so a fetcher that only ever
/// serves fixtures never sets up TLS. No retries and no timeout beyond
/// the client default: a stalled upstream blocks the caller.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    user_agent: String,
    client: OnceCell<reqwest::blocking::Client>,
}

impl ReqwestFetcher {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            client: OnceCell::new(),
        }
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self {
            user_agent: String::new(),
            client: OnceCell::from(client),
        }
    }

    fn client(&self, url: &str) -> Result<&reqwest::blocking::Client, FetchError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        debug!(user_agent = %self.user_agent, "built HTTP client");
        Ok(self.client.get_or_init(|| client))
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client(url)?
            .get(url)
            .header("Accept", "application/json")
            .send()
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().map_err(transport)?;
        serde_json::from_str(&body).map_err(|e| FetchError::InvalidJson {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Cached fetcher
// ---------------------------------------------------------------------------

/// Fetches raw per-series payloads for one station and range.
///
/// Each series key is fetched at most once; later requests for the same
/// key are answered from the cache. Every URL that produced a payload is
/// appended to the URL log. Once fixture data has been loaded the fetcher
/// is offline: requested series are served from the fixture and the
/// network is never touched again.
pub struct ForecastFetcher {
    station_id: u64,
    range: Range,
    base_url: String,
    fixture_path: PathBuf,
    http: Box<dyn HttpFetcher>,
    offline: bool,
    fixture: SeriesCache,
    cache: SeriesCache,
    urls: Vec<String>,
}

impl fmt::Debug for ForecastFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForecastFetcher")
            .field("station_id", &self.station_id)
            .field("range", &self.range)
            .field("base_url", &self.base_url)
            .field("offline", &self.offline)
            .field("series", &self.cache.keys().collect::<Vec<_>>())
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

impl ForecastFetcher {
    pub fn new(
        station_id: u64,
        range: Range,
        config: &ServiceConfig,
        http: Box<dyn HttpFetcher>,
    ) -> Self {
        Self {
            station_id,
            range,
            base_url: config.base_url.clone(),
            fixture_path: config.fixture_path(range.product()),
            http,
            offline: false,
            fixture: SeriesCache::new(),
            cache: SeriesCache::new(),
            urls: Vec::new(),
        }
    }

    pub fn station_id(&self) -> u64 {
        self.station_id
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    /// URLs fetched so far, in request order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Fetches the deterministic short-range trace.
    ///
    /// # Errors
    /// - `ForecastError::Configuration` — the range is not short range.
    /// - `ForecastError::Fetch` — transport, status or JSON failure.
    pub fn fetch_point(&mut self) -> Result<&Value, ForecastError> {
        if self.range != Range::Short {
            return Err(ForecastError::Configuration(format!(
                "{} has no deterministic point forecast",
                self.range
            )));
        }
        let url = point_url(&self.base_url, self.range, self.station_id);
        self.fetch_cached(SeriesKey::Point, url)
    }

    /// Fetches the ensemble mean, or returns the cached payload.
    pub fn fetch_mean(&mut self) -> Result<&Value, ForecastError> {
        if !self.range.supports_mean() {
            return Err(ForecastError::Configuration(format!(
                "{} has no ensemble mean",
                self.range
            )));
        }
        let url = mean_url(&self.base_url, self.range, self.station_id);
        self.fetch_cached(SeriesKey::Mean, url)
    }

    /// Fetches one ensemble member, or returns the cached payload.
    ///
    /// The member is checked against the range's legal set before any
    /// request is made.
    pub fn fetch_ensemble_member(&mut self, member: u8) -> Result<&Value, ForecastError> {
        if !self.range.is_legal_member(member) {
            return Err(ForecastError::Configuration(format!(
                "ensemble member {} is not available for {} (legal: {:?})",
                member,
                self.range,
                self.range.ensemble_options()
            )));
        }
        let url = member_url(&self.base_url, self.range, self.station_id, member);
        self.fetch_cached(SeriesKey::Member(member), url)
    }

    /// Loads the bundled example response for this range in place of any
    /// network call and returns every series it holds.
    ///
    /// After this call the fetcher is offline. The fixture is only staged:
    /// `fetch_point`, `fetch_mean` and `fetch_ensemble_member` then take
    /// their series from it, so the cache holds exactly what was asked for.
    pub fn fetch_example(&mut self) -> Result<&SeriesCache, ForecastError> {
        let entries = fixtures::load_fixture(&self.fixture_path, self.range).map_err(|e| {
            log_fixture_failure(self.station_id, self.range, &e);
            e
        })?;
        debug!(
            station_id = self.station_id,
            range = %self.range,
            path = %self.fixture_path.display(),
            series = entries.len(),
            "loaded example fixture"
        );
        for (key, payload) in entries {
            self.fixture.insert(key, payload);
        }
        self.offline = true;
        Ok(&self.fixture)
    }

    fn fetch_cached(&mut self, key: SeriesKey, url: String) -> Result<&Value, ForecastError> {
        let station_id = self.station_id;
        let range = self.range;

        match self.cache.entry(key) {
            Entry::Occupied(entry) => {
                trace!(station_id, %range, series = %key, "series cache hit");
                Ok(&*entry.into_mut())
            }
            Entry::Vacant(slot) if self.offline => match self.fixture.get(key) {
                Some(payload) => {
                    trace!(station_id, %range, series = %key, "series served from fixture");
                    Ok(&*slot.insert(payload.clone()))
                }
                None => Err(ForecastError::Configuration(format!(
                    "series {} is not in the {} fixture and network access is disabled",
                    key, range
                ))),
            },
            Entry::Vacant(slot) => {
                let payload = self.http.get_json(&url).map_err(|e| {
                    log_fetch_failure(station_id, range, key, &e);
                    e
                })?;
                debug!(station_id, %range, series = %key, %url, "fetched forecast series");
                self.urls.push(url);
                Ok(&*slot.insert(payload))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
