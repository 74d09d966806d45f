/// Core data types for the National Water Model forecast client.
///
/// This module defines the shared domain model imported by all other
/// modules: forecast ranges and their ensemble policy, series keys, the
/// per-request series cache, and the error taxonomy. It performs no I/O.

use std::collections::BTreeMap;
use std::collections::btree_map::{self, Entry};
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Forecast ranges
// ---------------------------------------------------------------------------

/// Ensemble members published for the medium-range product.
pub const MEDIUM_RANGE_MEMBERS: &[u8] = &[1, 2, 3, 4, 5, 6, 7];

/// Ensemble members published for the long-range product.
pub const LONG_RANGE_MEMBERS: &[u8] = &[1, 2, 3, 4];

/// How the cached series of a range are turned into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePolicy {
    /// Exactly one deterministic trace; no join is performed.
    SingleSeries,
    /// Mean and ensemble members outer-joined on their timestamps.
    OuterJoin,
}

/// Forecast horizon category of the National Water Model.
///
/// Each variant carries its own policy: which ensemble members exist,
/// whether an ensemble mean is published, and how the table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Range {
    Short,
    Medium,
    Long,
}

impl Range {
    /// Product name as used by the forecast service and the fixture files.
    pub fn product(self) -> &'static str {
        match self {
            Range::Short => "short_range",
            Range::Medium => "medium_range",
            Range::Long => "long_range",
        }
    }

    /// Legal ensemble member numbers for this range.
    pub fn ensemble_options(self) -> &'static [u8] {
        match self {
            Range::Short => &[],
            Range::Medium => MEDIUM_RANGE_MEMBERS,
            Range::Long => LONG_RANGE_MEMBERS,
        }
    }

    pub fn supports_mean(self) -> bool {
        !matches!(self, Range::Short)
    }

    pub fn table_policy(self) -> TablePolicy {
        match self {
            Range::Short => TablePolicy::SingleSeries,
            Range::Medium | Range::Long => TablePolicy::OuterJoin,
        }
    }

    pub fn is_legal_member(self, member: u8) -> bool {
        self.ensemble_options().contains(&member)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.product())
    }
}

impl FromStr for Range {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "short_range" | "short" => Ok(Range::Short),
            "medium_range" | "medium" => Ok(Range::Medium),
            "long_range" | "long" => Ok(Range::Long),
            other => Err(ForecastError::Configuration(format!(
                "unknown forecast range '{}'",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Series identity
// ---------------------------------------------------------------------------

/// Identifies one forecast series within a request.
///
/// The derived ordering (point, mean, then members ascending) is the
/// column order of every merged table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeriesKey {
    Point,
    Mean,
    Member(u8),
}

impl SeriesKey {
    /// Parses a key as it appears in a fixture object (`"mean"`, `"3"`).
    pub fn from_label(label: &str) -> Option<SeriesKey> {
        match label.trim() {
            "point" => Some(SeriesKey::Point),
            "mean" => Some(SeriesKey::Mean),
            other => other.parse::<u8>().ok().map(SeriesKey::Member),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKey::Point => write!(f, "point"),
            SeriesKey::Mean => write!(f, "mean"),
            SeriesKey::Member(n) => write!(f, "{}", n),
        }
    }
}

// ---------------------------------------------------------------------------
// Ensemble selection
// ---------------------------------------------------------------------------

/// Which ensemble members a caller wants for a medium or long range request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnsembleSelection {
    /// No ensemble members. Independent of whether the mean is requested.
    #[default]
    None,
    /// Every member legal for the range.
    All,
    /// An explicit list of member numbers.
    Members(Vec<u8>),
}

impl EnsembleSelection {
    /// Expands the selection into the sorted, de-duplicated member list
    /// for `range`.
    ///
    /// # Errors
    /// `ForecastError::Configuration` if an explicit member is not legal
    /// for the range (e.g. member 9 of medium range, or any member of
    /// short range).
    pub fn resolve(&self, range: Range) -> Result<Vec<u8>, ForecastError> {
        match self {
            EnsembleSelection::None => Ok(Vec::new()),
            EnsembleSelection::All => Ok(range.ensemble_options().to_vec()),
            EnsembleSelection::Members(members) => {
                if let Some(bad) = members.iter().find(|m| !range.is_legal_member(**m)) {
                    return Err(ForecastError::Configuration(format!(
                        "ensemble member {} is not available for {} (legal: {:?})",
                        bad,
                        range,
                        range.ensemble_options()
                    )));
                }
                let mut resolved = members.clone();
                resolved.sort_unstable();
                resolved.dedup();
                Ok(resolved)
            }
        }
    }
}

impl From<bool> for EnsembleSelection {
    fn from(all: bool) -> Self {
        if all {
            EnsembleSelection::All
        } else {
            EnsembleSelection::None
        }
    }
}

impl From<Vec<u8>> for EnsembleSelection {
    fn from(members: Vec<u8>) -> Self {
        EnsembleSelection::Members(members)
    }
}

impl FromStr for EnsembleSelection {
    type Err = ForecastError;

    /// `"all"` selects every member, an empty string selects none, and
    /// `"1,3,5"` selects an explicit list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(EnsembleSelection::None);
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(EnsembleSelection::All);
        }
        s.split(',')
            .map(|part| {
                part.trim().parse::<u8>().map_err(|_| {
                    ForecastError::Configuration(format!(
                        "invalid ensemble member '{}'",
                        part.trim()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(EnsembleSelection::Members)
    }
}

// ---------------------------------------------------------------------------
// Series cache
// ---------------------------------------------------------------------------

/// Raw JSON payloads fetched for one request, keyed by series.
///
/// Scoped to a single request and never shared. Entries are only ever
/// added; nothing is evicted for the lifetime of the owning request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesCache {
    entries: BTreeMap<SeriesKey, Value>,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: SeriesKey) -> Option<&Value> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: SeriesKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in column order.
    pub fn keys(&self) -> impl Iterator<Item = SeriesKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, SeriesKey, Value> {
        self.entries.iter()
    }

    /// Stores a payload unless one is already cached for `key`.
    /// The first payload wins.
    pub fn insert(&mut self, key: SeriesKey, payload: Value) -> &Value {
        self.entries.entry(key).or_insert(payload)
    }

    pub(crate) fn entry(&mut self, key: SeriesKey) -> Entry<'_, SeriesKey, Value> {
        self.entries.entry(key)
    }

    /// The cache as one JSON object keyed by series label.
    pub fn to_json(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(key, payload)| (key.to_string(), payload.clone()))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl<'a> IntoIterator for &'a SeriesCache {
    type Item = (&'a SeriesKey, &'a Value);
    type IntoIter = btree_map::Iter<'a, SeriesKey, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures while obtaining a raw payload, from the network or a fixture.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
    /// Non-2xx HTTP response from the forecast service.
    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: u16 },
    /// The response body was not valid JSON.
    #[error("invalid JSON from {url}: {message}")]
    InvalidJson { url: String, message: String },
    /// A bundled fixture file could not be read or parsed.
    #[error("fixture {path}: {message}")]
    Fixture { path: String, message: String },
}

/// Errors surfaced by forecast requests and table construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// Propagated unchanged from the fetch layer.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// A payload is missing expected fields, or a value is not numeric.
    #[error("data format error: {0}")]
    DataFormat(String),
    /// A series resolved to zero data points where a table is required.
    #[error("no data points for series {series}")]
    EmptyData { series: String },
    /// The request asks for something the chosen range does not offer.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The table could not be rendered as a chart or written out as CSV.
    #[error("output error: {0}")]
    Output(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_range_policies() {
        assert!(Range::Short.ensemble_options().is_empty());
        assert_eq!(Range::Medium.ensemble_options(), &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(Range::Long.ensemble_options(), &[1, 2, 3, 4]);

        assert!(!Range::Short.supports_mean());
        assert!(Range::Medium.supports_mean());
        assert!(Range::Long.supports_mean());

        assert_eq!(Range::Short.table_policy(), TablePolicy::SingleSeries);
        assert_eq!(Range::Long.table_policy(), TablePolicy::OuterJoin);
    }

    #[test]
    fn test_range_round_trips_through_product_name() {
        for range in [Range::Short, Range::Medium, Range::Long] {
            assert_eq!(range.to_string().parse::<Range>().unwrap(), range);
        }
        assert!(matches!(
            "extended_range".parse::<Range>(),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_series_key_order_is_mean_then_members_ascending() {
        let mut keys = vec![
            SeriesKey::Member(3),
            SeriesKey::Mean,
            SeriesKey::Member(1),
            SeriesKey::Member(10),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SeriesKey::Mean,
                SeriesKey::Member(1),
                SeriesKey::Member(3),
                SeriesKey::Member(10),
            ]
        );
    }

    #[test]
    fn test_series_key_labels() {
        assert_eq!(SeriesKey::from_label("mean"), Some(SeriesKey::Mean));
        assert_eq!(SeriesKey::from_label("4"), Some(SeriesKey::Member(4)));
        assert_eq!(SeriesKey::from_label("point"), Some(SeriesKey::Point));
        assert_eq!(SeriesKey::from_label("median"), None);
        assert_eq!(SeriesKey::Member(6).to_string(), "6");
    }

    #[test]
    fn test_all_selection_expands_to_legal_members() {
        assert_eq!(
            EnsembleSelection::All.resolve(Range::Long).unwrap(),
            vec![1, 2, 3, 4]
        );
        // boolean and sentinel forms are the same request
        assert_eq!(EnsembleSelection::from(true), EnsembleSelection::All);
        assert_eq!(
            "all".parse::<EnsembleSelection>().unwrap(),
            EnsembleSelection::All
        );
    }

    #[test]
    fn test_empty_selection_means_no_members() {
        assert_eq!(EnsembleSelection::from(false), EnsembleSelection::None);
        assert_eq!(
            "".parse::<EnsembleSelection>().unwrap(),
            EnsembleSelection::None
        );
        assert!(EnsembleSelection::None.resolve(Range::Medium).unwrap().is_empty());
        assert!(
            EnsembleSelection::Members(vec![])
                .resolve(Range::Medium)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_explicit_members_are_sorted_and_deduplicated() {
        let selection: EnsembleSelection = "5, 2,5".parse().unwrap();
        assert_eq!(selection.resolve(Range::Medium).unwrap(), vec![2, 5]);
    }

    #[test]
    fn test_out_of_range_member_is_configuration_error() {
        let err = EnsembleSelection::Members(vec![1, 9])
            .resolve(Range::Medium)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));

        let err = EnsembleSelection::Members(vec![5])
            .resolve(Range::Long)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));

        // short range has no members at all, so "all" is simply empty
        let members = EnsembleSelection::All.resolve(Range::Short).unwrap();
        assert!(members.is_empty());
    }

    #[test]
    fn test_unparseable_member_list() {
        assert!(matches!(
            "1,two".parse::<EnsembleSelection>(),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_cache_keeps_first_payload() {
        let mut cache = SeriesCache::new();
        cache.insert(SeriesKey::Mean, json!([1]));
        cache.insert(SeriesKey::Mean, json!([2]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(SeriesKey::Mean), Some(&json!([1])));
    }

    #[test]
    fn test_cache_iterates_in_column_order() {
        let mut cache = SeriesCache::new();
        cache.insert(SeriesKey::Member(2), json!(null));
        cache.insert(SeriesKey::Member(1), json!(null));
        cache.insert(SeriesKey::Mean, json!(null));
        let keys: Vec<_> = cache.keys().collect();
        assert_eq!(
            keys,
            vec![SeriesKey::Mean, SeriesKey::Member(1), SeriesKey::Member(2)]
        );
        assert_eq!(
            cache.to_json(),
            json!({"mean": null, "1": null, "2": null})
        );
    }

    #[test]
    fn test_fetch_error_display_and_propagation() {
        let err = FetchError::Status {
            url: "https://example.test/x".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP error 503 for https://example.test/x");
        let wrapped: ForecastError = err.clone().into();
        assert_eq!(wrapped, ForecastError::Fetch(err.clone()));
        assert_eq!(wrapped.to_string(), err.to_string());
    }
}
