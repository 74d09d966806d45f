/// Bundled example responses for offline use.
///
/// One file per range, named after the product (`short_range.json`,
/// `medium_range.json`, `long_range.json`), holding the same structure the
/// live service returns:
///
/// - short range: a single series payload, a list whose first element
///   carries `forecast-type` and `data`;
/// - medium/long range: an object keyed by series label (`"mean"`, `"1"`,
///   `"2"`, ...) whose values are series payloads.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::model::{FetchError, Range, SeriesKey, TablePolicy};

/// Reads the fixture at `path` and splits it into per-series payloads.
///
/// # Errors
/// `FetchError::Fixture` if the file cannot be read, is not JSON, or does
/// not have the shape expected for `range`.
pub fn load_fixture(path: &Path, range: Range) -> Result<Vec<(SeriesKey, Value)>, FetchError> {
    let fixture_error = |message: String| FetchError::Fixture {
        path: path.display().to_string(),
        message,
    };

    let content = fs::read_to_string(path).map_err(|e| fixture_error(e.to_string()))?;
    let fixture: Value =
        serde_json::from_str(&content).map_err(|e| fixture_error(e.to_string()))?;

    split_fixture(fixture, range).map_err(fixture_error)
}

/// Splits a parsed fixture document into per-series payloads.
pub fn split_fixture(fixture: Value, range: Range) -> Result<Vec<(SeriesKey, Value)>, String> {
    match range.table_policy() {
        TablePolicy::SingleSeries => Ok(vec![(SeriesKey::Point, fixture)]),
        TablePolicy::OuterJoin => {
            let Value::Object(series) = fixture else {
                return Err(format!(
                    "{} fixture must be an object keyed by series",
                    range
                ));
            };
            series
                .into_iter()
                .map(|(label, payload)| match SeriesKey::from_label(&label) {
                    Some(SeriesKey::Mean) => Ok((SeriesKey::Mean, payload)),
                    Some(SeriesKey::Member(n)) if range.is_legal_member(n) => {
                        Ok((SeriesKey::Member(n), payload))
                    }
                    _ => Err(format!("unexpected series '{}' for {}", label, range)),
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_bundled_fixtures_load_for_every_range() {
        let config = ServiceConfig::default();

        let short = load_fixture(&config.fixture_path("short_range"), Range::Short).unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].0, SeriesKey::Point);

        let medium = load_fixture(&config.fixture_path("medium_range"), Range::Medium).unwrap();
        assert_eq!(medium.len(), 1 + Range::Medium.ensemble_options().len());

        let long = load_fixture(&config.fixture_path("long_range"), Range::Long).unwrap();
        assert_eq!(long.len(), 1 + Range::Long.ensemble_options().len());
    }

    #[test]
    fn test_split_rejects_unknown_series() {
        let fixture = json!({ "mean": [], "9": [] });
        assert!(split_fixture(fixture, Range::Medium).is_err());

        let fixture = json!({ "median": [] });
        assert!(split_fixture(fixture, Range::Long).is_err());

        assert!(split_fixture(json!([]), Range::Long).is_err());
    }

    #[test]
    fn test_missing_fixture_is_fetch_error() {
        let err = load_fixture(Path::new("/nonexistent/short_range.json"), Range::Short)
            .unwrap_err();
        assert!(matches!(err, FetchError::Fixture { .. }));
    }

    #[test]
    fn test_malformed_fixture_is_fetch_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = load_fixture(file.path(), Range::Medium).unwrap_err();
        assert!(matches!(err, FetchError::Fixture { .. }));
    }
}
