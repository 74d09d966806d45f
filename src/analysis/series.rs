/// Parsing of raw series payloads into typed forecast series.
///
/// A payload is either a JSON list whose first element is the series
/// object, or the series object itself:
///
/// ```json
/// [{
///   "forecast-type": "medium_range_ensemble_mean",
///   "data": [{ "forecast-time": "2020-06-30T03:00:00", "value": "18480.00" }]
/// }]
/// ```
///
/// Values arrive as JSON numbers or as numeric strings. `null` is kept as
/// a missing value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{ForecastError, SeriesKey};

// ---------------------------------------------------------------------------
// Payload structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SeriesPayload {
    #[serde(rename = "forecast-type")]
    forecast_type: String,
    data: Vec<PayloadPoint>,
}

#[derive(Debug, Deserialize)]
struct PayloadPoint {
    #[serde(rename = "forecast-time")]
    forecast_time: String,
    value: Value,
}

// ---------------------------------------------------------------------------
// Forecast series
// ---------------------------------------------------------------------------

/// One named forecast trace for a station.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    pub key: SeriesKey,
    /// The payload's declared `forecast-type`; becomes the column name.
    pub label: String,
    /// `(forecast time, value)` pairs in payload order.
    pub points: Vec<(DateTime<Utc>, Option<f64>)>,
}

impl ForecastSeries {
    /// Parses a raw payload.
    ///
    /// # Errors
    /// `ForecastError::DataFormat` if the structure, a timestamp or a
    /// value is malformed.
    pub fn from_payload(key: SeriesKey, payload: &Value) -> Result<Self, ForecastError> {
        let entry = match payload {
            Value::Array(items) => items.first().ok_or_else(|| {
                ForecastError::DataFormat(format!("series {}: payload list is empty", key))
            })?,
            Value::Object(_) => payload,
            other => {
                return Err(ForecastError::DataFormat(format!(
                    "series {}: expected a list or object, got {}",
                    key,
                    json_kind(other)
                )));
            }
        };

        let parsed = SeriesPayload::deserialize(entry)
            .map_err(|e| ForecastError::DataFormat(format!("series {}: {}", key, e)))?;

        let points = parsed
            .data
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let time = parse_forecast_time(&point.forecast_time).ok_or_else(|| {
                    ForecastError::DataFormat(format!(
                        "series {}: entry {} has unparseable forecast-time '{}'",
                        key, i, point.forecast_time
                    ))
                })?;
                let value = parse_value(&point.value).map_err(|msg| {
                    ForecastError::DataFormat(format!("series {}: entry {}: {}", key, i, msg))
                })?;
                Ok((time, value))
            })
            .collect::<Result<Vec<_>, ForecastError>>()?;

        Ok(Self {
            key,
            label: parsed.forecast_type,
            points,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Parses a `forecast-time` string.
///
/// Accepts RFC 3339 with an offset, or a naive `YYYY-MM-DDTHH:MM[:SS]`
/// (space separator also allowed) which is taken as UTC.
pub fn parse_forecast_time(raw: &str) -> Option<DateTime<Utc>> {
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Casts a payload value to a float. `null` is a missing value.
pub fn parse_value(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("value {} is not representable as a float", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("value '{}' is not numeric", s)),
        other => Err(format!("value must be numeric, got {}", json_kind(other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
