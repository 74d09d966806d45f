/// Merging of per-series forecasts into one time-indexed table.
///
/// Short range holds one trace and is tabulated directly. Medium and long
/// range outer-join the mean and ensemble members on their timestamps:
/// the first series seeds the table and each further series is joined in
/// column order (mean, then members ascending). A timestamp missing from
/// one series leaves a gap in that column rather than dropping the row.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::analysis::series::ForecastSeries;
use crate::model::{ForecastError, SeriesCache, TablePolicy};

/// Timestamp format of the CSV `datetime` column and the text rendering.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One value column of a merged table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Time-indexed forecast table, one column per series.
///
/// Every column has exactly one value slot per index row; missing values
/// are `None` and are never filled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedTable {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl MergedTable {
    /// Builds the table for a request's cached payloads according to the
    /// range's table policy.
    ///
    /// # Errors
    /// - `ForecastError::DataFormat` — a payload is malformed, a value is
    ///   not numeric, or two series declare the same `forecast-type`.
    /// - `ForecastError::EmptyData` — no series, or a series without points.
    pub fn from_cache(cache: &SeriesCache, policy: TablePolicy) -> Result<Self, ForecastError> {
        let series = cache
            .iter()
            .map(|(key, payload)| ForecastSeries::from_payload(*key, payload))
            .collect::<Result<Vec<_>, _>>()?;

        let table = match policy {
            TablePolicy::SingleSeries => {
                let mut series = series.into_iter();
                match (series.next(), series.next()) {
                    (Some(only), None) => Self::single(only)?,
                    (None, _) => {
                        return Err(ForecastError::EmptyData {
                            series: "point".to_string(),
                        });
                    }
                    (Some(_), Some(_)) => {
                        return Err(ForecastError::DataFormat(format!(
                            "single-series forecast holds {} series",
                            cache.len()
                        )));
                    }
                }
            }
            TablePolicy::OuterJoin => Self::outer_join(series)?,
        };

        debug!(
            rows = table.len(),
            columns = table.columns.len(),
            "built forecast table"
        );
        Ok(table)
    }

    /// Tabulates a single trace as-is, without any join.
    ///
    /// Rows keep the payload order; the service delivers them sorted, and
    /// a stable sort only guards the ascending-index invariant.
    pub fn single(series: ForecastSeries) -> Result<Self, ForecastError> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData {
                series: series.key.to_string(),
            });
        }
        let mut points = series.points;
        points.sort_by_key(|(time, _)| *time);
        let (index, values): (Vec<_>, Vec<_>) = points.into_iter().unzip();
        Ok(Self {
            index,
            columns: vec![Column {
                name: series.label,
                values,
            }],
        })
    }

    /// Outer-joins every series, in the given order.
    pub fn outer_join(series: Vec<ForecastSeries>) -> Result<Self, ForecastError> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData {
                series: "(none requested)".to_string(),
            });
        }
        series
            .into_iter()
            .try_fold(MergedTable::default(), |table, next| table.join(next))
    }

    /// Joins one more series onto the table, on the union of timestamps.
    pub fn join(mut self, series: ForecastSeries) -> Result<Self, ForecastError> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData {
                series: series.key.to_string(),
            });
        }
        if self.column(&series.label).is_some() {
            return Err(ForecastError::DataFormat(format!(
                "series {} repeats column '{}'",
                series.key, series.label
            )));
        }

        let mut incoming = BTreeMap::new();
        for (time, value) in &series.points {
            if incoming.insert(*time, *value).is_some() {
                return Err(ForecastError::DataFormat(format!(
                    "series {} has duplicate forecast-time {}",
                    series.key,
                    time.format(TIMESTAMP_FORMAT)
                )));
            }
        }

        let index: Vec<DateTime<Utc>> = self
            .index
            .iter()
            .copied()
            .chain(incoming.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if index.len() != self.index.len() {
            for column in &mut self.columns {
                let old: BTreeMap<_, _> = self
                    .index
                    .iter()
                    .copied()
                    .zip(std::mem::take(&mut column.values))
                    .collect();
                column.values = index
                    .iter()
                    .map(|time| old.get(time).copied().flatten())
                    .collect();
            }
        }

        self.columns.push(Column {
            name: series.label,
            values: index
                .iter()
                .map(|time| incoming.get(time).copied().flatten())
                .collect(),
        });
        self.index = index;
        Ok(self)
    }

    /// Row timestamps, ascending.
    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Value of column `name` at `row`; `None` if missing or out of bounds.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name)
            .and_then(|c| c.values.get(row).copied().flatten())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Writes the table as CSV: a `datetime` column followed by one column
    /// per series. Missing values are empty cells.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec!["datetime"];
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        out.write_record(&header)?;

        for (row, time) in self.index.iter().enumerate() {
            let mut record = vec![time.format(TIMESTAMP_FORMAT).to_string()];
            record.extend(self.columns.iter().map(|c| {
                c.values[row].map(|v| v.to_string()).unwrap_or_default()
            }));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }

    /// The CSV rendering as a string.
    pub fn to_csv_string(&self) -> Result<String, ForecastError> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)
            .map_err(|e| ForecastError::Output(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| ForecastError::Output(e.to_string()))
    }
}

impl fmt::Display for MergedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<usize> = self.columns.iter().map(|c| c.name.len().max(10)).collect();

        write!(f, "{:<19}", "datetime")?;
        for (column, width) in self.columns.iter().zip(widths.iter().copied()) {
            write!(f, "  {:>width$}", column.name, width = width)?;
        }
        writeln!(f)?;

        for (row, time) in self.index.iter().enumerate() {
            write!(f, "{}", time.format(TIMESTAMP_FORMAT))?;
            for (column, width) in self.columns.iter().zip(widths.iter().copied()) {
                match column.values[row] {
                    Some(v) => write!(f, "  {:>width$.2}", v, width = width)?,
                    None => write!(f, "  {:>width$}", "NaN", width = width)?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeriesKey;
    use chrono::{Duration, TimeZone};
    use serde_json::{Value, json};

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 30, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn series(key: SeriesKey, label: &str, points: &[(i64, Option<f64>)]) -> ForecastSeries {
        ForecastSeries {
            key,
            label: label.to_string(),
            points: points.iter().map(|(h, v)| (hour(*h), *v)).collect(),
        }
    }

    fn payload(label: &str, points: &[(&str, Value)]) -> Value {
        let data: Vec<Value> = points
            .iter()
            .map(|(t, v)| json!({ "forecast-time": t, "value": v }))
            .collect();
        json!([{ "forecast-type": label, "data": data }])
    }

    #[test]
    fn test_single_series_keeps_rows() {
        let table = MergedTable::single(series(
            SeriesKey::Point,
            "short_range",
            &[(1, Some(10.0)), (2, Some(11.0)), (3, Some(12.5))],
        ))
        .unwrap();
        assert_eq!(table.column_names(), vec!["short_range"]);
        assert_eq!(table.index(), &[hour(1), hour(2), hour(3)]);
        assert_eq!(table.value(2, "short_range"), Some(12.5));
    }

    #[test]
    fn test_outer_join_keeps_rows_missing_from_one_series() {
        let table = MergedTable::outer_join(vec![
            series(SeriesKey::Mean, "mean", &[(3, Some(1.0)), (6, Some(2.0))]),
            series(SeriesKey::Member(1), "m1", &[(6, Some(3.0)), (9, Some(4.0))]),
        ])
        .unwrap();

        assert_eq!(table.index(), &[hour(3), hour(6), hour(9)]);
        assert_eq!(table.column("mean").unwrap().values, vec![Some(1.0), Some(2.0), None]);
        assert_eq!(table.column("m1").unwrap().values, vec![None, Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_join_realigns_existing_columns() {
        let table = MergedTable::outer_join(vec![
            series(SeriesKey::Mean, "a", &[(6, Some(1.0))]),
            series(SeriesKey::Member(1), "b", &[(3, Some(2.0))]),
            series(SeriesKey::Member(2), "c", &[(0, Some(3.0)), (6, Some(4.0))]),
        ])
        .unwrap();

        assert_eq!(table.index(), &[hour(0), hour(3), hour(6)]);
        assert_eq!(table.column("a").unwrap().values, vec![None, None, Some(1.0)]);
        assert_eq!(table.column("b").unwrap().values, vec![None, Some(2.0), None]);
        assert_eq!(table.column("c").unwrap().values, vec![Some(3.0), None, Some(4.0)]);
        for column in table.columns() {
            assert_eq!(column.values.len(), table.len());
        }
    }

    #[test]
    fn test_join_sorts_unordered_input() {
        let table = MergedTable::outer_join(vec![series(
            SeriesKey::Mean,
            "mean",
            &[(9, Some(3.0)), (3, Some(1.0)), (6, Some(2.0))],
        )])
        .unwrap();
        assert_eq!(table.index(), &[hour(3), hour(6), hour(9)]);
        assert_eq!(table.value(0, "mean"), Some(1.0));
    }

    #[test]
    fn test_empty_series_cannot_be_joined() {
        let err = MergedTable::outer_join(vec![
            series(SeriesKey::Mean, "mean", &[(3, Some(1.0))]),
            series(SeriesKey::Member(4), "m4", &[]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ForecastError::EmptyData {
                series: "4".to_string()
            }
        );

        let err = MergedTable::single(series(SeriesKey::Point, "short_range", &[])).unwrap_err();
        assert!(matches!(err, ForecastError::EmptyData { .. }));

        assert!(matches!(
            MergedTable::outer_join(Vec::new()),
            Err(ForecastError::EmptyData { .. })
        ));
    }

    #[test]
    fn test_duplicate_labels_and_timestamps_are_rejected() {
        let err = MergedTable::outer_join(vec![
            series(SeriesKey::Mean, "same", &[(3, Some(1.0))]),
            series(SeriesKey::Member(1), "same", &[(3, Some(2.0))]),
        ])
        .unwrap_err();
        assert!(matches!(err, ForecastError::DataFormat(_)));

        let err = MergedTable::outer_join(vec![series(
            SeriesKey::Mean,
            "mean",
            &[(3, Some(1.0)), (3, Some(2.0))],
        )])
        .unwrap_err();
        assert!(matches!(err, ForecastError::DataFormat(_)));
    }

    #[test]
    fn test_from_cache_round_trip_is_independent_of_insertion_order() {
        let mean = payload(
            "mean",
            &[
                ("2020-06-30T03:00:00", json!("1.5")),
                ("2020-06-30T06:00:00", json!("2.5")),
                ("2020-06-30T09:00:00", json!(3.5)),
            ],
        );
        let member = payload(
            "member_2",
            &[
                ("2020-06-30T03:00:00", json!("10")),
                ("2020-06-30T06:00:00", json!("20")),
                ("2020-06-30T09:00:00", json!("30")),
            ],
        );

        let mut forward = SeriesCache::new();
        forward.insert(SeriesKey::Mean, mean.clone());
        forward.insert(SeriesKey::Member(2), member.clone());

        let mut backward = SeriesCache::new();
        backward.insert(SeriesKey::Member(2), member);
        backward.insert(SeriesKey::Mean, mean);

        let a = MergedTable::from_cache(&forward, TablePolicy::OuterJoin).unwrap();
        let b = MergedTable::from_cache(&backward, TablePolicy::OuterJoin).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.column_names(), vec!["mean", "member_2"]);
        assert_eq!(a.column("mean").unwrap().values, vec![Some(1.5), Some(2.5), Some(3.5)]);
        assert_eq!(
            a.column("member_2").unwrap().values,
            vec![Some(10.0), Some(20.0), Some(30.0)]
        );
    }

    #[test]
    fn test_single_series_policy_requires_exactly_one_series() {
        let mut cache = SeriesCache::new();
        assert!(matches!(
            MergedTable::from_cache(&cache, TablePolicy::SingleSeries),
            Err(ForecastError::EmptyData { .. })
        ));

        cache.insert(
            SeriesKey::Point,
            payload("short_range", &[("2020-06-30T01:00:00", json!("5"))]),
        );
        let table = MergedTable::from_cache(&cache, TablePolicy::SingleSeries).unwrap();
        assert_eq!(table.column_names(), vec!["short_range"]);

        cache.insert(
            SeriesKey::Mean,
            payload("mean", &[("2020-06-30T01:00:00", json!("5"))]),
        );
        assert!(matches!(
            MergedTable::from_cache(&cache, TablePolicy::SingleSeries),
            Err(ForecastError::DataFormat(_))
        ));
    }

    #[test]
    fn test_csv_output() {
        let table = MergedTable::outer_join(vec![
            series(SeriesKey::Mean, "mean", &[(3, Some(1.5)), (6, Some(2.0))]),
            series(SeriesKey::Member(1), "m1", &[(6, Some(3.25))]),
        ])
        .unwrap();
        let csv = table.to_csv_string().unwrap();
        assert_eq!(
            csv,
            "datetime,mean,m1\n\
             2020-06-30 03:00:00,1.5,\n\
             2020-06-30 06:00:00,2,3.25\n"
        );
    }

    #[test]
    fn test_display_marks_missing_values() {
        let table = MergedTable::outer_join(vec![
            series(SeriesKey::Mean, "mean", &[(3, Some(1.5))]),
            series(SeriesKey::Member(1), "m1", &[(6, Some(3.25))]),
        ])
        .unwrap();
        let text = table.to_string();
        assert!(text.starts_with("datetime"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("NaN"));
        assert!(text.contains("3.25"));
    }
}
