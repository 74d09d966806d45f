//! Line-chart rendering of forecast tables.
//!
//! One line per column against the timestamp axis. Gaps in a column break
//! its line instead of being interpolated across.

use chrono::NaiveDateTime;
use plotters::coord::types::RangedDateTime;
use plotters::prelude::*;

use crate::analysis::table::MergedTable;
use crate::model::ForecastError;

/// Draws a merged table as a chart.
pub trait ChartRenderer {
    fn render(&self, table: &MergedTable, title: &str) -> Result<String, ForecastError>;
}

/// Renders an SVG document with the plotters SVG backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgLineChart {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgLineChart {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 600,
        }
    }
}

fn draw_error(e: impl std::fmt::Display) -> ForecastError {
    ForecastError::Output(e.to_string())
}

impl ChartRenderer for SvgLineChart {
    fn render(&self, table: &MergedTable, title: &str) -> Result<String, ForecastError> {
        let times: Vec<NaiveDateTime> = table.index().iter().map(|t| t.naive_utc()).collect();
        let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
            return Err(ForecastError::EmptyData {
                series: title.to_string(),
            });
        };
        // a single row still needs a non-degenerate x range
        let last = if last > first {
            last
        } else {
            first + chrono::Duration::hours(1)
        };

        let (min_value, max_value) = table
            .columns()
            .iter()
            .flat_map(|c| c.values.iter().flatten())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
                (min.min(*v), max.max(*v))
            });
        if !min_value.is_finite() || !max_value.is_finite() {
            return Err(ForecastError::EmptyData {
                series: title.to_string(),
            });
        }
        let y_padding = if (max_value - min_value).abs() > 1e-6 {
            (max_value - min_value) * 0.1
        } else {
            1.0
        };

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.width, self.height))
                .into_drawing_area();
            root.fill(&WHITE).map_err(draw_error)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(title, ("sans-serif", 22))
                .margin(12)
                .x_label_area_size(40)
                .y_label_area_size(70)
                .build_cartesian_2d(
                    RangedDateTime::from(first..last),
                    (min_value - y_padding)..(max_value + y_padding),
                )
                .map_err(draw_error)?;

            chart
                .configure_mesh()
                .x_desc("datetime")
                .y_desc("streamflow")
                .x_label_formatter(&|dt: &NaiveDateTime| dt.format("%m-%d %Hh").to_string())
                .light_line_style(BLACK.mix(0.15))
                .draw()
                .map_err(draw_error)?;

            for (i, column) in table.columns().iter().enumerate() {
                let style = Palette99::pick(i).stroke_width(2);
                let mut labelled = false;

                for run in contiguous_runs(&times, &column.values) {
                    let series = chart
                        .draw_series(LineSeries::new(run, style))
                        .map_err(draw_error)?;
                    if !labelled {
                        series.label(column.name.as_str()).legend(move |(x, y)| {
                            PathElement::new(vec![(x, y), (x + 20, y)], style)
                        });
                        labelled = true;
                    }
                }
            }

            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(draw_error)?;

            root.present().map_err(draw_error)?;
        }
        Ok(svg)
    }
}

/// Splits a column into runs of consecutive present values.
fn contiguous_runs(
    times: &[NaiveDateTime],
    values: &[Option<f64>],
) -> Vec<Vec<(NaiveDateTime, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (time, value) in times.iter().zip(values) {
        match value {
            Some(v) => current.push((*time, *v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
