use float_ord::FloatOrd;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    AxisMapping, Bar, ChartError, ChartKind, LineSeries, OcrToken, Orientation, PlotBounds,
    Result, Sector,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub label: Option<String>,
    pub value: f64,
    pub series_id: Option<usize>,
}

/// Reconstructed chart data, one row per bar, sector or line point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.value).collect()
    }

    /// Values of one series, in row order.
    pub fn series_values(&self, series_id: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|row| row.series_id == Some(series_id))
            .map(|row| row.value)
            .collect()
    }

    /// `label,value,series_id` rows with values at fixed precision.
    pub fn to_csv(&self, precision: usize) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["label", "value", "series_id"])?;
        for row in &self.rows {
            writer.write_record([
                row.label.clone().unwrap_or_default(),
                format!("{:.*}", precision, row.value),
                row.series_id.map(|id| id.to_string()).unwrap_or_default(),
            ])?;
        }
        let bytes = writer.into_inner().map_err(|err| err.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn from_csv(data: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows = reader
            .deserialize::<TableRow>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl AxisMapping {
    /// Value at pixel row `y` of a vertical value axis.
    pub fn value_at_y(&self, y: f64, bounds: &PlotBounds) -> f64 {
        self.min + self.scale * (bounds.bottom - y)
    }

    /// Value at pixel column `x` of a horizontal value axis.
    pub fn value_at_x(&self, x: f64, bounds: &PlotBounds) -> f64 {
        self.min + self.scale * (x - bounds.left)
    }
}

/// The non-numeric token on the category axis closest to a bar.
fn category_label(
    bar: &Bar,
    orientation: Orientation,
    bounds: &PlotBounds,
    tokens: &[OcrToken],
) -> Option<String> {
    let bar_center = bar.center();
    tokens
        .iter()
        .filter(|token| token.numeric_value.is_none())
        .filter(|token| {
            let center = token.center();
            match orientation {
                Orientation::Vertical => {
                    center.y > bounds.bottom && (bar.x..=bar.right()).contains(&center.x)
                }
                Orientation::Horizontal => {
                    center.x < bounds.left && (bar.y..=bar.bottom()).contains(&center.y)
                }
            }
        })
        .min_by_key(|token| {
            let center = token.center();
            match orientation {
                Orientation::Vertical => FloatOrd((center.x - bar_center.x).abs()),
                Orientation::Horizontal => FloatOrd((center.y - bar_center.y).abs()),
            }
        })
        .map(|token| token.text.clone())
}

/// One row per bar. Vertical bars read their top edge off the y mapping,
/// horizontal bars their right edge off the x mapping.
#[instrument(level = "debug", skip(bars, tokens))]
pub fn bar_table(
    bars: &[Bar],
    orientation: Orientation,
    mapping: Option<&AxisMapping>,
    bounds: &PlotBounds,
    tokens: &[OcrToken],
) -> Result<Table> {
    let mapping = mapping.ok_or(ChartError::CalibrationMissing {
        kind: ChartKind::Bar,
    })?;
    let rows = bars
        .iter()
        .map(|bar| TableRow {
            label: category_label(bar, orientation, bounds, tokens),
            value: match orientation {
                Orientation::Vertical => mapping.value_at_y(bar.y, bounds),
                Orientation::Horizontal => mapping.value_at_x(bar.right(), bounds),
            },
            series_id: None,
        })
        .collect();
    Ok(Table { rows })
}

/// One row per point, labelled with its x pixel (the data index) and tagged
/// with the series position.
#[instrument(level = "debug", skip(series))]
pub fn line_table(
    series: &[LineSeries],
    mapping: Option<&AxisMapping>,
    bounds: &PlotBounds,
) -> Result<Table> {
    let mapping = mapping.ok_or(ChartError::CalibrationMissing {
        kind: ChartKind::Line,
    })?;
    let rows = series
        .iter()
        .enumerate()
        .flat_map(|(series_id, line)| {
            line.ordered_points.iter().map(move |point| TableRow {
                label: Some(format!("{:.0}", point.x)),
                value: mapping.value_at_y(point.y, bounds),
                series_id: Some(series_id),
            })
        })
        .collect();
    Ok(Table { rows })
}

/// One row per sector holding its share of the full turn, in percent.
pub fn pie_table(sectors: &[Sector]) -> Table {
    Table {
        rows: sectors
            .iter()
            .map(|sector| TableRow {
                label: None,
                value: sector.percentage(),
                series_id: None,
            })
            .collect(),
    }
}
