use float_ord::FloatOrd;
use geo::{coord, Coord, EuclideanDistance};
use tracing::instrument;

use crate::{AxisMapping, ChartError, OcrToken, PlotBounds, Result};

/// A numeric axis label with its parsed value.
#[derive(Debug, Clone, Copy)]
struct Label {
    value: f64,
    top: f64,
    center: Coord<f64>,
}

fn numeric_labels<'a>(
    tokens: &'a [OcrToken],
    keep: impl Fn(&OcrToken) -> bool + 'a,
) -> impl Iterator<Item = Label> + 'a {
    tokens.iter().filter(move |token| keep(token)).filter_map(|token| {
        Some(Label {
            value: token.numeric_value?,
            top: token.top(),
            center: token.center(),
        })
    })
}

fn nearest_to(labels: &[Label], anchor: Coord<f64>) -> Option<Label> {
    let anchor: geo::Point<f64> = anchor.into();
    labels
        .iter()
        .min_by_key(|label| {
            let center: geo::Point<f64> = label.center.into();
            FloatOrd(center.euclidean_distance(&anchor))
        })
        .copied()
}

fn validated(mapping: AxisMapping) -> Result<AxisMapping> {
    if !mapping.scale.is_finite() || mapping.scale <= 0.0 {
        return Err(ChartError::degenerate_axis(format!(
            "non-positive scale {}",
            mapping.scale
        )));
    }
    if mapping.max <= mapping.min {
        return Err(ChartError::degenerate_axis(format!(
            "max {} does not exceed min {}",
            mapping.max, mapping.min
        )));
    }
    Ok(mapping)
}

/// Estimate the value axis of a vertical bar or line chart from the numeric
/// labels left of the plot area.
///
/// The label nearest the bottom-left corner and the label nearest the
/// top-left corner fix the scale; the mapping is then extrapolated to the
/// plot edges.
#[instrument(level = "debug", skip(tokens))]
pub fn estimate_y_axis(
    bounds: &PlotBounds,
    tokens: &[OcrToken],
    margin: f64,
) -> Result<AxisMapping> {
    let candidates =
        numeric_labels(tokens, |token| token.right() < bounds.left - margin).collect::<Vec<_>>();
    log::debug!("{} y-axis label candidate(s)", candidates.len());

    let (Some(bottom_label), Some(top_label)) = (
        nearest_to(&candidates, coord! { x: bounds.left, y: bounds.bottom }),
        nearest_to(&candidates, coord! { x: bounds.left, y: bounds.top }),
    ) else {
        return Err(ChartError::degenerate_axis(
            "no numeric labels left of the plot area",
        ));
    };

    let span = top_label.top - bottom_label.top;
    if span == 0.0 {
        return Err(ChartError::degenerate_axis(
            "top and bottom axis labels sit at the same height",
        ));
    }
    let scale = (bottom_label.value - top_label.value) / span;
    let min = top_label.value - scale * (bounds.bottom - top_label.center.y);
    let max = bottom_label.value + scale * (bottom_label.center.y - bounds.top);
    log::debug!("y axis: scale {scale}, range [{min}, {max}]");

    validated(AxisMapping { scale, min, max })
}

/// Estimate the value axis of a horizontal bar chart from the numeric labels
/// below the plot area. Needs `bounds.right`.
#[instrument(level = "debug", skip(tokens))]
pub fn estimate_x_axis(
    bounds: &PlotBounds,
    tokens: &[OcrToken],
    margin: f64,
) -> Result<AxisMapping> {
    let Some(right) = bounds.right else {
        return Err(ChartError::degenerate_axis(
            "plot bounds carry no right edge",
        ));
    };
    let candidates =
        numeric_labels(tokens, |token| token.top() > bounds.bottom + margin).collect::<Vec<_>>();
    log::debug!("{} x-axis label candidate(s)", candidates.len());

    let (Some(left_label), Some(right_label)) = (
        nearest_to(&candidates, coord! { x: bounds.left, y: bounds.bottom }),
        nearest_to(&candidates, coord! { x: right, y: bounds.bottom }),
    ) else {
        return Err(ChartError::degenerate_axis(
            "no numeric labels below the plot area",
        ));
    };

    let span = right_label.center.x - left_label.center.x;
    if span == 0.0 {
        return Err(ChartError::degenerate_axis(
            "left and right axis labels share a column",
        ));
    }
    let scale = (right_label.value - left_label.value) / span;
    let min = left_label.value - scale * (left_label.center.x - bounds.left);
    let max = right_label.value + scale * (right - right_label.center.x);
    log::debug!("x axis: scale {scale}, range [{min}, {max}]");

    validated(AxisMapping { scale, min, max })
}
