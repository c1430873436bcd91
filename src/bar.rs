use float_ord::FloatOrd;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    assignment,
    util::lexicographic_key,
    Bar, ChartError, Orientation, Point, PointKind, ReconstructionOptions, ReconstructionReport,
    Result,
};

/// Weights of the corner distance `gamma * |dx| + nu * |dy|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerWeights {
    pub gamma: f64,
    pub nu: f64,
}

impl CornerWeights {
    pub fn distance(&self, top_left: &Point, bottom_right: &Point) -> f64 {
        self.gamma * (top_left.x - bottom_right.x).abs()
            + self.nu * (top_left.y - bottom_right.y).abs()
    }
}

impl Bar {
    /// Box spanned by a top-left and a bottom-right corner.
    pub fn from_corners(top_left: &Point, bottom_right: &Point) -> Result<Self> {
        let width = bottom_right.x - top_left.x;
        let height = bottom_right.y - top_left.y;
        if width <= 0.0 || height <= 0.0 {
            return Err(ChartError::InvalidBox { width, height });
        }
        Ok(Bar::new(top_left.x, top_left.y, width, height))
    }
}

fn corners(
    points: &[Point],
    kind: PointKind,
    min_confidence: f64,
    report: &mut ReconstructionReport,
) -> Vec<Point> {
    let mut corners = points
        .iter()
        .filter(|p| p.kind == kind)
        .filter(|p| {
            let keep = p.confidence >= min_confidence;
            if !keep {
                report.discarded_low_confidence += 1;
            }
            keep
        })
        .cloned()
        .collect::<Vec<_>>();
    corners.sort_by_key(|p| lexicographic_key(p.x, p.y));
    corners
}

/// Pair top-left and bottom-right corners into bars.
///
/// Pairing is a minimum-weight bipartite matching over the weighted corner
/// distance. Corners are sorted by `(x, y)` first, so the result does not
/// depend on input order. Top-left corners left without a partner within
/// `max_pair_distance`, and pairs that do not span a positive box, are
/// dropped and counted in the report.
#[instrument(level = "debug", skip(points, options))]
pub fn reconstruct_bars(
    points: &[Point],
    orientation: Orientation,
    options: &ReconstructionOptions,
) -> (Vec<Bar>, ReconstructionReport) {
    let mut report = ReconstructionReport::default();
    let top_left = corners(
        points,
        PointKind::TopLeft,
        options.min_confidence,
        &mut report,
    );
    let bottom_right = corners(
        points,
        PointKind::BottomRight,
        options.min_confidence,
        &mut report,
    );
    log::debug!(
        "pairing {} top-left with {} bottom-right corner(s)",
        top_left.len(),
        bottom_right.len()
    );

    if bottom_right.is_empty() {
        report.unmatched_corners = top_left.len();
        return (Vec::new(), report);
    }

    let weights = options.corner_weights(orientation);
    let max_distance = options.max_pair_distance.unwrap_or(f64::INFINITY);
    let distances = DMatrix::from_fn(top_left.len(), bottom_right.len(), |i, j| {
        weights.distance(&top_left[i], &bottom_right[j])
    });
    // out-of-range pairs stay admissible for the solver, but at a price
    // above any combination of in-range ones
    let infeasible = if max_distance.is_finite() {
        max_distance * (top_left.len() + bottom_right.len() + 1) as f64
    } else {
        f64::INFINITY
    };
    let costs = distances.map(|d| if d > max_distance { infeasible } else { d });
    let matching = assignment::solve(&costs);

    let mut bars = Vec::with_capacity(top_left.len());
    for (i, tl) in top_left.iter().enumerate() {
        let Some(j) = matching.column_for(i) else {
            log::debug!("top-left ({}, {}) has no bottom-right partner", tl.x, tl.y);
            report.unmatched_corners += 1;
            continue;
        };
        if distances[(i, j)] > max_distance {
            log::debug!(
                "top-left ({}, {}) nearest partner is {} away",
                tl.x,
                tl.y,
                distances[(i, j)]
            );
            report.unmatched_corners += 1;
            continue;
        }
        match Bar::from_corners(tl, &bottom_right[j]) {
            Ok(bar) => bars.push(bar),
            Err(err) => {
                log::warn!("dropping bar at ({}, {}): {err}", tl.x, tl.y);
                report.invalid_boxes += 1;
            }
        }
    }

    match orientation {
        Orientation::Vertical => bars.sort_by_key(|b| (FloatOrd(b.x), FloatOrd(b.y))),
        Orientation::Horizontal => bars.sort_by_key(|b| (FloatOrd(b.y), FloatOrd(b.x))),
    }
    log::debug!("reconstructed {} bar(s)", bars.len());
    (bars, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tl(x: f64, y: f64) -> Point {
        Point::new(x, y, PointKind::TopLeft)
    }

    fn br(x: f64, y: f64) -> Point {
        Point::new(x, y, PointKind::BottomRight)
    }

    #[test]
    fn pairs_two_vertical_bars() {
        let points = vec![tl(10.0, 50.0), br(30.0, 200.0), tl(40.0, 120.0), br(60.0, 200.0)];
        let (bars, report) = reconstruct_bars(
            &points,
            Orientation::Vertical,
            &ReconstructionOptions::default(),
        );
        assert_eq!(
            bars,
            vec![
                Bar::new(10.0, 50.0, 20.0, 150.0),
                Bar::new(40.0, 120.0, 20.0, 80.0)
            ]
        );
        assert!(report.is_clean());
    }

    #[test]
    fn pairing_ignores_input_order() {
        let points = vec![tl(10.0, 50.0), tl(40.0, 120.0), br(30.0, 200.0), br(60.0, 200.0)];
        let options = ReconstructionOptions::default();
        let (expected, _) = reconstruct_bars(&points, Orientation::Vertical, &options);
        let reversed = points.iter().rev().cloned().collect::<Vec<_>>();
        let (bars, _) = reconstruct_bars(&reversed, Orientation::Vertical, &options);
        assert_eq!(bars, expected);
    }

    #[test]
    fn matching_avoids_double_assignment() {
        // greedy nearest-neighbour would give both top-left corners the first
        // bottom-right corner
        let points = vec![tl(10.0, 50.0), tl(14.0, 60.0), br(30.0, 200.0), br(60.0, 200.0)];
        let (bars, report) = reconstruct_bars(
            &points,
            Orientation::Vertical,
            &ReconstructionOptions::default(),
        );
        assert_eq!(bars.len(), 2);
        assert_eq!(report.unmatched_corners, 0);
    }

    #[test]
    fn distant_corner_is_reported_not_paired() {
        let options = ReconstructionOptions {
            max_pair_distance: Some(100.0),
            ..Default::default()
        };
        let points = vec![tl(10.0, 50.0), br(30.0, 100.0), tl(500.0, 50.0)];
        let (bars, report) = reconstruct_bars(&points, Orientation::Vertical, &options);
        assert_eq!(bars, vec![Bar::new(10.0, 50.0, 20.0, 50.0)]);
        assert_eq!(report.unmatched_corners, 1);
    }

    #[test]
    fn inverted_box_is_dropped() {
        let points = vec![tl(30.0, 50.0), br(10.0, 100.0)];
        let (bars, report) = reconstruct_bars(
            &points,
            Orientation::Vertical,
            &ReconstructionOptions::default(),
        );
        assert!(bars.is_empty());
        assert_eq!(report.invalid_boxes, 1);
    }

    #[test]
    fn low_confidence_corners_are_discarded() {
        let points = vec![
            tl(10.0, 50.0),
            br(30.0, 100.0),
            tl(12.0, 52.0).with_confidence(0.1),
        ];
        let (bars, report) = reconstruct_bars(
            &points,
            Orientation::Vertical,
            &ReconstructionOptions::default(),
        );
        assert_eq!(bars.len(), 1);
        assert_eq!(report.discarded_low_confidence, 1);
        assert_eq!(report.unmatched_corners, 0);
    }

    #[test]
    fn horizontal_bars_sort_top_to_bottom() {
        let points = vec![tl(100.0, 60.0), br(180.0, 80.0), tl(100.0, 20.0), br(250.0, 40.0)];
        let (bars, _) = reconstruct_bars(
            &points,
            Orientation::Horizontal,
            &ReconstructionOptions::default(),
        );
        assert_eq!(
            bars,
            vec![
                Bar::new(100.0, 20.0, 150.0, 20.0),
                Bar::new(100.0, 60.0, 80.0, 20.0)
            ]
        );
    }

    #[test]
    fn inverted_corners_report_invalid_box() {
        let err = Bar::from_corners(&tl(10.0, 10.0), &br(10.0, 20.0)).unwrap_err();
        assert!(matches!(err, ChartError::InvalidBox { width, .. } if width == 0.0));
    }
}
