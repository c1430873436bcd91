use std::collections::BTreeMap;

use float_ord::FloatOrd;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{degenerate, ScoreResult};
use crate::{assignment, util::interpolate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineMatch {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn sorted(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut points = points.to_vec();
    points.sort_by_key(|&(u, v)| (FloatOrd(u), FloatOrd(v)));
    points
}

/// Relative error of `v` against `reference` interpolated at `u`; 1 outside
/// the reference's x range.
fn point_error(v: f64, u: f64, reference: &[(f64, f64)]) -> f64 {
    let Some(estimate) = interpolate(reference, u) else {
        return 1.0;
    };
    let error = if v == 0.0 {
        if estimate == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        (v - estimate).abs() / v.abs()
    };
    if error.is_nan() {
        1.0
    } else {
        error.min(1.0)
    }
}

/// Half the x extent a point covers: the adjacent gap at either end, half of
/// both gaps inside.
fn interval(points: &[(f64, f64)], j: usize) -> f64 {
    let last = points.len() - 1;
    match j {
        0 => (points[1].0 - points[0].0) / 2.0,
        j if j == last => (points[last].0 - points[last - 1].0) / 2.0,
        j => (points[j + 1].0 - points[j - 1].0) / 2.0,
    }
}

/// How well `predicted` covers the points of `truth`, weighted by the x
/// extent of each truth point.
pub fn recall(predicted: &[(f64, f64)], truth: &[(f64, f64)]) -> f64 {
    let predicted = sorted(predicted);
    let truth = sorted(truth);
    let (Some(first), Some(last)) = (truth.first(), truth.last()) else {
        return 0.0;
    };
    let range = last.0 - first.0;
    if truth.len() == 1 || range <= 0.0 {
        let credit = truth
            .iter()
            .map(|&(u, v)| 1.0 - point_error(v, u, &predicted))
            .sum::<f64>();
        return credit / truth.len() as f64;
    }
    let credit = truth
        .iter()
        .enumerate()
        .map(|(j, &(u, v))| (1.0 - point_error(v, u, &predicted)) * interval(&truth, j))
        .sum::<f64>();
    credit / range
}

/// `recall` with the roles swapped.
pub fn precision(predicted: &[(f64, f64)], truth: &[(f64, f64)]) -> f64 {
    recall(truth, predicted)
}

pub fn line_f1(predicted: &[(f64, f64)], truth: &[(f64, f64)]) -> LineMatch {
    if let Some(result) = degenerate(predicted.len(), truth.len()) {
        return LineMatch {
            precision: result.value,
            recall: result.value,
            f1: result.value,
        };
    }
    let precision = precision(predicted, truth);
    let recall = recall(predicted, truth);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    LineMatch {
        precision,
        recall,
        f1,
    }
}

/// Pair predicted and ground-truth series to maximize the summed F1; the
/// score is that sum over the larger series count, so unmatched series
/// count as 0.
#[instrument(level = "debug", skip_all, fields(predicted = predicted.len(), truth = truth.len()))]
pub fn line_score(predicted: &[Vec<(f64, f64)>], truth: &[Vec<(f64, f64)>]) -> ScoreResult {
    if let Some(result) = degenerate(predicted.len(), truth.len()) {
        return result;
    }
    let f1 = DMatrix::from_fn(predicted.len(), truth.len(), |i, j| {
        line_f1(&predicted[i], &truth[j]).f1
    });
    let matching = assignment::solve(&f1.map(|f| 1.0 - f));

    let per_item = (0..truth.len())
        .map(|j| (j, matching.row_for(j).map_or(0.0, |i| f1[(i, j)])))
        .collect::<BTreeMap<_, _>>();
    let matched = matching
        .pairs
        .iter()
        .map(|&(i, j)| f1[(i, j)])
        .sum::<f64>();
    let larger = predicted.len().max(truth.len());
    log::debug!("line score: summed F1 {matched} over {larger} series");
    ScoreResult::new(matched / larger as f64).with_items(per_item)
}
