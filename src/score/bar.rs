use std::collections::BTreeMap;

use nalgebra::DMatrix;
use tracing::instrument;

use super::{degenerate, ScoreResult};
use crate::{assignment, Bar};

/// `diff / scale`, or 0/1 for an exact/inexact match against a zero scale.
fn relative(diff: f64, scale: f64) -> f64 {
    if scale > 0.0 {
        diff / scale
    } else if diff == 0.0 {
        0.0
    } else {
        1.0
    }
}

/// Cost of matching a predicted bar to a ground-truth bar, in `[0, 1]`.
pub fn bar_cost(predicted: &Bar, truth: &Bar) -> f64 {
    let cost = relative((predicted.x - truth.x).abs(), truth.width)
        + relative((predicted.y - truth.y).abs(), truth.height)
        + relative((predicted.height - truth.height).abs(), truth.height);
    if cost.is_nan() {
        1.0
    } else {
        cost.min(1.0)
    }
}

/// `1 - total / max(N, M)` over the cheapest one-to-one matching; every
/// unmatched bar costs 1.
#[instrument(level = "debug", skip_all, fields(predicted = predicted.len(), truth = truth.len()))]
pub fn bar_score(predicted: &[Bar], truth: &[Bar]) -> ScoreResult {
    if let Some(result) = degenerate(predicted.len(), truth.len()) {
        return result;
    }
    let costs = DMatrix::from_fn(predicted.len(), truth.len(), |i, j| {
        bar_cost(&predicted[i], &truth[j])
    });
    let matching = assignment::solve(&costs);
    let larger = predicted.len().max(truth.len());
    let unmatched = larger - matching.pairs.len();
    let total = matching.total + unmatched as f64;

    let per_item = (0..truth.len())
        .map(|j| {
            let credit = matching
                .row_for(j)
                .map_or(0.0, |i| 1.0 - costs[(i, j)]);
            (j, credit)
        })
        .collect::<BTreeMap<_, _>>();
    log::debug!("bar score: total cost {total} over {larger} bar(s)");
    ScoreResult::new(1.0 - total / larger as f64).with_items(per_item)
}
