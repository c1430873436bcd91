//! Similarity between a reconstructed chart and its ground truth.
//!
//! Every score lies in `[0, 1]`. Two empty inputs score 1, an empty input
//! against a non-empty one scores 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod accumulator;
mod bar;
mod line;
mod pie;

pub use accumulator::{KindSummary, ScoreAccumulator};
pub use bar::{bar_cost, bar_score};
pub use line::{line_f1, line_score, precision, recall, LineMatch};
pub use pie::{pie_alignment_table, pie_score};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub value: f64,
    /// Per ground-truth item breakdown, keyed by ground-truth index.
    pub per_item: Option<BTreeMap<usize, f64>>,
}

impl ScoreResult {
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            per_item: None,
        }
    }

    pub fn with_items(mut self, per_item: BTreeMap<usize, f64>) -> Self {
        self.per_item = Some(per_item);
        self
    }
}

/// Score for inputs where at least one side is empty.
fn degenerate(predicted: usize, ground_truth: usize) -> Option<ScoreResult> {
    match (predicted, ground_truth) {
        (0, 0) => Some(ScoreResult::new(1.0)),
        (0, _) | (_, 0) => Some(ScoreResult::new(0.0)),
        _ => None,
    }
}
