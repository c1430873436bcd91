use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{bar_score, line_score, pie_score, ScoreResult};
use crate::{Bar, ChartKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct Totals {
    sum: f64,
    count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: ChartKind,
    pub count: usize,
    pub mean: f64,
}

/// Dataset-level running scores, kept per chart kind.
///
/// Each worker owns one accumulator; [`merge`](Self::merge) combines them,
/// so batch scoring can run as a rayon fold/reduce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreAccumulator {
    totals: BTreeMap<ChartKind, Totals>,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: ChartKind, result: &ScoreResult) {
        let totals = self.totals.entry(kind).or_default();
        totals.sum += result.value;
        totals.count += 1;
    }

    pub fn score_bars(&mut self, predicted: &[Bar], truth: &[Bar]) -> ScoreResult {
        let result = bar_score(predicted, truth);
        self.record(ChartKind::Bar, &result);
        result
    }

    pub fn score_lines(
        &mut self,
        predicted: &[Vec<(f64, f64)>],
        truth: &[Vec<(f64, f64)>],
    ) -> ScoreResult {
        let result = line_score(predicted, truth);
        self.record(ChartKind::Line, &result);
        result
    }

    pub fn score_pies(&mut self, predicted: &[f64], truth: &[f64]) -> ScoreResult {
        let result = pie_score(predicted, truth);
        self.record(ChartKind::Pie, &result);
        result
    }

    pub fn merge(mut self, other: ScoreAccumulator) -> Self {
        for (kind, totals) in other.totals {
            let entry = self.totals.entry(kind).or_default();
            entry.sum += totals.sum;
            entry.count += totals.count;
        }
        self
    }

    pub fn count(&self, kind: ChartKind) -> usize {
        self.totals.get(&kind).map_or(0, |t| t.count)
    }

    pub fn mean(&self, kind: ChartKind) -> Option<f64> {
        self.totals
            .get(&kind)
            .filter(|t| t.count > 0)
            .map(|t| t.sum / t.count as f64)
    }

    /// Mean over every recorded chart regardless of kind.
    pub fn overall_mean(&self) -> Option<f64> {
        let (sum, count) = self
            .totals
            .values()
            .fold((0.0, 0), |(sum, count), t| (sum + t.sum, count + t.count));
        (count > 0).then(|| sum / count as f64)
    }

    pub fn summary(&self) -> Vec<KindSummary> {
        self.totals
            .iter()
            .filter(|(_, t)| t.count > 0)
            .map(|(&kind, t)| KindSummary {
                kind,
                count: t.count,
                mean: t.sum / t.count as f64,
            })
            .collect()
    }
}
