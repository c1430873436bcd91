use ndarray::Array2;
use tracing::instrument;

use super::{degenerate, ScoreResult};

/// Credit for aligning predicted share `x` with ground-truth share `y`.
fn match_credit(x: f64, y: f64) -> f64 {
    if y != 0.0 {
        1.0 - (x - y).abs() / y
    } else if x == 0.0 {
        1.0
    } else {
        f64::NEG_INFINITY
    }
}

/// Alignment table of two clockwise share sequences: entry `(i, j)` is the
/// best credit for aligning `predicted[..i]` with `truth[..j]`, where either
/// side may skip sectors at no credit.
pub fn pie_alignment_table(predicted: &[f64], truth: &[f64]) -> Array2<f64> {
    let (n, m) = (predicted.len(), truth.len());
    let mut table = Array2::<f64>::zeros((n + 1, m + 1));
    for i in 1..=n {
        for j in 1..=m {
            let diagonal = table[[i - 1, j - 1]] + match_credit(predicted[i - 1], truth[j - 1]);
            table[[i, j]] = table[[i - 1, j]].max(table[[i, j - 1]]).max(diagonal);
        }
    }
    table
}

/// Best alignment credit over the number of ground-truth sectors.
#[instrument(level = "debug", skip_all, fields(predicted = predicted.len(), truth = truth.len()))]
pub fn pie_score(predicted: &[f64], truth: &[f64]) -> ScoreResult {
    if let Some(result) = degenerate(predicted.len(), truth.len()) {
        return result;
    }
    let table = pie_alignment_table(predicted, truth);
    let best = table[[predicted.len(), truth.len()]];
    log::debug!("pie alignment credit {best} over {} sector(s)", truth.len());
    ScoreResult::new(best / truth.len() as f64)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn identical_shares_score_one() {
        assert_eq!(pie_score(&[30.0, 30.0, 40.0], &[30.0, 30.0, 40.0]).value, 1.0);
    }

    #[test]
    fn shifted_shares_lose_relative_error() {
        let result = pie_score(&[25.0, 35.0, 40.0], &[30.0, 30.0, 40.0]);
        assert_relative_eq!(
            result.value,
            1.0 - (5.0 / 30.0 + 5.0 / 30.0) / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn missing_sector_is_skipped() {
        let result = pie_score(&[30.0, 70.0], &[30.0, 30.0, 40.0]);
        // 30 aligns with 30, 70 with 40 for a quarter credit
        assert_relative_eq!(result.value, 1.25 / 3.0, epsilon = 1e-12);
        let result = pie_score(&[30.0, 40.0], &[30.0, 30.0, 40.0]);
        assert_relative_eq!(result.value, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn table_is_monotone() {
        let predicted = [10.0, 55.0, 5.0, 30.0];
        let truth = [20.0, 50.0, 30.0];
        let table = pie_alignment_table(&predicted, &truth);
        for i in 1..=predicted.len() {
            for j in 1..=truth.len() {
                assert!(table[[i, j]] >= table[[i - 1, j]]);
                assert!(table[[i, j]] >= table[[i, j - 1]]);
            }
        }
    }

    #[test]
    fn score_is_bounded() {
        for (predicted, truth) in [
            (vec![100.0], vec![1.0, 99.0]),
            (vec![0.0, 100.0], vec![0.0, 100.0]),
            (vec![50.0, 50.0], vec![0.0, 100.0]),
            (vec![1.0; 100], vec![50.0, 50.0]),
        ] {
            let value = pie_score(&predicted, &truth).value;
            assert!((0.0..=1.0).contains(&value), "{predicted:?} vs {truth:?}: {value}");
        }
    }

    #[test]
    fn empty_sides() {
        assert_eq!(pie_score(&[], &[]).value, 1.0);
        assert_eq!(pie_score(&[100.0], &[]).value, 0.0);
        assert_eq!(pie_score(&[], &[100.0]).value, 0.0);
    }
}
