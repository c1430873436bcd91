//! Rectangular minimum-cost assignment (Kuhn-Munkres with row/column
//! potentials), shared by bar pairing and the bar and line scores.

use nalgebra::DMatrix;
use tracing::instrument;

/// Stand-in for non-finite costs.
const PENALTY: f64 = 1e12;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// `(row, column)` pairs, sorted by row.
    pub pairs: Vec<(usize, usize)>,
    /// Sum of the matched costs.
    pub total: f64,
}

impl Assignment {
    pub fn column_for(&self, row: usize) -> Option<usize> {
        self.pairs.iter().find(|(r, _)| *r == row).map(|(_, c)| *c)
    }

    pub fn row_for(&self, column: usize) -> Option<usize> {
        self.pairs.iter().find(|(_, c)| *c == column).map(|(r, _)| *r)
    }
}

/// Solve the assignment for an `n x m` cost matrix. Every row is matched when
/// `n <= m`, every column otherwise.
#[instrument(level = "trace", skip(costs), fields(rows = costs.nrows(), cols = costs.ncols()))]
pub fn solve(costs: &DMatrix<f64>) -> Assignment {
    if costs.nrows() == 0 || costs.ncols() == 0 {
        return Assignment::default();
    }
    let sanitized = costs.map(|c| if c.is_finite() { c } else { PENALTY });
    let transposed = sanitized.nrows() > sanitized.ncols();
    let matrix = if transposed {
        sanitized.transpose()
    } else {
        sanitized
    };

    let mut pairs = hungarian(&matrix)
        .into_iter()
        .map(|(r, c)| if transposed { (c, r) } else { (r, c) })
        .collect::<Vec<_>>();
    pairs.sort_unstable();

    let total = pairs.iter().map(|&(r, c)| costs[(r, c)]).sum();
    Assignment { pairs, total }
}

/// Kuhn-Munkres for `n <= m`, 1-based internally with a virtual column 0.
fn hungarian(a: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let (n, m) = (a.nrows(), a.ncols());
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    // p[j]: row matched to column j (0 = free)
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = a[(i0 - 1, j - 1)] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=m)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .collect()
}
