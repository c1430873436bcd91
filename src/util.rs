use std::f64::consts::TAU;

use float_ord::FloatOrd;
use geo::Coord;
use ndarray::ArrayView1;

/// Parse an axis label such as `1,000`, `45%`, `$20` or `−3.5` into a number.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_prefix(['$', '€', '£'])
        .unwrap_or(trimmed)
        .trim();
    let cleaned = trimmed
        .chars()
        .filter(|c| *c != ',')
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect::<String>();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Clockwise angle of `point` around `center` in image coordinates (y grows
/// downward), normalized to `[0, 2π)`.
pub fn clockwise_angle(center: Coord<f64>, point: Coord<f64>) -> f64 {
    normalize_angle((point.y - center.y).atan2(point.x - center.x))
}

pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Clockwise delta from angle `from` to angle `to`, in `[0, 2π)`.
pub fn clockwise_delta(from: f64, to: f64) -> f64 {
    normalize_angle(to - from)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|v| FloatOrd(*v));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn lexicographic_key(x: f64, y: f64) -> (FloatOrd<f64>, FloatOrd<f64>) {
    (FloatOrd(x), FloatOrd(y))
}

pub fn embedding_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    (&a - &b).mapv(|v| (v as f64).powi(2)).sum().sqrt()
}

/// Piecewise-linear interpolation over `(x, y)` pairs sorted by x. Returns
/// `None` outside the covered x range.
pub fn interpolate(points: &[(f64, f64)], u: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if u < first.0 || u > last.0 {
        return None;
    }
    let upper = points.partition_point(|(x, _)| *x < u);
    if upper == 0 {
        return Some(first.1);
    }
    let (x1, y1) = points[upper.min(points.len() - 1)];
    let (x0, y0) = points[upper - 1];
    if x1 == x0 || x1 == u {
        return Some(y1);
    }
    Some(y0 + (y1 - y0) * (u - x0) / (x1 - x0))
}

/// Like [`interpolate`] but extends the end segments linearly past the range.
pub fn extrapolate(points: &[(f64, f64)], u: f64) -> Option<f64> {
    match points {
        [] => None,
        [(_, y)] => Some(*y),
        _ => {
            if let Some(value) = interpolate(points, u) {
                return Some(value);
            }
            let ((x0, y0), (x1, y1)) = if u < points[0].0 {
                (points[0], points[1])
            } else {
                (points[points.len() - 2], points[points.len() - 1])
            };
            if x1 == x0 {
                Some(if u < x0 { y0 } else { y1 })
            } else {
                Some(y0 + (y1 - y0) * (u - x0) / (x1 - x0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::{FRAC_PI_2, PI};

    use approx::assert_relative_eq;
    use geo::coord;
    use ndarray::arr1;

    use super::*;

    #[test]
    fn parses_axis_labels() {
        assert_eq!(parse_numeric("100"), Some(100.0));
        assert_eq!(parse_numeric(" 1,250 "), Some(1250.0));
        assert_eq!(parse_numeric("45%"), Some(45.0));
        assert_eq!(parse_numeric("$20"), Some(20.0));
        assert_eq!(parse_numeric("\u{2212}3.5"), Some(-3.5));
        assert_eq!(parse_numeric("Q1"), None);
        assert_eq!(parse_numeric("%"), None);
        assert_eq!(parse_numeric(""), None);
    }

    #[test]
    fn angles_run_clockwise_on_screen() {
        let center = coord! { x: 0.0, y: 0.0 };
        assert_relative_eq!(clockwise_angle(center, coord! { x: 1.0, y: 0.0 }), 0.0);
        assert_relative_eq!(
            clockwise_angle(center, coord! { x: 0.0, y: 1.0 }),
            FRAC_PI_2
        );
        assert_relative_eq!(clockwise_angle(center, coord! { x: -1.0, y: 0.0 }), PI);
        assert_relative_eq!(
            clockwise_angle(center, coord! { x: 0.0, y: -1.0 }),
            3.0 * FRAC_PI_2
        );
        assert_relative_eq!(clockwise_delta(3.0 * FRAC_PI_2, 0.0), FRAC_PI_2);
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn interpolation_stays_in_range() {
        let points = [(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)];
        assert_eq!(interpolate(&points, 5.0), Some(5.0));
        assert_eq!(interpolate(&points, 10.0), Some(10.0));
        assert_eq!(interpolate(&points, 0.0), Some(0.0));
        assert_eq!(interpolate(&points, 20.0), Some(0.0));
        assert_eq!(interpolate(&points, 21.0), None);
        assert_eq!(extrapolate(&points, 30.0), Some(-10.0));
        assert_eq!(extrapolate(&points, -5.0), Some(-5.0));
    }

    #[test]
    fn embedding_distance_is_euclidean() {
        let a = arr1(&[0.0f32, 3.0]);
        let b = arr1(&[4.0f32, 0.0]);
        assert_relative_eq!(embedding_distance(a.view(), b.view()), 5.0);
        let c = arr1(&[1.0f32]);
        assert!(embedding_distance(a.view(), c.view()).is_infinite());
    }
}
