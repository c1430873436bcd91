use std::{cmp::Reverse, collections::BTreeMap, collections::BTreeSet};

use float_ord::FloatOrd;
use ndarray::{Array1, Array2, Axis};
use tracing::instrument;

use crate::{
    util::{embedding_distance, extrapolate, lexicographic_key},
    ChartError, LineSeries, Point, PointKind, ReconstructionOptions, ReconstructionReport,
};

/// Scores how well a pivot point continues a candidate line.
///
/// `trajectory` holds the candidate line's points around the query point,
/// sorted by x. Higher is better. `None` means no score is available (the
/// scorer failed or timed out) and counts as a rejection.
pub trait Disambiguator: Send + Sync {
    fn score(&self, point: &Point, trajectory: &[Point]) -> Option<f64>;
}

impl<F> Disambiguator for F
where
    F: Fn(&Point, &[Point]) -> Option<f64> + Send + Sync,
{
    fn score(&self, point: &Point, trajectory: &[Point]) -> Option<f64> {
        self(point, trajectory)
    }
}

/// Geometric fallback scorer: `1 / (1 + |dy| / y_scale)` where `dy` is the
/// vertical gap between the point and the trajectory, extended linearly past
/// its ends.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryScorer {
    pub y_scale: f64,
}

impl Default for TrajectoryScorer {
    fn default() -> Self {
        Self { y_scale: 10.0 }
    }
}

impl Disambiguator for TrajectoryScorer {
    fn score(&self, point: &Point, trajectory: &[Point]) -> Option<f64> {
        let coords = trajectory.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>();
        let expected = extrapolate(&coords, point.x)?;
        Some(1.0 / (1.0 + (point.y - expected).abs() / self.y_scale))
    }
}

/// Disjoint-set forest over point indices.
#[derive(Debug, Clone)]
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        let (root, child) = match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Equal => {
                let (root, child) = (ra.min(rb), ra.max(rb));
                self.rank[root] += 1;
                (root, child)
            }
        };
        self.parent[child] = root;
        true
    }

    /// Members of each set, ascending, sets ordered by their smallest member.
    pub(crate) fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root = BTreeMap::<usize, Vec<usize>>::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        let mut groups = by_root.into_values().collect::<Vec<_>>();
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

/// Up to `window` points on each side of `x`, sorted by x.
fn local_trajectory(members: &[Point], x: f64, window: usize) -> Vec<Point> {
    let mut sorted = members.to_vec();
    sorted.sort_by_key(|p| lexicographic_key(p.x, p.y));
    let left = sorted.iter().filter(|p| p.x < x).collect::<Vec<_>>();
    let right = sorted.iter().filter(|p| p.x > x);
    left[left.len().saturating_sub(window)..]
        .iter()
        .copied()
        .chain(right.take(window))
        .cloned()
        .collect()
}

/// Pivot points with embeddings of a common dimension, plus the count of
/// points that cannot be clustered.
fn embedded_pivots(
    points: &[Point],
    options: &ReconstructionOptions,
    report: &mut ReconstructionReport,
) -> (Vec<Point>, Array2<f32>) {
    let pivots = points
        .iter()
        .filter(|p| p.kind == PointKind::Pivot)
        .filter(|p| {
            let keep = p.confidence >= options.min_confidence;
            if !keep {
                report.discarded_low_confidence += 1;
            }
            keep
        })
        .collect::<Vec<_>>();
    let dim = pivots
        .iter()
        .find_map(|p| p.embedding.as_ref().map(Vec::len))
        .unwrap_or(0);

    let mut kept = Vec::with_capacity(pivots.len());
    for pivot in pivots {
        match &pivot.embedding {
            Some(embedding) if embedding.len() == dim && dim > 0 => kept.push(pivot.clone()),
            _ => {
                log::warn!(
                    "pivot ({}, {}) has no usable embedding, leaving it out",
                    pivot.x,
                    pivot.y
                );
                report.orphan_points += 1;
            }
        }
    }

    let matrix = Array2::from_shape_fn((kept.len(), dim), |(i, k)| {
        kept[i].embedding.as_ref().map_or(0.0, |e| e[k])
    });
    (kept, matrix)
}

/// Points whose embedding neighbourhood falls apart into separate groups,
/// i.e. points sitting between two lines.
fn bridge_points(
    neighbours: &[Vec<usize>],
    embeddings: &Array2<f32>,
    max_distance: f64,
) -> Vec<bool> {
    neighbours
        .iter()
        .map(|near| {
            let mut groups = DisjointSet::new(near.len());
            for (k, &a) in near.iter().enumerate() {
                for (l, &b) in near.iter().enumerate().skip(k + 1) {
                    if embedding_distance(embeddings.row(a), embeddings.row(b)) < max_distance {
                        groups.union(k, l);
                    }
                }
            }
            groups.groups().len() > 1
        })
        .collect()
}

fn x_extent(pivots: &[Point], members: &[usize]) -> (f64, f64) {
    members.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
        (lo.min(pivots[i].x), hi.max(pivots[i].x))
    })
}

/// Split a cluster joined only through bridge points into the lines it
/// holds. A split is only taken when two resulting lines cover overlapping
/// x ranges, which a single line cannot do; a chain drifting through
/// embedding space stays whole.
fn split_crossing(
    members: &[usize],
    neighbours: &[Vec<usize>],
    bridges: &[bool],
    pivots: &[Point],
) -> Option<Vec<Vec<usize>>> {
    let inner = members
        .iter()
        .copied()
        .filter(|&i| !bridges[i])
        .collect::<Vec<_>>();
    if inner.len() == members.len() {
        return None;
    }
    let position = inner
        .iter()
        .enumerate()
        .map(|(k, &i)| (i, k))
        .collect::<BTreeMap<_, _>>();
    let mut sets = DisjointSet::new(inner.len());
    for (k, &i) in inner.iter().enumerate() {
        for l in neighbours[i].iter().filter_map(|j| position.get(j)) {
            sets.union(k, *l);
        }
    }
    let parts = sets
        .groups()
        .into_iter()
        .map(|group| group.into_iter().map(|k| inner[k]).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let extents = parts
        .iter()
        .filter(|part| part.len() >= 2)
        .map(|part| x_extent(pivots, part))
        .collect::<Vec<_>>();
    let overlapping = extents.iter().enumerate().any(|(a, &(lo, hi))| {
        extents[a + 1..]
            .iter()
            .any(|&(other_lo, other_hi)| lo < other_hi && other_lo < hi)
    });
    overlapping.then_some(parts)
}

/// Partition pivot points into ordered line series.
///
/// Points whose embeddings are closer than `line_max_embedding_distance`
/// are linked with a disjoint-set forest, so clusters are transitive and do
/// not depend on input order. A cluster held together only by a few bridge
/// points (an intersection seen once by the detector) is split when it
/// contains two lines over the same x range; the bridge points, and any
/// point near several line centroids, are handed to the `disambiguator`,
/// which picks the line they continue best.
#[instrument(level = "debug", skip(points, disambiguator, options))]
pub fn cluster_lines(
    points: &[Point],
    disambiguator: &dyn Disambiguator,
    options: &ReconstructionOptions,
) -> (Vec<LineSeries>, ReconstructionReport) {
    let mut report = ReconstructionReport::default();
    let (pivots, embeddings) = embedded_pivots(points, options, &mut report);
    let max_distance = options.line_max_embedding_distance;
    let n = pivots.len();

    let neighbours = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| {
                    j != i
                        && embedding_distance(embeddings.row(i), embeddings.row(j)) < max_distance
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut sets = DisjointSet::new(n);
    for i in 0..n {
        for &j in neighbours[i].iter().filter(|&&j| j > i) {
            sets.union(i, j);
        }
    }

    let bridges = bridge_points(&neighbours, &embeddings, max_distance);
    let mut crossings = vec![false; n];
    let mut clusters = Vec::new();
    for members in sets.groups() {
        match split_crossing(&members, &neighbours, &bridges, &pivots) {
            Some(parts) => {
                for &i in members.iter().filter(|&&i| bridges[i]) {
                    crossings[i] = true;
                }
                log::debug!(
                    "split a cluster of {} point(s) into {} line(s) at crossing points",
                    members.len(),
                    parts.len()
                );
                clusters.extend(parts);
            }
            None => clusters.push(members),
        }
    }
    let cluster_of = {
        let mut cluster_of = vec![None; n];
        for (c, members) in clusters.iter().enumerate() {
            for &i in members {
                cluster_of[i] = Some(c);
            }
        }
        cluster_of
    };
    let centroids = clusters
        .iter()
        .map(|members| embeddings.select(Axis(0), members).mean_axis(Axis(0)))
        .collect::<Vec<Option<Array1<f32>>>>();
    let centroid_distance = |i: usize, c: usize| {
        centroids[c]
            .as_ref()
            .map_or(f64::INFINITY, |centroid| {
                embedding_distance(embeddings.row(i), centroid.view())
            })
    };
    log::debug!(
        "{} cluster(s) from {n} pivot(s), {} crossing point(s)",
        clusters.len(),
        crossings.iter().filter(|c| **c).count()
    );

    // candidate lines of every point
    let candidates = (0..n)
        .map(|i| {
            let mut set = BTreeSet::new();
            set.extend(cluster_of[i]);
            if crossings[i] {
                set.extend(neighbours[i].iter().filter_map(|&j| cluster_of[j]));
            }
            set.extend((0..clusters.len()).filter(|&c| centroid_distance(i, c) < max_distance));
            set
        })
        .collect::<Vec<_>>();
    let ambiguous = candidates.iter().map(|set| set.len() > 1).collect::<Vec<_>>();
    // leftmost settled point of each cluster, the order-independent tie-break
    let anchors = clusters
        .iter()
        .map(|members| {
            let settled = members
                .iter()
                .filter(|&&j| !ambiguous[j])
                .map(|&j| lexicographic_key(pivots[j].x, pivots[j].y))
                .min();
            settled.or_else(|| {
                members
                    .iter()
                    .map(|&j| lexicographic_key(pivots[j].x, pivots[j].y))
                    .min()
            })
        })
        .collect::<Vec<_>>();

    let mut assigned = vec![None; n];
    for i in 0..n {
        if candidates[i].is_empty() {
            log::warn!(
                "point ({}, {}) is close to no line, leaving it out",
                pivots[i].x,
                pivots[i].y
            );
            report.orphan_points += 1;
            continue;
        }
        if !ambiguous[i] {
            assigned[i] = candidates[i].first().copied();
            continue;
        }
        let point = &pivots[i];
        let best = candidates[i]
            .iter()
            .filter_map(|&c| {
                let members = clusters[c]
                    .iter()
                    .filter(|&&j| !ambiguous[j])
                    .map(|&j| pivots[j].clone())
                    .collect::<Vec<_>>();
                let trajectory = local_trajectory(&members, point.x, options.trajectory_window);
                let score = disambiguator.score(point, &trajectory);
                log::trace!("point ({}, {}) vs line {c}: {score:?}", point.x, point.y);
                score
                    .filter(|s| *s >= options.acceptance_threshold)
                    .map(|s| (c, s))
            })
            .max_by_key(|&(c, score)| {
                (
                    FloatOrd(score),
                    Reverse(FloatOrd(centroid_distance(i, c))),
                    Reverse(anchors[c]),
                )
            });
        match best {
            Some((c, score)) => {
                log::debug!(
                    "intersection point ({}, {}) assigned to line {c} (score {score})",
                    point.x,
                    point.y
                );
                assigned[i] = Some(c);
            }
            None => {
                log::warn!(
                    "point ({}, {}) rejected by every candidate line",
                    point.x,
                    point.y
                );
                report.orphan_points += 1;
            }
        }
    }

    let mut series = Vec::new();
    for (c, _) in clusters.iter().enumerate() {
        let mut members = (0..n)
            .filter(|&i| assigned[i] == Some(c))
            .map(|i| pivots[i].clone())
            .collect::<Vec<_>>();
        members.sort_by_key(|p| (FloatOrd(p.x), Reverse(FloatOrd(p.confidence)), FloatOrd(p.y)));
        let before = members.len();
        members.dedup_by(|later, kept| later.x == kept.x);
        if members.len() < before {
            log::debug!("line {c}: dropped {} point(s) sharing an x", before - members.len());
            report.duplicate_x_points += before - members.len();
        }

        if members.len() < 2 {
            let err = ChartError::InsufficientPoints {
                series: c,
                count: members.len(),
            };
            log::warn!("dropping cluster: {err}");
            report.undersized_series += 1;
            continue;
        }
        series.push(LineSeries {
            ordered_points: members,
        });
    }

    series.sort_by_key(|s| {
        let first = &s.ordered_points[0];
        lexicographic_key(first.x, first.y)
    });
    log::debug!("clustered {} line(s)", series.len());
    (series, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pivot(x: f64, y: f64, embedding: f32) -> Point {
        Point::new(x, y, PointKind::Pivot).with_embedding(vec![embedding])
    }

    fn ys(series: &LineSeries) -> Vec<f64> {
        series.ordered_points.iter().map(|p| p.y).collect()
    }

    fn crossing_lines(intersection_y: f64) -> Vec<Point> {
        vec![
            pivot(0.0, 0.0, 0.0),
            pivot(10.0, 10.0, 0.05),
            pivot(30.0, 30.0, 0.0),
            pivot(40.0, 40.0, 0.02),
            pivot(0.0, 44.0, 0.9),
            pivot(10.0, 34.0, 0.92),
            pivot(30.0, 14.0, 0.9),
            pivot(40.0, 4.0, 0.93),
            // close to both lines
            pivot(20.0, intersection_y, 0.45),
        ]
    }

    #[test]
    fn disjoint_set_merges_transitively() {
        let mut sets = DisjointSet::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(sets.union(1, 3));
        assert!(!sets.union(0, 4));
        assert_eq!(sets.find(0), sets.find(4));
        assert_ne!(sets.find(2), sets.find(0));
        assert_eq!(sets.groups(), vec![vec![0, 1, 3, 4], vec![2]]);
    }

    #[test]
    fn separates_lines_by_embedding() {
        let points = vec![
            pivot(20.0, 5.0, 0.0),
            pivot(0.0, 1.0, 0.1),
            pivot(10.0, 3.0, 0.05),
            pivot(0.0, 50.0, 2.0),
            pivot(10.0, 40.0, 2.1),
        ];
        let (series, report) =
            cluster_lines(&points, &TrajectoryScorer::default(), &ReconstructionOptions::default());
        assert_eq!(series.len(), 2);
        assert_eq!(ys(&series[0]), vec![1.0, 3.0, 5.0]);
        assert_eq!(ys(&series[1]), vec![50.0, 40.0]);
        assert!(report.is_clean());
    }

    #[test]
    fn clusters_do_not_depend_on_input_order() {
        let points = crossing_lines(21.0);
        let options = ReconstructionOptions::default();
        let (expected, _) = cluster_lines(&points, &TrajectoryScorer::default(), &options);
        let reversed = points.iter().rev().cloned().collect::<Vec<_>>();
        let (series, _) = cluster_lines(&reversed, &TrajectoryScorer::default(), &options);
        assert_eq!(series, expected);
    }

    #[test]
    fn intersection_goes_to_the_best_continuation() {
        let (series, report) = cluster_lines(
            &crossing_lines(21.0),
            &TrajectoryScorer::default(),
            &ReconstructionOptions::default(),
        );
        assert_eq!(series.len(), 2);
        assert_eq!(ys(&series[0]), vec![0.0, 10.0, 21.0, 30.0, 40.0]);
        assert_eq!(ys(&series[1]), vec![44.0, 34.0, 14.0, 4.0]);
        assert_eq!(report.orphan_points, 0);
    }

    #[test]
    fn stub_scorer_decides_the_intersection() {
        let prefer_falling = |_: &Point, trajectory: &[Point]| {
            let falling = trajectory.first()?.y > trajectory.last()?.y;
            Some(if falling { 0.9 } else { 0.6 })
        };
        let (series, _) = cluster_lines(
            &crossing_lines(21.0),
            &prefer_falling,
            &ReconstructionOptions::default(),
        );
        assert_eq!(ys(&series[0]), vec![0.0, 10.0, 30.0, 40.0]);
        assert_eq!(ys(&series[1]), vec![44.0, 34.0, 21.0, 14.0, 4.0]);
    }

    #[test]
    fn unavailable_scores_orphan_the_point() {
        let unavailable = |_: &Point, _: &[Point]| -> Option<f64> { None };
        let (series, report) = cluster_lines(
            &crossing_lines(21.0),
            &unavailable,
            &ReconstructionOptions::default(),
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.iter().map(LineSeries::len).sum::<usize>(), 8);
        assert_eq!(report.orphan_points, 1);
    }

    #[test]
    fn low_scores_orphan_the_point() {
        let (series, report) = cluster_lines(
            &crossing_lines(80.0),
            &TrajectoryScorer::default(),
            &ReconstructionOptions::default(),
        );
        assert_eq!(series.iter().map(LineSeries::len).sum::<usize>(), 8);
        assert_eq!(report.orphan_points, 1);
    }

    #[test]
    fn shared_x_keeps_the_confident_point() {
        let points = vec![
            pivot(0.0, 0.0, 0.0),
            pivot(10.0, 10.0, 0.0).with_confidence(0.6),
            pivot(10.0, 12.0, 0.0).with_confidence(0.9),
            pivot(20.0, 20.0, 0.0),
        ];
        let (series, report) =
            cluster_lines(&points, &TrajectoryScorer::default(), &ReconstructionOptions::default());
        assert_eq!(ys(&series[0]), vec![0.0, 12.0, 20.0]);
        assert_eq!(report.duplicate_x_points, 1);
    }

    #[test]
    fn single_point_cluster_is_dropped() {
        let points = vec![pivot(0.0, 0.0, 0.0), pivot(10.0, 5.0, 0.0), pivot(5.0, 90.0, 9.0)];
        let (series, report) =
            cluster_lines(&points, &TrajectoryScorer::default(), &ReconstructionOptions::default());
        assert_eq!(series.len(), 1);
        assert_eq!(report.undersized_series, 1);
    }

    #[test]
    fn missing_embeddings_are_orphans() {
        let points = vec![
            pivot(0.0, 0.0, 0.0),
            pivot(10.0, 5.0, 0.0),
            Point::new(20.0, 7.0, PointKind::Pivot),
        ];
        let (series, report) =
            cluster_lines(&points, &TrajectoryScorer::default(), &ReconstructionOptions::default());
        assert_eq!(series.len(), 1);
        assert_eq!(report.orphan_points, 1);
    }

    #[test]
    fn drifting_embeddings_stay_one_line() {
        let points = [0.0, 0.3, 0.6, 0.9, 1.2]
            .iter()
            .enumerate()
            .map(|(i, &e)| pivot(i as f64 * 10.0, i as f64 * 10.0, e))
            .collect::<Vec<_>>();
        let options = ReconstructionOptions::default();
        let (series, report) = cluster_lines(&points, &TrajectoryScorer::default(), &options);
        assert_eq!(series.len(), 1);
        assert_eq!(ys(&series[0]), vec![0.0, 10.0, 20.0, 30.0, 40.0]);
        assert!(report.is_clean());

        let reversed = points.iter().rev().cloned().collect::<Vec<_>>();
        let (again, _) = cluster_lines(&reversed, &TrajectoryScorer::default(), &options);
        assert_eq!(again, series);
    }

    #[test]
    fn point_near_no_line_is_counted_as_orphan() {
        let points = vec![
            pivot(0.0, 0.0, 0.0),
            pivot(10.0, 10.0, 0.02),
            pivot(30.0, 30.0, 0.0),
            pivot(40.0, 40.0, 0.02),
            pivot(0.0, 44.0, 1.5),
            pivot(10.0, 34.0, 1.52),
            pivot(30.0, 14.0, 1.5),
            pivot(40.0, 4.0, 1.52),
            // a chain of crossing points; the middle one is far from both
            // line centroids
            pivot(15.0, 15.0, 0.4),
            pivot(20.0, 22.0, 0.75),
            pivot(25.0, 19.0, 1.1),
        ];
        let (series, report) =
            cluster_lines(&points, &TrajectoryScorer::default(), &ReconstructionOptions::default());
        assert_eq!(series.len(), 2);
        assert_eq!(ys(&series[0]), vec![0.0, 10.0, 15.0, 30.0, 40.0]);
        assert_eq!(ys(&series[1]), vec![44.0, 34.0, 19.0, 14.0, 4.0]);
        assert_eq!(report.orphan_points, 1);
    }

    #[test]
    fn full_ties_resolve_independently_of_order() {
        let points = vec![
            pivot(0.0, 0.0, 0.0),
            pivot(10.0, 10.0, 0.0),
            pivot(30.0, 30.0, 0.0),
            pivot(40.0, 40.0, 0.0),
            pivot(0.0, 44.0, 0.5),
            pivot(10.0, 34.0, 0.5),
            pivot(30.0, 14.0, 0.5),
            pivot(40.0, 4.0, 0.5),
            pivot(20.0, 22.0, 0.25),
        ];
        let indifferent = |_: &Point, _: &[Point]| -> Option<f64> { Some(1.0) };
        let options = ReconstructionOptions::default();
        let (series, _) = cluster_lines(&points, &indifferent, &options);
        assert_eq!(ys(&series[0]), vec![0.0, 10.0, 22.0, 30.0, 40.0]);
        assert_eq!(series[1].len(), 4);

        let reversed = points.iter().rev().cloned().collect::<Vec<_>>();
        let (again, _) = cluster_lines(&reversed, &indifferent, &options);
        assert_eq!(again, series);
    }

    #[test]
    fn trajectory_window_is_local() {
        let members = (0..10)
            .map(|i| Point::new(i as f64 * 10.0, 0.0, PointKind::Pivot))
            .collect::<Vec<_>>();
        let window = local_trajectory(&members, 45.0, 2);
        let xs = window.iter().map(|p| p.x).collect::<Vec<_>>();
        assert_eq!(xs, vec![30.0, 40.0, 50.0, 60.0]);
    }
}
