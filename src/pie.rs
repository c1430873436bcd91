use std::f64::consts::TAU;

use float_ord::FloatOrd;
use tracing::instrument;

use crate::{
    util::{clockwise_angle, clockwise_delta, median},
    Point, PointKind, ReconstructionOptions, ReconstructionReport, Sector,
};

/// A sector proposed around one center, with angles measured around it.
#[derive(Debug, Clone)]
struct Candidate {
    center: usize,
    start: usize,
    end: usize,
    start_angle: f64,
    sweep: f64,
}

impl Candidate {
    fn bisector(&self) -> f64 {
        (self.start_angle + self.sweep / 2.0).rem_euclid(TAU)
    }

    fn end_angle(&self) -> f64 {
        (self.start_angle + self.sweep).rem_euclid(TAU)
    }

    /// Whether `angle` lies inside the clockwise span, `margin` away from both
    /// boundaries.
    fn strictly_contains(&self, angle: f64, margin: f64) -> bool {
        let delta = clockwise_delta(self.start_angle, angle);
        delta > margin && delta < self.sweep - margin
    }
}

fn angular_gap(a: f64, b: f64) -> f64 {
    let delta = clockwise_delta(a, b);
    delta.min(TAU - delta)
}

fn keypoints(
    points: &[Point],
    kind: PointKind,
    min_confidence: f64,
    report: &mut ReconstructionReport,
) -> Vec<Point> {
    let (kept, dropped): (Vec<_>, Vec<_>) = points
        .iter()
        .filter(|p| p.kind == kind)
        .partition(|p| p.confidence >= min_confidence);
    report.discarded_low_confidence += dropped.len();
    kept.into_iter().cloned().collect()
}

/// Combine pie centers and arc points into clockwise-ordered sectors.
///
/// With one center every arc point belongs to it and consecutive points
/// bound a sector, closing the loop. Exploded pies carry one center per
/// detached slice; sectors are then built per center from the arc points
/// lying on the common radius.
#[instrument(level = "debug", skip(points, options))]
pub fn combine_sectors(
    points: &[Point],
    options: &ReconstructionOptions,
) -> (Vec<Sector>, ReconstructionReport) {
    let mut report = ReconstructionReport::default();
    let centers = keypoints(points, PointKind::Center, options.min_confidence, &mut report);
    let arcs = keypoints(points, PointKind::Arc, options.min_confidence, &mut report);
    log::debug!("{} center(s), {} arc point(s)", centers.len(), arcs.len());

    let sectors = match centers.as_slice() {
        [] => {
            log::warn!("pie chart without a detected center");
            Vec::new()
        }
        [center] => single_center(center, &arcs, options, &mut report),
        _ => multi_center(&centers, &arcs, options, &mut report),
    };
    if !arcs.is_empty() && !centers.is_empty() {
        let covered = sectors.iter().map(|s| s.sweep).sum::<f64>();
        report.coverage_percent = Some(covered / TAU * 100.0);
    }
    (sectors, report)
}

#[instrument(level = "trace", skip_all)]
fn single_center(
    center: &Point,
    arcs: &[Point],
    options: &ReconstructionOptions,
    report: &mut ReconstructionReport,
) -> Vec<Sector> {
    let mut ordered = arcs
        .iter()
        .map(|arc| {
            let angle = clockwise_angle(center.coord(), arc.coord());
            (angle, center.distance(arc), arc)
        })
        .collect::<Vec<_>>();
    ordered.sort_by_key(|(angle, radius, _)| (FloatOrd(*angle), FloatOrd(*radius)));

    let sectors = match ordered.as_slice() {
        [] => Vec::new(),
        [(_, _, arc)] => vec![Sector {
            center: center.clone(),
            arc_start: (*arc).clone(),
            arc_end: (*arc).clone(),
            sweep: TAU,
        }],
        _ => ordered
            .iter()
            .zip(ordered.iter().cycle().skip(1))
            .map(|((from, _, start), (to, _, end))| Sector {
                center: center.clone(),
                arc_start: (*start).clone(),
                arc_end: (*end).clone(),
                sweep: clockwise_delta(*from, *to),
            })
            .collect(),
    };

    let total = sectors.iter().map(|s| s.sweep).sum::<f64>();
    if (total - TAU).abs() > options.pie_angle_tolerance {
        log::warn!("single-center sectors sweep {total} rad instead of a full turn");
        report.rejected_sectors += 1;
    }
    sectors
}

#[instrument(level = "trace", skip_all)]
fn multi_center(
    centers: &[Point],
    arcs: &[Point],
    options: &ReconstructionOptions,
    report: &mut ReconstructionReport,
) -> Vec<Sector> {
    let nearest = centers
        .iter()
        .filter_map(|c| {
            arcs.iter()
                .map(|arc| FloatOrd(c.distance(arc)))
                .min()
                .map(|d| d.0)
        })
        .collect::<Vec<_>>();
    let Some(radius) = median(&nearest) else {
        return Vec::new();
    };
    let tolerance = options.pie_tolerance_fraction * radius;
    // angle subtended by the tolerance at the common radius
    let margin = if radius > 0.0 { tolerance / radius } else { 0.0 };
    log::debug!("common radius {radius}, tolerance {tolerance}");

    // per center: (arc index, angle) of arc points on the common radius
    let on_radius = centers
        .iter()
        .map(|c| {
            arcs.iter()
                .enumerate()
                .filter(|(_, arc)| (c.distance(arc) - radius).abs() <= tolerance)
                .map(|(i, arc)| (i, clockwise_angle(c.coord(), arc.coord())))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut candidates = Vec::new();
    for (ci, members) in on_radius.iter().enumerate() {
        for &(start, start_angle) in members {
            let neighbour = members
                .iter()
                .filter(|(end, _)| *end != start)
                .map(|&(end, angle)| (end, clockwise_delta(start_angle, angle)))
                .filter(|(_, delta)| *delta > 0.0)
                .min_by_key(|(end, delta)| (FloatOrd(*delta), *end));
            match neighbour {
                Some((end, sweep)) => candidates.push(Candidate {
                    center: ci,
                    start,
                    end,
                    start_angle,
                    sweep,
                }),
                None => {
                    log::debug!("arc point {start} has no clockwise neighbour around center {ci}");
                    report.rejected_sectors += 1;
                }
            }
        }
    }

    // centers further apart than the radius belong to different pies
    let related = |a: usize, b: usize| a != b && centers[a].distance(&centers[b]) <= radius;

    // a sector may not swallow boundaries seen by a related center
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let swallows = on_radius
            .iter()
            .enumerate()
            .filter(|(ci, _)| related(*ci, candidate.center))
            .flat_map(|(_, members)| members.iter())
            .any(|&(_, angle)| candidate.strictly_contains(angle, margin));
        if swallows {
            log::debug!(
                "sector {} -> {} around center {} spans another center's boundary",
                candidate.start,
                candidate.end,
                candidate.center
            );
            report.rejected_sectors += 1;
        } else {
            kept.push(candidate);
        }
    }

    // the same slice seen from two centers: keep the one displaced along the
    // slice bisector, i.e. the exploded slice
    let mut dropped = vec![false; kept.len()];
    for i in 0..kept.len() {
        for j in (i + 1)..kept.len() {
            if dropped[i] || dropped[j] || !related(kept[i].center, kept[j].center) {
                continue;
            }
            let (a, b) = (&kept[i], &kept[j]);
            let same_slice = angular_gap(a.start_angle, b.start_angle) <= margin
                && angular_gap(a.end_angle(), b.end_angle()) <= margin;
            if !same_slice {
                continue;
            }
            let (dx, dy) = (
                centers[b.center].x - centers[a.center].x,
                centers[b.center].y - centers[a.center].y,
            );
            let bisector = b.bisector();
            let along = dx * bisector.cos() + dy * bisector.sin();
            if along > 0.0 {
                dropped[i] = true;
            } else {
                dropped[j] = true;
            }
            report.rejected_sectors += 1;
        }
    }

    let mut kept = kept
        .into_iter()
        .zip(dropped)
        .filter_map(|(candidate, dropped)| (!dropped).then_some(candidate))
        .collect::<Vec<_>>();
    kept.sort_by_key(|c| (FloatOrd(c.bisector()), c.center));

    kept.into_iter()
        .map(|c| Sector {
            center: centers[c.center].clone(),
            arc_start: arcs[c.start].clone(),
            arc_end: arcs[c.end].clone(),
            sweep: c.sweep,
        })
        .collect()
}
