//! Polyline simplification.
//!
//! | Mode | Kept observations |
//! |------|-------------------|
//! | [`SimplificationMode::DouglasPeucker`] | recursive split on the farthest point while its distance to the chord exceeds `ε` |
//! | [`SimplificationMode::Visvalingam`] | repeated removal of the smallest triangle while its area is below `ε²` |
//! | `Optimal*` | boundaries of an [optimal partition](crate::algorithms::partition) under a segment cost |
//!
//! The simplified track keeps the ids, frame and base of the input but no feature columns.
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use nalgebra::DMatrix;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::algorithms::geometry::{point_segment_distance, principal_mbr, triangle_area};
use crate::algorithms::partition::{optimal_partition, PartitionMode};
use crate::coords::Coord;
use crate::track::Track;
use crate::track_errors::TrackError;

/// Cost of keeping observations `i..=j` as a single segment.
pub type SegmentCostFn = Arc<dyn Fn(&Track, usize, usize) -> f64 + Send + Sync>;

#[derive(Clone)]
pub enum SimplificationMode {
    DouglasPeucker(f64),
    Visvalingam(f64),
    /// Minimise `Σ (width + 1)` of the segments' principal rectangles.
    OptimalLargestDeviation,
    /// Minimise `Σ width / length` of the segments' principal rectangles.
    OptimalElongationRatio,
    /// Fewest segments whose principal rectangle is at most `ε` wide.
    OptimalPrecludeLargeDeviation(f64),
    OptimalFree {
        cost: SegmentCostFn,
        mode: PartitionMode,
    },
}

impl fmt::Debug for SimplificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimplificationMode::DouglasPeucker(e) => write!(f, "DouglasPeucker({e})"),
            SimplificationMode::Visvalingam(e) => write!(f, "Visvalingam({e})"),
            SimplificationMode::OptimalLargestDeviation => write!(f, "OptimalLargestDeviation"),
            SimplificationMode::OptimalElongationRatio => write!(f, "OptimalElongationRatio"),
            SimplificationMode::OptimalPrecludeLargeDeviation(e) => {
                write!(f, "OptimalPrecludeLargeDeviation({e})")
            }
            SimplificationMode::OptimalFree { mode, .. } => write!(f, "OptimalFree({mode:?})"),
        }
    }
}

/// Indices kept by Douglas–Peucker with tolerance `epsilon`.
pub fn douglas_peucker(points: &[Coord], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0, n - 1)];
    while let Some((a, b)) = stack.pop() {
        let farthest = (a + 1..b)
            .map(|k| (k, point_segment_distance(&points[k], &points[a], &points[b])))
            .max_by(|l, r| l.1.total_cmp(&r.1));
        if let Some((k, d)) = farthest {
            if d > epsilon {
                keep[k] = true;
                stack.push((a, k));
                stack.push((k, b));
            }
        }
    }
    (0..n).filter(|&i| keep[i]).collect()
}

/// Indices kept by Visvalingam–Whyatt with area threshold `epsilon²`.
pub fn visvalingam(points: &[Coord], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }
    let threshold = epsilon * epsilon;
    let mut prev: Vec<usize> = (0..n).map(|i| i.saturating_sub(1)).collect();
    let mut next: Vec<usize> = (0..n).map(|i| (i + 1).min(n - 1)).collect();
    let mut alive = vec![true; n];
    let mut version = vec![0u32; n];

    let area = |i: usize, prev: &[usize], next: &[usize]| {
        triangle_area(&points[prev[i]], &points[i], &points[next[i]])
    };
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize, u32)>> = (1..n - 1)
        .map(|i| Reverse((OrderedFloat(area(i, &prev, &next)), i, 0)))
        .collect();

    while let Some(Reverse((OrderedFloat(a), i, v))) = heap.pop() {
        if !alive[i] || v != version[i] {
            continue;
        }
        if a >= threshold {
            break;
        }
        alive[i] = false;
        let (p, q) = (prev[i], next[i]);
        next[p] = q;
        prev[q] = p;
        for j in [p, q] {
            if j != 0 && j != n - 1 {
                version[j] += 1;
                heap.push(Reverse((OrderedFloat(area(j, &prev, &next)), j, version[j])));
            }
        }
    }
    (0..n).filter(|&i| alive[i]).collect()
}

fn mbr_of(track: &Track, i: usize, j: usize) -> (f64, f64) {
    principal_mbr(&track.positions()[i..=j]).map_or((0.0, 0.0), |m| (m.width, m.length))
}

fn partition_indices(
    track: &Track,
    cost: impl Fn(&Track, usize, usize) -> f64,
    mode: PartitionMode,
) -> Vec<usize> {
    let n = track.size();
    let neutral = match mode {
        PartitionMode::Minimise => f64::INFINITY,
        PartitionMode::Maximise => f64::NEG_INFINITY,
    };
    let c = DMatrix::from_fn(n, n, |i, j| if j > i { cost(track, i, j) } else { neutral });
    optimal_partition(&c, mode)
}

/// Simplify `track` according to `mode`.
///
/// Errors
/// ----------
/// * `WrongCoordSystem` outside of ENU/projected frames.
/// * `OutOfDomain` for a negative tolerance.
pub fn simplify(track: &Track, mode: &SimplificationMode) -> Result<Track, TrackError> {
    track.require_euclidean("simplification")?;
    let tolerance = match mode {
        SimplificationMode::DouglasPeucker(e)
        | SimplificationMode::Visvalingam(e)
        | SimplificationMode::OptimalPrecludeLargeDeviation(e) => Some(*e),
        _ => None,
    };
    if let Some(e) = tolerance.filter(|e| !(*e >= 0.0)) {
        return Err(TrackError::OutOfDomain(format!("tolerance must be non-negative, got {e}")));
    }

    let kept = if track.size() < 3 {
        (0..track.size()).collect()
    } else {
        match mode {
            SimplificationMode::DouglasPeucker(e) => douglas_peucker(track.positions(), *e),
            SimplificationMode::Visvalingam(e) => visvalingam(track.positions(), *e),
            SimplificationMode::OptimalLargestDeviation => partition_indices(
                track,
                |t, i, j| mbr_of(t, i, j).0 + 1.0,
                PartitionMode::Minimise,
            ),
            SimplificationMode::OptimalElongationRatio => partition_indices(
                track,
                |t, i, j| {
                    let (w, l) = mbr_of(t, i, j);
                    if l > 0.0 {
                        w / l
                    } else {
                        0.0
                    }
                },
                PartitionMode::Minimise,
            ),
            SimplificationMode::OptimalPrecludeLargeDeviation(e) => partition_indices(
                track,
                |t, i, j| if mbr_of(t, i, j).0 > *e { f64::INFINITY } else { 1.0 },
                PartitionMode::Minimise,
            ),
            SimplificationMode::OptimalFree { cost, mode } => {
                partition_indices(track, |t, i, j| cost(t, i, j), *mode)
            }
        }
    };

    let mut out = track.select(&kept)?;
    out.clear_features();
    debug!(tid = %track.tid, ?mode, before = track.size(), after = out.size(), "simplify");
    Ok(out)
}

impl Track {
    pub fn simplify(&self, mode: &SimplificationMode) -> Result<Track, TrackError> {
        simplify(self, mode)
    }
}

#[cfg(test)]
mod simplification_test {
    use super::*;
    use crate::coords::Srid;

    /// Tent of height 5 with a ±0.1 zigzag.
    fn zigzag() -> Track {
        let x: Vec<f64> = (0..21).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..21)
            .map(|i: i32| 0.5 * (10 - (i - 10).abs()) as f64 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap()
    }

    fn max_deviation(original: &Track, simplified: &Track) -> f64 {
        original
            .positions()
            .iter()
            .map(|p| {
                simplified
                    .positions()
                    .windows(2)
                    .map(|w| point_segment_distance(p, &w[0], &w[1]))
                    .fold(f64::INFINITY, f64::min)
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_douglas_peucker() {
        let t = zigzag();
        let coarse = simplify(&t, &SimplificationMode::DouglasPeucker(1.0)).unwrap();
        let fine = simplify(&t, &SimplificationMode::DouglasPeucker(0.05)).unwrap();
        assert_eq!(coarse.size(), 3);
        assert_eq!(coarse.positions()[1].get_x(), 10.0);
        assert!(fine.size() >= coarse.size());
        assert!(max_deviation(&t, &coarse) <= 1.0);
        assert!(max_deviation(&t, &fine) <= 0.05);
    }

    #[test]
    fn test_visvalingam_threshold() {
        let t = zigzag();
        let eps = 1.0;
        let s = simplify(&t, &SimplificationMode::Visvalingam(eps)).unwrap();
        assert!(s.size() < t.size());
        assert!(s
            .positions()
            .windows(3)
            .all(|w| triangle_area(&w[0], &w[1], &w[2]) >= eps * eps));
        assert_eq!(s.positions()[0], t.positions()[0]);
        assert_eq!(s.positions()[s.size() - 1], t.positions()[t.size() - 1]);
    }

    #[test]
    fn test_optimal_modes() {
        let mut t = zigzag();
        t.create_feature("w", 1.0).unwrap();
        let s = simplify(&t, &SimplificationMode::OptimalPrecludeLargeDeviation(0.5)).unwrap();
        assert_eq!(s.size(), 3);
        assert!(s.feature_names().is_empty());

        let dev = simplify(&t, &SimplificationMode::OptimalLargestDeviation).unwrap();
        assert!(dev.size() >= 2 && dev.size() <= t.size());

        // rewarding every single step keeps every observation
        let free = SimplificationMode::OptimalFree {
            cost: Arc::new(|_: &Track, i: usize, j: usize| if j == i + 1 { 1.0 } else { 0.0 }),
            mode: PartitionMode::Maximise,
        };
        assert_eq!(simplify(&t, &free).unwrap().size(), t.size());
        assert!(simplify(&t, &SimplificationMode::DouglasPeucker(-1.0)).is_err());
    }
}
