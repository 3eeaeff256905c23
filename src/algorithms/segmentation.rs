//! Track segmentation: threshold markers, splitting, stop detection and return trips.
//!
//! * [`segmentation`] writes a `0/1` column flagging observations that violate a set of
//!   per-feature thresholds, and [`split`] / [`split_at_indices`] cut a track into a
//!   [`TrackCollection`] whose sub-tracks are named `tid.0`, `tid.1`, …
//! * [`find_stops`] detects stationary episodes with a speed threshold ([`StopMode::Local`])
//!   or as an optimal partition of the observations ([`StopMode::Global`] and
//!   [`StopMode::Rtk`]).
//! * [`split_return_trip`] locates the turning point of an out-and-back track.
use nalgebra::DMatrix;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::debug;

use crate::algorithms::geometry::{minimum_enclosing_circle, Circle};
use crate::algorithms::partition::{optimal_partition, PartitionMode};
use crate::coords::Coord;
use crate::interpolation::{resample, InterpolationAlgo, InterpolationMode, InterpolationParams, ResampleDelta};
use crate::track::collection::TrackCollection;
use crate::track::features;
use crate::track::Track;
use crate::track_errors::TrackError;

/// How the per-feature threshold tests of [`segmentation`] are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerMode {
    /// An observation is kept unmarked when every feature is below its threshold.
    Conjunction,
    /// An observation is kept unmarked when at least one feature is below its threshold.
    Disjunction,
}

/// Write the `out_name` column: `1` where the combination of `af[j] ≤ thresholds[j]`
/// does not hold, `0` elsewhere. NaN values never satisfy their test.
///
/// Errors
/// ----------
/// * `LengthMismatch` when `af_names` and `thresholds` differ in length.
/// * `MissingFeature` for an unknown column.
pub fn segmentation(
    track: &mut Track,
    af_names: &[&str],
    out_name: &str,
    thresholds: &[f64],
    mode: MarkerMode,
) -> Result<(), TrackError> {
    if af_names.len() != thresholds.len() {
        return Err(TrackError::mismatch(
            "features / thresholds",
            af_names.len(),
            thresholds.len(),
        ));
    }
    let columns = af_names
        .iter()
        .map(|name| track.column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let marks = (0..track.size())
        .map(|i| {
            let mut tests = columns.iter().zip(thresholds).map(|(c, &thr)| c[i] <= thr);
            let ok = match mode {
                MarkerMode::Conjunction => tests.all(|b| b),
                MarkerMode::Disjunction => tests.any(|b| b),
            };
            if ok {
                0.0
            } else {
                1.0
            }
        })
        .collect();
    track.write_column(out_name, marks)
}

/// Observations `start..=last` as sub-track `k`.
fn piece(track: &Track, start: usize, last: usize, k: usize) -> Track {
    let mut sub = track.extract(start, last + 1);
    sub.tid = format!("{}.{k}", track.tid);
    sub
}

/// Cut `track` on its marker column: runs of marked observations (value `1`) separate
/// the sub-tracks and are themselves dropped.
pub fn split(track: &Track, indicator: &str) -> Result<TrackCollection, TrackError> {
    let marks = track.column(indicator)?;
    let mut out = TrackCollection::new();
    let mut start = None;
    for (i, &m) in marks.iter().enumerate() {
        match (m == 1.0, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                out.push(piece(track, s, i - 1, out.len()));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(piece(track, s, track.size() - 1, out.len()));
    }
    debug!(tid = %track.tid, pieces = out.len(), "split on marker {indicator}");
    Ok(out)
}

/// Cut `track` before each index: `[0, i₀)`, `[i₀, i₁)`, …, `[i_k, n)`.
/// Indices are sorted and deduplicated first; empty pieces are skipped.
pub fn split_at_indices(track: &Track, indices: &[usize]) -> TrackCollection {
    let mut cuts: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|&i| i > 0 && i < track.size())
        .collect();
    cuts.sort_unstable();
    cuts.dedup();
    cuts.insert(0, 0);
    cuts.push(track.size());

    cuts.windows(2)
        .filter(|w| w[1] > w[0])
        .enumerate()
        .map(|(k, w)| piece(track, w[0], w[1] - 1, k))
        .collect()
}

// -------------------------------------------------------------------------------------------------
// Stops
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopMode {
    /// Runs of observations slower than `speed` (m/s) lasting at least `duration` seconds.
    Local { speed: f64, duration: f64 },
    /// Optimal partition rewarding long segments whose minimum enclosing circle fits in
    /// `diameter` and which last at least `duration` seconds.
    Global { diameter: f64, duration: f64 },
    /// As [`StopMode::Global`], with every per-axis standard deviation at most
    /// `diameter / 2` instead of the enclosing circle.
    Rtk { diameter: f64, duration: f64 },
}

/// A detected stop, over observations `id_ini..=id_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id_ini: usize,
    pub id_end: usize,
    pub centroid: Coord,
    /// Radius of the minimum enclosing circle.
    pub radius: f64,
    /// Root mean square horizontal distance to the centroid.
    pub rms_radius: f64,
    /// Per-axis standard deviations.
    pub sigma: [f64; 3],
    pub duration: f64,
}

impl Stop {
    pub fn nb_points(&self) -> usize {
        self.id_end - self.id_ini + 1
    }
}

fn summarise(track: &Track, id_ini: usize, id_end: usize) -> Stop {
    let pts = &track.positions()[id_ini..=id_end];
    let n = pts.len() as f64;
    let mean = |f: fn(&Coord) -> f64| pts.iter().map(f).sum::<f64>() / n;
    let (mx, my, mz) = (mean(Coord::get_x), mean(Coord::get_y), mean(Coord::get_z));
    let std = |f: fn(&Coord) -> f64, m: f64| (pts.iter().map(|p| (f(p) - m).powi(2)).sum::<f64>() / n).sqrt();
    let centroid = pts[0].with_xyz(mx, my, mz);
    Stop {
        id_ini,
        id_end,
        centroid,
        radius: minimum_enclosing_circle(pts).map_or(0.0, |c| c.radius),
        rms_radius: (pts.iter().map(|p| p.distance_2d(&centroid).powi(2)).sum::<f64>() / n).sqrt(),
        sigma: [std(Coord::get_x, mx), std(Coord::get_y, my), std(Coord::get_z, mz)],
        duration: track.timestamps()[id_end] - track.timestamps()[id_ini],
    }
}

fn local_stops(track: &Track, speed: f64, duration: f64) -> Result<Vec<(usize, usize)>, TrackError> {
    let slow = (0..track.size())
        .map(|i| features::speed(track, i).map(|v| v <= speed))
        .collect::<Result<Vec<_>, _>>()?;
    let ts = track.timestamps();
    let mut runs = Vec::new();
    let mut start = None;
    for i in 0..=slow.len() {
        let is_slow = slow.get(i).copied().unwrap_or(false);
        match (is_slow, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if ts[i - 1] - ts[s] >= duration {
                    runs.push((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    Ok(runs)
}

/// Reward matrix over boundaries `0..=n`: entry `(i, j)` scores observations `[i, j)`.
fn stop_rewards(track: &Track, diameter: f64, duration: f64, rtk: bool) -> DMatrix<f64> {
    let n = track.size();
    let pts = track.positions();
    let ts = track.timestamps();
    let radius = diameter / 2.0;
    let mut c = DMatrix::zeros(n + 1, n + 1);
    for i in 0..n {
        let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
        let (mut sxx, mut syy, mut szz) = (0.0, 0.0, 0.0);
        let mut circle: Option<Circle> = None;
        for j in i + 1..=n {
            let p = &pts[j - 1];
            let fits = if rtk {
                let (x, y, z) = (p.get_x(), p.get_y(), p.get_z());
                sx += x;
                sy += y;
                sz += z;
                sxx += x * x;
                syy += y * y;
                szz += z * z;
                let m = (j - i) as f64;
                let var = |s: f64, ss: f64| (ss / m - (s / m).powi(2)).max(0.0);
                [var(sx, sxx), var(sy, syy), var(sz, szz)]
                    .iter()
                    .all(|v| v.sqrt() <= radius)
            } else {
                let grown = match circle {
                    Some(c) if c.contains(p) => c,
                    _ => match minimum_enclosing_circle(&pts[i..j]) {
                        Some(c) => c,
                        None => break,
                    },
                };
                circle = Some(grown);
                if grown.radius > radius {
                    // enclosing circles only grow with j
                    break;
                }
                true
            };
            if fits && ts[j - 1] - ts[i] >= duration {
                c[(i, j)] = ((j - i) as f64).powi(2);
            }
        }
    }
    c
}

/// Detect stops along `track`.
///
/// Return
/// ----------
/// * The stops in chronological order, each summarised by its centroid, enclosing and
///   RMS radii, per-axis deviations and duration.
///
/// Errors
/// ----------
/// * `WrongCoordSystem` outside of ENU/projected frames.
/// * `OutOfDomain` from the speed computation for non-increasing timestamps (local mode).
pub fn find_stops(track: &Track, mode: StopMode) -> Result<Vec<Stop>, TrackError> {
    track.require_euclidean("stop detection")?;
    if track.size() < 2 {
        return Ok(Vec::new());
    }
    let ranges = match mode {
        StopMode::Local { speed, duration } => local_stops(track, speed, duration)?,
        StopMode::Global { diameter, duration } | StopMode::Rtk { diameter, duration } => {
            let rewards = stop_rewards(track, diameter, duration, matches!(mode, StopMode::Rtk { .. }));
            optimal_partition(&rewards, PartitionMode::Maximise)
                .windows(2)
                .filter(|w| rewards[(w[0], w[1])] > 0.0)
                .map(|w| (w[0], w[1] - 1))
                .collect()
        }
    };
    let stops: Vec<Stop> = ranges.into_iter().map(|(a, b)| summarise(track, a, b)).collect();
    debug!(tid = %track.tid, ?mode, stops = stops.len(), "stop detection");
    Ok(stops)
}

// -------------------------------------------------------------------------------------------------
// Return trip
// -------------------------------------------------------------------------------------------------

/// Default fraction of the track excluded at each end when searching the pivot.
pub const SIDE_EFFECT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnTripMode {
    /// Mean distance between observations symmetric around each candidate pivot, `O(n²)`.
    Exhaustive,
    /// Peak of the self-convolution of the centred coordinates, computed by FFT on a
    /// spatially resampled copy, `O(n log n)`.
    Fast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnTrip {
    /// Index of the turning observation, shared by both legs.
    pub pivot: usize,
    /// Outbound leg (`tid.0`) then inbound leg (`tid.1`).
    pub legs: TrackCollection,
}

fn pivot_range(n: usize, side_effect: f64) -> (usize, usize) {
    let lo = ((side_effect * n as f64).floor() as usize).max(1);
    let hi = (((1.0 - side_effect) * n as f64).ceil() as usize).min(n - 2);
    (lo, hi.max(lo))
}

fn exhaustive_pivot(pts: &[Coord], side_effect: f64) -> usize {
    let n = pts.len();
    let (lo, hi) = pivot_range(n, side_effect);
    let mut best = (f64::INFINITY, lo);
    for p in lo..=hi {
        let m = p.min(n - 1 - p);
        if m == 0 {
            continue;
        }
        let cost = (1..=m).map(|k| pts[p - k].distance_2d(&pts[p + k])).sum::<f64>() / m as f64;
        if cost < best.0 {
            best = (cost, p);
        }
    }
    best.1
}

fn fast_pivot(pts: &[Coord], side_effect: f64) -> usize {
    let n = pts.len();
    let size = 2 * n;
    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut score = vec![0.0; size];
    for axis in [Coord::get_x as fn(&Coord) -> f64, Coord::get_y] {
        let mean = pts.iter().map(axis).sum::<f64>() / n as f64;
        let mut buf: Vec<Complex<f64>> = (0..size)
            .map(|i| Complex::new(if i < n { axis(&pts[i]) - mean } else { 0.0 }, 0.0))
            .collect();
        forward.process(&mut buf);
        for c in buf.iter_mut() {
            *c = *c * *c;
        }
        inverse.process(&mut buf);
        for (s, c) in score.iter_mut().zip(&buf) {
            *s += c.re / size as f64;
        }
    }
    // score[m] = Σ_i s[i]·s[m − i], peaking at twice the symmetry centre
    let (lo, hi) = pivot_range(n, side_effect);
    (2 * lo..=2 * hi)
        .max_by(|&a, &b| score[a].total_cmp(&score[b]).then(b.cmp(&a)))
        .map_or(lo, |m| m / 2)
}

/// Split an out-and-back track at its turning point.
///
/// Arguments
/// -----------------
/// * `mode` – pivot search, see [`ReturnTripMode`].
/// * `side_effect` – fraction of the observations excluded at each end from the pivot
///   search, [`SIDE_EFFECT`] by default.
///
/// Errors
/// ----------
/// * `WrongCoordSystem` outside of ENU/projected frames.
/// * `EmptyTrack` for tracks with fewer than three observations.
pub fn split_return_trip(
    track: &Track,
    mode: ReturnTripMode,
    side_effect: f64,
) -> Result<ReturnTrip, TrackError> {
    track.require_euclidean("return trip split")?;
    let n = track.size();
    if n < 3 {
        return Err(TrackError::EmptyTrack("return trip split (needs 3 observations)".into()));
    }
    if !(0.0..0.5).contains(&side_effect) {
        return Err(TrackError::OutOfDomain(format!(
            "side effect must lie in [0, 0.5), got {side_effect}"
        )));
    }

    let pivot = match mode {
        ReturnTripMode::Exhaustive => exhaustive_pivot(track.positions(), side_effect),
        ReturnTripMode::Fast => {
            let resampled = resample(
                track,
                ResampleDelta::Npts(n),
                InterpolationAlgo::Linear,
                InterpolationMode::Spatial,
                &InterpolationParams::default(),
            )?;
            let q = fast_pivot(resampled.positions(), side_effect);
            let abscissa = track.curvilinear_abscissa();
            let target = abscissa[n - 1] * q as f64 / (resampled.size() - 1).max(1) as f64;
            (0..n)
                .min_by(|&a, &b| (abscissa[a] - target).abs().total_cmp(&(abscissa[b] - target).abs()))
                .unwrap_or(q)
                .clamp(1, n - 2)
        }
    };
    debug!(tid = %track.tid, ?mode, pivot, "return trip");

    let legs = [piece(track, 0, pivot, 0), piece(track, pivot, n - 1, 1)]
        .into_iter()
        .collect();
    Ok(ReturnTrip { pivot, legs })
}
