//! # Track comparison
//!
//! [`difference_profile`] pairs every observation of a track with an observation of a
//! second track and stores the pairing in two feature columns of a copy of the first
//! track:
//!
//! * `diff` – horizontal distance to the paired observation,
//! * `pair` – index of the paired observation in the second track.
//!
//! Pairings ([`ProfileMode`]):
//!
//! * **nearest neighbour** – closest observation, `O(n·m)`,
//! * **DTW** – dynamic time warping on distances raised to the power `p`, `O(n·m)` time
//!   and memory,
//! * **FDTW** – DTW restricted to a band around the scaled diagonal.
//!
//! On top of the profile, [`compare`] summarises two tracks as the `p`-mean of `diff`
//! and [`central_track`] estimates a representative track of a collection.
use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::interpolation::{resample, InterpolationAlgo, InterpolationMode, InterpolationParams, ResampleDelta};
use crate::progress::Progress;
use crate::time::Timestamp;
use crate::track::collection::TrackCollection;
use crate::track::Track;
use crate::track_errors::TrackError;

pub const DIFF_FEATURE: &str = "diff";
pub const PAIR_FEATURE: &str = "pair";

/// Admissible range of the DTW distance exponent.
pub const DTW_P_RANGE: (f64, f64) = (1e-2, 15.0);

/// Number of matrix cells above which a memory notice is emitted.
const DTW_LARGE_CELLS: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileMode {
    NearestNeighbour,
    /// Full DTW. With `ends`, the alignment is forced to pair both first and both last
    /// observations; otherwise the second track may be entered and left anywhere.
    Dtw { p: f64, ends: bool },
    /// DTW restricted to `|j − i·m/n| ≤ band`, both ends forced.
    Fdtw { band: usize, p: f64 },
}

/// Optimal DTW alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct DtwAlignment {
    /// Sum of the powered distances along the path.
    pub cost: f64,
    /// Index pairs `(i, j)` from the first to the last aligned cell.
    pub path: Vec<(usize, usize)>,
}

fn check_pair(track1: &Track, track2: &Track, what: &str) -> Result<(), TrackError> {
    if track1.srid() != track2.srid() {
        return Err(TrackError::wrong_srid(&track1.srid().to_string(), track2.srid()));
    }
    if track1.is_empty() || track2.is_empty() {
        return Err(TrackError::EmptyTrack(what.to_string()));
    }
    Ok(())
}

fn check_exponent(p: f64) -> Result<(), TrackError> {
    if !(p >= DTW_P_RANGE.0 && p <= DTW_P_RANGE.1) {
        return Err(TrackError::OutOfDomain(format!(
            "DTW exponent must lie in [{}, {}], got {p}",
            DTW_P_RANGE.0, DTW_P_RANGE.1
        )));
    }
    Ok(())
}

fn distance(track1: &Track, i: usize, track2: &Track, j: usize) -> f64 {
    track1.positions()[i].distance_2d(&track2.positions()[j])
}

/// Accumulated cost table. `band` restricts the reachable cells, `ends` forces the
/// alignment to start on `(0, 0)`.
fn accumulate(track1: &Track, track2: &Track, p: f64, ends: bool, band: Option<usize>) -> DMatrix<f64> {
    let (n, m) = (track1.size(), track2.size());
    if n * m > DTW_LARGE_CELLS {
        warn!(n, m, "DTW on large inputs allocates an n × m table");
    }
    let inside = |i: usize, j: usize| match band {
        None => true,
        Some(b) => {
            let centre = if n > 1 { i as f64 * (m - 1) as f64 / (n - 1) as f64 } else { 0.0 };
            (j as f64 - centre).abs() <= b as f64
        }
    };
    let mut acc = DMatrix::from_element(n, m, f64::INFINITY);
    let mut progress = Progress::new("dtw", n as u64);
    for i in 0..n {
        for j in 0..m {
            if !inside(i, j) {
                continue;
            }
            let c = distance(track1, i, track2, j).powf(p);
            let before = match (i, j) {
                (0, 0) => 0.0,
                (0, _) if !ends => 0.0,
                (0, _) => acc[(0, j - 1)],
                (_, 0) => acc[(i - 1, 0)],
                _ => acc[(i - 1, j - 1)].min(acc[(i - 1, j)]).min(acc[(i, j - 1)]),
            };
            acc[(i, j)] = c + before;
        }
        progress.inc();
    }
    progress.finish();
    acc
}

fn backtrack(acc: &DMatrix<f64>, end: (usize, usize), ends: bool) -> Vec<(usize, usize)> {
    let (mut i, mut j) = end;
    let mut path = vec![(i, j)];
    while i > 0 || j > 0 {
        if i == 0 {
            if !ends {
                break;
            }
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let diag = acc[(i - 1, j - 1)];
            let up = acc[(i - 1, j)];
            let left = acc[(i, j - 1)];
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path.push((i, j));
    }
    path.reverse();
    path
}

fn align(track1: &Track, track2: &Track, p: f64, ends: bool, band: Option<usize>) -> Result<DtwAlignment, TrackError> {
    check_pair(track1, track2, "dtw")?;
    check_exponent(p)?;
    let acc = accumulate(track1, track2, p, ends, band);
    let (n, m) = (track1.size(), track2.size());
    let end = if ends {
        (n - 1, m - 1)
    } else {
        let j = (0..m)
            .min_by(|&a, &b| acc[(n - 1, a)].total_cmp(&acc[(n - 1, b)]))
            .unwrap_or(m - 1);
        (n - 1, j)
    };
    let cost = acc[end];
    if !cost.is_finite() {
        return Err(TrackError::OutOfDomain(format!(
            "no alignment within a band of {}",
            band.unwrap_or(0)
        )));
    }
    Ok(DtwAlignment {
        cost,
        path: backtrack(&acc, end, ends),
    })
}

/// Dynamic time warping of `track1` onto `track2`.
///
/// Errors
/// ----------
/// * `WrongCoordSystem` when the tracks live in different frames.
/// * `EmptyTrack` when either track is empty.
/// * `OutOfDomain` for `p` outside [`DTW_P_RANGE`].
pub fn dtw(track1: &Track, track2: &Track, p: f64, ends: bool) -> Result<DtwAlignment, TrackError> {
    align(track1, track2, p, ends, None)
}

/// Banded dynamic time warping, both ends forced.
pub fn fdtw(track1: &Track, track2: &Track, band: usize, p: f64) -> Result<DtwAlignment, TrackError> {
    align(track1, track2, p, true, Some(band))
}

/// For every observation of the first track, the closest observation it is aligned to.
fn pairs_from_path(track1: &Track, track2: &Track, path: &[(usize, usize)]) -> Vec<(f64, usize)> {
    let mut best = vec![(f64::INFINITY, 0usize); track1.size()];
    for &(i, j) in path {
        let d = distance(track1, i, track2, j);
        if d < best[i].0 {
            best[i] = (d, j);
        }
    }
    best
}

/// Copy of `track1` with columns `diff` and `pair` describing its pairing with `track2`.
///
/// Errors
/// ----------
/// * `WrongCoordSystem` when the tracks live in different frames.
/// * `EmptyTrack` when either track is empty.
/// * `OutOfDomain` for an exponent outside [`DTW_P_RANGE`] or a band too narrow to
///   connect both ends.
pub fn difference_profile(track1: &Track, track2: &Track, mode: ProfileMode) -> Result<Track, TrackError> {
    check_pair(track1, track2, "difference profile")?;
    let pairs: Vec<(f64, usize)> = match mode {
        ProfileMode::NearestNeighbour => (0..track1.size())
            .map(|i| {
                (0..track2.size())
                    .map(|j| (distance(track1, i, track2, j), j))
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .unwrap_or((f64::NAN, 0))
            })
            .collect(),
        ProfileMode::Dtw { p, ends } => {
            let alignment = dtw(track1, track2, p, ends)?;
            pairs_from_path(track1, track2, &alignment.path)
        }
        ProfileMode::Fdtw { band, p } => {
            let alignment = fdtw(track1, track2, band, p)?;
            pairs_from_path(track1, track2, &alignment.path)
        }
    };

    let mut out = track1.clone();
    out.add_feature_values(DIFF_FEATURE, pairs.iter().map(|(d, _)| *d).collect())?;
    out.add_feature_values(PAIR_FEATURE, pairs.iter().map(|(_, j)| *j as f64).collect())?;
    Ok(out)
}

/// `p`-mean of the `diff` column of the difference profile (`p = ∞` gives the maximum).
pub fn compare(track1: &Track, track2: &Track, mode: ProfileMode, p: f64) -> Result<f64, TrackError> {
    if !(p > 0.0) {
        return Err(TrackError::OutOfDomain(format!("mean exponent must be positive, got {p}")));
    }
    let profile = difference_profile(track1, track2, mode)?;
    let diff = profile.feature(DIFF_FEATURE)?;
    if p.is_infinite() {
        return Ok(diff.iter().copied().fold(0.0, f64::max));
    }
    let mean = diff.iter().map(|d| d.powf(p)).sum::<f64>() / diff.len() as f64;
    Ok(mean.powf(1.0 / p))
}

/// Representative track of a collection.
///
/// Every track is linearly resampled on `n` common timestamps spanning the intersection of
/// the tracks' time spans (`n` being the largest track size). The initial estimate is the
/// point-wise mean; each iteration then pairs the estimate with every track under `mode`
/// and replaces each observation by the mean of its partners, until observations move by
/// less than `1e-6` or after `n_iter` iterations.
///
/// Errors
/// ----------
/// * `EmptyTrack` for an empty collection.
/// * `WrongCoordSystem` for non-euclidean or heterogeneous frames.
/// * `OutOfDomain` when the time spans do not overlap.
pub fn central_track(tracks: &TrackCollection, mode: ProfileMode, n_iter: usize) -> Result<Track, TrackError> {
    let first = tracks
        .get(0)
        .ok_or_else(|| TrackError::EmptyTrack("central track (empty collection)".into()))?;
    first.require_euclidean("central track")?;
    if !tracks.is_homogeneous(first.srid()) {
        return Err(TrackError::wrong_srid(&first.srid().to_string(), "mixed frames"));
    }
    if tracks.iter().any(|t| t.size() < 2) {
        return Err(TrackError::EmptyTrack("central track (needs 2 observations per track)".into()));
    }

    let start = tracks.iter().map(|t| t.timestamps()[0]).max().unwrap_or(first.timestamps()[0]);
    let end = tracks
        .iter()
        .map(|t| t.timestamps()[t.size() - 1])
        .min()
        .unwrap_or(first.timestamps()[first.size() - 1]);
    let span = end - start;
    if !(span > 0.0) {
        return Err(TrackError::OutOfDomain("track time spans do not overlap".into()));
    }
    let n = tracks.iter().map(Track::size).max().unwrap_or(2);
    let support: Vec<Timestamp> = (0..n)
        .map(|k| start + span * k as f64 / (n - 1) as f64)
        .collect();

    let synced = tracks
        .iter()
        .map(|t| {
            resample(
                t,
                ResampleDelta::Timestamps(support.clone()),
                InterpolationAlgo::Linear,
                InterpolationMode::Temporal,
                &InterpolationParams::default(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(bad) = synced.iter().find(|t| t.size() != n) {
        return Err(TrackError::mismatch("central track support", n, bad.size()));
    }

    let count = synced.len() as f64;
    let mean_of = |pick: &dyn Fn(usize, usize) -> (f64, f64, f64)| -> Vec<(f64, f64, f64)> {
        (0..n)
            .map(|i| {
                let (sx, sy, sz) = (0..synced.len()).fold((0.0, 0.0, 0.0), |acc, k| {
                    let (x, y, z) = pick(k, i);
                    (acc.0 + x, acc.1 + y, acc.2 + z)
                });
                (sx / count, sy / count, sz / count)
            })
            .collect()
    };
    let xyz = |t: &Track, i: usize| {
        let p = t.positions()[i];
        (p.get_x(), p.get_y(), p.get_z())
    };

    let mut central = synced[0].clone().with_ids(first.uid.clone(), "central");
    central.clear_features();
    let build = |central: &mut Track, coords: &[(f64, f64, f64)]| -> Result<f64, TrackError> {
        let mut moved: f64 = 0.0;
        for (i, &(x, y, z)) in coords.iter().enumerate() {
            let old = central.positions()[i];
            let new = old.with_xyz(x, y, z);
            moved = moved.max(old.distance_3d(&new));
            central.set_position(i, new)?;
        }
        Ok(moved)
    };

    build(&mut central, &mean_of(&|k, i| xyz(&synced[k], i)))?;
    for iteration in 0..n_iter {
        let pairs = synced
            .iter()
            .map(|t| {
                let profile = difference_profile(&central, t, mode)?;
                Ok(profile.feature(PAIR_FEATURE)?.iter().map(|&j| j as usize).collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>, TrackError>>()?;
        let moved = build(&mut central, &mean_of(&|k, i| xyz(&synced[k], pairs[k][i])))?;
        debug!(iteration, moved, "central track iteration");
        if moved < 1e-6 {
            break;
        }
    }
    Ok(central)
}
