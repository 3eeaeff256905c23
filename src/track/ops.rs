//! Track algebra.
//!
//! | operation | method | operator |
//! |-----------|--------|----------|
//! | concatenation | [`Track::concat`] | `&a + &b` |
//! | split into `n + 1` parts | [`Track::split_equal`] | `&a / n` |
//! | drop first / last `k` | [`Track::trim_first`], [`Track::trim_last`] | |
//! | remove idle start / end | [`Track::remove_idle_start`], [`Track::remove_idle_end`] | |
//! | resample to `n` points | [`Track::resample_npts`] | |
//! | frequency × `k` | [`Track::resample_factor`] | `&a * k` |
//! | keep one of `k` | [`Track::decimate`] | `&a % k` |
//! | resample on `b`'s timestamps | [`Track::synchronize_on`] | |
//! | difference profile | [`difference_profile`] | `&a - &b` |
//!
//! Operators that can fail return a `Result`.
use std::ops::{Add, Div, Mul, Rem, Sub};

use tracing::debug;

use super::collection::TrackCollection;
use super::Track;
use crate::comparison::{difference_profile, ProfileMode};
use crate::coords::Coord;
use crate::track_errors::TrackError;

/// Number of observations in the window used to detect idle ends.
pub const IDLE_WINDOW: usize = 5;

fn window_centroid(positions: &[Coord]) -> (f64, f64, f64) {
    let n = positions.len() as f64;
    let (sx, sy, sz) = positions.iter().fold((0.0, 0.0, 0.0), |(x, y, z), c| {
        (x + c.get_x(), y + c.get_y(), z + c.get_z())
    });
    (sx / n, sy / n, sz / n)
}

/// Root of the summed per-axis variances of a window.
fn window_spread(positions: &[Coord], centre: (f64, f64, f64)) -> f64 {
    let n = positions.len() as f64;
    let var: f64 = positions
        .iter()
        .map(|c| {
            (c.get_x() - centre.0).powi(2) + (c.get_y() - centre.1).powi(2) + (c.get_z() - centre.2).powi(2)
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

fn centre_distance(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)).sqrt()
}

/// Length of the idle run at the start of `positions`: the number of leading observations
/// whose sliding window stays within `k + σ` of the first window's centroid.
fn idle_run(positions: &[Coord], k: f64) -> usize {
    if positions.len() <= IDLE_WINDOW {
        return 0;
    }
    let first = &positions[..IDLE_WINDOW];
    let c0 = window_centroid(first);
    let radius = k + window_spread(first, c0);
    let mut i = 0;
    while i + IDLE_WINDOW <= positions.len() {
        let c = window_centroid(&positions[i..i + IDLE_WINDOW]);
        if centre_distance(c, c0) > radius {
            break;
        }
        i += 1;
    }
    i.min(positions.len() - 1)
}

impl Track {
    /// Concatenate `other` after `self`.
    ///
    /// Both tracks must share the same frame. Only feature columns present in both tracks
    /// are kept.
    pub fn concat(&self, other: &Track) -> Result<Track, TrackError> {
        if self.srid != other.srid {
            return Err(TrackError::wrong_srid(&self.srid.to_string(), other.srid));
        }
        let mut out = self.clone();
        out.positions.extend_from_slice(&other.positions);
        out.timestamps.extend_from_slice(&other.timestamps);

        let mut names = Vec::new();
        let mut columns = Vec::new();
        for (name, col) in self.af_names.iter().zip(&self.af_columns) {
            match other.feature(name) {
                Ok(tail) => {
                    let mut merged = col.clone();
                    merged.extend_from_slice(tail);
                    names.push(name.clone());
                    columns.push(merged);
                }
                Err(_) => debug!(feature = %name, "feature dropped by concatenation"),
            }
        }
        out.af_names = names;
        out.af_columns = columns;
        Ok(out)
    }

    /// Split into exactly `n + 1` contiguous sub-tracks. Sizes differ by at most one, the
    /// longer ones first, so the last sub-track is never longer than the others. Tracks with
    /// fewer than `n + 1` observations end with empty sub-tracks. Sub-track ids are `tid.0`,
    /// `tid.1`, …
    pub fn split_equal(&self, n: usize) -> TrackCollection {
        let parts = n + 1;
        let (chunk, longer) = (self.size() / parts, self.size() % parts);
        let mut start = 0;
        (0..parts)
            .map(|k| {
                let end = start + chunk + usize::from(k < longer);
                let mut t = self.extract(start, end);
                t.tid = format!("{}.{k}", self.tid);
                start = end;
                t
            })
            .collect()
    }

    /// Copy without the first `k` observations.
    pub fn trim_first(&self, k: usize) -> Track {
        self.extract(k, self.size())
    }

    /// Copy without the last `k` observations.
    pub fn trim_last(&self, k: usize) -> Track {
        self.extract(0, self.size().saturating_sub(k))
    }

    /// Copy without the idle observations at the start: with a sliding window of
    /// [`IDLE_WINDOW`] observations, the window moves forward while its centroid stays
    /// within `k + σ` of the first window's centroid (`σ` the spread of that first window).
    pub fn remove_idle_start(&self, k: f64) -> Track {
        let run = idle_run(&self.positions, k);
        self.extract(run, self.size())
    }

    /// Mirror of [`Track::remove_idle_start`] at the end of the track.
    pub fn remove_idle_end(&self, k: f64) -> Track {
        let reversed: Vec<Coord> = self.positions.iter().rev().copied().collect();
        let run = idle_run(&reversed, k);
        self.extract(0, self.size() - run)
    }

    /// Keep one observation every `k` (the first one included). `k = 0` behaves as `1`.
    pub fn decimate(&self, k: usize) -> Track {
        let k = k.max(1);
        let keep: Vec<usize> = (0..self.size()).step_by(k).collect();
        let mut out = self.clone();
        out.retain_indices(&keep);
        out
    }

    /// Keep the observations whose mask entry is `true`.
    pub fn decimate_mask(&self, mask: &[bool]) -> Result<Track, TrackError> {
        if mask.len() != self.size() {
            return Err(TrackError::mismatch("decimation mask", self.size(), mask.len()));
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        let mut out = self.clone();
        out.retain_indices(&keep);
        Ok(out)
    }
}

impl Add<&Track> for &Track {
    type Output = Result<Track, TrackError>;

    fn add(self, rhs: &Track) -> Self::Output {
        self.concat(rhs)
    }
}

impl Div<usize> for &Track {
    type Output = TrackCollection;

    fn div(self, n: usize) -> TrackCollection {
        self.split_equal(n)
    }
}

impl Mul<f64> for &Track {
    type Output = Result<Track, TrackError>;

    fn mul(self, k: f64) -> Self::Output {
        self.resample_factor(k)
    }
}

impl Rem<usize> for &Track {
    type Output = Track;

    fn rem(self, k: usize) -> Track {
        self.decimate(k)
    }
}

/// Nearest-neighbour difference profile of `self` against `rhs`.
impl Sub<&Track> for &Track {
    type Output = Result<Track, TrackError>;

    fn sub(self, rhs: &Track) -> Self::Output {
        difference_profile(self, rhs, ProfileMode::NearestNeighbour)
    }
}

#[cfg(test)]
mod ops_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_relative_eq;

    fn line(n: usize, x0: f64) -> Track {
        let x: Vec<f64> = (0..n).map(|i| x0 + i as f64).collect();
        Track::from_xyz(Srid::Enu, &x, &vec![0.0; n], None, None)
            .unwrap()
            .with_ids("u", "7")
    }

    #[test]
    fn test_concat_and_features() {
        let mut a = line(3, 0.0);
        let mut b = line(2, 10.0);
        a.create_feature("speed", 1.0).unwrap();
        a.create_feature("only_a", 0.0).unwrap();
        b.create_feature("speed", 2.0).unwrap();
        let c = (&a + &b).unwrap();
        assert_eq!(c.size(), 5);
        assert_eq!(c.feature_names(), &["speed"]);
        assert_eq!(c.feature("speed").unwrap(), &[1.0, 1.0, 1.0, 2.0, 2.0]);

        let mut g = line(2, 0.0);
        g.to_geo(Some(crate::coords::GeoCoords::new(2.0, 45.0, 0.0))).unwrap();
        assert!(matches!(&a + &g, Err(TrackError::WrongCoordSystem { .. })));
    }

    #[test]
    fn test_split_equal() {
        let t = line(10, 0.0);
        let parts = &t / 2;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].size(), 4);
        assert_eq!(parts[2].size(), 3);
        assert_eq!(parts[1].tid, "7.1");
        assert_eq!(parts.total_size(), 10);
    }

    #[test]
    fn test_split_equal_uneven_sizes() {
        for (size, n, expected) in [
            (9, 3, vec![3, 2, 2, 2]),
            (5, 3, vec![2, 1, 1, 1]),
            (8, 3, vec![2, 2, 2, 2]),
            (2, 3, vec![1, 1, 0, 0]),
        ] {
            let t = line(size, 0.0);
            let parts = t.split_equal(n);
            let sizes: Vec<usize> = parts.iter().map(Track::size).collect();
            assert_eq!(sizes, expected, "size {size}, n {n}");
            assert_eq!(parts.total_size(), size);
        }
        let t = line(9, 0.0);
        let parts = t.split_equal(3);
        assert_eq!(parts[1].first().unwrap().position, Coord::enu(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_trim_and_decimate() {
        let t = line(10, 0.0);
        assert_eq!(t.trim_first(3).first().unwrap().position, Coord::enu(3.0, 0.0, 0.0));
        assert_eq!(t.trim_last(3).size(), 7);
        assert_eq!(t.trim_last(30).size(), 0);
        let d = &t % 3;
        assert_eq!(d.column("x").unwrap(), vec![0.0, 3.0, 6.0, 9.0]);
        let mask: Vec<bool> = (0..10).map(|i| i < 2).collect();
        assert_eq!(t.decimate_mask(&mask).unwrap().size(), 2);
        assert!(t.decimate_mask(&[true]).is_err());
    }

    #[test]
    fn test_factor_resample() {
        let t = line(11, 0.0);
        let r = (&t * 2.0).unwrap();
        assert_eq!(r.size(), 21);
        assert_relative_eq!(r.positions()[1].get_x(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_remove_idle() {
        // 10 observations jittering around the origin, then a straight move east
        let mut x: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        x.extend((1..=20).map(|i| 5.0 * i as f64));
        x.extend((0..10).map(|i| if i % 2 == 0 { 100.1 } else { 99.9 }));
        let y = vec![0.0; x.len()];
        let t = Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap();

        let start = t.remove_idle_start(1.0);
        assert!(start.size() < t.size());
        assert!(start.size() >= 30);
        assert!(start.positions()[0].get_x().abs() < 1.0);

        let end = t.remove_idle_end(1.0);
        assert!(end.size() < t.size());
        assert!(end.size() >= 30);
    }
}
