//! Built-in analytical features.
//!
//! Each feature is a plain function `(track, i) -> Result<f64>` usable with
//! [`Track::add_feature`]; the `compute_*` methods on [`Track`] are shortcuts writing the
//! conventional column names (`ds`, `abs_curv`, `speed`, `heading`, `orientation`,
//! `curvature`).
//!
//! Distances are horizontal (see [`crate::coords::Coord::distance_2d`]), so these features are
//! meaningful in every frame. Angles are in radians.
use itertools::Itertools;

use crate::constants::DPI;
use crate::track::Track;
use crate::track_errors::TrackError;

fn need(track: &Track, n: usize, what: &str) -> Result<(), TrackError> {
    if track.size() < n {
        return Err(TrackError::EmptyTrack(format!(
            "{what} needs at least {n} observations"
        )));
    }
    Ok(())
}

/// Distance to the previous observation (`0` on the first one).
pub fn ds(track: &Track, i: usize) -> Result<f64, TrackError> {
    let p = track.position(i)?;
    if i == 0 {
        return Ok(0.0);
    }
    Ok(track.position(i - 1)?.distance_2d(&p))
}

/// Curvilinear abscissa of observation `i`.
pub fn abs_curv(track: &Track, i: usize) -> Result<f64, TrackError> {
    track.position(i)?;
    Ok(track.positions()[..=i]
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.distance_2d(b))
        .sum())
}

/// Centred finite-difference speed (one-sided at both ends), in units per second.
pub fn speed(track: &Track, i: usize) -> Result<f64, TrackError> {
    need(track, 2, "speed")?;
    track.position(i)?;
    let (a, b) = match i {
        0 => (0, 1),
        _ if i == track.size() - 1 => (i - 1, i),
        _ => (i - 1, i + 1),
    };
    let dist: f64 = track.positions()[a..=b]
        .iter()
        .tuple_windows()
        .map(|(p, q)| p.distance_2d(q))
        .sum();
    let dt = track.timestamps()[b] - track.timestamps()[a];
    if dt <= 0.0 {
        return Err(TrackError::OutOfDomain(format!(
            "non-increasing timestamps around observation {i}"
        )));
    }
    Ok(dist / dt)
}

/// Azimuth of the step leaving observation `i` (entering it for the last observation),
/// clockwise from north in `[0, 2π)`.
pub fn heading(track: &Track, i: usize) -> Result<f64, TrackError> {
    need(track, 2, "heading")?;
    track.position(i)?;
    let (a, b) = if i + 1 < track.size() { (i, i + 1) } else { (i - 1, i) };
    let p = track.positions();
    Ok(p[a].azimuth_to(&p[b]))
}

/// Heading quantised into `sectors` equal sectors; sector `0` is centred on north.
pub fn orientation(sectors: usize) -> impl Fn(&Track, usize) -> Result<f64, TrackError> {
    move |track, i| {
        if sectors == 0 {
            return Err(TrackError::OutOfDomain("orientation needs at least one sector".into()));
        }
        let width = DPI / sectors as f64;
        let h = heading(track, i)?;
        Ok((((h + width / 2.0) / width).floor() as usize % sectors) as f64)
    }
}

/// Signed turning angle at observation `i` per unit of travelled distance
/// (positive for a left turn, `0` at both ends).
pub fn curvature(track: &Track, i: usize) -> Result<f64, TrackError> {
    track.position(i)?;
    if i == 0 || i + 1 >= track.size() {
        return Ok(0.0);
    }
    let p = track.positions();
    let u = p[i] - p[i - 1];
    let v = p[i + 1] - p[i];
    let cross = u.get_x() * v.get_y() - u.get_y() * v.get_x();
    let dot = u.get_x() * v.get_x() + u.get_y() * v.get_y();
    let mean = (p[i - 1].distance_2d(&p[i]) + p[i].distance_2d(&p[i + 1])) / 2.0;
    if mean <= 0.0 {
        return Ok(0.0);
    }
    Ok(cross.atan2(dot) / mean)
}

impl Track {
    pub fn compute_ds(&mut self) -> Result<(), TrackError> {
        self.add_feature("ds", ds)
    }

    /// Writes `abs_curv` in a single pass.
    pub fn compute_abs_curv(&mut self) -> Result<(), TrackError> {
        let s = self.curvilinear_abscissa();
        self.add_feature_values("abs_curv", s)
    }

    pub fn compute_speed(&mut self) -> Result<(), TrackError> {
        need(self, 2, "speed")?;
        self.add_feature("speed", speed)
    }

    pub fn compute_heading(&mut self) -> Result<(), TrackError> {
        need(self, 2, "heading")?;
        self.add_feature("heading", heading)
    }

    pub fn compute_orientation(&mut self, sectors: usize) -> Result<(), TrackError> {
        need(self, 2, "orientation")?;
        self.add_feature("orientation", orientation(sectors))
    }

    pub fn compute_curvature(&mut self) -> Result<(), TrackError> {
        self.add_feature("curvature", curvature)
    }
}
