//! # Registration
//!
//! Estimation of the planar similarity `X' = k·R(θ)·X + T` bringing a track onto a
//! reference (another track or a list of points).
//!
//! * With tie points, Gauss–Newton iterations solve the least squares problem on the
//!   residuals `x'ᵢ − (k·R·xᵢ + T)` over `(k, tx, ty, θ)`.
//! * Without tie points, an ICP loop is used: a coarse step matches the mean sampling
//!   step and the centroids, then each iteration pairs [`RegistrationParams::npts`] evenly
//!   spaced observations with their nearest reference point and runs one least squares step.
//!
//! Reflections are not modelled (`k > 0`).
use nalgebra::{Matrix4, Vector4};
use tracing::{debug, warn};

use crate::coords::Coord;
use crate::track::Track;
use crate::track_errors::TrackError;

/// Tuning of [`map_on`].
///
/// Defaults
/// -----------------
/// * `n_iter_max`: `50` – Gauss–Newton or ICP iterations,
/// * `npts`: `50` – observations paired at each ICP iteration,
/// * `apply`: `false` – when set, the estimated transform is applied to the track,
/// * `tolerance`: `1e-4` – convergence threshold on the largest parameter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationParams {
    pub n_iter_max: usize,
    pub npts: usize,
    pub apply: bool,
    pub tolerance: f64,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        RegistrationParams {
            n_iter_max: 50,
            npts: 50,
            apply: false,
            tolerance: 1e-4,
        }
    }
}

impl RegistrationParams {
    pub fn builder() -> RegistrationParamsBuilder {
        RegistrationParamsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationParamsBuilder {
    params: RegistrationParams,
}

impl RegistrationParamsBuilder {
    pub fn n_iter_max(mut self, v: usize) -> Self {
        self.params.n_iter_max = v;
        self
    }

    pub fn npts(mut self, v: usize) -> Self {
        self.params.npts = v;
        self
    }

    pub fn apply(mut self, v: bool) -> Self {
        self.params.apply = v;
        self
    }

    pub fn tolerance(mut self, v: f64) -> Self {
        self.params.tolerance = v;
        self
    }

    /// Return
    /// ------
    /// * `Err(TrackError::OutOfDomain)` for zero iterations, fewer than two ICP points or
    ///   a non-positive tolerance.
    pub fn build(self) -> Result<RegistrationParams, TrackError> {
        let p = self.params;
        if p.n_iter_max == 0 {
            return Err(TrackError::OutOfDomain("n_iter_max must be positive".into()));
        }
        if p.npts < 2 {
            return Err(TrackError::OutOfDomain(format!(
                "npts must be at least 2, got {}",
                p.npts
            )));
        }
        if !(p.tolerance > 0.0) {
            return Err(TrackError::OutOfDomain("tolerance must be positive".into()));
        }
        Ok(p)
    }
}

/// Target of a registration.
#[derive(Debug, Clone, Copy)]
pub enum Reference<'a> {
    Track(&'a Track),
    Points(&'a [Coord]),
}

impl Reference<'_> {
    fn points(&self) -> &[Coord] {
        match self {
            Reference::Track(t) => t.positions(),
            Reference::Points(p) => p,
        }
    }
}

/// Planar similarity `X' = k·R(θ)·X + T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub theta: f64,
    pub k: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Similarity {
    pub const IDENTITY: Similarity = Similarity {
        theta: 0.0,
        k: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// `[θ, k, tx, ty]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.theta, self.k, self.tx, self.ty]
    }

    pub fn apply(&self, c: &Coord) -> Coord {
        c.rotate(self.theta).scale(self.k).translate(self.tx, self.ty, 0.0)
    }

    /// Apply the transform to every position of `track`.
    pub fn apply_to(&self, track: &mut Track) -> Result<(), TrackError> {
        track.rotate(self.theta)?;
        track.scale(self.k)?;
        track.translate(self.tx, self.ty, 0.0)
    }
}

/// One Gauss–Newton step on the pairs `(source, target)`; returns the parameter update
/// ordered `(k, tx, ty, θ)`.
fn gauss_newton_step(s: &Similarity, pairs: &[(Coord, Coord)]) -> Result<Vector4<f64>, TrackError> {
    let (sin, cos) = s.theta.sin_cos();
    let mut jtj = Matrix4::zeros();
    let mut jtr = Vector4::zeros();
    for (src, dst) in pairs {
        let (x, y) = (src.get_x(), src.get_y());
        let (rx, ry) = (cos * x - sin * y, sin * x + cos * y);
        let res = [dst.get_x() - (s.k * rx + s.tx), dst.get_y() - (s.k * ry + s.ty)];
        // d(model)/d(k, tx, ty, θ) for each component
        let rows = [
            Vector4::new(rx, 1.0, 0.0, -s.k * ry),
            Vector4::new(ry, 0.0, 1.0, s.k * rx),
        ];
        for (row, r) in rows.iter().zip(res) {
            jtj += row * row.transpose();
            jtr += row * r;
        }
    }
    jtj.lu()
        .solve(&jtr)
        .ok_or_else(|| TrackError::singular("registration normal equations"))
}

fn update(s: &mut Similarity, delta: &Vector4<f64>) {
    s.k += delta[0];
    s.tx += delta[1];
    s.ty += delta[2];
    s.theta += delta[3];
}

fn centroid(points: impl Iterator<Item = Coord>) -> (f64, f64) {
    let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
    for p in points {
        sx += p.get_x();
        sy += p.get_y();
        n += 1;
    }
    let n = n.max(1) as f64;
    (sx / n, sy / n)
}

fn mean_step(points: &[Coord]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points.windows(2).map(|w| w[0].distance_2d(&w[1])).sum::<f64>() / (points.len() - 1) as f64
}

fn solve_tie_points(pairs: &[(Coord, Coord)], params: &RegistrationParams) -> Result<Similarity, TrackError> {
    let (cs, cd) = (
        centroid(pairs.iter().map(|p| p.0)),
        centroid(pairs.iter().map(|p| p.1)),
    );
    let mut s = Similarity {
        tx: cd.0 - cs.0,
        ty: cd.1 - cs.1,
        ..Similarity::IDENTITY
    };
    for iteration in 0..params.n_iter_max {
        let delta = gauss_newton_step(&s, pairs)?;
        update(&mut s, &delta);
        if delta.amax() < params.tolerance {
            debug!(iteration, "tie point registration converged");
            return Ok(s);
        }
    }
    warn!(n_iter_max = params.n_iter_max, "tie point registration did not converge");
    Ok(s)
}

fn nearest(points: &[Coord], c: &Coord) -> Coord {
    points
        .iter()
        .min_by(|a, b| a.distance_2d(c).total_cmp(&b.distance_2d(c)))
        .copied()
        .unwrap_or(*c)
}

fn solve_icp(source: &[Coord], target: &[Coord], params: &RegistrationParams) -> Result<Similarity, TrackError> {
    let (step_s, step_t) = (mean_step(source), mean_step(target));
    let k = if step_s > 0.0 && step_t > 0.0 { step_t / step_s } else { 1.0 };
    let (cs, ct) = (centroid(source.iter().copied()), centroid(target.iter().copied()));
    let mut s = Similarity {
        k,
        tx: ct.0 - k * cs.0,
        ty: ct.1 - k * cs.1,
        theta: 0.0,
    };

    let n = source.len();
    let npts = params.npts.min(n);
    let picks: Vec<usize> = (0..npts)
        .map(|i| if npts > 1 { i * (n - 1) / (npts - 1) } else { 0 })
        .collect();

    for iteration in 0..params.n_iter_max {
        let pairs: Vec<(Coord, Coord)> = picks
            .iter()
            .map(|&i| (source[i], nearest(target, &s.apply(&source[i]))))
            .collect();
        let delta = gauss_newton_step(&s, &pairs)?;
        update(&mut s, &delta);
        if delta.amax() < params.tolerance {
            debug!(iteration, "ICP converged");
            return Ok(s);
        }
    }
    warn!(n_iter_max = params.n_iter_max, "ICP did not converge");
    Ok(s)
}

/// Register `track` onto `reference`.
///
/// Arguments
/// -----------------
/// * `reference` – target track or point list.
/// * `tie_points` – matching observation indices `(in track, in reference)`; `None`
///   selects the ICP fallback.
/// * `params` – see [`RegistrationParams`].
///
/// Return
/// ----------
/// * The estimated transform; `to_array()` gives `[θ, k, tx, ty]`. The track is only
///   modified when `params.apply` is set.
///
/// Errors
/// ----------
/// * `WrongCoordSystem` outside of ENU/projected frames.
/// * `LengthMismatch` when the tie point lists differ in length.
/// * `IndexOutOfRange` for a tie point index past the end of its list.
/// * `OutOfDomain` with fewer than two tie points.
/// * `EmptyTrack` when the track or the reference is empty.
/// * `SingularMatrix` for degenerate configurations.
pub fn map_on(
    track: &mut Track,
    reference: Reference<'_>,
    tie_points: Option<(&[usize], &[usize])>,
    params: &RegistrationParams,
) -> Result<Similarity, TrackError> {
    track.require_euclidean("registration")?;
    if let Reference::Track(r) = reference {
        r.require_euclidean("registration reference")?;
    }
    let target = reference.points();
    if track.is_empty() || target.is_empty() {
        return Err(TrackError::EmptyTrack("registration".into()));
    }

    let similarity = match tie_points {
        Some((src, dst)) => {
            if src.len() != dst.len() {
                return Err(TrackError::mismatch("tie points", src.len(), dst.len()));
            }
            if src.len() < 2 {
                return Err(TrackError::OutOfDomain(format!(
                    "registration needs at least 2 tie points, got {}",
                    src.len()
                )));
            }
            let pairs = src
                .iter()
                .zip(dst)
                .map(|(&i, &j)| {
                    let dst = target.get(j).copied().ok_or(TrackError::IndexOutOfRange {
                        index: j,
                        len: target.len(),
                    })?;
                    Ok((track.position(i)?, dst))
                })
                .collect::<Result<Vec<_>, TrackError>>()?;
            solve_tie_points(&pairs, params)?
        }
        None => solve_icp(track.positions(), target, params)?,
    };

    if params.apply {
        similarity.apply_to(track)?;
    }
    debug!(tid = %track.tid, ?similarity, "registration");
    Ok(similarity)
}

impl Track {
    pub fn map_on(
        &mut self,
        reference: Reference<'_>,
        tie_points: Option<(&[usize], &[usize])>,
        params: &RegistrationParams,
    ) -> Result<Similarity, TrackError> {
        map_on(self, reference, tie_points, params)
    }
}

#[cfg(test)]
mod registration_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_abs_diff_eq;

    fn curve() -> Track {
        let x: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 10.0 * (x / 10.0).sin()).collect();
        Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap()
    }

    fn truth() -> Similarity {
        Similarity {
            theta: 0.3,
            k: 1.2,
            tx: 5.0,
            ty: -3.0,
        }
    }

    #[test]
    fn test_tie_points() {
        let mut t = curve();
        let mut reference = t.clone();
        truth().apply_to(&mut reference).unwrap();
        let idx: Vec<usize> = (0..60).step_by(6).collect();

        let params = RegistrationParams::builder().apply(true).tolerance(1e-10).build().unwrap();
        let s = map_on(&mut t, Reference::Track(&reference), Some((idx.as_slice(), idx.as_slice())), &params).unwrap();
        let [theta, k, tx, ty] = s.to_array();
        assert_abs_diff_eq!(theta, 0.3, epsilon = 1e-8);
        assert_abs_diff_eq!(k, 1.2, epsilon = 1e-8);
        assert_abs_diff_eq!(tx, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ty, -3.0, epsilon = 1e-6);
        assert!(t.positions()[17].distance_2d(&reference.positions()[17]) < 1e-6);
    }

    #[test]
    fn test_icp_small_motion() {
        let mut t = curve();
        let moved = Similarity {
            theta: 0.02,
            k: 1.0,
            tx: 0.5,
            ty: 0.3,
        };
        let reference: Vec<Coord> = t.positions().iter().map(|c| moved.apply(c)).collect();
        let before = t.clone();
        let s = map_on(&mut t, Reference::Points(&reference), None, &RegistrationParams::default()).unwrap();
        assert_eq!(t, before);
        let residual = before
            .positions()
            .iter()
            .zip(&reference)
            .map(|(a, b)| s.apply(a).distance_2d(b))
            .fold(0.0, f64::max);
        assert!(residual < 0.5, "residual {residual}");
    }

    #[test]
    fn test_errors() {
        let mut t = curve();
        let r = curve();
        let p = RegistrationParams::default();
        assert!(matches!(
            map_on(&mut t, Reference::Track(&r), Some((&[0usize, 1][..], &[0usize][..])), &p),
            Err(TrackError::LengthMismatch { .. })
        ));
        assert!(map_on(&mut t, Reference::Track(&r), Some((&[0usize][..], &[0usize][..])), &p).is_err());
        assert!(RegistrationParams::builder().npts(1).build().is_err());
        let mut geo = Track::from_xyz(Srid::Geo, &[2.0], &[48.0], None, None).unwrap();
        assert!(map_on(&mut geo, Reference::Track(&r), None, &p).is_err());
    }
}
