//! # Resampling and interpolation
//!
//! Every resampling runs along one of two parameterisations ([`InterpolationMode`]):
//!
//! * **temporal** – the parameter is the elapsed time since the first observation,
//! * **spatial** – the parameter is the curvilinear abscissa (requires an ENU or projected track).
//!
//! and uses one of four algorithms ([`InterpolationAlgo`]):
//!
//! | algorithm | module | notes |
//! |-----------|--------|-------|
//! | `Linear` | [`linear`] | piecewise linear between the bracketing observations |
//! | `ThinSplines` | [`splines`] | kernel `r² log(r + ε)` plus affine trend, penalisation `λ` |
//! | `BSplines` | [`splines`] | cardinal B-splines of degree ≤ 3, least squares |
//! | `GaussianProcess` | [`gaussian_process`] | posterior mean (temporal only), optional σ column |
//!
//! The target sampling is described by a [`ResampleDelta`]. The output track is strictly
//! increasing in time and carries no analytical features (resampling invalidates them),
//! except the optional `sigma_gp` column of the Gaussian process.
//!
//! Tuning knobs live in [`InterpolationParams`], built with [`InterpolationParams::builder`].
//!
//! Memory
//! -----------------
//! Thin-plate splines and Gaussian processes build dense `n × n` systems: `O(n²)` memory
//! and `O(n³)` time in the number of observations.
pub mod gaussian_process;
pub mod linear;
pub mod splines;

use tracing::{debug, warn};

use crate::constants::EPS;
use crate::coords::Coord;
use crate::kernel::Kernel;
use crate::time::Timestamp;
use crate::track::Track;
use crate::track_errors::TrackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationAlgo {
    Linear,
    ThinSplines,
    BSplines,
    GaussianProcess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Uniform along the curvilinear abscissa.
    Spatial,
    /// Uniform along time.
    Temporal,
}

/// Target sampling of a resampling.
#[derive(Debug, Clone)]
pub enum ResampleDelta<'a> {
    /// Constant step, in seconds (temporal) or meters (spatial).
    Step(f64),
    /// Explicit target timestamps (temporal only).
    Timestamps(Vec<Timestamp>),
    /// Timestamps of a reference track (temporal only).
    Reference(&'a Track),
    /// Exactly `n` evenly spaced samples spanning the track.
    Npts(usize),
    /// Multiply the number of samples by `k` (`k < 1` decimates).
    Factor(f64),
}

/// Tuning of the non-linear interpolation algorithms.
///
/// Defaults
/// -----------------
/// * `spline_penalisation` (`λ`): `0.0` – thin-plate splines interpolate exactly,
/// * `bspline_degree`: `3`,
/// * `bspline_resolution`: `None` – knot spacing of one tenth of the data extent,
/// * `gp_kernel`: `None` – must be set before using the Gaussian process,
/// * `gp_noise` (`σ`): `0.0`,
/// * `gp_store_variance`: `false` – when set, the posterior σ is stored as `sigma_gp`.
#[derive(Debug, Clone)]
pub struct InterpolationParams {
    pub spline_penalisation: f64,
    pub bspline_degree: usize,
    pub bspline_resolution: Option<f64>,
    pub gp_kernel: Option<Kernel>,
    pub gp_noise: f64,
    pub gp_store_variance: bool,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        InterpolationParams {
            spline_penalisation: 0.0,
            bspline_degree: 3,
            bspline_resolution: None,
            gp_kernel: None,
            gp_noise: 0.0,
            gp_store_variance: false,
        }
    }
}

impl InterpolationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InterpolationParamsBuilder {
        InterpolationParamsBuilder::new()
    }
}

/// Builder for [`InterpolationParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct InterpolationParamsBuilder {
    params: InterpolationParams,
}

impl InterpolationParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spline_penalisation(mut self, v: f64) -> Self {
        self.params.spline_penalisation = v;
        self
    }

    pub fn bspline_degree(mut self, v: usize) -> Self {
        self.params.bspline_degree = v;
        self
    }

    pub fn bspline_resolution(mut self, v: f64) -> Self {
        self.params.bspline_resolution = Some(v);
        self
    }

    pub fn gp_kernel(mut self, k: Kernel) -> Self {
        self.params.gp_kernel = Some(k);
        self
    }

    pub fn gp_noise(mut self, v: f64) -> Self {
        self.params.gp_noise = v;
        self
    }

    pub fn gp_store_variance(mut self, v: bool) -> Self {
        self.params.gp_store_variance = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// Return
    /// ------
    /// * `Err(TrackError::OutOfDomain)` for a negative penalisation or noise, a B-spline
    ///   degree above 3 or a non-positive knot spacing.
    pub fn build(self) -> Result<InterpolationParams, TrackError> {
        let p = &self.params;
        if !(p.spline_penalisation >= 0.0) {
            return Err(TrackError::OutOfDomain(
                "spline_penalisation must be non-negative".into(),
            ));
        }
        if p.bspline_degree > 3 {
            return Err(TrackError::OutOfDomain(format!(
                "B-spline degree must be at most 3, got {}",
                p.bspline_degree
            )));
        }
        if let Some(r) = p.bspline_resolution {
            if !(r > 0.0) {
                return Err(TrackError::OutOfDomain(
                    "bspline_resolution must be positive".into(),
                ));
            }
        }
        if !(p.gp_noise >= 0.0) {
            return Err(TrackError::OutOfDomain("gp_noise must be non-negative".into()));
        }
        Ok(self.params)
    }
}

/// Evenly spaced parameter values `0, step, 2·step, …` up to `extent`, the last one
/// always being `extent`.
fn stepped(extent: f64, step: f64) -> Vec<f64> {
    let mut out: Vec<f64> = (0..)
        .map(|k| k as f64 * step)
        .take_while(|v| *v < extent - EPS * extent.abs().max(1.0))
        .collect();
    out.push(extent);
    out
}

fn linspace(extent: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|k| extent * k as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Drop observations whose parameter does not strictly increase.
fn strictly_increasing_sites(params: &[f64]) -> Vec<usize> {
    let mut keep = Vec::with_capacity(params.len());
    for (i, &p) in params.iter().enumerate() {
        match keep.last() {
            Some(&j) if p <= params[j] => {}
            _ => keep.push(i),
        }
    }
    keep
}

/// Interpolate one column along `sites` at `targets` with the chosen algorithm.
fn interpolate_column(
    algo: InterpolationAlgo,
    sites: &[f64],
    values: &[f64],
    targets: &[f64],
    params: &InterpolationParams,
) -> Result<Vec<f64>, TrackError> {
    match algo {
        InterpolationAlgo::Linear => Ok(linear::interpolate(sites, values, targets)),
        InterpolationAlgo::ThinSplines => {
            splines::thin_plate(sites, values, targets, params.spline_penalisation)
        }
        InterpolationAlgo::BSplines => splines::bspline(
            sites,
            values,
            targets,
            params.bspline_degree,
            params.bspline_resolution,
        ),
        InterpolationAlgo::GaussianProcess => {
            let kernel = params.gp_kernel.as_ref().ok_or_else(|| {
                TrackError::OutOfDomain("Gaussian process resampling needs a kernel".into())
            })?;
            Ok(gaussian_process::posterior(kernel, params.gp_noise, sites, values, targets, false)?.0)
        }
    }
}

/// Resample `track` according to `delta`.
///
/// Arguments
/// -----------------
/// * `track` – input track; an unsorted track is sorted on a copy (with a warning).
/// * `delta` – target sampling, see [`ResampleDelta`].
/// * `algo`, `mode` – algorithm and parameterisation.
/// * `params` – algorithm knobs.
///
/// Return
/// ----------
/// * A new track with the same ids, frame and base, strictly increasing in time,
///   without analytical features (except `sigma_gp` when requested).
///
/// Errors
/// ----------
/// * `WrongCoordSystem` for a spatial resampling outside of ENU/projected frames.
/// * `OutOfDomain` for a non-positive step, timestamp targets in spatial mode, a spatial
///   Gaussian process or a missing GP kernel.
/// * `EmptyTrack` for tracks with fewer than two observations.
pub fn resample(
    track: &Track,
    delta: ResampleDelta<'_>,
    algo: InterpolationAlgo,
    mode: InterpolationMode,
    params: &InterpolationParams,
) -> Result<Track, TrackError> {
    if track.size() < 2 {
        return Err(TrackError::EmptyTrack("resample (needs 2 observations)".into()));
    }
    if mode == InterpolationMode::Spatial {
        track.require_euclidean("spatial resampling")?;
        if algo == InterpolationAlgo::GaussianProcess {
            return Err(TrackError::OutOfDomain(
                "Gaussian process resampling is temporal only".into(),
            ));
        }
    }

    let sorted;
    let track = if track.is_sorted() {
        track
    } else {
        warn!(tid = %track.tid, "resampling an unsorted track, observations are sorted first");
        let mut copy = track.clone();
        copy.sort();
        sorted = copy;
        &sorted
    };

    let t_rel = track.relative_times();
    let param = match mode {
        InterpolationMode::Temporal => t_rel.clone(),
        InterpolationMode::Spatial => track.curvilinear_abscissa(),
    };
    let extent = param[param.len() - 1];

    let targets: Vec<f64> = match delta {
        ResampleDelta::Step(step) => {
            if !(step > 0.0) {
                return Err(TrackError::OutOfDomain(format!(
                    "resampling step must be positive, got {step}"
                )));
            }
            stepped(extent, step)
        }
        ResampleDelta::Npts(n) => linspace(extent, n),
        ResampleDelta::Factor(k) => {
            if !(k > 0.0) {
                return Err(TrackError::OutOfDomain(format!(
                    "resampling factor must be positive, got {k}"
                )));
            }
            let n = ((track.size() - 1) as f64 * k).round() as usize + 1;
            linspace(extent, n.max(2))
        }
        ResampleDelta::Timestamps(ref ts) => timestamps_to_targets(track, mode, ts)?,
        ResampleDelta::Reference(reference) => {
            timestamps_to_targets(track, mode, reference.timestamps())?
        }
    };

    let keep = strictly_increasing_sites(&param);
    if keep.len() < track.size() {
        debug!(
            dropped = track.size() - keep.len(),
            "repeated parameter values ignored as interpolation sites"
        );
    }
    let sites: Vec<f64> = keep.iter().map(|&i| param[i]).collect();
    let column = |name: &str| -> Result<Vec<f64>, TrackError> {
        let c = track.column(name)?;
        Ok(keep.iter().map(|&i| c[i]).collect())
    };

    let x = interpolate_column(algo, &sites, &column("x")?, &targets, params)?;
    let y = interpolate_column(algo, &sites, &column("y")?, &targets, params)?;
    let z = interpolate_column(algo, &sites, &column("z")?, &targets, params)?;
    let mut t = match mode {
        InterpolationMode::Temporal => targets.clone(),
        InterpolationMode::Spatial => {
            let t_sites: Vec<f64> = keep.iter().map(|&i| t_rel[i]).collect();
            interpolate_column(algo, &sites, &t_sites, &targets, params)?
        }
    };
    for k in 1..t.len() {
        if t[k] <= t[k - 1] {
            t[k] = t[k - 1] + 1e-6;
        }
    }

    let t0 = track.timestamps()[0];
    let template = track.positions()[0];
    let positions: Vec<Coord> = (0..targets.len())
        .map(|k| template.with_xyz(x[k], y[k], z[k]))
        .collect();
    let timestamps: Vec<Timestamp> = t.iter().map(|&dt| t0 + dt).collect();

    let mut out = Track::from_parts(track.srid(), positions, timestamps)?
        .with_ids(track.uid.clone(), track.tid.clone());
    out.set_base(track.base());

    if algo == InterpolationAlgo::GaussianProcess && params.gp_store_variance {
        if let Some(kernel) = params.gp_kernel.as_ref() {
            let x_sites = column("x")?;
            let (_, sigma) =
                gaussian_process::posterior(kernel, params.gp_noise, &sites, &x_sites, &targets, true)?;
            out.add_feature_values("sigma_gp", sigma.unwrap_or_default())?;
        }
    }
    Ok(out)
}

/// Convert absolute target timestamps into parameter values, keeping those inside the
/// track's time span, sorted and without repetitions.
fn timestamps_to_targets(
    track: &Track,
    mode: InterpolationMode,
    timestamps: &[Timestamp],
) -> Result<Vec<f64>, TrackError> {
    if mode == InterpolationMode::Spatial {
        return Err(TrackError::OutOfDomain(
            "timestamp targets require a temporal resampling".into(),
        ));
    }
    let t0 = track.timestamps()[0];
    let extent = track.duration();
    let mut targets: Vec<f64> = timestamps
        .iter()
        .map(|&t| t - t0)
        .filter(|&dt| dt >= -1e-9 && dt <= extent + 1e-9)
        .map(|dt| dt.clamp(0.0, extent))
        .collect();
    targets.sort_by(f64::total_cmp);
    targets.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    if targets.len() < timestamps.len() {
        debug!(
            dropped = timestamps.len() - targets.len(),
            "target timestamps outside the track time span or repeated"
        );
    }
    Ok(targets)
}

impl Track {
    /// Linear temporal resampling to exactly `n` observations.
    pub fn resample_npts(&self, n: usize) -> Result<Track, TrackError> {
        resample(
            self,
            ResampleDelta::Npts(n),
            InterpolationAlgo::Linear,
            InterpolationMode::Temporal,
            &InterpolationParams::default(),
        )
    }

    /// Linear temporal resampling multiplying the sampling frequency by `k`.
    pub fn resample_factor(&self, k: f64) -> Result<Track, TrackError> {
        resample(
            self,
            ResampleDelta::Factor(k),
            InterpolationAlgo::Linear,
            InterpolationMode::Temporal,
            &InterpolationParams::default(),
        )
    }

    /// Linear temporal resampling onto the timestamps of `reference`.
    pub fn synchronize_on(&self, reference: &Track) -> Result<Track, TrackError> {
        resample(
            self,
            ResampleDelta::Reference(reference),
            InterpolationAlgo::Linear,
            InterpolationMode::Temporal,
            &InterpolationParams::default(),
        )
    }
}

#[cfg(test)]
mod interpolation_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_relative_eq;

    fn ramp(n: usize) -> Track {
        let x: Vec<f64> = (0..n).map(|i| (i * i) as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| 2.0 * i as f64).collect();
        let mut t = Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap();
        t.create_feature("speed", 1.0).unwrap();
        t
    }

    #[test]
    fn test_npts_exact() {
        let t = ramp(10);
        let r = t.resample_npts(25).unwrap();
        assert_eq!(r.size(), 25);
        assert!(r.feature_names().is_empty());
        assert_eq!(r.timestamps()[0], t.timestamps()[0]);
        assert_relative_eq!(r.timestamps()[24] - t.timestamps()[9], 0.0, epsilon = 1e-6);
        assert!(r.timestamps().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_step_temporal() {
        let t = ramp(5);
        let r = resample(
            &t,
            ResampleDelta::Step(0.5),
            InterpolationAlgo::Linear,
            InterpolationMode::Temporal,
            &InterpolationParams::default(),
        )
        .unwrap();
        assert_eq!(r.size(), 9);
        assert_relative_eq!(r.positions()[1].get_x(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(r.positions()[3].get_x(), 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_spatial_requires_enu() {
        let t = Track::from_xyz(Srid::Geo, &[1.0, 1.1], &[2.0, 2.0], None, None).unwrap();
        let err = resample(
            &t,
            ResampleDelta::Step(1.0),
            InterpolationAlgo::Linear,
            InterpolationMode::Spatial,
            &InterpolationParams::default(),
        );
        assert!(matches!(err, Err(TrackError::WrongCoordSystem { .. })));
    }

    #[test]
    fn test_synchronize_on_reference() {
        let t = ramp(5);
        let times: Vec<Timestamp> = [0.5, 1.5, 9.0]
            .iter()
            .map(|&s| Timestamp::from_unix_seconds(s))
            .collect();
        let reference = Track::from_xyz(Srid::Enu, &[0.0; 3], &[0.0; 3], None, Some(&times)).unwrap();
        let r = t.synchronize_on(&reference).unwrap();
        // 9.0 s is outside the track span
        assert_eq!(r.size(), 2);
        assert_relative_eq!(r.positions()[1].get_y(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let times: Vec<Timestamp> = [2.0, 0.0, 1.0]
            .iter()
            .map(|&s| Timestamp::from_unix_seconds(s))
            .collect();
        let t = Track::from_xyz(Srid::Enu, &[2.0, 0.0, 1.0], &[0.0; 3], None, Some(&times)).unwrap();
        let r = t.resample_npts(5).unwrap();
        assert_relative_eq!(r.positions()[4].get_x(), 2.0, epsilon = 1e-9);
        assert!(!t.is_sorted());
    }

    #[test]
    fn test_params_builder() {
        let p = InterpolationParams::builder()
            .bspline_degree(2)
            .spline_penalisation(0.1)
            .build()
            .unwrap();
        assert_eq!(p.bspline_degree, 2);
        assert!(InterpolationParams::builder().bspline_degree(4).build().is_err());
        assert!(InterpolationParams::builder().gp_noise(-1.0).build().is_err());
    }

    #[test]
    fn test_gp_requires_kernel() {
        let t = ramp(5);
        let err = resample(
            &t,
            ResampleDelta::Npts(4),
            InterpolationAlgo::GaussianProcess,
            InterpolationMode::Temporal,
            &InterpolationParams::default(),
        );
        assert!(matches!(err, Err(TrackError::OutOfDomain(_))));
    }
}
