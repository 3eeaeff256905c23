//! # Stochastic processes
//!
//! Correlated noise generation along a track and Monte-Carlo helpers.
//!
//! A [`NoiseProcess`] superposes one or more components, each made of an amplitude `σ`
//! and a covariance [`Kernel`]. For each component the Gram matrix
//! `Σ[i, j] = k(sᵢ − sⱼ)` is built over the track abscissa `s` (curvilinear or
//! temporal), regularised, rescaled so that its diagonal equals `σ²` and factored as
//! `Σ = L·Lᵀ`. A noised copy of the track adds `L·ξ` to each coordinate, `ξ` being a
//! vector of independent unit-variance draws.
//!
//! Reproducibility is achieved by passing the same seeded generator
//! (see [`seeded_rng`]) to every entry point.
use nalgebra::{Cholesky, DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};
use tracing::debug;

use crate::constants::GRAM_REGULARISER;
use crate::kernel::Kernel;
use crate::track::{SamplingMode, Track};
use crate::track_errors::TrackError;

/// Generator with a fixed seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Law of the unit-variance innovations `ξ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseDistribution {
    #[default]
    Normal,
    /// Uniform on `[−√3, √3]`.
    Uniform,
    /// Laplace with scale `1/√2`.
    Laplace,
}

impl NoiseDistribution {
    /// `n` independent unit-variance draws.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<DVector<f64>, TrackError> {
        Ok(match self {
            NoiseDistribution::Normal => {
                let normal = Normal::new(0.0, 1.0)?;
                DVector::from_iterator(n, (0..n).map(|_| normal.sample(rng)))
            }
            NoiseDistribution::Uniform => {
                let a = 3f64.sqrt();
                DVector::from_iterator(n, (0..n).map(|_| rng.random_range(-a..a)))
            }
            NoiseDistribution::Laplace => {
                let exp = Exp::new(std::f64::consts::SQRT_2)?;
                DVector::from_iterator(
                    n,
                    (0..n).map(|_| {
                        let magnitude: f64 = exp.sample(rng);
                        if rng.random_bool(0.5) {
                            magnitude
                        } else {
                            -magnitude
                        }
                    }),
                )
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct NoiseProcess {
    amplitudes: Vec<f64>,
    kernels: Vec<Kernel>,
    distribution: NoiseDistribution,
    abscissa: SamplingMode,
    vertical: bool,
}

impl NoiseProcess {
    /// Process with one component per `(amplitude, kernel)` pair, normal innovations,
    /// curvilinear abscissa and horizontal noise only.
    ///
    /// Errors
    /// ----------
    /// * `LengthMismatch` when the lists differ in length.
    /// * `OutOfDomain` for an empty list or a negative amplitude.
    pub fn new(amplitudes: Vec<f64>, kernels: Vec<Kernel>) -> Result<Self, TrackError> {
        if amplitudes.len() != kernels.len() {
            return Err(TrackError::mismatch("amplitudes / kernels", amplitudes.len(), kernels.len()));
        }
        if amplitudes.is_empty() {
            return Err(TrackError::OutOfDomain("noise process without component".into()));
        }
        if let Some(a) = amplitudes.iter().find(|a| !(**a >= 0.0)) {
            return Err(TrackError::OutOfDomain(format!("noise amplitude must be non-negative, got {a}")));
        }
        Ok(NoiseProcess {
            amplitudes,
            kernels,
            distribution: NoiseDistribution::Normal,
            abscissa: SamplingMode::Spatial,
            vertical: false,
        })
    }

    pub fn with_distribution(mut self, distribution: NoiseDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_abscissa(mut self, abscissa: SamplingMode) -> Self {
        self.abscissa = abscissa;
        self
    }

    /// Also noise the `z` component.
    pub fn with_vertical(mut self, vertical: bool) -> Self {
        self.vertical = vertical;
        self
    }

    fn abscissa_of(&self, track: &Track) -> Vec<f64> {
        match self.abscissa {
            SamplingMode::Spatial => track.curvilinear_abscissa(),
            SamplingMode::Temporal => track.relative_times(),
        }
    }

    /// Lower Cholesky factor of the covariance of one component.
    ///
    /// Errors
    /// ----------
    /// * `NotPositiveDefinite` when the regularised Gram matrix cannot be factored.
    pub fn factor(s: &[f64], sigma: f64, kernel: &Kernel) -> Result<DMatrix<f64>, TrackError> {
        let n = s.len();
        let mut gram = DMatrix::from_fn(n, n, |i, j| kernel.covariance(s[i] - s[j]));
        for i in 0..n {
            gram[(i, i)] += GRAM_REGULARISER;
        }
        let scale: Vec<f64> = (0..n).map(|i| gram[(i, i)].sqrt()).collect();
        if let Some(i) = scale.iter().position(|d| !(*d > 0.0)) {
            return Err(TrackError::NotPositiveDefinite(format!("null variance at observation {i}")));
        }
        let rescaled = DMatrix::from_fn(n, n, |i, j| sigma * sigma * gram[(i, j)] / (scale[i] * scale[j]));
        Cholesky::new(rescaled)
            .map(|c| c.l())
            .ok_or_else(|| TrackError::NotPositiveDefinite("noise covariance".into()))
    }

    /// Correlated noise along `track`: one `(dx, dy, dz)` per observation.
    pub fn sample<R: Rng + ?Sized>(&self, track: &Track, rng: &mut R) -> Result<Vec<(f64, f64, f64)>, TrackError> {
        let n = track.size();
        let s = self.abscissa_of(track);
        let mut dx = DVector::zeros(n);
        let mut dy = DVector::zeros(n);
        let mut dz = DVector::zeros(n);
        for (sigma, kernel) in self.amplitudes.iter().zip(&self.kernels) {
            let l = Self::factor(&s, *sigma, kernel)?;
            dx += &l * self.distribution.sample(n, rng)?;
            dy += &l * self.distribution.sample(n, rng)?;
            if self.vertical {
                dz += &l * self.distribution.sample(n, rng)?;
            }
        }
        Ok((0..n).map(|i| (dx[i], dy[i], dz[i])).collect())
    }

    /// Noised copy of `track`.
    ///
    /// Errors
    /// ----------
    /// * `WrongCoordSystem` outside of ENU/projected frames.
    /// * `NotPositiveDefinite` from [`NoiseProcess::factor`].
    pub fn noise<R: Rng + ?Sized>(&self, track: &Track, rng: &mut R) -> Result<Track, TrackError> {
        track.require_euclidean("noise generation")?;
        let offsets = self.sample(track, rng)?;
        let mut out = track.clone();
        for (i, (dx, dy, dz)) in offsets.into_iter().enumerate() {
            let c = out.positions()[i];
            out.set_position(i, c.translate(dx, dy, dz))?;
        }
        debug!(tid = %track.tid, components = self.amplitudes.len(), "noised copy");
        Ok(out)
    }
}

impl Track {
    /// Noised copy with a single normal component of amplitude `sigma`.
    pub fn noise<R: Rng + ?Sized>(&self, sigma: f64, kernel: Kernel, rng: &mut R) -> Result<Track, TrackError> {
        NoiseProcess::new(vec![sigma], vec![kernel])?.noise(self, rng)
    }
}

/// Monte-Carlo driver: call `f` on `n` independently noised copies of `inputs`.
///
/// Return
/// ----------
/// * The `n` outputs of `f`, in draw order.
pub fn randomizer<T, F, R>(
    inputs: &[Track],
    mut f: F,
    process: &NoiseProcess,
    n: usize,
    rng: &mut R,
) -> Result<Vec<T>, TrackError>
where
    F: FnMut(&[Track]) -> Result<T, TrackError>,
    R: Rng + ?Sized,
{
    (0..n)
        .map(|_| {
            let noised = inputs
                .iter()
                .map(|t| process.noise(t, rng))
                .collect::<Result<Vec<_>, _>>()?;
            f(&noised)
        })
        .collect()
}

#[cfg(test)]
mod stochastic_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_abs_diff_eq;

    fn straight(n: usize) -> Track {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Track::from_xyz(Srid::Enu, &x, &vec![0.0; n], None, None).unwrap()
    }

    fn sample_stats(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn test_unit_variance_laws() {
        let mut rng = seeded_rng(7);
        for law in [NoiseDistribution::Normal, NoiseDistribution::Uniform, NoiseDistribution::Laplace] {
            let xi = law.sample(50_000, &mut rng).unwrap();
            let (mean, var) = sample_stats(xi.as_slice());
            assert_abs_diff_eq!(mean, 0.0, epsilon = 0.03);
            assert_abs_diff_eq!(var, 1.0, epsilon = 0.05);
        }
    }

    #[test]
    fn test_factor_diagonal() {
        let s: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let l = NoiseProcess::factor(&s, 2.0, &Kernel::gaussian(3.0).unwrap()).unwrap();
        let cov = &l * l.transpose();
        for i in 0..20 {
            assert_abs_diff_eq!(cov[(i, i)], 4.0, epsilon = 1e-9);
        }
        assert!(cov[(0, 1)] > cov[(0, 5)]);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let t = straight(30);
        let p = NoiseProcess::new(vec![1.0, 0.2], vec![Kernel::gaussian(5.0).unwrap(), Kernel::dirac()])
            .unwrap()
            .with_distribution(NoiseDistribution::Laplace);
        let a = p.noise(&t, &mut seeded_rng(42)).unwrap();
        let b = p.noise(&t, &mut seeded_rng(42)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.positions(), t.positions());
        assert!(a.positions().iter().all(|c| c.get_z() == 0.0));
        assert_eq!(a.timestamps(), t.timestamps());
    }

    #[test]
    fn test_randomizer() {
        let t = straight(10);
        let p = NoiseProcess::new(vec![0.5], vec![Kernel::gaussian(2.0).unwrap()]).unwrap();
        let lengths = randomizer(&[t.clone()], |ts| Ok(ts[0].length()), &p, 8, &mut seeded_rng(1)).unwrap();
        assert_eq!(lengths.len(), 8);
        assert!(lengths.iter().all(|l| *l > 0.0));

        assert!(NoiseProcess::new(vec![1.0], vec![]).is_err());
        let geo = Track::from_xyz(Srid::Geo, &[2.0], &[48.0], None, None).unwrap();
        assert!(geo.noise(1.0, Kernel::dirac(), &mut seeded_rng(0)).is_err());
    }
}
