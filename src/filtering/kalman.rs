//! # Kalman filtering
//!
//! A [`KalmanFilter`] estimates a hidden state `X` along a track from the measurement
//! columns listed at estimation time:
//!
//! ```text
//! X(k+1) = F(X(k)) + w,   w ~ N(0, Q(k))
//! Y(k)   = H(X(k)) + v,   v ~ N(0, R(k))
//! ```
//!
//! `F` and `H` are [`Model`]s: constant matrices or callables. With two matrix models the
//! standard linear update is used; as soon as one model is a callable the filter switches
//! to the unscented transform, with sigma points spread by `n + λ` (`λ` = `spreading`,
//! default 0). `Q` and `R` are [`Covariance`]s: constant or functions of the step.
//!
//! Outputs
//! -----------------
//! After [`KalmanFilter::estimate`] the track carries the columns
//!
//! * `kf_0 … kf_{n-1}` – estimated state,
//! * `kf_<obs>_inov` – innovation of each measurement column,
//! * `kf_<i>_std` – state standard deviations (only with [`KalmanFilter::with_std`]).
//!
//! [`KalmanMode`] optionally copies the first state components into the positions.
//!
//! Measurements containing a NaN skip the update step (the prediction is kept).
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::progress::Progress;
use crate::track::Track;
use crate::track_errors::TrackError;

/// Non-linear model `(X, k, track) → vector`.
pub type ModelFn =
    Arc<dyn Fn(&DVector<f64>, usize, &Track) -> Result<DVector<f64>, TrackError> + Send + Sync>;

/// Step-dependent covariance `(k, track) → matrix`.
pub type CovarianceFn = Arc<dyn Fn(usize, &Track) -> Result<DMatrix<f64>, TrackError> + Send + Sync>;

/// Hook run before each step; it may overwrite the state and its covariance.
pub type RestartFn =
    Arc<dyn Fn(&mut DVector<f64>, &mut DMatrix<f64>, &Track, usize) + Send + Sync>;

#[derive(Clone)]
pub enum Model {
    Matrix(DMatrix<f64>),
    Function(ModelFn),
}

impl Model {
    fn apply(&self, x: &DVector<f64>, k: usize, track: &Track) -> Result<DVector<f64>, TrackError> {
        match self {
            Model::Matrix(m) => Ok(m * x),
            Model::Function(f) => f(x, k, track).map_err(|e| TrackError::Callback {
                step: k,
                message: e.to_string(),
            }),
        }
    }

    fn matrix(&self) -> Option<&DMatrix<f64>> {
        match self {
            Model::Matrix(m) => Some(m),
            Model::Function(_) => None,
        }
    }
}

#[derive(Clone)]
pub enum Covariance {
    Matrix(DMatrix<f64>),
    Function(CovarianceFn),
}

impl Covariance {
    fn at(&self, k: usize, track: &Track) -> Result<DMatrix<f64>, TrackError> {
        match self {
            Covariance::Matrix(m) => Ok(m.clone()),
            Covariance::Function(f) => f(k, track).map_err(|e| TrackError::Callback {
                step: k,
                message: e.to_string(),
            }),
        }
    }
}

/// Post-processing of the estimated states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KalmanMode {
    /// States are only stored as columns.
    StatesOnly,
    /// The first two state components overwrite `x` and `y`.
    StatesAs2dPositions,
    /// The first three state components overwrite `x`, `y` and `z`.
    StatesAs3dPositions,
}

#[derive(Clone)]
pub struct KalmanFilter {
    transition: Option<(Model, Covariance)>,
    observation: Option<(Model, Covariance)>,
    init: Option<(DVector<f64>, DMatrix<f64>)>,
    restart: Option<RestartFn>,
    spreading: f64,
    store_std: bool,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        KalmanFilter {
            transition: None,
            observation: None,
            init: None,
            restart: None,
            spreading: 0.0,
            store_std: false,
        }
    }
}

/// Filtered (and predicted) moments of one step.
struct Step {
    x: DVector<f64>,
    p: DMatrix<f64>,
    x_pred: DVector<f64>,
    p_pred: DMatrix<f64>,
    innovation: DVector<f64>,
}

fn sigma_points(x: &DVector<f64>, p: &DMatrix<f64>, spreading: f64) -> Result<(Vec<DVector<f64>>, Vec<f64>), TrackError> {
    let n = x.len();
    let scale = n as f64 + spreading;
    if scale <= 0.0 {
        return Err(TrackError::OutOfDomain(format!(
            "unscented spreading {spreading} too small for a state of size {n}"
        )));
    }
    let l = (p * scale)
        .cholesky()
        .ok_or_else(|| TrackError::NotPositiveDefinite("unscented transform covariance".into()))?
        .l();
    let mut points = Vec::with_capacity(2 * n + 1);
    let mut weights = Vec::with_capacity(2 * n + 1);
    points.push(x.clone());
    weights.push(spreading / scale);
    for i in 0..n {
        let col = l.column(i);
        points.push(x + &col);
        points.push(x - &col);
        weights.push(0.5 / scale);
        weights.push(0.5 / scale);
    }
    Ok((points, weights))
}

fn weighted_mean(points: &[DVector<f64>], weights: &[f64]) -> DVector<f64> {
    let mut mean = DVector::zeros(points[0].len());
    for (p, w) in points.iter().zip(weights) {
        mean += p * *w;
    }
    mean
}

fn weighted_cross(
    a: &[DVector<f64>],
    ma: &DVector<f64>,
    b: &[DVector<f64>],
    mb: &DVector<f64>,
    weights: &[f64],
) -> DMatrix<f64> {
    let mut c = DMatrix::zeros(ma.len(), mb.len());
    for ((pa, pb), w) in a.iter().zip(b).zip(weights) {
        c += (pa - ma) * (pb - mb).transpose() * *w;
    }
    c
}

impl KalmanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transition model `F` and the process covariance `Q`.
    pub fn set_transition(&mut self, f: Model, q: Covariance) -> &mut Self {
        self.transition = Some((f, q));
        self
    }

    /// Set the observation model `H` and the measurement covariance `R`.
    pub fn set_observation(&mut self, h: Model, r: Covariance) -> &mut Self {
        self.observation = Some((h, r));
        self
    }

    pub fn set_init_state(&mut self, x0: DVector<f64>, p0: DMatrix<f64>) -> &mut Self {
        self.init = Some((x0, p0));
        self
    }

    pub fn set_restart(&mut self, restart: RestartFn) -> &mut Self {
        self.restart = Some(restart);
        self
    }

    /// Sigma point spreading `λ` of the unscented transform.
    pub fn with_spreading(&mut self, spreading: f64) -> &mut Self {
        self.spreading = spreading;
        self
    }

    /// Also store the state standard deviations as `kf_<i>_std`.
    pub fn with_std(&mut self, store: bool) -> &mut Self {
        self.store_std = store;
        self
    }

    /// `true` when both models are constant matrices.
    pub fn is_linear(&self) -> bool {
        matches!(
            (&self.transition, &self.observation),
            (Some((Model::Matrix(_), _)), Some((Model::Matrix(_), _)))
        )
    }

    fn parts(&self) -> Result<(&(Model, Covariance), &(Model, Covariance), &(DVector<f64>, DMatrix<f64>)), TrackError> {
        let missing = |what: &str| TrackError::OutOfDomain(format!("Kalman filter has no {what}"));
        Ok((
            self.transition.as_ref().ok_or_else(|| missing("transition model"))?,
            self.observation.as_ref().ok_or_else(|| missing("observation model"))?,
            self.init.as_ref().ok_or_else(|| missing("initial state"))?,
        ))
    }

    fn measurements(track: &Track, obs_names: &[&str]) -> Result<Vec<DVector<f64>>, TrackError> {
        let columns = obs_names
            .iter()
            .map(|name| track.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..track.size())
            .map(|k| DVector::from_iterator(columns.len(), columns.iter().map(|c| c[k])))
            .collect())
    }

    fn forward(&self, track: &Track, obs_names: &[&str]) -> Result<Vec<Step>, TrackError> {
        let ((f, q), (h, r), (x0, p0)) = self.parts()?;
        let linear = self.is_linear();
        let ys = Self::measurements(track, obs_names)?;
        debug!(
            steps = track.size(),
            state = x0.len(),
            linear,
            "Kalman forward pass"
        );

        let mut x = x0.clone();
        let mut p = p0.clone();
        let mut steps = Vec::with_capacity(track.size());
        let mut progress = Progress::new("kalman", track.size() as u64);

        for (k, y) in ys.iter().enumerate() {
            if let Some(restart) = &self.restart {
                restart(&mut x, &mut p, track, k);
            }

            // prediction (the first step starts from the initial state)
            if k > 0 {
                let qk = q.at(k, track)?;
                if linear {
                    let fm = f.matrix().ok_or_else(|| TrackError::singular("Kalman transition"))?;
                    x = fm * &x;
                    p = fm * &p * fm.transpose() + qk;
                } else {
                    let (points, w) = sigma_points(&x, &p, self.spreading)?;
                    let moved = points
                        .iter()
                        .map(|s| f.apply(s, k, track))
                        .collect::<Result<Vec<_>, _>>()?;
                    x = weighted_mean(&moved, &w);
                    p = weighted_cross(&moved, &x, &moved, &x, &w) + qk;
                }
            }
            let x_pred = x.clone();
            let p_pred = p.clone();

            // update
            let rk = r.at(k, track)?;
            let (y_hat, s, cross) = if linear {
                let hm = h.matrix().ok_or_else(|| TrackError::singular("Kalman observation"))?;
                (hm * &x, hm * &p * hm.transpose() + &rk, &p * hm.transpose())
            } else {
                let (points, w) = sigma_points(&x, &p, self.spreading)?;
                let observed = points
                    .iter()
                    .map(|s| h.apply(s, k, track))
                    .collect::<Result<Vec<_>, _>>()?;
                let y_hat = weighted_mean(&observed, &w);
                let s = weighted_cross(&observed, &y_hat, &observed, &y_hat, &w) + &rk;
                let cross = weighted_cross(&points, &x, &observed, &y_hat, &w);
                (y_hat, s, cross)
            };
            if y.len() != y_hat.len() {
                return Err(TrackError::mismatch("Kalman measurement", y_hat.len(), y.len()));
            }

            let innovation = y - &y_hat;
            if innovation.iter().all(|v| v.is_finite()) {
                let s_inv = s.try_inverse().ok_or_else(|| {
                    TrackError::singular(&format!("Kalman innovation covariance at step {k}"))
                })?;
                let gain = &cross * s_inv;
                x += &gain * &innovation;
                p = if linear {
                    let hm = h.matrix().ok_or_else(|| TrackError::singular("Kalman observation"))?;
                    let eye = DMatrix::<f64>::identity(x.len(), x.len());
                    (eye - &gain * hm) * &p
                } else {
                    &p - &gain * &cross.transpose()
                };
            }

            steps.push(Step {
                x: x.clone(),
                p: p.clone(),
                x_pred,
                p_pred,
                innovation,
            });
            progress.inc();
        }
        progress.finish();
        Ok(steps)
    }

    fn write(
        &self,
        track: &mut Track,
        obs_names: &[&str],
        states: &[(DVector<f64>, DMatrix<f64>)],
        innovations: &[DVector<f64>],
        mode: KalmanMode,
    ) -> Result<(), TrackError> {
        let n = states.first().map_or(0, |(x, _)| x.len());
        let axes: &[&str] = match mode {
            KalmanMode::StatesOnly => &[],
            KalmanMode::StatesAs2dPositions => &["x", "y"],
            KalmanMode::StatesAs3dPositions => &["x", "y", "z"],
        };
        if !states.is_empty() && axes.len() > n {
            return Err(TrackError::OutOfDomain(format!(
                "state of size {n} cannot be written as {} coordinates",
                axes.len()
            )));
        }

        for i in 0..n {
            let column: Vec<f64> = states.iter().map(|(x, _)| x[i]).collect();
            track.add_feature_values(&format!("kf_{i}"), column)?;
            if self.store_std {
                let std: Vec<f64> = states.iter().map(|(_, p)| p[(i, i)].max(0.0).sqrt()).collect();
                track.add_feature_values(&format!("kf_{i}_std"), std)?;
            }
        }
        for (j, name) in obs_names.iter().enumerate() {
            let column: Vec<f64> = innovations.iter().map(|v| v[j]).collect();
            track.add_feature_values(&format!("kf_{name}_inov"), column)?;
        }

        for (i, axis) in axes.iter().enumerate() {
            let column: Vec<f64> = states.iter().map(|(x, _)| x[i]).collect();
            track.set_column(axis, &column)?;
        }
        Ok(())
    }

    /// Run the filter along `track`.
    ///
    /// Arguments
    /// -----------------
    /// * `obs_names` – columns forming the measurement vector of each step.
    /// * `mode` – what to do with the estimated states besides storing them.
    ///
    /// Errors
    /// ----------
    /// * `OutOfDomain` when a model or the initial state is missing.
    /// * `SingularMatrix` when an innovation covariance cannot be inverted.
    /// * `NotPositiveDefinite` when the unscented transform cannot factorise a covariance.
    /// * `Callback` when a user model fails.
    pub fn estimate(&self, track: &mut Track, obs_names: &[&str], mode: KalmanMode) -> Result<(), TrackError> {
        let steps = self.forward(track, obs_names)?;
        let states: Vec<_> = steps.iter().map(|s| (s.x.clone(), s.p.clone())).collect();
        let innovations: Vec<_> = steps.into_iter().map(|s| s.innovation).collect();
        self.write(track, obs_names, &states, &innovations, mode)
    }

    /// Forward filter followed by a Rauch–Tung–Striebel backward pass.
    ///
    /// Only available for linear models: `OutOfDomain` otherwise. The columns written are
    /// the same as for [`KalmanFilter::estimate`], with smoothed states.
    pub fn smooth(&self, track: &mut Track, obs_names: &[&str], mode: KalmanMode) -> Result<(), TrackError> {
        if !self.is_linear() {
            return Err(TrackError::OutOfDomain(
                "the RTS smoother needs matrix transition and observation models".into(),
            ));
        }
        let fm = match &self.transition {
            Some((Model::Matrix(m), _)) => m.clone(),
            _ => return Err(TrackError::singular("Kalman transition")),
        };
        let steps = self.forward(track, obs_names)?;
        let n = steps.len();
        let mut smoothed: Vec<(DVector<f64>, DMatrix<f64>)> =
            steps.iter().map(|s| (s.x.clone(), s.p.clone())).collect();

        for k in (0..n.saturating_sub(1)).rev() {
            let next = &steps[k + 1];
            let p_pred_inv = next
                .p_pred
                .clone()
                .try_inverse()
                .ok_or_else(|| TrackError::singular(&format!("RTS predicted covariance at step {}", k + 1)))?;
            let c = &steps[k].p * fm.transpose() * p_pred_inv;
            let (xs_next, ps_next) = smoothed[k + 1].clone();
            let xs = &steps[k].x + &c * (xs_next - &next.x_pred);
            let ps = &steps[k].p + &c * (ps_next - &next.p_pred) * c.transpose();
            smoothed[k] = (xs, ps);
        }

        let innovations: Vec<_> = steps.into_iter().map(|s| s.innovation).collect();
        self.write(track, obs_names, &smoothed, &innovations, mode)
    }
}

#[cfg(test)]
mod kalman_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn random_walk(n: usize, seed: u64) -> Track {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut x = Vec::with_capacity(n);
        let mut acc = 0.0;
        for _ in 0..n {
            acc += 0.1 * noise.sample(&mut rng);
            x.push(acc + noise.sample(&mut rng));
        }
        Track::from_xyz(Srid::Enu, &x, &vec![0.0; n], None, None).unwrap()
    }

    fn scalar_filter(q: f64, r: f64) -> KalmanFilter {
        let mut kf = KalmanFilter::new();
        kf.set_transition(
            Model::Matrix(DMatrix::from_element(1, 1, 1.0)),
            Covariance::Matrix(DMatrix::from_element(1, 1, q)),
        )
        .set_observation(
            Model::Matrix(DMatrix::from_element(1, 1, 1.0)),
            Covariance::Matrix(DMatrix::from_element(1, 1, r)),
        )
        .set_init_state(DVector::from_element(1, 0.0), DMatrix::from_element(1, 1, 10.0));
        kf
    }

    #[test]
    fn test_linear_matches_closed_form() {
        let (q, r) = (0.01, 1.0);
        let mut t = random_walk(50, 3);
        let y = t.column("x").unwrap();
        scalar_filter(q, r)
            .estimate(&mut t, &["x"], KalmanMode::StatesOnly)
            .unwrap();

        let (mut x, mut p) = (0.0, 10.0);
        for (k, &yk) in y.iter().enumerate() {
            if k > 0 {
                p += q;
            }
            let gain = p / (p + r);
            let inov = yk - x;
            x += gain * inov;
            p *= 1.0 - gain;
            assert_relative_eq!(t.feature("kf_0").unwrap()[k], x, epsilon = 1e-9);
            assert_relative_eq!(t.feature("kf_x_inov").unwrap()[k], inov, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unscented_matches_linear_on_linear_models() {
        let mut a = random_walk(40, 11);
        let mut b = a.clone();
        scalar_filter(0.01, 1.0)
            .estimate(&mut a, &["x"], KalmanMode::StatesOnly)
            .unwrap();

        let mut ukf = scalar_filter(0.01, 1.0);
        ukf.set_transition(
            Model::Function(Arc::new(|x: &DVector<f64>, _: usize, _: &Track| Ok(x.clone()))),
            Covariance::Matrix(DMatrix::from_element(1, 1, 0.01)),
        )
        .with_spreading(1.0);
        ukf.estimate(&mut b, &["x"], KalmanMode::StatesOnly).unwrap();

        for (u, v) in a.feature("kf_0").unwrap().iter().zip(b.feature("kf_0").unwrap()) {
            assert_relative_eq!(u, v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_errors() {
        let mut t = random_walk(5, 1);
        let kf = KalmanFilter::new();
        assert!(matches!(
            kf.estimate(&mut t, &["x"], KalmanMode::StatesOnly),
            Err(TrackError::OutOfDomain(_))
        ));

        let mut singular = scalar_filter(0.0, 0.0);
        singular.set_init_state(DVector::from_element(1, 0.0), DMatrix::from_element(1, 1, 0.0));
        assert!(matches!(
            singular.estimate(&mut t, &["x"], KalmanMode::StatesOnly),
            Err(TrackError::SingularMatrix(_))
        ));

        let mut failing = scalar_filter(0.01, 1.0);
        failing.set_observation(
            Model::Function(Arc::new(|_: &DVector<f64>, k: usize, _: &Track| {
                Err(TrackError::OutOfDomain(format!("no model at {k}")))
            })),
            Covariance::Matrix(DMatrix::from_element(1, 1, 1.0)),
        );
        assert!(matches!(
            failing.estimate(&mut t, &["x"], KalmanMode::StatesOnly),
            Err(TrackError::Callback { step: 0, .. })
        ));
        assert!(matches!(
            failing.smooth(&mut t, &["x"], KalmanMode::StatesOnly),
            Err(TrackError::OutOfDomain(_))
        ));
    }

    #[test]
    fn test_restart_and_std() {
        let mut t = random_walk(10, 5);
        let mut kf = scalar_filter(0.01, 1.0);
        kf.set_restart(Arc::new(
            |x: &mut DVector<f64>, _: &mut DMatrix<f64>, _: &Track, k: usize| {
                if k == 5 {
                    x[0] = 100.0;
                }
            },
        ))
        .with_std(true);
        // a single state cannot be written as 2D positions
        assert!(matches!(
            kf.estimate(&mut t, &["x"], KalmanMode::StatesAs2dPositions),
            Err(TrackError::OutOfDomain(_))
        ));
        assert!(t.feature_names().is_empty());

        kf.estimate(&mut t, &["x"], KalmanMode::StatesOnly).unwrap();
        assert!(t.feature("kf_0").unwrap()[5] > 10.0);
        assert!(t.feature("kf_0_std").unwrap()[9] < 1.0);
    }

    #[test]
    fn test_smoother_reduces_error() {
        let n = 200;
        let truth: Vec<f64> = (0..n).map(|i| (i as f64 / 20.0).sin() * 10.0).collect();
        let mut rng = StdRng::seed_from_u64(21);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let y: Vec<f64> = truth.iter().map(|v| v + noise.sample(&mut rng)).collect();
        let mut filtered = Track::from_xyz(Srid::Enu, &y, &vec![0.0; n], None, None).unwrap();
        let mut smoothed = filtered.clone();

        // slope of the truth reaches 0.5 per step, the walk variance has to follow it
        let kf = scalar_filter(0.5, 1.0);
        kf.estimate(&mut filtered, &["x"], KalmanMode::StatesOnly).unwrap();
        kf.smooth(&mut smoothed, &["x"], KalmanMode::StatesOnly).unwrap();

        let rmse = |est: &[f64]| {
            (est.iter().zip(&truth).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n as f64).sqrt()
        };
        let e_f = rmse(filtered.feature("kf_0").unwrap());
        let e_s = rmse(smoothed.feature("kf_0").unwrap());
        assert!(e_s < e_f);
        assert!(e_f < rmse(&y));
    }
}
