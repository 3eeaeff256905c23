//! # Hidden Markov model decoding
//!
//! Viterbi decoder over time-varying state sets:
//!
//! * `S(track, k)` – candidate states at step `k` (any number, at least one),
//! * `Q(s₁, s₂, k, track)` – transition score from `s₁ ∈ S(k)` to `s₂ ∈ S(k+1)`,
//! * `P(s, y, k, track)` – likelihood of measurement `y` in state `s`.
//!
//! Scores are probabilities, or log-probabilities when the model is built with `log = true`.
//! The decoder returns the path of minimum cost `−Σ log Q − Σ log P`; ties are broken in
//! favour of the lowest state index.
//!
//! Measurements are assembled from track columns according to [`HmmMode`]: a plain vector
//! of values, or a 2D/3D [`Coord`] built from the first two/three columns. In position
//! modes the decoded states are also written back into the positions.
use std::sync::Arc;

use tracing::debug;

use crate::coords::Coord;
use crate::track::Track;
use crate::track_errors::TrackError;

/// Column written by [`HiddenMarkovModel::estimate`].
pub const HMM_OUTPUT: &str = "hmm_output";

/// Measurement handed to the emission function.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Values(Vec<f64>),
    Position(Coord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmmMode {
    /// Measurements are the raw column values.
    Values,
    /// The first two columns form an ENU position (`z = 0`).
    Positions2d,
    /// The first three columns form an ENU position.
    Positions3d,
}

/// What a hidden state contributes to the outputs.
pub trait HmmState: Clone {
    /// Value stored in the `hmm_output` column; `index` is the rank of the state in `S(k)`.
    fn output_value(&self, index: usize) -> f64 {
        index as f64
    }

    /// Position written back in the position modes.
    fn position(&self) -> Option<Coord> {
        None
    }
}

impl HmmState for f64 {
    fn output_value(&self, _: usize) -> f64 {
        *self
    }
}

impl HmmState for usize {
    fn output_value(&self, _: usize) -> f64 {
        *self as f64
    }
}

impl HmmState for Coord {
    fn position(&self) -> Option<Coord> {
        Some(*self)
    }
}

pub type StatesFn<S> = Arc<dyn Fn(&Track, usize) -> Vec<S> + Send + Sync>;
pub type TransitionFn<S> = Arc<dyn Fn(&S, &S, usize, &Track) -> f64 + Send + Sync>;
pub type EmissionFn<S> = Arc<dyn Fn(&S, &Measurement, usize, &Track) -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct HiddenMarkovModel<S> {
    states: StatesFn<S>,
    transition: TransitionFn<S>,
    emission: EmissionFn<S>,
    log: bool,
}

/// Decoded path: index of the chosen state at every step and total cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiPath {
    pub indices: Vec<usize>,
    pub cost: f64,
}

impl<S: HmmState + 'static> HiddenMarkovModel<S> {
    pub fn new(states: StatesFn<S>, transition: TransitionFn<S>, emission: EmissionFn<S>, log: bool) -> Self {
        HiddenMarkovModel {
            states,
            transition,
            emission,
            log,
        }
    }

    /// Model whose state set and scores do not depend on the step.
    pub fn stationary<Q, P>(states: Vec<S>, transition: Q, emission: P, log: bool) -> Self
    where
        S: Send + Sync,
        Q: Fn(&S, &S) -> f64 + Send + Sync + 'static,
        P: Fn(&S, &Measurement) -> f64 + Send + Sync + 'static,
    {
        HiddenMarkovModel {
            states: Arc::new(move |_: &Track, _: usize| states.clone()),
            transition: Arc::new(move |a: &S, b: &S, _: usize, _: &Track| transition(a, b)),
            emission: Arc::new(move |s: &S, y: &Measurement, _: usize, _: &Track| emission(s, y)),
            log,
        }
    }

    fn cost(&self, score: f64) -> f64 {
        if self.log {
            -score
        } else {
            -score.ln()
        }
    }

    /// Measurements of every step.
    pub fn measurements(track: &Track, obs_names: &[&str], mode: HmmMode) -> Result<Vec<Measurement>, TrackError> {
        let columns = obs_names
            .iter()
            .map(|name| track.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let needed = match mode {
            HmmMode::Values => 0,
            HmmMode::Positions2d => 2,
            HmmMode::Positions3d => 3,
        };
        if columns.len() < needed {
            return Err(TrackError::mismatch("HMM position columns", needed, columns.len()));
        }
        Ok((0..track.size())
            .map(|k| match mode {
                HmmMode::Values => Measurement::Values(columns.iter().map(|c| c[k]).collect()),
                HmmMode::Positions2d => Measurement::Position(Coord::enu(columns[0][k], columns[1][k], 0.0)),
                HmmMode::Positions3d => {
                    Measurement::Position(Coord::enu(columns[0][k], columns[1][k], columns[2][k]))
                }
            })
            .collect())
    }

    /// Viterbi decoding of precomputed measurements.
    ///
    /// Returns the state sets `S(k)` alongside the optimal path.
    pub fn decode(&self, track: &Track, measurements: &[Measurement]) -> Result<(Vec<Vec<S>>, ViterbiPath), TrackError> {
        let n = measurements.len();
        if n == 0 {
            return Err(TrackError::EmptyTrack("HMM decoding".into()));
        }
        let sets: Vec<Vec<S>> = (0..n).map(|k| (self.states)(track, k)).collect();
        if let Some(k) = sets.iter().position(Vec::is_empty) {
            return Err(TrackError::OutOfDomain(format!("no candidate state at step {k}")));
        }

        let mut cost: Vec<f64> = sets[0]
            .iter()
            .map(|s| self.cost((self.emission)(s, &measurements[0], 0, track)))
            .collect();
        let mut back: Vec<Vec<usize>> = Vec::with_capacity(n);
        back.push(vec![0; sets[0].len()]);

        for k in 1..n {
            let mut next_cost = Vec::with_capacity(sets[k].len());
            let mut next_back = Vec::with_capacity(sets[k].len());
            for s2 in &sets[k] {
                let (best, best_cost) = sets[k - 1].iter().enumerate().fold(
                    (0, f64::INFINITY),
                    |(bi, bc), (i, s1)| {
                        let c = cost[i] + self.cost((self.transition)(s1, s2, k - 1, track));
                        if c < bc {
                            (i, c)
                        } else {
                            (bi, bc)
                        }
                    },
                );
                next_cost.push(best_cost + self.cost((self.emission)(s2, &measurements[k], k, track)));
                next_back.push(best);
            }
            cost = next_cost;
            back.push(next_back);
        }

        let (mut last, total) = cost
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(bi, bc), (i, &c)| if c < bc { (i, c) } else { (bi, bc) });
        let mut indices = vec![0; n];
        for k in (0..n).rev() {
            indices[k] = last;
            last = back[k][last];
        }
        debug!(steps = n, cost = total, "Viterbi path decoded");
        Ok((sets, ViterbiPath { indices, cost: total }))
    }

    /// Cost of an explicit path (indices into each `S(k)`).
    pub fn path_cost(&self, track: &Track, measurements: &[Measurement], indices: &[usize]) -> Result<f64, TrackError> {
        if indices.len() != measurements.len() {
            return Err(TrackError::mismatch("HMM path", measurements.len(), indices.len()));
        }
        let mut total = 0.0;
        let mut previous: Option<S> = None;
        for (k, &i) in indices.iter().enumerate() {
            let set = (self.states)(track, k);
            let s = set.get(i).ok_or(TrackError::IndexOutOfRange {
                index: i,
                len: set.len(),
            })?;
            if let Some(p) = &previous {
                total += self.cost((self.transition)(p, s, k - 1, track));
            }
            total += self.cost((self.emission)(s, &measurements[k], k, track));
            previous = Some(s.clone());
        }
        Ok(total)
    }

    /// Decode `track` and write the outputs.
    ///
    /// The `hmm_output` column receives each chosen state's [`HmmState::output_value`]; in
    /// the position modes, states providing a position also overwrite the observation's
    /// position (frame permitting).
    ///
    /// Return
    /// ------
    /// * The decoded states, one per observation.
    pub fn estimate(&self, track: &mut Track, obs_names: &[&str], mode: HmmMode) -> Result<Vec<S>, TrackError> {
        let measurements = Self::measurements(track, obs_names, mode)?;
        let (sets, path) = self.decode(track, &measurements)?;
        let states: Vec<S> = path
            .indices
            .iter()
            .enumerate()
            .map(|(k, &i)| sets[k][i].clone())
            .collect();

        let output = states
            .iter()
            .zip(&path.indices)
            .map(|(s, &i)| s.output_value(i))
            .collect();
        track.add_feature_values(HMM_OUTPUT, output)?;

        if mode != HmmMode::Values {
            for (k, s) in states.iter().enumerate() {
                if let Some(p) = s.position() {
                    let p = if mode == HmmMode::Positions2d {
                        p.with_z(track.position(k)?.get_z())
                    } else {
                        p
                    };
                    track.set_position(k, p)?;
                }
            }
        }
        Ok(states)
    }
}

#[cfg(test)]
mod hmm_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_relative_eq;

    fn noisy_levels() -> Track {
        let x = [0.1, -0.2, 0.3, 2.1, 1.8, 2.2];
        Track::from_xyz(Srid::Enu, &x, &[0.0; 6], None, None).unwrap()
    }

    fn level_model(log: bool) -> HiddenMarkovModel<f64> {
        HiddenMarkovModel::stationary(
            vec![0.0, 1.0, 2.0, 3.0],
            move |a: &f64, b: &f64| {
                let p = if a == b { 0.7 } else { 0.1 };
                if log {
                    f64::ln(p)
                } else {
                    p
                }
            },
            move |s: &f64, y: &Measurement| {
                let Measurement::Values(v) = y else { return 0.0 };
                let p = (-(v[0] - s).powi(2)).exp();
                if log {
                    p.ln()
                } else {
                    p
                }
            },
            log,
        )
    }

    fn brute_force(model: &HiddenMarkovModel<f64>, track: &Track, y: &[Measurement]) -> f64 {
        let n = y.len();
        let mut best = f64::INFINITY;
        for code in 0..4usize.pow(n as u32) {
            let path: Vec<usize> = (0..n).map(|k| (code / 4usize.pow(k as u32)) % 4).collect();
            best = best.min(model.path_cost(track, y, &path).unwrap());
        }
        best
    }

    #[test]
    fn test_viterbi_is_optimal() {
        let t = noisy_levels();
        for log in [false, true] {
            let model = level_model(log);
            let y = HiddenMarkovModel::<f64>::measurements(&t, &["x"], HmmMode::Values).unwrap();
            let (_, path) = model.decode(&t, &y).unwrap();
            assert_eq!(path.indices, vec![0, 0, 0, 2, 2, 2]);
            assert_relative_eq!(path.cost, brute_force(&model, &t, &y), epsilon = 1e-9);
            assert_relative_eq!(path.cost, model.path_cost(&t, &y, &path.indices).unwrap(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_estimate_writes_output() {
        let mut t = noisy_levels();
        let states = level_model(false).estimate(&mut t, &["x"], HmmMode::Values).unwrap();
        assert_eq!(states, vec![0.0, 0.0, 0.0, 2.0, 2.0, 2.0]);
        assert_eq!(t.feature(HMM_OUTPUT).unwrap(), &[0.0, 0.0, 0.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_position_mode_snaps() {
        // candidate positions: the two nearest integer grid nodes along x
        let mut t = Track::from_xyz(Srid::Enu, &[0.2, 1.1, 1.9], &[0.1, -0.1, 0.0], None, None).unwrap();
        let model: HiddenMarkovModel<Coord> = HiddenMarkovModel::new(
            Arc::new(|track: &Track, k: usize| {
                let x = track.positions()[k].get_x().floor();
                vec![Coord::enu(x, 0.0, 0.0), Coord::enu(x + 1.0, 0.0, 0.0)]
            }),
            Arc::new(|_: &Coord, _: &Coord, _: usize, _: &Track| 1.0),
            Arc::new(|s: &Coord, y: &Measurement, _: usize, _: &Track| match y {
                Measurement::Position(p) => (-s.distance_2d(p)).exp(),
                Measurement::Values(_) => 0.0,
            }),
            false,
        );
        model.estimate(&mut t, &["x", "y"], HmmMode::Positions2d).unwrap();
        assert_eq!(t.column("x").unwrap(), vec![0.0, 1.0, 2.0]);
        assert_eq!(t.column("y").unwrap(), vec![0.0, 0.0, 0.0]);
        assert_eq!(t.feature(HMM_OUTPUT).unwrap(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_errors() {
        let mut t = noisy_levels();
        let empty: HiddenMarkovModel<f64> = HiddenMarkovModel::stationary(
            vec![],
            |_: &f64, _: &f64| 1.0,
            |_: &f64, _: &Measurement| 1.0,
            false,
        );
        assert!(matches!(
            empty.estimate(&mut t, &["x"], HmmMode::Values),
            Err(TrackError::OutOfDomain(_))
        ));
        assert!(level_model(false)
            .estimate(&mut t, &["x"], HmmMode::Positions2d)
            .is_err());
    }
}
