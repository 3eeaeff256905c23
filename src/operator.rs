//! # Operators on analytical features
//!
//! An [`Operator`] is one of five shapes:
//!
//! | shape | signature | examples |
//! |-------|-----------|----------|
//! | [`Operator::Unary`] | `(track, af) → value` | min, max, average, variance, argmin, … |
//! | [`Operator::Binary`] | `(track, af1, af2) → value` | quadratic sum, covariance, correlation, RMSE |
//! | [`Operator::UnaryVoid`] | `(track, af_in, af_out)` | differentiate, integrate, rectify, filter |
//! | [`Operator::BinaryVoid`] | `(track, af1, af2, af_out)` | element-wise +, −, ×, ÷, … |
//! | [`Operator::ScalarVoid`] | `(track, af, arg, af_out)` | scalar multiplier, adder, power, random |
//!
//! [`Track::operate`] dispatches on the shape and broadcasts over its [`Operands`]: every
//! operand list used by the shape must have either one entry or `n` entries, and the
//! operator is applied `n` times (single entries are repeated).
//!
//! Input names may be any column (`x`, `y`, `z`, `t` or a feature). Output names `x`, `y`,
//! `z`, `t` overwrite the positions or timestamps; any other output name creates (or
//! replaces) a feature column.
//!
//! NaN handling
//! -----------------
//! `Min`, `Max`, `Averager`, `Variance`, `Stddev`, `Median`, `Argmin` and `Argmax` skip NaN
//! cells. The other reducers propagate them.
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::constants::is_reserved_name;
use crate::kernel::Kernel;
use crate::track::Track;
use crate::track_errors::TrackError;

/// Reducers `(track, af) → value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Min,
    Max,
    Averager,
    Variance,
    Stddev,
    /// Root mean square of the column.
    Rmse,
    /// Mean square of the column.
    Mse,
    Sum,
    Median,
    /// Median absolute deviation from the median.
    Mad,
    Argmin,
    Argmax,
}

/// Reducers `(track, af1, af2) → value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `√(Σ aᵢ² + bᵢ²)`
    QuadAdder,
    Covariance,
    Correlation,
    /// `√(mean (aᵢ − bᵢ)²)`
    Rmse,
}

/// Transforms `(track, af_in, af_out)`.
#[derive(Debug, Clone)]
pub enum UnaryVoidOp {
    /// `yᵢ = xᵢ − xᵢ₋₁`, `y₀ = 0`.
    Differentiator,
    /// Cumulative sum.
    Integrator,
    /// `|x|`
    Rectifier,
    /// `1 / x`
    Inverter,
    /// `−x`
    Opposite,
    /// Convolution with the kernel's sliding window. Near the edges the column is extended
    /// by mirroring when the kernel's filter-boundary flag is set, by zeros otherwise.
    Filter(Kernel),
}

/// Element-wise operations `(track, af1, af2, af_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryVoidOp {
    Adder,
    Subtracter,
    Multiplier,
    Divider,
    Power,
    /// `√(a² + b²)`
    QuadAdder,
    Max,
    Min,
}

/// Operations with a scalar argument `(track, af, arg, af_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarVoidOp {
    Multiplier,
    Adder,
    Power,
    /// `yᵢ = xᵢ + arg · ξᵢ`, `ξᵢ` standard normal drawn from the caller's generator.
    Random,
}

#[derive(Debug, Clone)]
pub enum Operator {
    Unary(UnaryOp),
    Binary(BinaryOp),
    UnaryVoid(UnaryVoidOp),
    BinaryVoid(BinaryVoidOp),
    ScalarVoid(ScalarVoidOp),
}

/// Arguments of [`Track::operate`].
///
/// ```rust, ignore
/// let ops = Operands::new(&["speed"]).scalar(&[3.6]).output(&["speed_kmh"]);
/// track.operate(&Operator::ScalarVoid(ScalarVoidOp::Multiplier), ops)?;
/// ```
#[derive(Default)]
pub struct Operands<'a> {
    first: &'a [&'a str],
    second: &'a [&'a str],
    scalar: &'a [f64],
    output: &'a [&'a str],
    rng: Option<&'a mut dyn RngCore>,
}

impl<'a> Operands<'a> {
    pub fn new(first: &'a [&'a str]) -> Self {
        Operands {
            first,
            ..Default::default()
        }
    }

    /// Second input columns of the binary shapes.
    pub fn second(mut self, second: &'a [&'a str]) -> Self {
        self.second = second;
        self
    }

    pub fn scalar(mut self, scalar: &'a [f64]) -> Self {
        self.scalar = scalar;
        self
    }

    pub fn output(mut self, output: &'a [&'a str]) -> Self {
        self.output = output;
        self
    }

    /// Generator sampled by [`ScalarVoidOp::Random`].
    pub fn rng(mut self, rng: &'a mut dyn RngCore) -> Self {
        self.rng = Some(rng);
        self
    }
}

/// Result of [`Track::operate`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorOutput {
    /// One value per application of a reducer.
    Values(Vec<f64>),
    /// Names of the columns written by a void operator.
    Written(Vec<String>),
}

impl OperatorOutput {
    /// The single reduced value, when the operator was applied once.
    pub fn value(&self) -> Option<f64> {
        match self {
            OperatorOutput::Values(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Reducers
// -------------------------------------------------------------------------------------------------

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn nonempty(values: Vec<f64>, what: &str) -> Result<Vec<f64>, TrackError> {
    if values.is_empty() {
        return Err(TrackError::EmptyTrack(what.to_string()));
    }
    Ok(values)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn arg_extremum(values: &[f64], greater: bool) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if (greater && v <= b) || (!greater && v >= b) => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Apply a reducer to a column.
///
/// Return
/// ------
/// * `Err(TrackError::EmptyTrack)` when no usable value remains (empty column, or only NaN
///   for the NaN-skipping reducers).
pub fn reduce(op: UnaryOp, values: &[f64]) -> Result<f64, TrackError> {
    let name = format!("{op:?} reducer");
    match op {
        UnaryOp::Min => Ok(nonempty(finite(values), &name)?
            .into_iter()
            .fold(f64::INFINITY, f64::min)),
        UnaryOp::Max => Ok(nonempty(finite(values), &name)?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)),
        UnaryOp::Averager => Ok(mean(&nonempty(finite(values), &name)?)),
        UnaryOp::Variance => Ok(variance(&nonempty(finite(values), &name)?)),
        UnaryOp::Stddev => Ok(variance(&nonempty(finite(values), &name)?).sqrt()),
        UnaryOp::Median => Ok(median(&nonempty(finite(values), &name)?)),
        UnaryOp::Argmin => arg_extremum(values, false)
            .map(|i| i as f64)
            .ok_or(TrackError::EmptyTrack(name)),
        UnaryOp::Argmax => arg_extremum(values, true)
            .map(|i| i as f64)
            .ok_or(TrackError::EmptyTrack(name)),
        UnaryOp::Sum => Ok(nonempty(values.to_vec(), &name)?.iter().sum()),
        UnaryOp::Mse => {
            let v = nonempty(values.to_vec(), &name)?;
            Ok(v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64)
        }
        UnaryOp::Rmse => reduce(UnaryOp::Mse, values).map(f64::sqrt),
        UnaryOp::Mad => {
            let v = nonempty(values.to_vec(), &name)?;
            if v.iter().any(|x| x.is_nan()) {
                return Ok(f64::NAN);
            }
            let m = median(&v);
            let deviations: Vec<f64> = v.iter().map(|x| (x - m).abs()).collect();
            Ok(median(&deviations))
        }
    }
}

/// Apply a two-column reducer.
pub fn reduce_pair(op: BinaryOp, a: &[f64], b: &[f64]) -> Result<f64, TrackError> {
    if a.len() != b.len() {
        return Err(TrackError::mismatch("binary operator columns", a.len(), b.len()));
    }
    if a.is_empty() {
        return Err(TrackError::EmptyTrack(format!("{op:?} reducer")));
    }
    let n = a.len() as f64;
    Ok(match op {
        BinaryOp::QuadAdder => a
            .iter()
            .zip(b)
            .map(|(x, y)| x * x + y * y)
            .sum::<f64>()
            .sqrt(),
        BinaryOp::Covariance => {
            let (ma, mb) = (mean(a), mean(b));
            a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum::<f64>() / n
        }
        BinaryOp::Correlation => {
            let cov = reduce_pair(BinaryOp::Covariance, a, b)?;
            cov / (variance(a) * variance(b)).sqrt()
        }
        BinaryOp::Rmse => (a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / n).sqrt(),
    })
}

// -------------------------------------------------------------------------------------------------
// Transforms
// -------------------------------------------------------------------------------------------------

/// Convolve `values` with `window` (odd length, centred).
fn convolve(values: &[f64], window: &[f64], mirror: bool) -> Vec<f64> {
    let n = values.len() as i64;
    let half = (window.len() / 2) as i64;
    (0..n)
        .map(|i| {
            window
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let mut j = i + k as i64 - half;
                    if j < 0 || j >= n {
                        if !mirror {
                            return 0.0;
                        }
                        if j < 0 {
                            j = -j;
                        }
                        if j >= n {
                            j = 2 * (n - 1) - j;
                        }
                        j = j.clamp(0, n - 1);
                    }
                    w * values[j as usize]
                })
                .sum()
        })
        .collect()
}

/// Apply a unary transform to a column.
pub fn transform(op: &UnaryVoidOp, values: &[f64]) -> Vec<f64> {
    match op {
        UnaryVoidOp::Differentiator => (0..values.len())
            .map(|i| if i == 0 { 0.0 } else { values[i] - values[i - 1] })
            .collect(),
        UnaryVoidOp::Integrator => values
            .iter()
            .scan(0.0, |acc, v| {
                *acc += v;
                Some(*acc)
            })
            .collect(),
        UnaryVoidOp::Rectifier => values.iter().map(|v| v.abs()).collect(),
        UnaryVoidOp::Inverter => values.iter().map(|v| 1.0 / v).collect(),
        UnaryVoidOp::Opposite => values.iter().map(|v| -v).collect(),
        UnaryVoidOp::Filter(kernel) => {
            convolve(values, &kernel.to_sliding_window(), kernel.filter_boundary())
        }
    }
}

pub fn combine(op: BinaryVoidOp, a: &[f64], b: &[f64]) -> Result<Vec<f64>, TrackError> {
    if a.len() != b.len() {
        return Err(TrackError::mismatch("binary operator columns", a.len(), b.len()));
    }
    let f = |x: f64, y: f64| match op {
        BinaryVoidOp::Adder => x + y,
        BinaryVoidOp::Subtracter => x - y,
        BinaryVoidOp::Multiplier => x * y,
        BinaryVoidOp::Divider => x / y,
        BinaryVoidOp::Power => x.powf(y),
        BinaryVoidOp::QuadAdder => x.hypot(y),
        BinaryVoidOp::Max => x.max(y),
        BinaryVoidOp::Min => x.min(y),
    };
    Ok(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect())
}

fn apply_scalar(
    op: ScalarVoidOp,
    values: &[f64],
    arg: f64,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<Vec<f64>, TrackError> {
    Ok(match op {
        ScalarVoidOp::Multiplier => values.iter().map(|v| v * arg).collect(),
        ScalarVoidOp::Adder => values.iter().map(|v| v + arg).collect(),
        ScalarVoidOp::Power => values.iter().map(|v| v.powf(arg)).collect(),
        ScalarVoidOp::Random => {
            let rng = rng.ok_or_else(|| {
                TrackError::OutOfDomain("the random operator needs a generator".into())
            })?;
            values
                .iter()
                .map(|v| {
                    let xi: f64 = StandardNormal.sample(&mut *rng);
                    v + arg * xi
                })
                .collect()
        }
    })
}

/// Number of applications for a list of operand lengths (`0` = role unused).
fn broadcast(lengths: &[usize]) -> Result<usize, TrackError> {
    let n = lengths.iter().copied().max().unwrap_or(0);
    if n == 0 {
        return Err(TrackError::OutOfDomain("operator called without operands".into()));
    }
    if let Some(&bad) = lengths.iter().find(|&&l| l != 1 && l != n) {
        return Err(TrackError::mismatch("operator operands", n, bad));
    }
    Ok(n)
}

fn pick<T: Copy>(list: &[T], k: usize) -> T {
    if list.len() == 1 {
        list[0]
    } else {
        list[k]
    }
}

fn required(len: usize, role: &str) -> Result<usize, TrackError> {
    if len == 0 {
        return Err(TrackError::OutOfDomain(format!("operator needs {role} operands")));
    }
    Ok(len)
}

impl Track {
    /// Write `values` to a position or timestamp column, or to a feature column.
    pub(crate) fn write_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), TrackError> {
        if is_reserved_name(name) {
            self.set_column(name, &values)
        } else {
            self.add_feature_values(name, values)
        }
    }

    /// Apply `op` with the broadcast rule described in the [module docs](self).
    ///
    /// Errors
    /// ----------
    /// * `MissingFeature` for an unknown input column.
    /// * `LengthMismatch` when operand lists cannot be broadcast together.
    /// * `OutOfDomain` when a role required by the shape has no operand.
    /// * `EmptyTrack` from the reducers.
    pub fn operate(&mut self, op: &Operator, mut operands: Operands<'_>) -> Result<OperatorOutput, TrackError> {
        let first = required(operands.first.len(), "input")?;
        match op {
            Operator::Unary(u) => {
                let n = broadcast(&[first])?;
                let values = (0..n)
                    .map(|k| reduce(*u, &self.column(pick(operands.first, k))?))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(OperatorOutput::Values(values))
            }
            Operator::Binary(b) => {
                let n = broadcast(&[first, required(operands.second.len(), "second input")?])?;
                let values = (0..n)
                    .map(|k| {
                        reduce_pair(
                            *b,
                            &self.column(pick(operands.first, k))?,
                            &self.column(pick(operands.second, k))?,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(OperatorOutput::Values(values))
            }
            Operator::UnaryVoid(u) => {
                let n = broadcast(&[first, required(operands.output.len(), "output")?])?;
                let mut written = Vec::with_capacity(n);
                for k in 0..n {
                    let out = transform(u, &self.column(pick(operands.first, k))?);
                    let name = pick(operands.output, k);
                    self.write_column(name, out)?;
                    written.push(name.to_string());
                }
                Ok(OperatorOutput::Written(written))
            }
            Operator::BinaryVoid(b) => {
                let n = broadcast(&[
                    first,
                    required(operands.second.len(), "second input")?,
                    required(operands.output.len(), "output")?,
                ])?;
                let mut written = Vec::with_capacity(n);
                for k in 0..n {
                    let out = combine(
                        *b,
                        &self.column(pick(operands.first, k))?,
                        &self.column(pick(operands.second, k))?,
                    )?;
                    let name = pick(operands.output, k);
                    self.write_column(name, out)?;
                    written.push(name.to_string());
                }
                Ok(OperatorOutput::Written(written))
            }
            Operator::ScalarVoid(s) => {
                let n = broadcast(&[
                    first,
                    required(operands.scalar.len(), "scalar")?,
                    required(operands.output.len(), "output")?,
                ])?;
                let mut written = Vec::with_capacity(n);
                for k in 0..n {
                    let input = self.column(pick(operands.first, k))?;
                    let out = apply_scalar(
                        *s,
                        &input,
                        pick(operands.scalar, k),
                        operands.rng.as_deref_mut(),
                    )?;
                    let name = pick(operands.output, k);
                    self.write_column(name, out)?;
                    written.push(name.to_string());
                }
                Ok(OperatorOutput::Written(written))
            }
        }
    }

    /// Shortcut for a single reducer application.
    pub fn reduce(&self, op: UnaryOp, name: &str) -> Result<f64, TrackError> {
        reduce(op, &self.column(name)?)
    }
}

#[cfg(test)]
mod operator_test {
    use super::*;
    use crate::coords::Srid;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn track() -> Track {
        let x = [1.0, 3.0, 2.0, 6.0, 4.0];
        let y = [0.0, 0.0, 1.0, 1.0, 1.0];
        Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap()
    }

    #[test]
    fn test_reducers() {
        let t = track();
        assert_eq!(t.reduce(UnaryOp::Min, "x").unwrap(), 1.0);
        assert_eq!(t.reduce(UnaryOp::Max, "x").unwrap(), 6.0);
        assert_eq!(t.reduce(UnaryOp::Argmax, "x").unwrap(), 3.0);
        assert_eq!(t.reduce(UnaryOp::Argmin, "x").unwrap(), 0.0);
        assert_relative_eq!(t.reduce(UnaryOp::Averager, "x").unwrap(), 3.2);
        assert_relative_eq!(t.reduce(UnaryOp::Variance, "x").unwrap(), 2.96, epsilon = 1e-12);
        assert_eq!(t.reduce(UnaryOp::Median, "x").unwrap(), 3.0);
        assert_eq!(t.reduce(UnaryOp::Mad, "x").unwrap(), 1.0);
        assert_relative_eq!(t.reduce(UnaryOp::Mse, "x").unwrap(), 66.0 / 5.0);
        assert_eq!(t.reduce(UnaryOp::Sum, "y").unwrap(), 3.0);
    }

    #[test]
    fn test_nan_policy() {
        let v = [1.0, f64::NAN, 3.0];
        assert_eq!(reduce(UnaryOp::Averager, &v).unwrap(), 2.0);
        assert_eq!(reduce(UnaryOp::Max, &v).unwrap(), 3.0);
        assert_eq!(reduce(UnaryOp::Argmax, &v).unwrap(), 2.0);
        assert!(reduce(UnaryOp::Sum, &v).unwrap().is_nan());
        assert!(reduce(UnaryOp::Rmse, &v).unwrap().is_nan());
        assert_eq!(
            reduce(UnaryOp::Min, &[f64::NAN]),
            Err(TrackError::EmptyTrack("Min reducer".into()))
        );
    }

    #[test]
    fn test_binary_reducers() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert_relative_eq!(reduce_pair(BinaryOp::Correlation, &a, &b).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(reduce_pair(BinaryOp::QuadAdder, &a, &b).unwrap(), 70f64.sqrt());
        assert_relative_eq!(reduce_pair(BinaryOp::Rmse, &a, &b).unwrap(), (14.0f64 / 3.0).sqrt());
        assert!(reduce_pair(BinaryOp::Rmse, &a, &b[..2]).is_err());
    }

    #[test]
    fn test_void_operators_and_broadcast() {
        let mut t = track();
        let out = t
            .operate(
                &Operator::UnaryVoid(UnaryVoidOp::Differentiator),
                Operands::new(&["x", "y"]).output(&["dx", "dy"]),
            )
            .unwrap();
        assert_eq!(out, OperatorOutput::Written(vec!["dx".into(), "dy".into()]));
        assert_eq!(t.feature("dx").unwrap(), &[0.0, 2.0, -1.0, 4.0, -2.0]);

        t.operate(
            &Operator::UnaryVoid(UnaryVoidOp::Integrator),
            Operands::new(&["dx"]).output(&["xi"]),
        )
        .unwrap();
        assert_eq!(t.feature("xi").unwrap(), &[0.0, 2.0, 1.0, 5.0, 3.0]);

        t.operate(
            &Operator::BinaryVoid(BinaryVoidOp::QuadAdder),
            Operands::new(&["dx"]).second(&["dy"]).output(&["step"]),
        )
        .unwrap();
        assert_relative_eq!(t.feature("step").unwrap()[2], 2f64.sqrt());

        // one input broadcast against two scalars
        t.operate(
            &Operator::ScalarVoid(ScalarVoidOp::Multiplier),
            Operands::new(&["x"]).scalar(&[2.0, 10.0]).output(&["x2", "x10"]),
        )
        .unwrap();
        assert_eq!(t.feature("x10").unwrap()[3], 60.0);

        let values = t
            .operate(&Operator::Unary(UnaryOp::Max), Operands::new(&["x2", "x10"]))
            .unwrap();
        assert_eq!(values, OperatorOutput::Values(vec![12.0, 60.0]));

        let bad = t.operate(
            &Operator::ScalarVoid(ScalarVoidOp::Adder),
            Operands::new(&["x", "y"]).scalar(&[1.0, 2.0, 3.0]).output(&["a"]),
        );
        assert!(matches!(bad, Err(TrackError::LengthMismatch { .. })));
    }

    #[test]
    fn test_binary_broadcast_pairs_columns() {
        let mut t = track();
        let values = t
            .operate(
                &Operator::Binary(BinaryOp::Rmse),
                Operands::new(&["x", "y"]).second(&["x"]),
            )
            .unwrap();
        let OperatorOutput::Values(values) = values else {
            panic!("reducers return values");
        };
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], 0.0);
        assert_relative_eq!(values[1], reduce_pair(BinaryOp::Rmse, &t.column("y").unwrap(), &t.column("x").unwrap()).unwrap());
    }

    #[test]
    fn test_write_positions() {
        let mut t = track();
        t.operate(
            &Operator::ScalarVoid(ScalarVoidOp::Adder),
            Operands::new(&["x"]).scalar(&[1.0]).output(&["x"]),
        )
        .unwrap();
        assert_eq!(t.column("x").unwrap(), vec![2.0, 4.0, 3.0, 7.0, 5.0]);
        assert!(t.feature_names().is_empty());
    }

    #[test]
    fn test_filter_boundaries() {
        let values = vec![1.0; 6];
        let mirrored = transform(
            &UnaryVoidOp::Filter(Kernel::uniform(1.0).unwrap().with_filter_boundary(true)),
            &values,
        );
        for v in &mirrored {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
        let zeroed = transform(&UnaryVoidOp::Filter(Kernel::uniform(1.0).unwrap()), &values);
        assert_relative_eq!(zeroed[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(zeroed[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_random_needs_generator() {
        let mut t = track();
        let op = Operator::ScalarVoid(ScalarVoidOp::Random);
        assert!(t
            .operate(&op, Operands::new(&["x"]).scalar(&[1.0]).output(&["noisy"]))
            .is_err());

        let mut rng = StdRng::seed_from_u64(7);
        t.operate(
            &op,
            Operands::new(&["x"]).scalar(&[0.0]).output(&["same"]).rng(&mut rng),
        )
        .unwrap();
        assert_eq!(t.feature("same").unwrap(), t.column("x").unwrap().as_slice());

        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let mut t1 = track();
        let mut t2 = track();
        t1.operate(&op, Operands::new(&["x"]).scalar(&[1.0]).output(&["n"]).rng(&mut a))
            .unwrap();
        t2.operate(&op, Operands::new(&["x"]).scalar(&[1.0]).output(&["n"]).rng(&mut b))
            .unwrap();
        assert_eq!(t1.feature("n").unwrap(), t2.feature("n").unwrap());
    }
}
