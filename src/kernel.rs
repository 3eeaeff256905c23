//! # Smoothing and covariance kernels
//!
//! A [`Kernel`] is a symmetric real function `f: ℝ → ℝ` with a finite support and a
//! `filter_boundary` flag used by the convolution operator (mirror extension near the
//! edges when set, zero fill otherwise).
//!
//! Built-in shapes are parametrised by a single scale (`width` or `sigma`):
//!
//! | shape | `f(x)` | support |
//! |-------|--------|---------|
//! | Dirac | `1` at `0`, `0` elsewhere | ½ |
//! | Uniform(w) | `1` | `w` |
//! | Triangular(w) | `1 − |x|/w` | `w` |
//! | Gaussian(σ) | `exp(−x²/2σ²)` | `3σ` |
//! | Epanechnikov(w) | `¾ (1 − (x/w)²)` | `w` |
//! | Exponential(w) | `exp(−|x|/w)` | `3w` |
//! | Sinc(w) | `sin(πx/w) / (πx/w)` | `3w` |
//!
//! Kernels are pure: evaluating never mutates anything.
use std::fmt;
use std::sync::Arc;

use crate::track_errors::TrackError;

/// User-defined kernel function.
pub type KernelFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

#[derive(Clone)]
pub enum KernelShape {
    Dirac,
    Uniform { width: f64 },
    Triangular { width: f64 },
    Gaussian { sigma: f64 },
    Epanechnikov { width: f64 },
    Exponential { width: f64 },
    Sinc { width: f64 },
    Custom { function: KernelFn, support: f64 },
}

impl fmt::Debug for KernelShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelShape::Dirac => write!(f, "Dirac"),
            KernelShape::Uniform { width } => write!(f, "Uniform({width})"),
            KernelShape::Triangular { width } => write!(f, "Triangular({width})"),
            KernelShape::Gaussian { sigma } => write!(f, "Gaussian({sigma})"),
            KernelShape::Epanechnikov { width } => write!(f, "Epanechnikov({width})"),
            KernelShape::Exponential { width } => write!(f, "Exponential({width})"),
            KernelShape::Sinc { width } => write!(f, "Sinc({width})"),
            KernelShape::Custom { support, .. } => write!(f, "Custom(support={support})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Kernel {
    shape: KernelShape,
    filter_boundary: bool,
}

impl Kernel {
    fn build(shape: KernelShape, scale: f64) -> Result<Self, TrackError> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(TrackError::OutOfDomain(format!(
                "kernel scale must be positive and finite, got {scale}"
            )));
        }
        Ok(Kernel {
            shape,
            filter_boundary: false,
        })
    }

    pub fn dirac() -> Self {
        Kernel {
            shape: KernelShape::Dirac,
            filter_boundary: false,
        }
    }

    pub fn uniform(width: f64) -> Result<Self, TrackError> {
        Self::build(KernelShape::Uniform { width }, width)
    }

    pub fn triangular(width: f64) -> Result<Self, TrackError> {
        Self::build(KernelShape::Triangular { width }, width)
    }

    pub fn gaussian(sigma: f64) -> Result<Self, TrackError> {
        Self::build(KernelShape::Gaussian { sigma }, sigma)
    }

    pub fn epanechnikov(width: f64) -> Result<Self, TrackError> {
        Self::build(KernelShape::Epanechnikov { width }, width)
    }

    pub fn exponential(width: f64) -> Result<Self, TrackError> {
        Self::build(KernelShape::Exponential { width }, width)
    }

    pub fn sinc(width: f64) -> Result<Self, TrackError> {
        Self::build(KernelShape::Sinc { width }, width)
    }

    /// Wrap an arbitrary symmetric function with an explicit support.
    pub fn custom<F>(function: F, support: f64) -> Result<Self, TrackError>
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::build(
            KernelShape::Custom {
                function: Arc::new(function),
                support,
            },
            support,
        )
    }

    /// Toggle mirror extension at the boundaries when the kernel is used as a filter.
    pub fn with_filter_boundary(mut self, filter_boundary: bool) -> Self {
        self.filter_boundary = filter_boundary;
        self
    }

    pub fn filter_boundary(&self) -> bool {
        self.filter_boundary
    }

    pub fn shape(&self) -> &KernelShape {
        &self.shape
    }

    /// Half-width outside of which the kernel is zero.
    pub fn support(&self) -> f64 {
        match self.shape {
            KernelShape::Dirac => 0.5,
            KernelShape::Uniform { width }
            | KernelShape::Triangular { width }
            | KernelShape::Epanechnikov { width } => width,
            KernelShape::Gaussian { sigma } => 3.0 * sigma,
            KernelShape::Exponential { width } | KernelShape::Sinc { width } => 3.0 * width,
            KernelShape::Custom { support, .. } => support,
        }
    }

    /// `f(x)` inside the support, `0` outside.
    pub fn evaluate(&self, x: f64) -> f64 {
        if x.abs() > self.support() {
            return 0.0;
        }
        self.profile(x)
    }

    /// Entry of a covariance (Gram) matrix. Kernels with infinite tails are not truncated
    /// so that their Gram matrices stay positive definite.
    pub fn covariance(&self, x: f64) -> f64 {
        match self.shape {
            KernelShape::Gaussian { .. } | KernelShape::Exponential { .. } | KernelShape::Sinc { .. } => {
                self.profile(x)
            }
            _ => self.evaluate(x),
        }
    }

    fn profile(&self, x: f64) -> f64 {
        match &self.shape {
            KernelShape::Dirac => {
                if x == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            KernelShape::Uniform { .. } => 1.0,
            KernelShape::Triangular { width } => 1.0 - x.abs() / width,
            KernelShape::Gaussian { sigma } => (-x * x / (2.0 * sigma * sigma)).exp(),
            KernelShape::Epanechnikov { width } => 0.75 * (1.0 - (x / width).powi(2)),
            KernelShape::Exponential { width } => (-x.abs() / width).exp(),
            KernelShape::Sinc { width } => {
                let u = std::f64::consts::PI * x / width;
                if u.abs() < 1e-12 {
                    1.0
                } else {
                    u.sin() / u
                }
            }
            KernelShape::Custom { function, .. } => function(x),
        }
    }

    /// Discrete window of length `2⌊support⌋ + 1`, centred on 0, normalised to unit sum.
    ///
    /// Sample `i` of the window is `f(i − ⌊support⌋)`. A window whose raw sum vanishes
    /// (e.g. a sinc sampled on its zeros) is returned unnormalised.
    pub fn to_sliding_window(&self) -> Vec<f64> {
        let half = self.support().floor() as i64;
        let raw: Vec<f64> = (-half..=half).map(|i| self.evaluate(i as f64)).collect();
        let total: f64 = raw.iter().sum();
        if total.abs() < f64::EPSILON {
            return raw;
        }
        raw.into_iter().map(|v| v / total).collect()
    }
}

#[cfg(test)]
mod kernel_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_support() {
        let k = Kernel::gaussian(2.0).unwrap();
        assert_relative_eq!(k.support(), 6.0);
        assert_relative_eq!(k.evaluate(0.0), 1.0);
        assert_relative_eq!(k.evaluate(2.0), (-0.5f64).exp());
        assert_eq!(k.evaluate(6.5), 0.0);
        assert!(k.covariance(6.5) > 0.0);
    }

    #[test]
    fn test_sliding_window() {
        let w = Kernel::triangular(2.0).unwrap().to_sliding_window();
        assert_eq!(w.len(), 5);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(w[2], 0.5, epsilon = 1e-12);
        assert_relative_eq!(w[1], 0.25, epsilon = 1e-12);
        assert_relative_eq!(w[0], 0.0);

        let g = Kernel::gaussian(1.5).unwrap().to_sliding_window();
        assert_eq!(g.len(), 9);
        assert_relative_eq!(g[0], g[8]);

        assert_eq!(Kernel::dirac().to_sliding_window(), vec![1.0]);
    }

    #[test]
    fn test_shapes() {
        assert_relative_eq!(Kernel::uniform(1.0).unwrap().evaluate(0.9), 1.0);
        assert_relative_eq!(Kernel::epanechnikov(2.0).unwrap().evaluate(1.0), 0.5625);
        assert_relative_eq!(Kernel::exponential(1.0).unwrap().evaluate(-1.0), (-1.0f64).exp());
        assert_relative_eq!(Kernel::sinc(1.0).unwrap().evaluate(0.0), 1.0);
        assert_relative_eq!(Kernel::sinc(1.0).unwrap().evaluate(1.0), 0.0, epsilon = 1e-12);
        let k = Kernel::custom(|x| 1.0 / (1.0 + x * x), 4.0).unwrap();
        assert_relative_eq!(k.evaluate(1.0), 0.5);
        assert_eq!(k.evaluate(5.0), 0.0);
    }

    #[test]
    fn test_invalid_scale() {
        assert!(Kernel::gaussian(0.0).is_err());
        assert!(Kernel::uniform(-1.0).is_err());
        assert!(Kernel::triangular(f64::NAN).is_err());
    }

    #[test]
    fn test_filter_boundary_flag() {
        let k = Kernel::uniform(1.0).unwrap();
        assert!(!k.filter_boundary());
        assert!(k.with_filter_boundary(true).filter_boundary());
    }
}
