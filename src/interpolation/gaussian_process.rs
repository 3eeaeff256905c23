//! Gaussian process regression along time.
//!
//! Data are debiased by their mean `m`; with Gram matrix `K_ij = k(t_i − t_j) + σ² δ_ij`
//! the posterior at `t*` is
//!
//! ```text
//! μ(t*)  = m + k*ᵀ K⁻¹ (v − m)
//! σ²(t*) = k(0) − k*ᵀ K⁻¹ k*
//! ```
//!
//! `K` is factorised once with a Cholesky decomposition.
use nalgebra::{DMatrix, DVector};

use crate::constants::GRAM_REGULARISER;
use crate::kernel::Kernel;
use crate::track_errors::TrackError;

/// Posterior mean (and optionally standard deviation) at `targets`.
///
/// Return
/// ------
/// * `(mean, sigma)`, with `sigma` only when `with_sigma` is set.
/// * `Err(TrackError::NotPositiveDefinite)` when the Gram matrix cannot be factorised.
pub fn posterior(
    kernel: &Kernel,
    noise: f64,
    sites: &[f64],
    values: &[f64],
    targets: &[f64],
    with_sigma: bool,
) -> Result<(Vec<f64>, Option<Vec<f64>>), TrackError> {
    let n = sites.len();
    if n == 0 {
        return Err(TrackError::EmptyTrack("Gaussian process".into()));
    }
    let mean = values.iter().sum::<f64>() / n as f64;

    let gram = DMatrix::from_fn(n, n, |i, j| {
        let k = kernel.covariance(sites[i] - sites[j]);
        if i == j {
            k + noise * noise + GRAM_REGULARISER
        } else {
            k
        }
    });
    let chol = gram.cholesky().ok_or_else(|| {
        TrackError::NotPositiveDefinite("Gaussian process Gram matrix".into())
    })?;
    let centred = DVector::from_iterator(n, values.iter().map(|v| v - mean));
    let alpha = chol.solve(&centred);

    let k0 = kernel.covariance(0.0);
    let mut mu = Vec::with_capacity(targets.len());
    let mut sigma = with_sigma.then(|| Vec::with_capacity(targets.len()));
    for &t in targets {
        let kstar = DVector::from_iterator(n, sites.iter().map(|s| kernel.covariance(t - s)));
        mu.push(mean + kstar.dot(&alpha));
        if let Some(sigma) = sigma.as_mut() {
            let var = k0 - kstar.dot(&chol.solve(&kstar));
            sigma.push(var.max(0.0).sqrt());
        }
    }
    Ok((mu, sigma))
}
