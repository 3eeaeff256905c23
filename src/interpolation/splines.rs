//! Thin-plate and cardinal B-spline interpolation of a scalar signal along a 1D parameter.
//!
//! Thin-plate splines
//! -----------------
//! The interpolant is
//!
//! ```text
//! f(s) = Σ_j w_j φ(|s − s_j|) + c₀ + c₁ s,     φ(r) = r² log(r + ε)
//! ```
//!
//! with weights solving the augmented system
//!
//! ```text
//! | K + λI   P | | w |   | v |
//! | Pᵀ       0 | | c | = | 0 |      P = [1  s_i]
//! ```
//!
//! `λ = 0` interpolates the data, larger `λ` smooths it.
//!
//! B-splines
//! -----------------
//! The basis is made of translates of the centred cardinal B-spline `βᵈ` of degree `d ≤ 3`
//! (the `d`-fold convolution of the unit rectangle), spaced by the knot resolution `h`.
//! Coefficients are the least squares fit to the data (normal equations). When the basis
//! has more functions than data sites, a warning is emitted and the minimum-norm solution
//! is used instead.
use nalgebra::{DMatrix, DVector};
use tracing::warn;

use super::linear;
use crate::constants::EPS;
use crate::track_errors::TrackError;

fn tps_kernel(r: f64) -> f64 {
    r * r * (r + EPS).ln()
}

/// Thin-plate spline fit of `values` at `sites`, evaluated at `targets`.
///
/// Return
/// ------
/// * `Err(TrackError::SingularMatrix)` when the augmented system cannot be solved.
pub fn thin_plate(
    sites: &[f64],
    values: &[f64],
    targets: &[f64],
    penalisation: f64,
) -> Result<Vec<f64>, TrackError> {
    let n = sites.len();
    if n < 2 {
        return Ok(linear::interpolate(sites, values, targets));
    }

    let mut a = DMatrix::<f64>::zeros(n + 2, n + 2);
    for i in 0..n {
        for j in 0..n {
            a[(i, j)] = tps_kernel((sites[i] - sites[j]).abs());
        }
        a[(i, i)] += penalisation;
        a[(i, n)] = 1.0;
        a[(i, n + 1)] = sites[i];
        a[(n, i)] = 1.0;
        a[(n + 1, i)] = sites[i];
    }
    let mut b = DVector::<f64>::zeros(n + 2);
    b.rows_mut(0, n).copy_from_slice(values);

    let coeffs = a
        .lu()
        .solve(&b)
        .ok_or_else(|| TrackError::singular("thin-plate spline fit"))?;

    Ok(targets
        .iter()
        .map(|&s| {
            let radial: f64 = (0..n)
                .map(|j| coeffs[j] * tps_kernel((s - sites[j]).abs()))
                .sum();
            radial + coeffs[n] + coeffs[n + 1] * s
        })
        .collect())
}

/// Centred cardinal B-spline of degree `degree`, from the convolution recursion
/// `βᵈ(x) = [(x + (d+1)/2) βᵈ⁻¹(x + ½) + ((d+1)/2 − x) βᵈ⁻¹(x − ½)] / d`.
pub fn cardinal_bspline(degree: usize, x: f64) -> f64 {
    if degree == 0 {
        let a = x.abs();
        return if a < 0.5 {
            1.0
        } else if a == 0.5 {
            0.5
        } else {
            0.0
        };
    }
    let d = degree as f64;
    let half = (d + 1.0) / 2.0;
    if x.abs() >= half {
        return 0.0;
    }
    ((x + half) * cardinal_bspline(degree - 1, x + 0.5)
        + (half - x) * cardinal_bspline(degree - 1, x - 0.5))
        / d
}

/// Least squares B-spline fit of `values` at `sites`, evaluated at `targets`.
///
/// Arguments
/// -----------------
/// * `degree` – spline degree, at most 3.
/// * `resolution` – knot spacing; `None` uses one tenth of the data extent.
///
/// Errors
/// ----------
/// * `OutOfDomain` when `degree > 3` or the resolution exceeds the data extent.
/// * `SingularMatrix` when the least squares problem cannot be solved.
pub fn bspline(
    sites: &[f64],
    values: &[f64],
    targets: &[f64],
    degree: usize,
    resolution: Option<f64>,
) -> Result<Vec<f64>, TrackError> {
    if degree > 3 {
        return Err(TrackError::OutOfDomain(format!(
            "B-spline degree must be at most 3, got {degree}"
        )));
    }
    let n = sites.len();
    if n < 2 {
        return Ok(linear::interpolate(sites, values, targets));
    }
    let s0 = sites[0];
    let extent = sites[n - 1] - s0;
    let h = resolution.unwrap_or(extent / 10.0);
    if h > extent {
        return Err(TrackError::OutOfDomain(format!(
            "B-spline resolution {h} larger than the data extent {extent}"
        )));
    }
    if !(h > 0.0) {
        return Err(TrackError::OutOfDomain(format!(
            "B-spline resolution must be positive, got {h}"
        )));
    }

    let half = (degree as f64 + 1.0) / 2.0;
    let j_min = -(half.ceil() as i64);
    let j_max = (extent / h).ceil() as i64 + half.ceil() as i64;
    let centres: Vec<f64> = (j_min..=j_max)
        .map(|j| s0 + j as f64 * h)
        .filter(|c| c - half * h < sites[n - 1] && c + half * h > s0)
        .collect();
    let m = centres.len();

    let design = |points: &[f64]| {
        DMatrix::from_fn(points.len(), m, |i, j| {
            cardinal_bspline(degree, (points[i] - centres[j]) / h)
        })
    };
    let a = design(sites);
    let v = DVector::from_column_slice(values);

    let coeffs = if n >= m {
        let ata = a.transpose() * &a;
        let atv = a.transpose() * &v;
        match ata.clone().cholesky() {
            Some(chol) => chol.solve(&atv),
            None => ata
                .svd(true, true)
                .solve(&atv, 1e-12)
                .map_err(|_| TrackError::singular("B-spline normal equations"))?,
        }
    } else {
        warn!(
            sites = n,
            basis = m,
            "B-spline system is underdetermined, using the minimum-norm solution"
        );
        a.svd(true, true)
            .solve(&v, 1e-12)
            .map_err(|_| TrackError::singular("B-spline least squares"))?
    };

    Ok((design(targets) * coeffs).iter().copied().collect())
}
