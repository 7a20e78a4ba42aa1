//! Dense linear algebra: covariance from a cost Hessian, and straight-line
//! least squares.
//!
//! At a minimum of a cost with `errordef` `e`, the parameter covariance is
//! `2e · H⁻¹`. The Hessian is small (one row per free parameter), so a dense
//! inverse is fine; we try Cholesky first (the Hessian should be positive
//! definite at a proper minimum) and fall back to an SVD pseudo-inverse for
//! nearly flat directions.

use nalgebra::{DMatrix, DVector};

/// Invert a symmetric Hessian and scale it into a covariance matrix.
///
/// Returns `None` if the matrix is not finite or cannot be inverted robustly.
pub fn covariance_from_hessian(hessian: &DMatrix<f64>, errordef: f64) -> Option<DMatrix<f64>> {
    if hessian.nrows() != hessian.ncols() || hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let inverse = match hessian.clone().cholesky() {
        Some(chol) => chol.inverse(),
        None => hessian.clone().svd(true, true).pseudo_inverse(1e-12).ok()?,
    };
    if inverse.iter().all(|v| v.is_finite()) {
        Some(inverse * (2.0 * errordef))
    } else {
        None
    }
}

/// Least-squares line `y = slope·x + intercept`, as `(slope, intercept)`.
///
/// `None` for fewer than two points or when all `x` coincide.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let design = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { x[i] } else { 1.0 });
    let svd = design.svd(true, true);
    if svd.rank(1e-12) < 2 {
        return None;
    }
    let coef = svd.solve(&DVector::from_column_slice(y), 1e-12).ok()?;
    Some((coef[0], coef[1])).filter(|(a, b)| a.is_finite() && b.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn diagonal_hessian_gives_reciprocal_variances() {
        // Gaussian NLL 0.5 * (x/σ)^2 has H = 1/σ^2 and errordef 0.5.
        let h = DMatrix::from_row_slice(2, 2, &[1.0 / 4.0, 0.0, 0.0, 1.0 / 9.0]);
        let cov = covariance_from_hessian(&h, 0.5).unwrap();
        assert_relative_eq!(cov[(0, 0)], 4.0, epsilon = 1e-10);
        assert_relative_eq!(cov[(1, 1)], 9.0, epsilon = 1e-10);
    }

    #[test]
    fn non_finite_hessian_is_rejected() {
        let h = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(covariance_from_hessian(&h, 1.0).is_none());
    }

    #[test]
    fn line_through_points() {
        let (slope, intercept) = linear_fit(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.1, 4.9, 7.0]).unwrap();
        assert_relative_eq!(slope, 1.98, epsilon = 1e-10);
        assert_relative_eq!(intercept, 1.03, epsilon = 1e-10);

        assert!(linear_fit(&[1.0], &[2.0]).is_none());
        assert!(linear_fit(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).is_none());
    }
}
