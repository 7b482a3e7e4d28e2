//! Linear algebra utilities
//!
//! Gaussian densities and matrix helpers shared by the tracking filter and
//! the trajectory sampler.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Compute log Gaussian PDF for numerical stability
///
/// # Arguments
/// * `x` - Point to evaluate
/// * `mu` - Mean vector
/// * `sigma` - Covariance matrix
///
/// # Returns
/// Log probability density, or negative infinity if the covariance is not
/// positive definite.
pub fn log_gaussian_pdf(x: &DVector<f64>, mu: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
    let n = x.len() as f64;
    let diff = x - mu;

    let det = sigma.determinant();
    if det <= 0.0 {
        return f64::NEG_INFINITY;
    }

    match sigma.clone().cholesky() {
        Some(chol) => {
            let inv_sigma_diff = chol.solve(&diff);
            let mahalanobis = diff.dot(&inv_sigma_diff);

            -0.5 * (n * (2.0 * PI).ln() + det.ln() + mahalanobis)
        }
        None => f64::NEG_INFINITY,
    }
}

/// Check if matrix is positive definite
pub fn is_positive_definite(matrix: &DMatrix<f64>) -> bool {
    matrix.clone().cholesky().is_some()
}

/// Make matrix symmetric
///
/// Ensures a matrix is symmetric by averaging with its transpose
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (matrix + matrix.transpose())
}

/// Lower Cholesky factor of a covariance matrix.
///
/// Returns `None` when the matrix is not positive definite.
pub fn cholesky_sqrt(matrix: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    matrix.clone().cholesky().map(|c| c.l())
}
