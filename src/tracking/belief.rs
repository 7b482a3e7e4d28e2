//! Gaussian belief over the vehicle state.

use nalgebra::{DMatrix, DVector};

/// A multivariate Gaussian belief.
///
/// The dimension is authoritative: 4 means the ground state
/// `(x, x_dot, y, y_dot)` in the projected plane, 2 means the road state
/// `(s, s_dot)` along an edge. The filter and the sampler branch on it.
#[derive(Debug, Clone)]
pub struct GaussianBelief {
    /// Mean vector (state estimate)
    pub mean: DVector<f64>,
    /// Covariance matrix (uncertainty)
    pub covariance: DMatrix<f64>,
}

impl GaussianBelief {
    /// Create a new belief.
    ///
    /// # Panics
    /// Debug-asserts that the covariance is square and matches the mean.
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Self {
        debug_assert_eq!(covariance.nrows(), covariance.ncols());
        debug_assert_eq!(mean.len(), covariance.nrows());
        Self { mean, covariance }
    }

    /// State dimension (2 on-road, 4 off-road).
    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Whether this belief lives in road coordinates.
    #[inline]
    pub fn is_road(&self) -> bool {
        self.dim() == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_discriminates_regimes() {
        let road = GaussianBelief::new(DVector::zeros(2), DMatrix::identity(2, 2));
        let ground = GaussianBelief::new(DVector::zeros(4), DMatrix::identity(4, 4));

        assert!(road.is_road());
        assert_eq!(road.dim(), 2);
        assert!(!ground.is_road());
        assert_eq!(ground.dim(), 4);
    }
}
