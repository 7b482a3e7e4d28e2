//! Hybrid road-tracking filter.
//!
//! Two embedded linear-Gaussian filters share one belief: a 4-D
//! constant-velocity model `(x, x_dot, y, y_dot)` for free motion on the
//! plane and a 2-D model `(s, s_dot)` for motion pinned to an edge, plus
//! the projection operators that move a belief between the two frames.
//! Process noise enters through a covariance factor `Gamma`, so
//! `Q = Gamma * sigma^2 * Gamma^T` stays consistent between prediction and
//! the sampler's noise draws.

use nalgebra::{DMatrix, DVector, Vector2};

use crate::common::linalg::{is_positive_definite, log_gaussian_pdf, symmetrize};
use crate::tracking::belief::GaussianBelief;
use crate::tracking::errors::TrackingError;
use crate::tracking::path::PathEdge;
use crate::tracking::state::InitialParameters;

/// Linear-Gaussian motion and observation models for both tracking regimes.
///
/// The filter is cheap to clone; each vehicle state carries its own copy
/// with its own time step, so chains share no mutable state.
#[derive(Debug, Clone)]
pub struct RoadTrackingFilter {
    /// Observation noise covariance `R` (2x2 diagonal).
    obs_cov: DMatrix<f64>,
    /// Per-axis ground acceleration variance.
    off_road_variance: Vector2<f64>,
    /// Along-edge acceleration variance.
    on_road_variance: f64,
    /// Current prediction time step, seconds.
    dt: f64,
    /// Time step assumed for a chain's first observation.
    default_dt: f64,
}

impl RoadTrackingFilter {
    pub fn new(params: &InitialParameters) -> Self {
        Self {
            obs_cov: DMatrix::from_diagonal(&DVector::from_vec(vec![
                params.obs_variance[0],
                params.obs_variance[1],
            ])),
            off_road_variance: Vector2::new(
                params.off_road_state_variance[0],
                params.off_road_state_variance[1],
            ),
            on_road_variance: params.on_road_state_variance,
            dt: params.initial_time_delta,
            default_dt: params.initial_time_delta,
        }
    }

    /// Set the prediction time step. Non-positive steps are fatal.
    pub fn set_time_diff(&mut self, dt: f64) -> Result<(), TrackingError> {
        if !(dt > 0.0) {
            return Err(TrackingError::numeric(format!(
                "non-positive time delta {}",
                dt
            )));
        }
        self.dt = dt;
        Ok(())
    }

    pub fn time_diff(&self) -> f64 {
        self.dt
    }

    /// Time step assumed when an observation has no predecessor.
    pub fn default_time_diff(&self) -> f64 {
        self.default_dt
    }

    /// Observation noise covariance `R`.
    pub fn observation_covariance(&self) -> &DMatrix<f64> {
        &self.obs_cov
    }

    /// Ground observation matrix `O_g` (positions out of the 4-D state).
    pub fn ground_observation_matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 4, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }

    /// Initial off-road belief: zero mean, identity covariance.
    pub fn initial_ground_belief(&self) -> GaussianBelief {
        GaussianBelief::new(DVector::zeros(4), DMatrix::identity(4, 4))
    }

    /// Initial on-road belief: zero mean, identity covariance.
    pub fn initial_road_belief(&self) -> GaussianBelief {
        GaussianBelief::new(DVector::zeros(2), DMatrix::identity(2, 2))
    }

    fn ground_transition(&self) -> DMatrix<f64> {
        let dt = self.dt;
        DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, dt, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 1.0, dt,
                0.0, 0.0, 0.0, 1.0,
            ],
        )
    }

    fn road_transition(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[1.0, self.dt, 0.0, 1.0])
    }

    /// Covariance factor `Gamma`: 2x1 on-road, 4x2 off-road.
    ///
    /// Spreads the underlying acceleration noise onto the state, with
    /// `dt^2/2` on positions and `dt` on velocities per axis.
    pub fn covariance_factor(&self, is_road: bool) -> DMatrix<f64> {
        let half = self.dt * self.dt / 2.0;
        if is_road {
            DMatrix::from_row_slice(2, 1, &[half, self.dt])
        } else {
            DMatrix::from_row_slice(
                4,
                2,
                &[
                    half, 0.0,
                    self.dt, 0.0,
                    0.0, half,
                    0.0, self.dt,
                ],
            )
        }
    }

    /// Underlying acceleration noise covariance sampled through the factor:
    /// 1x1 on-road, 2x2 off-road, diagonal.
    pub fn state_noise_covariance(&self, is_road: bool) -> DMatrix<f64> {
        if is_road {
            DMatrix::from_element(1, 1, self.on_road_variance)
        } else {
            DMatrix::from_diagonal(&DVector::from_vec(vec![
                self.off_road_variance.x,
                self.off_road_variance.y,
            ]))
        }
    }

    fn process_noise(&self, is_road: bool) -> DMatrix<f64> {
        let gamma = self.covariance_factor(is_road);
        &gamma * self.state_noise_covariance(is_road) * gamma.transpose()
    }

    /// Run one prediction step, crossing regimes when the edges demand it.
    ///
    /// - off-road to off-road: ground filter;
    /// - on-road to on-road: road filter, shifting the along-path origin by
    ///   the old edge's length when the edge changed;
    /// - on-road to off-road: project the belief to the ground frame via
    ///   `old_edge`, then ground-predict;
    /// - off-road to on-road: project the belief onto `new_edge`'s line,
    ///   then road-predict.
    pub fn predict(
        &self,
        belief: &mut GaussianBelief,
        new_edge: &PathEdge,
        old_edge: Option<&PathEdge>,
    ) -> Result<(), TrackingError> {
        match (belief.is_road(), new_edge) {
            (false, PathEdge::Empty) => {
                self.predict_linear(belief, false);
                Ok(())
            }
            (false, pe @ PathEdge::OnRoad { .. }) => {
                Self::project_to_road(belief, pe)?;
                self.predict_linear(belief, true);
                Ok(())
            }
            (true, PathEdge::OnRoad { edge, .. }) => {
                if let Some(PathEdge::OnRoad {
                    edge: old,
                    ..
                }) = old_edge
                {
                    if old.id() != edge.id() {
                        // Keep s zeroed at the new edge's start
                        belief.mean[0] -= old.length();
                    }
                }
                self.predict_linear(belief, true);
                Ok(())
            }
            (true, PathEdge::Empty) => {
                let old = old_edge.and_then(|pe| {
                    if pe.is_empty() {
                        None
                    } else {
                        Some(pe)
                    }
                });
                match old {
                    Some(pe) => {
                        Self::invert_projection(belief, pe)?;
                        self.predict_linear(belief, false);
                        Ok(())
                    }
                    None => Err(TrackingError::GraphInconsistency {
                        description:
                            "road belief leaving the network without a current edge".to_string(),
                    }),
                }
            }
        }
    }

    fn predict_linear(&self, belief: &mut GaussianBelief, is_road: bool) {
        let f = if is_road {
            self.road_transition()
        } else {
            self.ground_transition()
        };
        belief.mean = &f * &belief.mean;
        belief.covariance = symmetrize(&(&f * &belief.covariance * f.transpose()
            + self.process_noise(is_road)));
    }

    /// Kalman measurement update with a world-coordinate observation.
    ///
    /// On-road beliefs observe the scalar along-path position of the point
    /// projected onto the edge, with noise `tau^T R tau`.
    pub fn update(
        &self,
        belief: &mut GaussianBelief,
        observation: &Vector2<f64>,
        edge: &PathEdge,
    ) -> Result<(), TrackingError> {
        match edge {
            PathEdge::Empty => self.update_ground(belief, observation),
            PathEdge::OnRoad {
                edge,
                dist_to_start,
            } => {
                let (arc, _) = edge.project(observation);
                let tangent = edge.tangent_at(arc);
                let s_obs = dist_to_start + arc;
                // tau^T R tau
                let r = &self.obs_cov;
                let r_tau = tangent.x * tangent.x * r[(0, 0)]
                    + 2.0 * tangent.x * tangent.y * r[(0, 1)]
                    + tangent.y * tangent.y * r[(1, 1)];
                self.update_road(belief, s_obs, r_tau)
            }
        }
    }

    fn update_ground(
        &self,
        belief: &mut GaussianBelief,
        observation: &Vector2<f64>,
    ) -> Result<(), TrackingError> {
        let h = Self::ground_observation_matrix();
        let z = DVector::from_vec(vec![observation.x, observation.y]);

        let innovation = &z - &h * &belief.mean;
        let s = &h * &belief.covariance * h.transpose() + &self.obs_cov;
        let s_inv = s
            .clone()
            .try_inverse()
            .ok_or_else(|| TrackingError::numeric("singular innovation covariance"))?;

        let gain = &belief.covariance * h.transpose() * s_inv;
        belief.mean += &gain * innovation;
        belief.covariance = symmetrize(
            &((DMatrix::identity(4, 4) - &gain * &h) * &belief.covariance),
        );

        if !is_positive_definite(&belief.covariance) {
            return Err(TrackingError::numeric(
                "posterior covariance is not positive definite",
            ));
        }
        Ok(())
    }

    fn update_road(
        &self,
        belief: &mut GaussianBelief,
        s_obs: f64,
        obs_variance: f64,
    ) -> Result<(), TrackingError> {
        let s = belief.covariance[(0, 0)] + obs_variance;
        if !(s > 0.0) {
            return Err(TrackingError::numeric("singular innovation covariance"));
        }

        // W = Sigma * H^T with H = [1, 0]
        let w = DVector::from_vec(vec![
            belief.covariance[(0, 0)],
            belief.covariance[(1, 0)],
        ]);
        let innovation = s_obs - belief.mean[0];

        belief.mean += &w * (innovation / s);
        belief.covariance = symmetrize(&(&belief.covariance - &w * w.transpose() / s));

        if !is_positive_definite(&belief.covariance) {
            return Err(TrackingError::numeric(
                "posterior covariance is not positive definite",
            ));
        }
        Ok(())
    }

    /// Log-density of a world observation under the predicted measurement.
    ///
    /// On-road beliefs are converted to the ground frame first, so both
    /// regimes score in the same 2-D observation space.
    pub fn log_likelihood(
        &self,
        observation: &Vector2<f64>,
        belief: &GaussianBelief,
        edge: &PathEdge,
    ) -> Result<f64, TrackingError> {
        let ground = if belief.is_road() {
            Self::to_ground_belief(belief, edge)?
        } else {
            belief.clone()
        };

        let h = Self::ground_observation_matrix();
        let pred_mean = &h * &ground.mean;
        let pred_cov = &h * &ground.covariance * h.transpose() + &self.obs_cov;

        let z = DVector::from_vec(vec![observation.x, observation.y]);
        let log_p = log_gaussian_pdf(&z, &pred_mean, &pred_cov);
        if log_p == f64::NEG_INFINITY && !is_positive_definite(&pred_cov) {
            return Err(TrackingError::numeric(
                "predicted observation covariance is not positive definite",
            ));
        }
        Ok(log_p)
    }

    /// Project a 4-D ground belief onto an edge's line, in place.
    ///
    /// The resulting `s` is measured in the path frame of `edge` (its
    /// offset plus the arc of the closest point); `s_dot` is the velocity
    /// component along the tangent.
    pub fn project_to_road(
        belief: &mut GaussianBelief,
        edge: &PathEdge,
    ) -> Result<(), TrackingError> {
        let (e, d0) = match edge {
            PathEdge::OnRoad {
                edge,
                dist_to_start,
            } => (edge, *dist_to_start),
            PathEdge::Empty => {
                return Err(TrackingError::GraphInconsistency {
                    description: "projection onto the empty edge".to_string(),
                });
            }
        };
        if !belief.is_road() {
            let position = Vector2::new(belief.mean[0], belief.mean[2]);
            let velocity = Vector2::new(belief.mean[1], belief.mean[3]);
            let (arc, _) = e.project(&position);
            let tangent = e.tangent_at(arc);

            // J = [tau_x 0 tau_y 0; 0 tau_x 0 tau_y]
            let j = DMatrix::from_row_slice(
                2,
                4,
                &[
                    tangent.x, 0.0, tangent.y, 0.0,
                    0.0, tangent.x, 0.0, tangent.y,
                ],
            );

            belief.covariance = symmetrize(&(&j * &belief.covariance * j.transpose()));
            belief.mean = DVector::from_vec(vec![d0 + arc, tangent.dot(&velocity)]);
        }
        Ok(())
    }

    /// Map a 2-D road belief back to the 4-D ground frame, in place.
    ///
    /// Uses the unit tangent at `s - d0` along the edge; arcs outside the
    /// edge extrapolate along the terminal segment rather than failing.
    pub fn invert_projection(
        belief: &mut GaussianBelief,
        edge: &PathEdge,
    ) -> Result<(), TrackingError> {
        let (e, d0) = match edge {
            PathEdge::OnRoad {
                edge,
                dist_to_start,
            } => (edge, *dist_to_start),
            PathEdge::Empty => {
                return Err(TrackingError::GraphInconsistency {
                    description: "inverse projection from the empty edge".to_string(),
                });
            }
        };
        if belief.is_road() {
            let arc = belief.mean[0] - d0;
            let position = e.point_at(arc);
            let tangent = e.tangent_at(arc);
            let s_dot = belief.mean[1];

            // Gamma spreads (s, s_dot) onto (x, x_dot, y, y_dot)
            let gamma = DMatrix::from_row_slice(
                4,
                2,
                &[
                    tangent.x, 0.0,
                    0.0, tangent.x,
                    tangent.y, 0.0,
                    0.0, tangent.y,
                ],
            );

            belief.covariance = symmetrize(&(&gamma * &belief.covariance * gamma.transpose()));
            belief.mean = DVector::from_vec(vec![
                position.x,
                s_dot * tangent.x,
                position.y,
                s_dot * tangent.y,
            ]);
        }
        Ok(())
    }

    /// Clone-and-convert form of [`Self::invert_projection`].
    pub fn to_ground_belief(
        belief: &GaussianBelief,
        edge: &PathEdge,
    ) -> Result<GaussianBelief, TrackingError> {
        let mut ground = belief.clone();
        Self::invert_projection(&mut ground, edge)?;
        Ok(ground)
    }
}
