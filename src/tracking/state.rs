//! Vehicle state and its conditional density.
//!
//! A [`VehicleState`] bundles everything known about one vehicle at one
//! observation: the tracking filter with its time step, the belief in one of
//! the two coordinate regimes, the current edge, the path travelled since
//! the parent state, the per-vehicle edge-transition posterior, and a weak
//! link back to the parent for trace reconstruction.

use std::sync::{Arc, Weak};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::graph::{Edge, RoadGraph};
use crate::tracking::belief::GaussianBelief;
use crate::tracking::errors::TrackingError;
use crate::tracking::filter::RoadTrackingFilter;
use crate::tracking::observation::Observation;
use crate::tracking::path::{InferredPath, PathEdge};
use crate::tracking::transition::EdgeTransitionDistribution;

/// Estimator configuration.
///
/// Variances are in m^2 (observation) and (m/s^2)^2 (state); transition
/// probabilities are Dirichlet pseudo-counts. A zero seed asks the
/// simulator for a fresh random seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialParameters {
    /// Diagonal of the observation noise covariance `R`.
    pub obs_variance: [f64; 2],
    /// Along-edge acceleration variance.
    pub on_road_state_variance: f64,
    /// Per-axis ground acceleration variance.
    pub off_road_state_variance: [f64; 2],
    /// Pseudo-counts for [stay off-road, move on-road].
    pub off_transition_probs: [f64; 2],
    /// Pseudo-counts for [stay on-road, move off-road].
    pub on_transition_probs: [f64; 2],
    /// Simulation seed; zero requests a fresh one.
    pub seed: u64,
    /// Time step assumed for a chain's first observation, seconds.
    pub initial_time_delta: f64,
}

impl Default for InitialParameters {
    fn default() -> Self {
        Self {
            obs_variance: [625.0, 625.0],
            on_road_state_variance: 6.25e-4,
            off_road_state_variance: [6.25e-4, 6.25e-4],
            off_transition_probs: [10.0, 1.0],
            on_transition_probs: [10.0, 1.0],
            seed: 0,
            initial_time_delta: 30.0,
        }
    }
}

/// Conditioning arguments for [`VehicleState::log_density`].
#[derive(Debug, Clone)]
pub struct ConditionalParams {
    /// Path edge the vehicle came from.
    pub path_edge: PathEdge,
    /// Along-path offset of the state's current edge.
    pub distance_to_current_edge: f64,
    /// Observed location in projected coordinates.
    pub location: Vector2<f64>,
}

/// The state of one vehicle at one observation.
#[derive(Debug)]
pub struct VehicleState {
    filter: RoadTrackingFilter,
    belief: GaussianBelief,
    transition: EdgeTransitionDistribution,
    observation: Arc<Observation>,
    edge: Edge,
    path: InferredPath,
    graph: Arc<RoadGraph>,
    parent: Option<Weak<VehicleState>>,
    distance_from_previous: f64,
}

impl VehicleState {
    /// Build the first state of a chain from an observation and a starting
    /// edge.
    ///
    /// Off-road starts centre the ground belief on the projected
    /// observation with zero velocity; on-road starts centre the road
    /// belief on the observation's foot on the edge.
    pub fn initial(
        graph: Arc<RoadGraph>,
        observation: Arc<Observation>,
        edge: Edge,
        params: &InitialParameters,
    ) -> Result<Arc<Self>, TrackingError> {
        let mut filter = RoadTrackingFilter::new(params);
        let dt = observation.time_delta_seconds(params.initial_time_delta);
        filter.set_time_diff(dt)?;

        let (belief, path) = match &edge {
            Edge::Empty => {
                let mut belief = filter.initial_ground_belief();
                let point = observation.projected_point();
                belief.mean[0] = point.x;
                belief.mean[2] = point.y;
                (belief, InferredPath::empty())
            }
            Edge::Road(e) => {
                let mut belief = filter.initial_road_belief();
                let (arc, _) = e.project(observation.projected_point());
                belief.mean[0] = arc;
                (belief, InferredPath::from_single(e.clone()))
            }
        };

        let transition =
            EdgeTransitionDistribution::new(params.off_transition_probs, params.on_transition_probs)?;

        Ok(Arc::new(Self {
            filter,
            belief,
            transition,
            observation,
            edge,
            path,
            graph,
            parent: None,
            distance_from_previous: 0.0,
        }))
    }

    /// Build a successor state from a traversal result.
    ///
    /// The road belief's position is re-zeroed to the current edge by
    /// subtracting the path edge's offset; the subtracted offset is kept as
    /// `distance_from_previous`. The parent link is weak, so a chain's
    /// earlier states can be dropped independently of their children.
    pub fn transition(
        parent: &Arc<VehicleState>,
        observation: Arc<Observation>,
        filter: RoadTrackingFilter,
        mut belief: GaussianBelief,
        transition: EdgeTransitionDistribution,
        path: InferredPath,
        path_edge: &PathEdge,
    ) -> Result<Arc<Self>, TrackingError> {
        let mut filter = filter;
        let dt = observation.time_delta_seconds(filter.default_time_diff());
        filter.set_time_diff(dt)?;

        let edge = path_edge.edge();
        let distance_from_previous = path_edge.dist_to_start().unwrap_or(0.0);
        if belief.is_road() {
            belief.mean[0] -= distance_from_previous;
        }

        let state = Self {
            filter,
            belief,
            transition,
            observation,
            edge,
            path,
            graph: parent.graph.clone(),
            parent: Some(Arc::downgrade(parent)),
            distance_from_previous,
        };
        state.check_invariants()?;
        Ok(Arc::new(state))
    }

    /// Regime coherence: an off-road state is 4-D with an empty path, an
    /// on-road state is 2-D with a path ending on its edge.
    fn check_invariants(&self) -> Result<(), TrackingError> {
        let coherent = match &self.edge {
            Edge::Empty => !self.belief.is_road(),
            Edge::Road(e) => {
                self.belief.is_road()
                    && self
                        .path
                        .last_edge()
                        .inferred()
                        .map(|last| last.id() == e.id())
                        .unwrap_or(false)
            }
        };
        if coherent {
            Ok(())
        } else {
            Err(TrackingError::GraphInconsistency {
                description: format!(
                    "belief dimension {} does not match edge {:?}",
                    self.belief.dim(),
                    self.edge
                ),
            })
        }
    }

    /// Conditional log-density `p(observation, path | parent)`.
    ///
    /// Factorises as the edge-transition log prior plus the measurement
    /// log-likelihood of the observed location under the (already
    /// predicted) belief.
    pub fn log_density(&self, params: &ConditionalParams) -> Result<f64, TrackingError> {
        let prev = params.path_edge.edge();

        let transfer = match &prev {
            Edge::Empty => self.graph.nearby_edges(&params.location),
            Edge::Road(e) => {
                if params.distance_to_current_edge < 0.0 {
                    self.graph.incoming(e)
                } else {
                    self.graph.outgoing(e)
                }
            }
        };

        let transition_log = self.transition.log_evaluate(&transfer, &prev, &self.edge);

        let measurement_edge = match &self.edge {
            Edge::Empty => PathEdge::Empty,
            Edge::Road(e) => PathEdge::on_road(e.clone(), params.distance_to_current_edge),
        };
        let measurement_log =
            self.filter
                .log_likelihood(&params.location, &self.belief, &measurement_edge)?;

        Ok(transition_log + measurement_log)
    }

    /// Sampling conditional parameters from a state is not supported; use
    /// the trajectory sampler to generate.
    pub fn sample(&self) -> Result<ConditionalParams, TrackingError> {
        Err(TrackingError::NotImplemented {
            operation: "VehicleState::sample",
        })
    }

    /// Ground-coordinate mean location, converting on-road beliefs first.
    pub fn mean_location(&self) -> Result<Vector2<f64>, TrackingError> {
        match &self.edge {
            Edge::Empty => Ok(Vector2::new(self.belief.mean[0], self.belief.mean[2])),
            Edge::Road(e) => {
                let pe = PathEdge::on_road(e.clone(), 0.0);
                let ground = RoadTrackingFilter::to_ground_belief(&self.belief, &pe)?;
                Ok(Vector2::new(ground.mean[0], ground.mean[2]))
            }
        }
    }

    pub fn belief(&self) -> &GaussianBelief {
        &self.belief
    }

    pub fn edge(&self) -> &Edge {
        &self.edge
    }

    pub fn path(&self) -> &InferredPath {
        &self.path
    }

    pub fn observation(&self) -> &Arc<Observation> {
        &self.observation
    }

    pub fn filter(&self) -> &RoadTrackingFilter {
        &self.filter
    }

    pub fn transition_distribution(&self) -> &EdgeTransitionDistribution {
        &self.transition
    }

    pub fn graph(&self) -> &Arc<RoadGraph> {
        &self.graph
    }

    /// Parent state, if it is still alive.
    pub fn parent(&self) -> Option<Arc<VehicleState>> {
        self.parent.as_ref().and_then(|w| w.upgrade())
    }

    /// Offset subtracted from the road position at construction.
    pub fn distance_from_previous(&self) -> f64 {
        self.distance_from_previous
    }
}
