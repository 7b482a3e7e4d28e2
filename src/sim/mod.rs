//! Trajectory sampling and vehicle simulation.
//!
//! The generative side of the estimator: walk the graph edge by edge
//! according to the edge-transition distribution, predict the belief along
//! the way, and sample a noisy observation of the result. The simulator
//! drives this in a loop to produce whole vehicle trajectories from the
//! same model the inference side assumes.

use std::sync::Arc;

use nalgebra::{DVector, Vector2};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::linalg::cholesky_sqrt;
use crate::common::rng::{Rng, SimpleRng};
use crate::graph::{Edge, GeoProjection, InferredEdge, RoadGraph};
use crate::tracking::belief::GaussianBelief;
use crate::tracking::errors::TrackingError;
use crate::tracking::filter::RoadTrackingFilter;
use crate::tracking::observation::Observation;
use crate::tracking::path::{InferredPath, PathEdge};
use crate::tracking::state::{InitialParameters, VehicleState};
use crate::tracking::transition::EdgeTransitionDistribution;

/// Admissible destination edges for the next sampling step.
fn transfer_set(
    graph: &RoadGraph,
    current_edge: &PathEdge,
    belief: &GaussianBelief,
    total_dist_to_travel: Option<f64>,
) -> Vec<Arc<InferredEdge>> {
    match current_edge {
        PathEdge::Empty => {
            let position = Vector2::new(belief.mean[0], belief.mean[2]);
            graph.nearby_edges(&position)
        }
        PathEdge::OnRoad { edge, .. } => {
            if total_dist_to_travel.is_none() {
                // No direction committed yet
                vec![edge.clone()]
            } else if belief.mean[0] < 0.0 {
                graph.incoming(edge)
            } else if belief.mean[0] > 0.0 {
                graph.outgoing(edge)
            } else {
                let mut edges = graph.incoming(edge);
                edges.extend(graph.outgoing(edge));
                edges
            }
        }
    }
}

/// Sample a path from the current edge, predicting the belief along it.
///
/// Walks the graph edge by edge: sample the next edge from the transition
/// distribution, commit the total travel distance on the first concrete
/// edge (projecting a ground belief onto it first and injecting state noise
/// through the covariance factor), then keep appending edges until the
/// committed distance is exhausted. Leaving the network predicts the belief
/// back to the ground frame and ends the path with an off-road edge; a dead
/// end clamps the position to the end of the current edge with zero
/// velocity.
///
/// The belief's position stays in the along-path frame throughout; callers
/// re-zero it to the final edge when constructing the successor state.
pub fn traverse_edge<R: Rng + ?Sized>(
    rng: &mut R,
    graph: &RoadGraph,
    transition: &EdgeTransitionDistribution,
    belief: &mut GaussianBelief,
    start_edge: &PathEdge,
    filter: &RoadTrackingFilter,
) -> Result<InferredPath, TrackingError> {
    let mut current_edge = start_edge.clone();
    let mut path: Vec<PathEdge> = Vec::new();
    let mut dist_traveled = 0.0;
    let mut total_dist_to_travel: Option<f64> = None;

    loop {
        if let Some(total) = total_dist_to_travel {
            let d0 = current_edge.dist_to_start().unwrap_or(0.0);
            let length = current_edge.inferred().map(|e| e.length()).unwrap_or(0.0);
            if total.abs() < d0.abs() + length {
                break;
            }
        }

        let transfer = transfer_set(graph, &current_edge, belief, total_dist_to_travel);

        match transition.sample(rng, &transfer, &current_edge.edge()) {
            None => {
                // Dead end: stop at the end of the current edge
                let direction = if belief.mean[0] >= 0.0 { 1.0 } else { -1.0 };
                let length = current_edge.inferred().map(|e| e.length()).unwrap_or(0.0);
                belief.mean[0] = direction * length;
                belief.mean[1] = 0.0;
                break;
            }
            Some(Edge::Empty) => {
                filter.predict(belief, &PathEdge::Empty, Some(&current_edge))?;
                if path.is_empty() {
                    return Ok(InferredPath::empty());
                }
                path.push(PathEdge::Empty);
                return InferredPath::new(path, Some(dist_traveled), graph);
            }
            Some(Edge::Road(sampled)) => {
                if let Some(current) = current_edge.inferred() {
                    if total_dist_to_travel.is_some()
                        && current.id() != sampled.id()
                        && !graph.are_adjacent(current, &sampled)
                    {
                        return Err(TrackingError::GraphInconsistency {
                            description: format!(
                                "sampled edge {} is not adjacent to edge {}",
                                sampled.id(),
                                current.id()
                            ),
                        });
                    }
                }

                let sampled_pe = PathEdge::on_road(sampled.clone(), dist_traveled);

                if total_dist_to_travel.is_none() {
                    // Commit the travel distance: predict once along the
                    // sampled edge and draw state noise through the factor
                    if !belief.is_road() {
                        RoadTrackingFilter::project_to_road(belief, &sampled_pe)?;
                    }
                    filter.predict(belief, &sampled_pe, None)?;
                    belief.mean = sample_movement_belief(rng, &belief.mean, filter);
                    total_dist_to_travel = Some(belief.mean[0]);
                }

                let direction = if belief.mean[0] >= 0.0 { 1.0 } else { -1.0 };
                dist_traveled += direction * sampled.length();
                current_edge = sampled_pe.clone();
                path.push(sampled_pe);
            }
        }
    }

    let total = total_dist_to_travel.unwrap_or(dist_traveled);
    InferredPath::new(path, Some(total), graph)
}

/// Add state noise to a mean through the covariance factor.
///
/// Draws from the underlying acceleration noise (diagonal, so the factor
/// draw is an element-wise scaled normal) and maps it through `Gamma`.
/// Sampling through the factor sidesteps the rank-deficient joint the full
/// state-noise covariance would have.
pub fn sample_movement_belief<R: Rng + ?Sized>(
    rng: &mut R,
    mean: &DVector<f64>,
    filter: &RoadTrackingFilter,
) -> DVector<f64> {
    let is_road = mean.len() == 2;
    let noise_cov = filter.state_noise_covariance(is_road);

    let mut underlying = DVector::zeros(noise_cov.ncols());
    for i in 0..underlying.len() {
        underlying[i] = noise_cov[(i, i)].sqrt() * rng.randn();
    }

    mean + filter.covariance_factor(is_road) * underlying
}

/// Sample a noisy observation of a belief.
///
/// Projects the belief to the ground frame via the given path edge, takes
/// the position components, and adds zero-mean noise with covariance `R`
/// through its Cholesky factor.
pub fn sample_observation<R: rand::RngCore>(
    rng: &mut R,
    filter: &RoadTrackingFilter,
    belief: &GaussianBelief,
    edge: &PathEdge,
) -> Result<Vector2<f64>, TrackingError> {
    let ground = if belief.is_road() {
        RoadTrackingFilter::to_ground_belief(belief, edge)?
    } else {
        belief.clone()
    };

    let factor = cholesky_sqrt(filter.observation_covariance())
        .ok_or_else(|| TrackingError::numeric("observation covariance has no Cholesky factor"))?;

    let draws = DVector::<f64>::from_fn(2, |_, _| StandardNormal.sample(&mut *rng));
    let noise = factor * draws;

    Ok(Vector2::new(
        ground.mean[0] + noise[0],
        ground.mean[2] + noise[1],
    ))
}

/// Simulation schedule: where the vehicle starts and how often it reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Starting coordinate as (lat, lon) degrees.
    pub start_coordinate: (f64, f64),
    /// Timestamp of the first observation, milliseconds.
    pub start_time_ms: u64,
    /// Total simulated duration, seconds.
    pub duration_s: u64,
    /// Observation interval, seconds.
    pub frequency_s: u64,
}

/// Samples a vehicle trajectory from the generative model.
pub struct Simulation {
    label: String,
    seed: u64,
    rng: SimpleRng,
    graph: Arc<RoadGraph>,
    projection: GeoProjection,
    parameters: InitialParameters,
    sim_parameters: SimulationParameters,
}

impl Simulation {
    /// Create a simulation. A zero seed in the parameters draws a fresh one
    /// from entropy; any other value reproduces the run exactly.
    pub fn new(
        label: impl Into<String>,
        graph: Arc<RoadGraph>,
        projection: GeoProjection,
        parameters: InitialParameters,
        sim_parameters: SimulationParameters,
    ) -> Self {
        let seed = if parameters.seed != 0 {
            parameters.seed
        } else {
            rand::random::<u64>()
        };

        Self {
            label: label.into(),
            seed,
            rng: SimpleRng::new(seed),
            graph,
            projection,
            parameters,
            sim_parameters,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn graph(&self) -> &Arc<RoadGraph> {
        &self.graph
    }

    /// Build the starting state: an observation at the start coordinate on
    /// an edge drawn uniformly from the nearby edges plus off-road.
    pub fn initial_state(&mut self) -> Result<Arc<VehicleState>, TrackingError> {
        let (lat, lon) = self.sim_parameters.start_coordinate;
        let observation = Observation::new(
            self.label.clone(),
            self.sim_parameters.start_time_ms,
            lat,
            lon,
            None,
            &self.projection,
        )?;

        let mut candidates = vec![Edge::Empty];
        candidates.extend(
            self.graph
                .nearby_edges(observation.projected_point())
                .into_iter()
                .map(Edge::Road),
        );
        let index = ((self.rng.rand() * candidates.len() as f64) as usize)
            .min(candidates.len() - 1);

        VehicleState::initial(
            self.graph.clone(),
            observation,
            candidates[index].clone(),
            &self.parameters,
        )
    }

    /// Advance the vehicle by one observation interval.
    pub fn step(
        &mut self,
        state: &Arc<VehicleState>,
        time_ms: u64,
    ) -> Result<Arc<VehicleState>, TrackingError> {
        let mut filter = state.filter().clone();
        filter.set_time_diff(self.sim_parameters.frequency_s as f64)?;

        let mut belief = state.belief().clone();
        let current_pe = match state.edge() {
            Edge::Empty => PathEdge::Empty,
            Edge::Road(e) => PathEdge::on_road(e.clone(), 0.0),
        };

        let path = traverse_edge(
            &mut self.rng,
            &self.graph,
            state.transition_distribution(),
            &mut belief,
            &current_pe,
            &filter,
        )?;
        let new_pe = path.last_edge();

        let sampled = sample_observation(&mut self.rng, &filter, &belief, &new_pe)?;
        let (lat, lon) = self.projection.unproject(&sampled)?;
        let observation = Observation::new(
            self.label.clone(),
            time_ms,
            lat,
            lon,
            Some(state.observation().clone()),
            &self.projection,
        )?;

        debug!(
            timestamp_ms = time_ms,
            edges = path.edges().len(),
            on_road = !new_pe.is_empty(),
            "sampled simulation step"
        );

        VehicleState::transition(
            state,
            observation,
            filter,
            belief,
            state.transition_distribution().clone(),
            path,
            &new_pe,
        )
    }

    /// Run the whole schedule, returning the sampled state chain.
    pub fn run(&mut self) -> Result<Vec<Arc<VehicleState>>, TrackingError> {
        info!(label = %self.label, seed = self.seed, "starting simulation");

        let mut current = self.initial_state()?;
        let mut states = vec![current.clone()];

        let step_ms = self.sim_parameters.frequency_s * 1000;
        let end_ms = self.sim_parameters.start_time_ms + self.sim_parameters.duration_s * 1000;
        let mut time_ms = self.sim_parameters.start_time_ms + step_ms;
        while time_ms <= end_ms {
            current = self.step(&current, time_ms)?;
            states.push(current.clone());
            time_ms += step_ms;
        }

        info!(label = %self.label, steps = states.len(), "simulation finished");
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(dt: f64, on_var: f64, off_var: f64) -> RoadTrackingFilter {
        let params = InitialParameters {
            on_road_state_variance: on_var,
            off_road_state_variance: [off_var, off_var],
            initial_time_delta: dt,
            ..InitialParameters::default()
        };
        RoadTrackingFilter::new(&params)
    }

    #[test]
    fn test_movement_sample_dimensions() {
        let filter = filter(1.0, 0.25, 0.25);
        let mut rng = SimpleRng::new(7);

        let road = sample_movement_belief(&mut rng, &DVector::from_vec(vec![5.0, 1.0]), &filter);
        assert_eq!(road.len(), 2);

        let ground = sample_movement_belief(
            &mut rng,
            &DVector::from_vec(vec![5.0, 1.0, 2.0, 0.0]),
            &filter,
        );
        assert_eq!(ground.len(), 4);
    }

    #[test]
    fn test_movement_sample_zero_variance_is_exact() {
        let filter = filter(1.0, 0.0, 0.0);
        let mut rng = SimpleRng::new(7);
        let mean = DVector::from_vec(vec![5.0, 1.0]);

        let sampled = sample_movement_belief(&mut rng, &mean, &filter);
        assert!((sampled - mean).norm() < 1e-15);
    }

    #[test]
    fn test_observation_sample_zero_noise_hits_mean() {
        let params = InitialParameters {
            obs_variance: [1e-12, 1e-12],
            ..InitialParameters::default()
        };
        let filter = RoadTrackingFilter::new(&params);
        let mut rng = SimpleRng::new(7);

        let belief = GaussianBelief::new(
            DVector::from_vec(vec![10.0, 1.0, -4.0, 0.0]),
            nalgebra::DMatrix::identity(4, 4),
        );
        let z = sample_observation(&mut rng, &filter, &belief, &PathEdge::Empty).unwrap();
        assert!((z - Vector2::new(10.0, -4.0)).norm() < 1e-4);
    }
}
