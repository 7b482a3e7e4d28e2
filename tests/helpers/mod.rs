//! Shared fixtures for integration tests.

// Not every test binary uses every fixture
#![allow(dead_code)]

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Vector2};
use roadtrack::common::rng::Rng;
use roadtrack::{GaussianBelief, InferredEdge, InitialParameters, RoadGraph, RoadTrackingFilter};

/// A benign draw: `rand()` of one half, safe for Box-Muller inputs.
pub const HALF: u64 = 1 << 63;

/// RNG returning a scripted sequence of raw draws, then `HALF` forever.
///
/// Makes sampler traces exact: regime draws below one half stay in the
/// current regime (with even pseudo-counts), draws near the maximum switch.
pub struct ScriptedRng {
    values: Vec<u64>,
    position: usize,
}

impl ScriptedRng {
    pub fn new(values: Vec<u64>) -> Self {
        Self {
            values,
            position: 0,
        }
    }
}

impl Rng for ScriptedRng {
    fn next_u64(&mut self) -> u64 {
        let value = self.values.get(self.position).copied().unwrap_or(HALF);
        self.position += 1;
        value
    }
}

/// Two collinear edges: 1 from (0,0) to (50,0), 2 from (50,0) to (100,0).
pub fn two_edge_line() -> (Arc<RoadGraph>, Arc<InferredEdge>, Arc<InferredEdge>) {
    let mut graph = RoadGraph::new();
    let e1 = graph
        .add_edge(1, vec![Vector2::new(0.0, 0.0), Vector2::new(50.0, 0.0)])
        .unwrap();
    let e2 = graph
        .add_edge(2, vec![Vector2::new(50.0, 0.0), Vector2::new(100.0, 0.0)])
        .unwrap();
    (Arc::new(graph), e1, e2)
}

/// A single isolated edge of the given length along the x axis.
pub fn isolated_edge(length: f64) -> (Arc<RoadGraph>, Arc<InferredEdge>) {
    let mut graph = RoadGraph::new();
    let e = graph
        .add_edge(1, vec![Vector2::new(0.0, 0.0), Vector2::new(length, 0.0)])
        .unwrap();
    (Arc::new(graph), e)
}

/// A square one-way loop of four 100 m edges.
pub fn square_loop() -> Arc<RoadGraph> {
    let mut graph = RoadGraph::new();
    graph
        .add_edge(1, vec![Vector2::new(0.0, 0.0), Vector2::new(100.0, 0.0)])
        .unwrap();
    graph
        .add_edge(2, vec![Vector2::new(100.0, 0.0), Vector2::new(100.0, 100.0)])
        .unwrap();
    graph
        .add_edge(3, vec![Vector2::new(100.0, 100.0), Vector2::new(0.0, 100.0)])
        .unwrap();
    graph
        .add_edge(4, vec![Vector2::new(0.0, 100.0), Vector2::new(0.0, 0.0)])
        .unwrap();
    Arc::new(graph)
}

/// Noise-free parameters with even transition pseudo-counts and the given
/// time step.
pub fn exact_params(dt: f64) -> InitialParameters {
    InitialParameters {
        obs_variance: [1.0, 1.0],
        on_road_state_variance: 0.0,
        off_road_state_variance: [0.0, 0.0],
        off_transition_probs: [1.0, 1.0],
        on_transition_probs: [1.0, 1.0],
        seed: 1,
        initial_time_delta: dt,
    }
}

pub fn exact_filter(dt: f64) -> RoadTrackingFilter {
    RoadTrackingFilter::new(&exact_params(dt))
}

/// Road belief at position `s` with velocity `s_dot` and identity
/// covariance.
pub fn road_belief(s: f64, s_dot: f64) -> GaussianBelief {
    GaussianBelief::new(DVector::from_vec(vec![s, s_dot]), DMatrix::identity(2, 2))
}

/// Ground belief with identity covariance.
pub fn ground_belief(x: f64, vx: f64, y: f64, vy: f64) -> GaussianBelief {
    GaussianBelief::new(
        DVector::from_vec(vec![x, vx, y, vy]),
        DMatrix::identity(4, 4),
    )
}
