/*!
# Roadtrack - hybrid on/off-road vehicle tracking

Tracks vehicles moving over a street graph from noisy GPS observations.
Each vehicle carries a Gaussian belief that lives either on the plane
(4-D ground state) or pinned to an edge of the road network (2-D along-edge
state), together with a distribution over the path travelled since the
previous observation. The same generative model drives a simulator that
samples whole trajectories.

## Features

- Hybrid linear-Gaussian tracking filter with projections between the
  ground and road frames
- Edge-transition distribution with Bayesian count updates
- Path traversal sampler coupled to graph topology
- Deterministic, seedable simulation

## Modules

- [`tracking`] - The estimator: filter, beliefs, paths, vehicle states
- [`graph`] - Read-only street graph view and geographic projection
- [`sim`] - Trajectory sampler and simulation driver
- [`common`] - Low-level utilities (linear algebra, RNG)

## Example

```rust,no_run
use std::sync::Arc;
use nalgebra::Vector2;
use roadtrack::{GeoProjection, InitialParameters, RoadGraph, Simulation, SimulationParameters};

let mut graph = RoadGraph::new();
graph.add_edge(1, vec![Vector2::new(0.0, 0.0), Vector2::new(200.0, 0.0)]).unwrap();
graph.add_edge(2, vec![Vector2::new(200.0, 0.0), Vector2::new(200.0, 300.0)]).unwrap();

let projection = GeoProjection::new(40.7, -74.0).unwrap();
let parameters = InitialParameters { seed: 42, ..InitialParameters::default() };
let schedule = SimulationParameters {
    start_coordinate: (40.7, -74.0),
    start_time_ms: 0,
    duration_s: 600,
    frequency_s: 30,
};

let mut simulation = Simulation::new("veh-1", Arc::new(graph), projection, parameters, schedule);
let states = simulation.run().unwrap();
println!("sampled {} states", states.len());
```
*/

/// Low-level utilities (linear algebra, deterministic RNG)
pub mod common;

/// Read-only street graph view and geographic projection
pub mod graph;

/// Trajectory sampler and simulation driver
pub mod sim;

/// The state-and-path estimator
pub mod tracking;

// Core types
pub use graph::{Edge, EdgeId, GeoProjection, InferredEdge, RoadGraph};
pub use tracking::{
    summarize_state, ConditionalParams, EdgeTransitionDistribution, GaussianBelief,
    InferredPath, InitialParameters, Observation, PathEdge, PositionSummary,
    RoadTrackingFilter, VehicleState,
};

// Errors
pub use tracking::TrackingError;

// Simulation
pub use sim::{
    sample_movement_belief, sample_observation, traverse_edge, Simulation,
    SimulationParameters,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
