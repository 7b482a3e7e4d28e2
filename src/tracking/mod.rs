//! The state-and-path estimator.
//!
//! Everything that defines a tracked vehicle: observations, Gaussian
//! beliefs, the hybrid road-tracking filter, path edges and inferred paths,
//! the edge-transition distribution, the vehicle state with its conditional
//! density, and position summaries for rendering.

pub mod belief;
pub mod errors;
pub mod filter;
pub mod observation;
pub mod output;
pub mod path;
pub mod state;
pub mod transition;

pub use belief::GaussianBelief;
pub use errors::TrackingError;
pub use filter::RoadTrackingFilter;
pub use observation::Observation;
pub use output::{summarize_state, PositionSummary};
pub use path::{InferredPath, PathEdge};
pub use state::{ConditionalParams, InitialParameters, VehicleState};
pub use transition::EdgeTransitionDistribution;
