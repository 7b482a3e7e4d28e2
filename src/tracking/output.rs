//! Reconstructed position summaries.
//!
//! Turns a vehicle state back into geographic coordinates: the ground-frame
//! mean plus the endpoints of the 95% confidence ellipse axes, and the ids
//! of the edges the state's path traversed.

use nalgebra::{DMatrix, SymmetricEigen, Vector2};

use crate::graph::{Edge, EdgeId, GeoProjection};
use crate::tracking::errors::TrackingError;
use crate::tracking::filter::RoadTrackingFilter;
use crate::tracking::path::PathEdge;
use crate::tracking::state::VehicleState;

/// 95% confidence scaling applied to the principal standard deviations.
const CONFIDENCE_SCALE: f64 = 1.98;

/// Geographic summary of one vehicle state.
#[derive(Debug, Clone)]
pub struct PositionSummary {
    /// Mean location as (lat, lon) degrees.
    pub mean_coords: (f64, f64),
    /// Endpoint of the ellipse's major axis as (lat, lon) degrees.
    pub major_axis_coords: (f64, f64),
    /// Endpoint of the ellipse's minor axis as (lat, lon) degrees.
    pub minor_axis_coords: (f64, f64),
    /// Ids of the traversed edges, in travel order.
    pub edge_ids: Vec<EdgeId>,
}

/// Summarize a state's position with its 95% confidence ellipse.
///
/// On-road beliefs are converted to the ground frame first, so both regimes
/// produce a planar ellipse.
pub fn summarize_state(
    state: &VehicleState,
    projection: &GeoProjection,
) -> Result<PositionSummary, TrackingError> {
    let ground = match state.edge() {
        Edge::Empty => state.belief().clone(),
        Edge::Road(e) => RoadTrackingFilter::to_ground_belief(
            state.belief(),
            &PathEdge::on_road(e.clone(), 0.0),
        )?,
    };

    let mean = Vector2::new(ground.mean[0], ground.mean[2]);

    // Position block of the ground covariance
    let h = RoadTrackingFilter::ground_observation_matrix();
    let position_cov: DMatrix<f64> = &h * &ground.covariance * h.transpose();

    let eigen = SymmetricEigen::new(position_cov);
    let mut axes: Vec<(f64, Vector2<f64>)> = (0..2)
        .map(|i| {
            let v = eigen.eigenvectors.column(i);
            (
                eigen.eigenvalues[i].max(0.0),
                Vector2::new(v[0], v[1]),
            )
        })
        .collect();
    axes.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let endpoint = |(value, direction): &(f64, Vector2<f64>)| {
        mean + direction * (CONFIDENCE_SCALE * value.sqrt())
    };
    let major = endpoint(&axes[0]);
    let minor = endpoint(&axes[1]);

    let edge_ids = state
        .path()
        .edges()
        .iter()
        .filter_map(|pe| pe.inferred().map(|e| e.id()))
        .collect();

    Ok(PositionSummary {
        mean_coords: projection.unproject(&mean)?,
        major_axis_coords: projection.unproject(&major)?,
        minor_axis_coords: projection.unproject(&minor)?,
        edge_ids,
    })
}
