//! Path edges and inferred paths.
//!
//! A path edge pairs a graph edge with the along-path offset at which it
//! begins; an inferred path is the ordered, contiguous sequence of path
//! edges a vehicle traversed between two observations. Both are immutable
//! once built.

use std::sync::Arc;

use nalgebra::DVector;
use smallvec::SmallVec;

use crate::graph::{Edge, InferredEdge, RoadGraph};
use crate::tracking::belief::GaussianBelief;
use crate::tracking::errors::TrackingError;

/// Tolerance for the cumulative-distance law between consecutive offsets.
const DISTANCE_TOLERANCE: f64 = 1e-6;

/// An edge together with the along-path distance at which it starts.
///
/// `Empty` marks off-road travel; it carries no offset.
#[derive(Debug, Clone)]
pub enum PathEdge {
    /// Off-road segment of a path.
    Empty,
    /// A concrete edge entered at signed along-path distance
    /// `dist_to_start`.
    OnRoad {
        edge: Arc<InferredEdge>,
        dist_to_start: f64,
    },
}

impl PathEdge {
    /// Wrap an [`Edge`], mapping the off-road sentinel to `Empty`.
    pub fn new(edge: Edge, dist_to_start: f64) -> Self {
        match edge {
            Edge::Empty => PathEdge::Empty,
            Edge::Road(e) => PathEdge::OnRoad {
                edge: e,
                dist_to_start,
            },
        }
    }

    pub fn on_road(edge: Arc<InferredEdge>, dist_to_start: f64) -> Self {
        PathEdge::OnRoad {
            edge,
            dist_to_start,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PathEdge::Empty)
    }

    /// The underlying edge as an [`Edge`] value.
    pub fn edge(&self) -> Edge {
        match self {
            PathEdge::Empty => Edge::Empty,
            PathEdge::OnRoad { edge, .. } => Edge::Road(edge.clone()),
        }
    }

    pub fn inferred(&self) -> Option<&Arc<InferredEdge>> {
        match self {
            PathEdge::Empty => None,
            PathEdge::OnRoad { edge, .. } => Some(edge),
        }
    }

    /// Along-path distance to the start of this edge; undefined off-road.
    pub fn dist_to_start(&self) -> Option<f64> {
        match self {
            PathEdge::Empty => None,
            PathEdge::OnRoad { dist_to_start, .. } => Some(*dist_to_start),
        }
    }

    /// Condition a road belief on "the position lies within this edge".
    ///
    /// Rank-1 update against a coarse uniform measurement over the interval
    /// `[d0, d0 + length]`: the pseudo-observation has mean at the interval
    /// midpoint and variance `(length / sqrt(12))^2`. This is not a true
    /// truncated-Gaussian moment match; mass outside the interval is pulled
    /// in but not clipped.
    ///
    /// On `Empty` the interval is unbounded and the belief is unchanged.
    pub fn predict(&self, belief: &mut GaussianBelief) {
        let (edge, d0) = match self {
            PathEdge::Empty => return,
            PathEdge::OnRoad {
                edge,
                dist_to_start,
            } => (edge, *dist_to_start),
        };

        let length = edge.length();
        let s_var = belief.covariance[(0, 0)];
        let s = s_var + (length / 12.0_f64.sqrt()).powi(2);

        // W = Sigma * H^T / S with H = [1, 0]
        let w = DVector::from_vec(vec![
            belief.covariance[(0, 0)] / s,
            belief.covariance[(1, 0)] / s,
        ]);
        let e = (d0 + length / 2.0) - belief.mean[0];

        belief.mean += &w * e;
        belief.covariance -= &w * w.transpose() * s;
    }
}

impl PartialEq for PathEdge {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PathEdge::Empty, PathEdge::Empty) => true,
            (
                PathEdge::OnRoad {
                    edge: a,
                    dist_to_start: da,
                },
                PathEdge::OnRoad {
                    edge: b,
                    dist_to_start: db,
                },
            ) => a.id() == b.id() && da == db,
            _ => false,
        }
    }
}

/// An ordered, contiguous sequence of path edges.
///
/// Invariants, enforced at construction:
/// - consecutive edges are adjacent in the graph or equal;
/// - the first offset is zero;
/// - subsequent offsets follow the signed cumulative edge lengths, so a
///   path travels in a single direction;
/// - at most one `Empty` edge, and only in the final position.
///
/// A path with no edges represents off-road motion.
#[derive(Debug, Clone)]
pub struct InferredPath {
    edges: SmallVec<[PathEdge; 4]>,
    total_distance: Option<f64>,
}

impl InferredPath {
    /// The empty path: off-road motion, no edges.
    pub fn empty() -> Self {
        Self {
            edges: SmallVec::new(),
            total_distance: None,
        }
    }

    /// A single-edge path starting at offset zero.
    pub fn from_single(edge: Arc<InferredEdge>) -> Self {
        let mut edges = SmallVec::new();
        edges.push(PathEdge::on_road(edge, 0.0));
        Self {
            edges,
            total_distance: None,
        }
    }

    /// Build a path, validating the contiguity and distance invariants
    /// against the graph.
    pub fn new(
        edges: impl IntoIterator<Item = PathEdge>,
        total_distance: Option<f64>,
        graph: &RoadGraph,
    ) -> Result<Self, TrackingError> {
        let edges: SmallVec<[PathEdge; 4]> = edges.into_iter().collect();

        if let Some(first) = edges.first() {
            if let Some(d0) = first.dist_to_start() {
                if d0 != 0.0 {
                    return Err(TrackingError::GraphInconsistency {
                        description: format!("path starts at offset {} instead of 0", d0),
                    });
                }
            }
        }

        let mut direction = 0.0;
        for (i, pair) in edges.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);

            let prev_edge = match prev.inferred() {
                Some(e) => e,
                None => {
                    return Err(TrackingError::GraphInconsistency {
                        description: "off-road edge before the end of a path".to_string(),
                    });
                }
            };
            let next_edge = match next.inferred() {
                // A trailing Empty marks departure from the network
                None => continue,
                Some(e) => e,
            };

            if prev_edge.id() != next_edge.id() && !graph.are_adjacent(prev_edge, next_edge) {
                return Err(TrackingError::GraphInconsistency {
                    description: format!(
                        "edges {} and {} are not adjacent",
                        prev_edge.id(),
                        next_edge.id()
                    ),
                });
            }

            let d_prev = prev.dist_to_start().unwrap_or(0.0);
            let d_next = next.dist_to_start().unwrap_or(0.0);
            let step = d_next - d_prev;
            if (step.abs() - prev_edge.length()).abs() > DISTANCE_TOLERANCE {
                return Err(TrackingError::GraphInconsistency {
                    description: format!(
                        "offset step {} does not match edge {} length {}",
                        step,
                        prev_edge.id(),
                        prev_edge.length()
                    ),
                });
            }

            let step_dir = step.signum();
            if i == 0 {
                direction = step_dir;
            } else if direction != 0.0 && step_dir != direction {
                return Err(TrackingError::GraphInconsistency {
                    description: "path reverses direction".to_string(),
                });
            }
        }

        Ok(Self {
            edges,
            total_distance,
        })
    }

    /// Path edges in travel order.
    pub fn edges(&self) -> &[PathEdge] {
        &self.edges
    }

    /// Whether this is the off-road path.
    pub fn is_empty_path(&self) -> bool {
        self.edges.is_empty()
    }

    /// Final edge of the path; `Empty` for the off-road path.
    pub fn last_edge(&self) -> PathEdge {
        self.edges.last().cloned().unwrap_or(PathEdge::Empty)
    }

    /// Total signed distance travelled, when known.
    pub fn total_distance(&self) -> Option<f64> {
        self.total_distance
    }

    /// Direction of travel: +1 forward, -1 backward, +1 for single-edge and
    /// empty paths.
    pub fn direction(&self) -> f64 {
        for pair in self.edges.windows(2) {
            if let (Some(a), Some(b)) = (pair[0].dist_to_start(), pair[1].dist_to_start()) {
                return (b - a).signum();
            }
        }
        1.0
    }

    /// The path edge whose interval covers along-path distance `s`.
    pub fn edge_containing(&self, s: f64) -> Option<&PathEdge> {
        let dir = self.direction();
        self.edges.iter().find(|pe| match pe {
            PathEdge::Empty => false,
            PathEdge::OnRoad {
                edge,
                dist_to_start,
            } => {
                let offset = (s - dist_to_start) * dir;
                (0.0..=edge.length()).contains(&offset)
            }
        })
    }
}

impl PartialEq for InferredPath {
    /// Paths compare by their edge-id/offset sequences.
    fn eq(&self, other: &Self) -> bool {
        self.edges == other.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, Vector2};

    fn line_graph() -> (RoadGraph, Arc<InferredEdge>, Arc<InferredEdge>) {
        let mut graph = RoadGraph::new();
        let e1 = graph
            .add_edge(1, vec![Vector2::new(0.0, 0.0), Vector2::new(50.0, 0.0)])
            .unwrap();
        let e2 = graph
            .add_edge(2, vec![Vector2::new(50.0, 0.0), Vector2::new(100.0, 0.0)])
            .unwrap();
        (graph, e1, e2)
    }

    #[test]
    fn test_truncation_reduces_position_variance() {
        let (_, e1, _) = line_graph();
        let pe = PathEdge::on_road(e1, 0.0);

        let mut belief = GaussianBelief::new(
            DVector::from_vec(vec![20.0, 10.0]),
            DMatrix::from_row_slice(2, 2, &[100.0, 0.0, 0.0, 4.0]),
        );
        let before = belief.covariance[(0, 0)];

        pe.predict(&mut belief);

        assert!(belief.covariance[(0, 0)] < before);
        // Mean is pulled toward the interval midpoint (25)
        assert!(belief.mean[0] > 20.0 && belief.mean[0] < 25.0);
    }

    #[test]
    fn test_truncation_identity_off_road() {
        let mut belief = GaussianBelief::new(DVector::zeros(2), DMatrix::identity(2, 2));
        let before = belief.clone();

        PathEdge::Empty.predict(&mut belief);

        assert_eq!(belief.mean, before.mean);
        assert_eq!(belief.covariance, before.covariance);
    }

    #[test]
    fn test_path_validation_accepts_contiguous() {
        let (graph, e1, e2) = line_graph();
        let path = InferredPath::new(
            vec![PathEdge::on_road(e1, 0.0), PathEdge::on_road(e2, 50.0)],
            Some(60.0),
            &graph,
        )
        .unwrap();

        assert_eq!(path.edges().len(), 2);
        assert_eq!(path.total_distance(), Some(60.0));
        assert_eq!(path.direction(), 1.0);
    }

    #[test]
    fn test_path_validation_rejects_gap() {
        let mut graph = RoadGraph::new();
        let e1 = graph
            .add_edge(1, vec![Vector2::new(0.0, 0.0), Vector2::new(50.0, 0.0)])
            .unwrap();
        let e3 = graph
            .add_edge(3, vec![Vector2::new(80.0, 0.0), Vector2::new(130.0, 0.0)])
            .unwrap();

        let err = InferredPath::new(
            vec![PathEdge::on_road(e1, 0.0), PathEdge::on_road(e3, 50.0)],
            None,
            &graph,
        )
        .unwrap_err();
        assert!(matches!(err, TrackingError::GraphInconsistency { .. }));
    }

    #[test]
    fn test_path_validation_rejects_nonzero_start() {
        let (graph, e1, _) = line_graph();
        let err =
            InferredPath::new(vec![PathEdge::on_road(e1, 5.0)], None, &graph).unwrap_err();
        assert!(matches!(err, TrackingError::GraphInconsistency { .. }));
    }

    #[test]
    fn test_path_validation_rejects_bad_offset_step() {
        let (graph, e1, e2) = line_graph();
        let err = InferredPath::new(
            vec![PathEdge::on_road(e1, 0.0), PathEdge::on_road(e2, 30.0)],
            None,
            &graph,
        )
        .unwrap_err();
        assert!(matches!(err, TrackingError::GraphInconsistency { .. }));
    }

    #[test]
    fn test_trailing_empty_allowed() {
        let (graph, e1, _) = line_graph();
        let path = InferredPath::new(
            vec![PathEdge::on_road(e1, 0.0), PathEdge::Empty],
            Some(50.0),
            &graph,
        )
        .unwrap();
        assert!(path.last_edge().is_empty());
    }

    #[test]
    fn test_edge_containing() {
        let (graph, e1, e2) = line_graph();
        let path = InferredPath::new(
            vec![PathEdge::on_road(e1, 0.0), PathEdge::on_road(e2, 50.0)],
            Some(60.0),
            &graph,
        )
        .unwrap();

        assert_eq!(path.edge_containing(10.0).unwrap().inferred().unwrap().id(), 1);
        assert_eq!(path.edge_containing(60.0).unwrap().inferred().unwrap().id(), 2);
        assert!(path.edge_containing(150.0).is_none());
    }

    #[test]
    fn test_empty_path_shape() {
        let path = InferredPath::empty();
        assert!(path.is_empty_path());
        assert!(path.last_edge().is_empty());
        assert!(path.edge_containing(0.0).is_none());
    }

    #[test]
    fn test_path_equality_by_sequence() {
        let (graph, e1, e2) = line_graph();
        let a = InferredPath::new(
            vec![PathEdge::on_road(e1.clone(), 0.0), PathEdge::on_road(e2.clone(), 50.0)],
            Some(60.0),
            &graph,
        )
        .unwrap();
        let b = InferredPath::new(
            vec![PathEdge::on_road(e1.clone(), 0.0), PathEdge::on_road(e2, 50.0)],
            None,
            &graph,
        )
        .unwrap();
        let c = InferredPath::from_single(e1);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
