//! Read-only view of the inferred street graph.
//!
//! The estimator and the sampler consume a small contract from the graph:
//! edge geometry with arc-length queries, incoming/outgoing adjacency, and a
//! "which edges are near this point" lookup. Adjacency is derived from
//! endpoint coincidence when edges are inserted, and the whole structure is
//! immutable afterwards so it can be shared across vehicles with `Arc`.

pub mod geo;

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::Vector2;

use crate::tracking::errors::TrackingError;

pub use geo::GeoProjection;

/// Stable numeric edge identifier.
pub type EdgeId = u64;

/// Distance below which two edge endpoints are considered the same node.
const ENDPOINT_TOLERANCE: f64 = 1e-6;

/// A single directed edge of the street graph.
///
/// Geometry is a polyline in projected (metre) coordinates. Arc-length
/// queries extrapolate past either end along the terminal segment, since
/// beliefs routinely predict positions beyond the current edge before the
/// sampler advances to the next one.
#[derive(Debug, Clone)]
pub struct InferredEdge {
    id: EdgeId,
    geometry: Vec<Vector2<f64>>,
    /// Arc length from the start to each polyline vertex.
    cumulative: Vec<f64>,
    length: f64,
}

impl InferredEdge {
    fn new(id: EdgeId, geometry: Vec<Vector2<f64>>) -> Result<Self, TrackingError> {
        if geometry.len() < 2 {
            return Err(TrackingError::GraphInconsistency {
                description: format!("edge {} has fewer than two geometry points", id),
            });
        }
        if geometry.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(TrackingError::GraphInconsistency {
                description: format!("edge {} has non-finite geometry", id),
            });
        }

        let mut cumulative = Vec::with_capacity(geometry.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in geometry.windows(2) {
            total += (w[1] - w[0]).norm();
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Err(TrackingError::GraphInconsistency {
                description: format!("edge {} has zero length", id),
            });
        }

        Ok(Self {
            id,
            geometry,
            cumulative,
            length: total,
        })
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn start(&self) -> Vector2<f64> {
        self.geometry[0]
    }

    pub fn end(&self) -> Vector2<f64> {
        self.geometry[self.geometry.len() - 1]
    }

    /// Index of the polyline segment containing the given arc length.
    fn segment_at(&self, arc: f64) -> usize {
        if arc <= 0.0 {
            return 0;
        }
        let last = self.geometry.len() - 2;
        for i in 0..=last {
            if arc <= self.cumulative[i + 1] {
                return i;
            }
        }
        last
    }

    /// Unit tangent of the segment containing `arc` (clamped to the edge).
    pub fn tangent_at(&self, arc: f64) -> Vector2<f64> {
        let i = self.segment_at(arc);
        let d = self.geometry[i + 1] - self.geometry[i];
        d / d.norm()
    }

    /// Point at the given arc length along the polyline.
    ///
    /// Arc lengths outside `[0, length]` extrapolate along the first or last
    /// segment direction.
    pub fn point_at(&self, arc: f64) -> Vector2<f64> {
        let i = self.segment_at(arc);
        let tangent = self.tangent_at(arc);
        self.geometry[i] + tangent * (arc - self.cumulative[i])
    }

    /// Project a point onto the edge.
    ///
    /// Returns the arc length of the closest point (clamped to the edge) and
    /// the closest point itself.
    pub fn project(&self, point: &Vector2<f64>) -> (f64, Vector2<f64>) {
        let mut best_arc = 0.0;
        let mut best_point = self.geometry[0];
        let mut best_dist = f64::INFINITY;

        for i in 0..self.geometry.len() - 1 {
            let a = self.geometry[i];
            let b = self.geometry[i + 1];
            let ab = b - a;
            let seg_len_sq = ab.norm_squared();
            let t = ((point - a).dot(&ab) / seg_len_sq).clamp(0.0, 1.0);
            let candidate = a + ab * t;
            let dist = (point - candidate).norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best_point = candidate;
                best_arc = self.cumulative[i] + ab.norm() * t;
            }
        }

        (best_arc, best_point)
    }

    /// Foot of the perpendicular from a world point onto the edge.
    pub fn point_on_edge(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.project(point).1
    }

    fn distance_to(&self, point: &Vector2<f64>) -> f64 {
        (point - self.point_on_edge(point)).norm()
    }
}

impl PartialEq for InferredEdge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InferredEdge {}

/// An edge reference that may be the off-road sentinel.
///
/// `Empty` stands for free motion on the plane; it compares equal only to
/// itself. Concrete edges compare by id.
#[derive(Debug, Clone)]
pub enum Edge {
    /// Off-road: the vehicle is not constrained to the graph.
    Empty,
    /// A concrete edge of the street graph.
    Road(Arc<InferredEdge>),
}

impl Edge {
    pub fn is_empty(&self) -> bool {
        matches!(self, Edge::Empty)
    }

    /// The underlying edge, if on-road.
    pub fn inferred(&self) -> Option<&Arc<InferredEdge>> {
        match self {
            Edge::Empty => None,
            Edge::Road(e) => Some(e),
        }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Edge::Empty, Edge::Empty) => true,
            (Edge::Road(a), Edge::Road(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl Eq for Edge {}

/// The street graph: edges plus derived adjacency.
///
/// Adjacency links edge `a` to edge `b` as `a -> b` whenever `a`'s end point
/// coincides with `b`'s start point. `nearby_edges` is a linear scan bounded
/// by the search radius; a spatial index is a caller concern.
#[derive(Debug)]
pub struct RoadGraph {
    edges: Vec<Arc<InferredEdge>>,
    by_id: HashMap<EdgeId, usize>,
    outgoing: HashMap<EdgeId, Vec<EdgeId>>,
    incoming: HashMap<EdgeId, Vec<EdgeId>>,
    search_radius: f64,
}

impl RoadGraph {
    /// Default radius for `nearby_edges`, in metres.
    pub const DEFAULT_SEARCH_RADIUS: f64 = 200.0;

    pub fn new() -> Self {
        Self::with_search_radius(Self::DEFAULT_SEARCH_RADIUS)
    }

    pub fn with_search_radius(search_radius: f64) -> Self {
        Self {
            edges: Vec::new(),
            by_id: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            search_radius,
        }
    }

    /// Insert an edge and link it to existing edges by endpoint coincidence.
    pub fn add_edge(
        &mut self,
        id: EdgeId,
        geometry: Vec<Vector2<f64>>,
    ) -> Result<Arc<InferredEdge>, TrackingError> {
        if self.by_id.contains_key(&id) {
            return Err(TrackingError::GraphInconsistency {
                description: format!("duplicate edge id {}", id),
            });
        }

        let edge = Arc::new(InferredEdge::new(id, geometry)?);

        for other in &self.edges {
            if (edge.end() - other.start()).norm() < ENDPOINT_TOLERANCE {
                self.outgoing.entry(edge.id()).or_default().push(other.id());
                self.incoming.entry(other.id()).or_default().push(edge.id());
            }
            if (other.end() - edge.start()).norm() < ENDPOINT_TOLERANCE {
                self.outgoing.entry(other.id()).or_default().push(edge.id());
                self.incoming.entry(edge.id()).or_default().push(other.id());
            }
        }

        self.by_id.insert(id, self.edges.len());
        self.edges.push(edge.clone());
        Ok(edge)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Arc<InferredEdge>> {
        self.by_id.get(&id).map(|&i| &self.edges[i])
    }

    /// Edges reachable from the end of the given edge.
    pub fn outgoing(&self, edge: &InferredEdge) -> Vec<Arc<InferredEdge>> {
        self.adjacent(&self.outgoing, edge)
    }

    /// Edges arriving at the start of the given edge.
    pub fn incoming(&self, edge: &InferredEdge) -> Vec<Arc<InferredEdge>> {
        self.adjacent(&self.incoming, edge)
    }

    fn adjacent(
        &self,
        table: &HashMap<EdgeId, Vec<EdgeId>>,
        edge: &InferredEdge,
    ) -> Vec<Arc<InferredEdge>> {
        table
            .get(&edge.id())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.edge(*id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether two edges share a node, in either direction.
    pub fn are_adjacent(&self, a: &InferredEdge, b: &InferredEdge) -> bool {
        let member = |table: &HashMap<EdgeId, Vec<EdgeId>>| {
            table
                .get(&a.id())
                .map(|ids| ids.contains(&b.id()))
                .unwrap_or(false)
        };
        member(&self.outgoing) || member(&self.incoming)
    }

    /// All edges within the search radius of the given point.
    pub fn nearby_edges(&self, point: &Vector2<f64>) -> Vec<Arc<InferredEdge>> {
        self.edges
            .iter()
            .filter(|e| e.distance_to(point) <= self.search_radius)
            .cloned()
            .collect()
    }
}

impl Default for RoadGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(x, y)
    }

    #[test]
    fn test_edge_length_and_endpoints() {
        let mut graph = RoadGraph::new();
        let e = graph
            .add_edge(1, vec![v(0.0, 0.0), v(3.0, 0.0), v(3.0, 4.0)])
            .unwrap();

        assert_eq!(e.id(), 1);
        assert!((e.length() - 7.0).abs() < 1e-12);
        assert_eq!(e.start(), v(0.0, 0.0));
        assert_eq!(e.end(), v(3.0, 4.0));
    }

    #[test]
    fn test_edge_rejects_degenerate_geometry() {
        let mut graph = RoadGraph::new();
        assert!(graph.add_edge(1, vec![v(0.0, 0.0)]).is_err());
        assert!(graph
            .add_edge(2, vec![v(1.0, 1.0), v(1.0, 1.0)])
            .is_err());
    }

    #[test]
    fn test_point_at_interpolates_and_extrapolates() {
        let mut graph = RoadGraph::new();
        let e = graph
            .add_edge(1, vec![v(0.0, 0.0), v(10.0, 0.0), v(10.0, 10.0)])
            .unwrap();

        assert!((e.point_at(5.0) - v(5.0, 0.0)).norm() < 1e-12);
        assert!((e.point_at(15.0) - v(10.0, 5.0)).norm() < 1e-12);
        // Past the end: continue along the last segment
        assert!((e.point_at(25.0) - v(10.0, 15.0)).norm() < 1e-12);
        // Before the start: continue backwards along the first segment
        assert!((e.point_at(-5.0) - v(-5.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_project_onto_polyline() {
        let mut graph = RoadGraph::new();
        let e = graph
            .add_edge(1, vec![v(0.0, 0.0), v(10.0, 0.0)])
            .unwrap();

        let (arc, closest) = e.project(&v(4.0, 3.0));
        assert!((arc - 4.0).abs() < 1e-12);
        assert!((closest - v(4.0, 0.0)).norm() < 1e-12);

        // Beyond the end clamps to the last vertex
        let (arc, closest) = e.project(&v(15.0, 1.0));
        assert!((arc - 10.0).abs() < 1e-12);
        assert!((closest - v(10.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_adjacency_from_endpoints() {
        let mut graph = RoadGraph::new();
        let e1 = graph.add_edge(1, vec![v(0.0, 0.0), v(50.0, 0.0)]).unwrap();
        let e2 = graph.add_edge(2, vec![v(50.0, 0.0), v(100.0, 0.0)]).unwrap();

        let out = graph.outgoing(&e1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), 2);

        let inc = graph.incoming(&e2);
        assert_eq!(inc.len(), 1);
        assert_eq!(inc[0].id(), 1);

        assert!(graph.are_adjacent(&e1, &e2));
        assert!(graph.are_adjacent(&e2, &e1));
        assert!(graph.outgoing(&e2).is_empty());
    }

    #[test]
    fn test_nearby_edges_respects_radius() {
        let mut graph = RoadGraph::with_search_radius(10.0);
        graph.add_edge(1, vec![v(0.0, 0.0), v(100.0, 0.0)]).unwrap();
        graph
            .add_edge(2, vec![v(0.0, 50.0), v(100.0, 50.0)])
            .unwrap();

        let near = graph.nearby_edges(&v(50.0, 5.0));
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id(), 1);

        assert!(graph.nearby_edges(&v(50.0, 25.0)).is_empty());
    }

    #[test]
    fn test_edge_equality_by_id() {
        let mut graph = RoadGraph::new();
        let e1 = graph.add_edge(1, vec![v(0.0, 0.0), v(1.0, 0.0)]).unwrap();
        let e2 = graph.add_edge(2, vec![v(0.0, 0.0), v(1.0, 0.0)]).unwrap();

        assert_eq!(Edge::Road(e1.clone()), Edge::Road(e1.clone()));
        assert_ne!(Edge::Road(e1), Edge::Road(e2));
        assert_eq!(Edge::Empty, Edge::Empty);
        assert!(Edge::Empty.is_empty());
    }
}
