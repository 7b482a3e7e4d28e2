//! Edge-transition distribution.
//!
//! A categorical prior over how a vehicle moves between the road network
//! and free motion: two 2-way Dirichlet-categorical posteriors, one for the
//! off-road regime (stay off / move onto the network) and one for the
//! on-road regime (stay on / leave the network). When the vehicle stays on
//! the network the concrete neighbour is chosen uniformly from the
//! admissible transfer set, and the evaluation subtracts the matching
//! `log |transfer|` so the discrete distribution stays normalized.

use std::sync::Arc;

use crate::common::rng::Rng;
use crate::graph::{Edge, InferredEdge};
use crate::tracking::errors::TrackingError;

/// Index of "remain in the current regime" in both count vectors.
const STAY: usize = 0;
/// Index of "switch regimes" in both count vectors.
const SWITCH: usize = 1;

/// Bayesian categorical distribution over edge transitions.
///
/// Holds Dirichlet pseudo-counts; evaluation and sampling use the posterior
/// predictive `alpha_i / sum(alpha)`. One instance per vehicle, since the
/// counts are sufficient statistics of that vehicle's history.
#[derive(Debug, Clone)]
pub struct EdgeTransitionDistribution {
    /// [stay off-road, move on-road]
    off_road_counts: [f64; 2],
    /// [stay on-road, move off-road]
    on_road_counts: [f64; 2],
}

impl EdgeTransitionDistribution {
    /// Create a distribution from Dirichlet pseudo-counts.
    pub fn new(
        off_transition_probs: [f64; 2],
        on_transition_probs: [f64; 2],
    ) -> Result<Self, TrackingError> {
        for &c in off_transition_probs.iter().chain(on_transition_probs.iter()) {
            if !(c > 0.0) {
                return Err(TrackingError::numeric(format!(
                    "transition pseudo-count {} is not positive",
                    c
                )));
            }
        }
        Ok(Self {
            off_road_counts: off_transition_probs,
            on_road_counts: on_transition_probs,
        })
    }

    fn predictive(counts: &[f64; 2], index: usize) -> f64 {
        counts[index] / (counts[0] + counts[1])
    }

    /// Posterior-predictive probability of staying off-road.
    pub fn stay_off_probability(&self) -> f64 {
        Self::predictive(&self.off_road_counts, STAY)
    }

    /// Posterior-predictive probability of staying on-road.
    pub fn stay_on_probability(&self) -> f64 {
        Self::predictive(&self.on_road_counts, STAY)
    }

    /// Log-density of moving from `prev` to `next` given the admissible
    /// transfer set.
    ///
    /// Concrete destinations carry a `-ln |transfer|` uniform-choice term.
    /// A destination that is neither the previous edge nor a member of the
    /// transfer set has density zero.
    pub fn log_evaluate(
        &self,
        transfer_edges: &[Arc<InferredEdge>],
        prev: &Edge,
        next: &Edge,
    ) -> f64 {
        match (prev, next) {
            (Edge::Empty, Edge::Empty) => self.stay_off_probability().ln(),
            (Edge::Empty, Edge::Road(e)) => {
                if !contains(transfer_edges, e) {
                    return f64::NEG_INFINITY;
                }
                Self::predictive(&self.off_road_counts, SWITCH).ln()
                    - (transfer_edges.len() as f64).ln()
            }
            (Edge::Road(_), Edge::Empty) => {
                Self::predictive(&self.on_road_counts, SWITCH).ln()
            }
            (Edge::Road(p), Edge::Road(e)) => {
                // Staying in place is always admissible, even when the
                // caller's transfer set omits the current edge.
                if e.id() != p.id() && !contains(transfer_edges, e) {
                    return f64::NEG_INFINITY;
                }
                let support = transfer_edges.len().max(1);
                self.stay_on_probability().ln() - (support as f64).ln()
            }
        }
    }

    /// Sample the next edge.
    ///
    /// Draws the regime from the appropriate Bernoulli, then picks uniformly
    /// among `transfer_edges`. Returns `None` only when an on-road stay was
    /// drawn against an empty transfer set (a dead end); off-road, an empty
    /// transfer set simply keeps the vehicle off the network.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        transfer_edges: &[Arc<InferredEdge>],
        current: &Edge,
    ) -> Option<Edge> {
        let u = rng.rand();
        match current {
            Edge::Empty => {
                if u < self.stay_off_probability() || transfer_edges.is_empty() {
                    Some(Edge::Empty)
                } else {
                    Some(Edge::Road(uniform_pick(rng, transfer_edges)))
                }
            }
            Edge::Road(_) => {
                if u < self.stay_on_probability() {
                    if transfer_edges.is_empty() {
                        None
                    } else {
                        Some(Edge::Road(uniform_pick(rng, transfer_edges)))
                    }
                } else {
                    Some(Edge::Empty)
                }
            }
        }
    }

    /// Record an observed transition, incrementing the matching
    /// pseudo-count.
    pub fn update(&mut self, prev: &Edge, next: &Edge) {
        match (prev, next) {
            (Edge::Empty, Edge::Empty) => self.off_road_counts[STAY] += 1.0,
            (Edge::Empty, Edge::Road(_)) => self.off_road_counts[SWITCH] += 1.0,
            (Edge::Road(_), Edge::Road(_)) => self.on_road_counts[STAY] += 1.0,
            (Edge::Road(_), Edge::Empty) => self.on_road_counts[SWITCH] += 1.0,
        }
    }
}

fn contains(edges: &[Arc<InferredEdge>], edge: &InferredEdge) -> bool {
    edges.iter().any(|e| e.id() == edge.id())
}

fn uniform_pick<R: Rng + ?Sized>(
    rng: &mut R,
    edges: &[Arc<InferredEdge>],
) -> Arc<InferredEdge> {
    let index = ((rng.rand() * edges.len() as f64) as usize).min(edges.len() - 1);
    edges[index].clone()
}
