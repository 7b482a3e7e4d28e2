//! Timestamped vehicle observations.
//!
//! Observations for one vehicle form a chain through their predecessor, and
//! timestamps must strictly increase along it. The chain carries both the
//! raw geographic coordinate and its planar projection so the filter never
//! re-derives either.

use std::sync::Arc;

use nalgebra::Vector2;

use crate::graph::GeoProjection;
use crate::tracking::errors::TrackingError;

/// A single GPS observation of a vehicle.
#[derive(Debug, Clone)]
pub struct Observation {
    label: String,
    timestamp_ms: u64,
    latitude: f64,
    longitude: f64,
    projected_point: Vector2<f64>,
    previous: Option<Arc<Observation>>,
}

impl Observation {
    /// Create an observation, projecting it into the metric plane and
    /// linking it to its predecessor.
    ///
    /// Fails with [`TrackingError::TimeOrder`] when the timestamp is not
    /// strictly after the predecessor's, and with
    /// [`TrackingError::NotGeoreferenced`] when the coordinate cannot be
    /// projected.
    pub fn new(
        label: impl Into<String>,
        timestamp_ms: u64,
        latitude: f64,
        longitude: f64,
        previous: Option<Arc<Observation>>,
        projection: &GeoProjection,
    ) -> Result<Arc<Self>, TrackingError> {
        if let Some(prev) = &previous {
            if timestamp_ms <= prev.timestamp_ms {
                return Err(TrackingError::TimeOrder {
                    timestamp_ms,
                    previous_ms: prev.timestamp_ms,
                });
            }
        }

        let projected_point = projection.project(latitude, longitude)?;

        Ok(Arc::new(Self {
            label: label.into(),
            timestamp_ms,
            latitude,
            longitude,
            projected_point,
            previous,
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Raw geographic coordinate as (lat, lon) degrees.
    pub fn coords(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Planar projection of the coordinate, in metres.
    pub fn projected_point(&self) -> &Vector2<f64> {
        &self.projected_point
    }

    pub fn previous(&self) -> Option<&Arc<Observation>> {
        self.previous.as_ref()
    }

    /// Seconds elapsed since the previous observation, or the supplied
    /// default when this is the first of its chain.
    pub fn time_delta_seconds(&self, default: f64) -> f64 {
        match &self.previous {
            Some(prev) => (self.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0,
            None => default,
        }
    }
}
