//! Error types for the estimator
//!
//! This module provides proper error handling instead of panics.

use std::fmt;

/// Errors that can occur while tracking a vehicle.
///
/// Time-order violations are recoverable by the caller (drop the record and
/// continue); numeric and graph failures are fatal for the affected vehicle
/// and propagate unmodified.
#[derive(Debug, Clone)]
pub enum TrackingError {
    /// An observation is not strictly newer than its predecessor
    TimeOrder {
        /// Timestamp of the offending observation, in milliseconds
        timestamp_ms: u64,
        /// Timestamp of the preceding observation, in milliseconds
        previous_ms: u64,
    },

    /// A coordinate conversion failed
    NotGeoreferenced {
        /// Description of the offending coordinate
        description: String,
    },

    /// Numerical instability detected (non-PSD covariance, singular
    /// innovation, failed Cholesky)
    NumericFailure {
        /// Description of the issue
        description: String,
    },

    /// The graph view returned something inconsistent with itself
    GraphInconsistency {
        /// Description of the inconsistency
        description: String,
    },

    /// The requested operation is intentionally unsupported
    NotImplemented {
        /// Name of the operation
        operation: &'static str,
    },
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::TimeOrder {
                timestamp_ms,
                previous_ms,
            } => {
                write!(
                    f,
                    "observation at {} ms is not after its predecessor at {} ms",
                    timestamp_ms, previous_ms
                )
            }
            TrackingError::NotGeoreferenced { description } => {
                write!(f, "coordinate conversion failed: {}", description)
            }
            TrackingError::NumericFailure { description } => {
                write!(f, "numerical failure: {}", description)
            }
            TrackingError::GraphInconsistency { description } => {
                write!(f, "graph inconsistency: {}", description)
            }
            TrackingError::NotImplemented { operation } => {
                write!(f, "operation not implemented: {}", operation)
            }
        }
    }
}

impl std::error::Error for TrackingError {}

impl TrackingError {
    /// Shorthand for numeric failures.
    pub(crate) fn numeric(description: impl Into<String>) -> Self {
        TrackingError::NumericFailure {
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_order_display() {
        let err = TrackingError::TimeOrder {
            timestamp_ms: 5_000,
            previous_ms: 10_000,
        };
        assert!(err.to_string().contains("5000"));
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_numeric_failure_display() {
        let err = TrackingError::numeric("innovation covariance is singular");
        assert!(err.to_string().contains("innovation covariance"));
    }

    #[test]
    fn test_not_implemented_display() {
        let err = TrackingError::NotImplemented {
            operation: "VehicleState::sample",
        };
        assert!(err.to_string().contains("VehicleState::sample"));
    }
}
