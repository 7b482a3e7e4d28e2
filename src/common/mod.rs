//! Low-level utilities shared across the crate.
//!
//! Linear algebra helpers for Gaussian beliefs and the deterministic random
//! number generator the sampler runs on.

pub mod linalg;
pub mod rng;
