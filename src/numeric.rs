//! Basic numerical concepts used throughout the crate

#![allow(missing_docs)]

// Floating-point precision is configured here
#[cfg(feature = "f32")]
pub type Float = f32;
#[cfg(feature = "f32")]
pub use std::f32 as floats;
#[cfg(not(feature = "f32"))]
pub type Float = f64;
#[cfg(not(feature = "f32"))]
pub use std::f64 as floats;

/// Absolute tolerance of approximate comparisons in tests
#[cfg(all(test, feature = "f32"))]
pub const TOLERANCE: Float = 1e-4;
#[cfg(all(test, not(feature = "f32")))]
pub const TOLERANCE: Float = 1e-9;

/// Mathematical functions
pub mod functions {
    pub use prefix_num_ops::real::*;

    /// Square of a number, the way physicists like to write it
    pub fn sqr(x: super::Float) -> super::Float {
        x * x
    }
}
