//! Deterministic synthetic calibration data.
//!
//! Used by tests and benchmarks across the workspace: board layouts, a spread
//! of well-conditioned poses, projection through the full camera model, and
//! platform-independent pixel noise.

pub mod noise;
pub mod planar;

pub use noise::UniformPixelNoise;
pub use planar::*;
