//! Core math and data types for `camcal`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and Rodrigues helpers,
//! - the pinhole camera matrix and the OpenCV-compatible distortion model
//!   (radial, rational, tangential, thin prism, tilted sensor),
//! - calibration data records ([`View`], [`Pose`], [`ImageSize`]),
//! - the error taxonomy shared by every `camcal` crate,
//! - deterministic synthetic data for tests.
//!
//! Camera pipeline:
//! `pixel = K ∘ tilt ∘ distortion ∘ dehom(R·P + t)`

/// Error taxonomy.
pub mod error;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera matrix, distortion and projection.
pub mod models;
/// Rigid rig-to-camera pose.
pub mod pose;
/// Deterministic synthetic calibration data.
pub mod synthetic;
/// Observation records.
pub mod view;

pub use error::*;
pub use math::*;
pub use models::*;
pub use pose::*;
pub use view::*;
