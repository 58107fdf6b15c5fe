//! Camera models.
//!
//! The camera is a pinhole with zero skew ([`CameraMatrix`]) followed by the
//! OpenCV-compatible lens model ([`DistortionCoefficients`]) and an optional
//! tilted sensor ([`TiltedSensor`]). [`Projector`] chains them for one pose and
//! also produces the analytic Jacobian used by the refiner.

mod camera_matrix;
mod distortion;
mod projection;
mod sensor;

pub use camera_matrix::*;
pub use distortion::*;
pub use projection::*;
pub use sensor::*;
