//! Closed-form initialization for single-camera calibration.
//!
//! - [`solver`]: swappable least-squares strategies (SVD, LU with SVD fallback),
//! - [`homography`]: normalized DLT homography between the rig plane and the image,
//! - [`zhang_intrinsics`]: Zhang's intrinsics from plane homographies (zero skew),
//! - [`planar_pose`] / [`pnp`]: pose from a homography or from 3D DLT,
//! - [`pose_init`]: the [`PoseEstimator`] strategy used per view.
//!
//! Everything here is a pure function of its inputs; the results seed the
//! nonlinear refinement in `camcal-optim`.

pub mod homography;
pub mod math;
pub mod planar_pose;
pub mod pnp;
pub mod pose_init;
pub mod solver;
pub mod zhang_intrinsics;

pub use homography::*;
pub use planar_pose::*;
pub use pnp::*;
pub use pose_init::*;
pub use solver::*;
pub use zhang_intrinsics::*;
