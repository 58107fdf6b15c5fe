//! Nonlinear refinement for single-camera calibration.
//!
//! - [`layout`]: the canonical parameter vector and which entries are free,
//! - [`residuals`]: reprojection residuals and per-view Jacobian blocks,
//!   evaluated in parallel with `rayon`,
//! - [`lm`]: a Levenberg–Marquardt refiner generic over [`NllsProblem`],
//! - [`pose_refine`]: iterative single-view pose refinement on top of any
//!   linear [`PoseEstimator`](camcal_linear::PoseEstimator).

pub mod layout;
pub mod lm;
pub mod pose_refine;
pub mod residuals;

pub use layout::*;
pub use lm::*;
pub use pose_refine::*;
pub use residuals::*;
