//! Single-camera calibration from several views of a known rig.
//!
//! The pipeline runs Zhang's closed-form intrinsics on the planar views,
//! initializes one pose per view, then refines intrinsics, distortion and
//! poses jointly with Levenberg–Marquardt on the reprojection error.
//!
//! ```no_run
//! use camcal::{calibrate, CalibrateOptions, CalibrationFlags};
//! use camcal::core::ImageSize;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dataset = camcal::io::load_dataset("board.json")?;
//! let options = CalibrateOptions {
//!     flags: CalibrationFlags {
//!         rational_model: true,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! let result = calibrate(&dataset.views, ImageSize::new(1920, 1080), &options)?;
//! camcal::io::save_result("calibration.json", &result)?;
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks live in the layer crates, re-exported here:
//! [`core`] (camera model, distortion, views), [`linear`] (homographies,
//! Zhang, closed-form poses) and [`optim`] (parameter layout, residuals, LM).

mod calibrate;
pub mod io;
mod options;

pub use calibrate::{calibrate, calibrate_with, CalibrationResult};
pub use options::{CalibrateOptions, CalibrationFlags};

pub use camcal_core::CalibError;
pub use camcal_optim::{LmReport, LmStatus, TermCriteria, TermKind};

/// Camera model, distortion, poses, views and synthetic data.
pub mod core {
    pub use camcal_core::*;
}

/// Closed-form initialization: homographies, Zhang intrinsics, planar and DLT poses.
pub mod linear {
    pub use camcal_linear::*;
}

/// Parameter layout, reprojection residuals and the Levenberg–Marquardt refiner.
pub mod optim {
    pub use camcal_optim::*;
}

/// `use camcal::prelude::*;` for the common types.
pub mod prelude {
    pub use crate::core::{
        CalibError, CameraMatrix, DistortionCoefficients, DistortionModel, ImageSize, Pose, Pt2,
        Pt3, View,
    };
    pub use crate::io::{load_dataset, save_result, CalibrationDataset};
    pub use crate::linear::{DecompMethod, LinearPoseEstimator, PoseEstimator};
    pub use crate::optim::{LmReport, LmStatus, RefinedPoseEstimator, TermCriteria, TermKind};
    pub use crate::{
        calibrate, calibrate_with, CalibrateOptions, CalibrationFlags, CalibrationResult,
    };
}
