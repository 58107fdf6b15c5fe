use thiserror::Error;

/// Errors produced by the calibration engine.
///
/// Non-convergence of the refiner is not an error; it is reported through the
/// optimizer report instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibError {
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("insufficient views: {0}")]
    InsufficientViews(String),
    #[error("pose estimation failed for view {view}: {reason}")]
    PoseEstimation { view: usize, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("linear solve failed: {0}")]
    LinearSolve(String),
}

impl CalibError {
    /// Attribute a failure to the view with index `view`.
    ///
    /// Pose estimators report plain geometric failures; the caller knows which
    /// view it was processing and re-tags the error here.
    pub fn in_view(self, view: usize) -> Self {
        match self {
            CalibError::PoseEstimation { reason, .. } => {
                CalibError::PoseEstimation { view, reason }
            }
            CalibError::DegenerateGeometry(reason)
            | CalibError::InvalidInput(reason)
            | CalibError::LinearSolve(reason)
            | CalibError::InsufficientViews(reason) => CalibError::PoseEstimation { view, reason },
        }
    }
}
