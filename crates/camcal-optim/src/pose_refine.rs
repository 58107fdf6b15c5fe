//! Per-view pose estimation: closed-form start, then LM over the pose alone.

use crate::layout::ParamLayout;
use crate::lm::{LevenbergMarquardt, LmStatus, TermCriteria, TermKind};
use crate::residuals::ReprojectionProblem;
use camcal_core::{CalibError, CameraMatrix, DistortionCoefficients, Pose, Real, View};
use camcal_linear::{DecompMethod, LinearPoseEstimator, PoseEstimator};
use log::debug;

/// Wraps an initial estimator and polishes its pose by minimizing the
/// reprojection error with intrinsics and distortion held fixed.
#[derive(Debug, Clone)]
pub struct RefinedPoseEstimator<E = LinearPoseEstimator> {
    pub initial: E,
    pub criteria: TermCriteria,
    pub solver: DecompMethod,
}

impl Default for RefinedPoseEstimator<LinearPoseEstimator> {
    fn default() -> Self {
        Self {
            initial: LinearPoseEstimator,
            criteria: TermCriteria::new(TermKind::CountEps, 20, Real::EPSILON),
            solver: DecompMethod::Svd,
        }
    }
}

impl<E: PoseEstimator> RefinedPoseEstimator<E> {
    pub fn new(initial: E, criteria: TermCriteria) -> Self {
        Self {
            initial,
            criteria,
            solver: DecompMethod::Svd,
        }
    }
}

impl<E: PoseEstimator> PoseEstimator for RefinedPoseEstimator<E> {
    fn estimate(
        &self,
        view: &View,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
    ) -> Result<Pose, CalibError> {
        let pose = self.initial.estimate(view, camera, dist)?;

        let layout = ParamLayout::poses_only(dist.model(), 1);
        let problem = ReprojectionProblem::new(std::slice::from_ref(view), layout.clone())?;
        let x0 = layout.pack(camera, dist, std::slice::from_ref(&pose));
        let (x, report) = LevenbergMarquardt::new(self.criteria)
            .with_solver(self.solver)
            .minimize(&problem, x0);

        if report.status == LmStatus::Diverged || report.final_error >= report.initial_error {
            debug!("pose refinement kept the closed-form pose ({:?})", report.status);
            return Ok(pose);
        }
        let refined = layout.pose(&x, 0);
        if refined.is_finite() {
            Ok(refined)
        } else {
            Ok(pose)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::synthetic::{grid_points, orbit_poses, project_views, UniformPixelNoise};
    use camcal_core::{project_points, DistortionModel};

    fn rms(view: &View, pose: &Pose, camera: &CameraMatrix, dist: &DistortionCoefficients) -> f64 {
        let pred = project_points(view.object_points(), pose, camera, dist);
        let sum: f64 = pred
            .iter()
            .zip(view.image_points())
            .map(|(p, o)| (p - o).norm_squared())
            .sum();
        (sum / view.len() as f64).sqrt()
    }

    #[test]
    fn refinement_does_not_increase_reprojection_error() {
        let camera = CameraMatrix::new(900.0, 880.0, 640.0, 360.0);
        let dist = DistortionCoefficients::from_slice(&[-0.2, 0.05, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(dist.model(), DistortionModel::Standard);
        let board = grid_points(8, 6, 0.03);
        let poses = orbit_poses(&board, 4, 0.6, 0.4);
        let noise = UniformPixelNoise::new(11, 0.5);
        let views = project_views(&camera, &dist, &poses, &board, &noise).unwrap();

        let refined = RefinedPoseEstimator::default();
        for view in &views {
            let linear = LinearPoseEstimator.estimate(view, &camera, &dist).unwrap();
            let polished = refined.estimate(view, &camera, &dist).unwrap();
            let e0 = rms(view, &linear, &camera, &dist);
            let e1 = rms(view, &polished, &camera, &dist);
            assert!(e1 <= e0 + 1e-12, "refined rms {e1} > linear rms {e0}");
            assert!(e1 < 0.6, "refined rms {e1}");
        }
    }
}
