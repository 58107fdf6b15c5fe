//! Multi-view calibration entry point.

use crate::options::CalibrateOptions;
use camcal_core::{
    CalibError, CameraMatrix, DistortionCoefficients, ImageSize, Mat3, Pose, Real, View,
};
use camcal_linear::{
    dlt_homography, estimate_intrinsics, LinearPoseEstimator, PoseEstimator, ZhangConstraints,
};
use camcal_optim::{LevenbergMarquardt, LmReport, ParamLayout, ReprojectionProblem};
use log::{debug, info};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of [`calibrate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera_matrix: CameraMatrix,
    pub dist_coeffs: DistortionCoefficients,
    /// RMS reprojection error over all points, in pixels.
    pub reproj_error: Real,
    /// Rig-to-camera pose per view, in input order.
    pub poses: Vec<Pose>,
    /// RMS reprojection error of each view, in pixels.
    pub per_view_errors: Vec<Real>,
    /// `fx fy cx cy` followed by the distortion coefficients; zero for held
    /// entries. `None` when the problem has no residual degrees of freedom.
    pub std_deviations_intrinsics: Option<Vec<Real>>,
    /// `rvec tvec` per view.
    pub std_deviations_extrinsics: Option<Vec<Real>>,
    pub report: LmReport,
}

impl CalibrationResult {
    pub fn num_views(&self) -> usize {
        self.poses.len()
    }
}

/// Calibrate with the closed-form pose initializer.
///
/// ```no_run
/// use camcal::{calibrate, CalibrateOptions};
/// use camcal::core::{ImageSize, View};
///
/// # fn load() -> Vec<View> { Vec::new() }
/// let views = load();
/// let result = calibrate(&views, ImageSize::new(1280, 720), &CalibrateOptions::default())?;
/// println!("rms {:.3} px, K = {:?}", result.reproj_error, result.camera_matrix);
/// # Ok::<(), camcal::CalibError>(())
/// ```
pub fn calibrate(
    views: &[View],
    image_size: ImageSize,
    options: &CalibrateOptions,
) -> Result<CalibrationResult, CalibError> {
    calibrate_with(views, image_size, options, &LinearPoseEstimator)
}

/// Calibrate with a caller-chosen pose initializer.
pub fn calibrate_with<E: PoseEstimator>(
    views: &[View],
    image_size: ImageSize,
    options: &CalibrateOptions,
    estimator: &E,
) -> Result<CalibrationResult, CalibError> {
    if views.is_empty() {
        return Err(CalibError::InsufficientViews(
            "at least one view is required".into(),
        ));
    }
    image_size.validate()?;
    options.criteria.validate()?;

    let flags = &options.flags;
    let model = flags.model();
    let solver = flags.solver();
    if flags.use_intrinsic_guess && options.camera_matrix_guess.is_none() {
        return Err(CalibError::InvalidInput(
            "use_intrinsic_guess requires camera_matrix_guess".into(),
        ));
    }
    let guess = options.camera_guess(image_size);
    if flags.use_intrinsic_guess || flags.fix_aspect_ratio {
        guess.validate()?;
    }
    let dist_guess = options.dist_guess();
    if !dist_guess.is_finite() {
        return Err(CalibError::InvalidInput(
            "distortion guess must be finite".into(),
        ));
    }

    let num_points: usize = views.iter().map(View::len).sum();
    info!(
        "calibrating {} views ({} points), {:?} distortion ({} coefficients)",
        views.len(),
        num_points,
        model,
        model.len()
    );

    let aspect_ratio = flags.fix_aspect_ratio.then(|| guess.aspect_ratio());
    let mut camera = if flags.use_intrinsic_guess {
        guess
    } else {
        let homographies = planar_homographies(views)?;
        let constraints = ZhangConstraints {
            aspect_ratio,
            principal_point: flags
                .fix_principal_point
                .then(|| options.principal_point_guess(image_size)),
        };
        estimate_intrinsics(&homographies, image_size, &constraints, &solver)?
    };
    if let Some(a) = aspect_ratio {
        camera.fx = a * camera.fy;
    }
    let dist = initial_distortion(options);
    debug!("initial camera {:?}, distortion {:?}", camera, dist.as_slice());

    let poses = views
        .par_iter()
        .enumerate()
        .map(|(i, view)| {
            estimator
                .estimate(view, &camera, &dist)
                .map_err(|e| e.in_view(i))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let layout = ParamLayout::new(model, flags.to_mask(), aspect_ratio, views.len());
    let problem = ReprojectionProblem::new(views, layout.clone())?;
    let x0 = layout.pack(&camera, &dist, &poses);
    let (x, report) = LevenbergMarquardt::new(options.criteria)
        .with_solver(solver)
        .minimize(&problem, x0);

    let (camera_matrix, dist_coeffs, poses) = layout.unpack(&x);
    let per_view_errors = problem
        .view_residuals(&x)
        .iter()
        .map(|r| (r.norm_squared() / (r.len() / 2) as Real).sqrt())
        .collect();
    let reproj_error = (report.final_error / num_points as Real).sqrt();
    let (std_deviations_intrinsics, std_deviations_extrinsics) =
        split_std_deviations(problem.std_deviations(&x), layout.shared_dim());

    info!(
        "calibration finished: rms {:.4} px after {} iterations ({:?})",
        reproj_error, report.iterations, report.status
    );

    Ok(CalibrationResult {
        camera_matrix,
        dist_coeffs,
        reproj_error,
        poses,
        per_view_errors,
        std_deviations_intrinsics,
        std_deviations_extrinsics,
        report,
    })
}

/// Homographies of the views whose rig lies on `Z = 0`.
fn planar_homographies(views: &[View]) -> Result<Vec<Mat3>, CalibError> {
    let mut homographies = Vec::with_capacity(views.len());
    for (i, view) in views.iter().enumerate() {
        if !view.is_planar() {
            debug!("view {i} is not on Z = 0; skipped for intrinsic initialization");
            continue;
        }
        let h = dlt_homography(&view.planar_points(), view.image_points()).map_err(|e| match e {
            CalibError::DegenerateGeometry(reason) => {
                CalibError::DegenerateGeometry(format!("view {i}: {reason}"))
            }
            other => other,
        })?;
        homographies.push(h);
    }
    Ok(homographies)
}

/// Starting distortion.
///
/// Zero unless `use_intrinsic_guess`; entries held by `fix_k*`,
/// `fix_s1_s2_s3_s4` or `fix_tau_x_tau_y` keep the guess. `zero_tangent_dist`
/// always wins for `p1, p2`.
fn initial_distortion(options: &CalibrateOptions) -> DistortionCoefficients {
    let flags = &options.flags;
    let guess = options.dist_guess();
    let mut dist = if flags.use_intrinsic_guess {
        guess
    } else {
        let mut zeros = DistortionCoefficients::zeros(flags.model());
        for i in flags.held_distortion() {
            zeros.set(i, guess.get(i));
        }
        zeros
    };
    if flags.zero_tangent_dist {
        dist.set(DistortionCoefficients::P1, 0.0);
        dist.set(DistortionCoefficients::P2, 0.0);
    }
    dist
}

type StdSplit = (Option<Vec<Real>>, Option<Vec<Real>>);

fn split_std_deviations(std: Option<DVector<Real>>, shared_dim: usize) -> StdSplit {
    match std {
        Some(s) => (
            Some(s.rows(0, shared_dim).iter().copied().collect()),
            Some(s.rows(shared_dim, s.len() - shared_dim).iter().copied().collect()),
        ),
        None => (None, None),
    }
}
