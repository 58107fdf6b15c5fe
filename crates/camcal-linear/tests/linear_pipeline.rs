use anyhow::Result;
use camcal_core::synthetic::{grid_points, orbit_poses, project_views, UniformPixelNoise};
use camcal_core::{CameraMatrix, DistortionCoefficients, ImageSize, Pt2};
use camcal_linear::{
    dlt_homography, estimate_intrinsics, DecompMethod, LinearPoseEstimator, PoseEstimator,
    ZhangConstraints,
};

#[test]
fn zhang_then_pose_recovers_synthetic_rig() -> Result<()> {
    let camera = CameraMatrix::new(800.0, 780.0, 639.5, 359.5);
    let dist = DistortionCoefficients::default();
    let board = grid_points(9, 6, 0.025);
    let poses = orbit_poses(&board, 5, 0.5, 0.45);
    let views = project_views(&camera, &dist, &poses, &board, &UniformPixelNoise::new(4, 0.2))?;

    let homographies = views
        .iter()
        .map(|v| {
            let plane: Vec<Pt2> = v.object_points().iter().map(|p| Pt2::new(p.x, p.y)).collect();
            dlt_homography(&plane, v.image_points())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let size = ImageSize::new(1280, 720);
    let constraints = ZhangConstraints::default();
    let est = estimate_intrinsics(&homographies, size, &constraints, &DecompMethod::Svd)?;
    assert!((est.fx - camera.fx).abs() / camera.fx < 0.02, "fx {}", est.fx);
    assert!((est.fy - camera.fy).abs() / camera.fy < 0.02, "fy {}", est.fy);
    assert!((est.cx - camera.cx).abs() < 15.0, "cx {}", est.cx);
    assert!((est.cy - camera.cy).abs() < 15.0, "cy {}", est.cy);

    for (view, truth) in views.iter().zip(&poses) {
        let pose = LinearPoseEstimator.estimate(view, &est, &dist)?;
        assert!((pose.tvec - truth.tvec).norm() < 0.03 * truth.tvec.norm());
        assert!((pose.rotation() - truth.rotation()).amax() < 0.05);
    }
    Ok(())
}
