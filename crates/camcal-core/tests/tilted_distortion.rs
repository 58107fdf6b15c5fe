//! Integration tests for the tilted sensor combined with lens distortion.
//!
//! Validates that projection followed by undistortion recovers the ideal ray
//! for every distortion layout, and that the OpenCV tilt convention holds.

use camcal_core::{
    project_point, undistort_points, CameraMatrix, DistortionCoefficients, DistortionModel, Pose,
    Pt3, Vec2, Vec3,
};

fn camera() -> CameraMatrix {
    CameraMatrix::new(800.0, 780.0, 640.0, 360.0)
}

fn coefficients(model: DistortionModel) -> DistortionCoefficients {
    let full = [
        -0.3, 0.1, 0.001, -0.001, 0.0, 0.01, -0.005, 0.002, 1e-3, -5e-4, 5e-4, 2e-4, 0.02, -0.01,
    ];
    DistortionCoefficients::from_slice(&full[..model.len()]).unwrap()
}

#[test]
fn tilted_projection_round_trip_for_every_model() {
    let pose = Pose::identity();
    let test_points = [
        Pt3::new(0.0, 0.0, 2.0),
        Pt3::new(0.2, 0.1, 2.5),
        Pt3::new(-0.15, -0.08, 1.8),
        Pt3::new(0.3, -0.2, 3.0),
        Pt3::new(-0.1, 0.15, 2.2),
    ];

    for model in [
        DistortionModel::Standard,
        DistortionModel::Rational,
        DistortionModel::ThinPrism,
        DistortionModel::Tilted,
    ] {
        let dist = coefficients(model);
        for point in test_points {
            let pixel = project_point(&point, &pose, &camera(), &dist);
            let ideal = undistort_points(&[pixel], &camera(), &dist)[0];
            let expected = Vec2::new(point.x / point.z, point.y / point.z);
            let err = (ideal - expected).norm();
            assert!(
                err < 1e-9,
                "{model:?}: normalized error too large: {err} for point {point:?}"
            );
        }
    }
}

#[test]
fn tilt_moves_off_axis_points_only_through_the_sensor_stage() {
    let pose = Pose::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
    let mut tilted = DistortionCoefficients::zeros(DistortionModel::Tilted);
    let flat = tilted.clone();
    tilted.set(DistortionCoefficients::TAU_X, 0.05);

    // The optical axis is a fixed point of the tilt homography.
    let center = Pt3::new(0.0, 0.0, 0.0);
    let a = project_point(&center, &pose, &camera(), &tilted);
    let b = project_point(&center, &pose, &camera(), &flat);
    assert!((a - b).norm() < 1e-12, "axis moved: {a:?} vs {b:?}");

    let off_axis = Pt3::new(0.0, 0.2, 0.0);
    let a = project_point(&off_axis, &pose, &camera(), &tilted);
    let b = project_point(&off_axis, &pose, &camera(), &flat);
    assert!((a - b).norm() > 1e-3, "tilt had no effect");
    assert!((a.x - b.x).abs() < 1e-9, "tilt around X must not shift u");
}
