use crate::synthetic::UniformPixelNoise;
use crate::{
    project_points, rotation_from_rvec, CameraMatrix, DistortionCoefficients, Pose, Pt3, Real,
    Vec3, View,
};
use anyhow::{ensure, Context, Result};
use std::f64::consts::TAU;

/// Planar chessboard corners on `Z = 0`, row-major.
pub fn grid_points(cols: usize, rows: usize, spacing: Real) -> Vec<Pt3> {
    let mut pts = Vec::with_capacity(cols * rows);
    for j in 0..rows {
        for i in 0..cols {
            pts.push(Pt3::new(i as Real * spacing, j as Real * spacing, 0.0));
        }
    }
    pts
}

/// Non-coplanar rig: `layers` copies of a grid stacked along `Z`.
pub fn grid_points_3d(cols: usize, rows: usize, layers: usize, spacing: Real) -> Vec<Pt3> {
    let mut pts = Vec::with_capacity(cols * rows * layers);
    for k in 0..layers {
        for mut p in grid_points(cols, rows, spacing) {
            p.z = k as Real * spacing;
            pts.push(p);
        }
    }
    pts
}

/// Centroid of a point set.
pub fn centroid(points: &[Pt3]) -> Vec3 {
    let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords);
    sum / points.len().max(1) as Real
}

/// `count` poses viewing a rig from different tilts.
///
/// Each pose places the rig centroid at roughly `distance` in front of the
/// camera with a tilt of about `tilt` radians around an axis that rotates
/// from view to view, which keeps the Zhang system well conditioned.
pub fn orbit_poses(points: &[Pt3], count: usize, distance: Real, tilt: Real) -> Vec<Pose> {
    let center = centroid(points);
    (0..count)
        .map(|i| {
            let phase = TAU * i as Real / count.max(1) as Real;
            let rvec = Vec3::new(
                tilt * phase.cos(),
                tilt * phase.sin(),
                0.1 * ((i % 3) as Real - 1.0),
            );
            let r = rotation_from_rvec(&rvec);
            let offset = Vec3::new(
                0.05 * distance * phase.sin(),
                -0.04 * distance * phase.cos(),
                distance * (1.0 + 0.1 * (i % 2) as Real),
            );
            Pose::new(rvec, offset - r * center)
        })
        .collect()
}

/// Project a rig into one view, requiring every point in front of the camera.
pub fn project_view(
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
    pose: &Pose,
    points: &[Pt3],
) -> Result<View> {
    project_view_noisy(camera, dist, pose, points, &UniformPixelNoise::default(), 0)
}

/// [`project_view`] with deterministic pixel noise keyed by `view_idx`.
pub fn project_view_noisy(
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
    pose: &Pose,
    points: &[Pt3],
    noise: &UniformPixelNoise,
    view_idx: usize,
) -> Result<View> {
    for (i, p) in points.iter().enumerate() {
        let depth = pose.transform_point(p).z;
        ensure!(depth > 0.0, "point {i} is behind the camera (z = {depth})");
    }
    let pixels = project_points(points, pose, camera, dist)
        .into_iter()
        .enumerate()
        .map(|(i, px)| noise.apply(view_idx, i, px))
        .collect();
    View::new(points.to_vec(), pixels).context("building synthetic view")
}

/// Project a rig into every pose.
pub fn project_views(
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
    poses: &[Pose],
    points: &[Pt3],
    noise: &UniformPixelNoise,
) -> Result<Vec<View>> {
    poses
        .iter()
        .enumerate()
        .map(|(i, pose)| {
            project_view_noisy(camera, dist, pose, points, noise, i)
                .with_context(|| format!("view {i}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_points_order_is_stable() {
        let pts = grid_points(2, 3, 0.5);
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], Pt3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Pt3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[2], Pt3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn orbit_poses_keep_the_rig_in_front() {
        let board = grid_points(9, 6, 0.03);
        let camera = CameraMatrix::new(800.0, 800.0, 640.0, 360.0);
        let dist = DistortionCoefficients::default();
        let poses = orbit_poses(&board, 6, 0.6, 0.4);
        let views = project_views(&camera, &dist, &poses, &board, &UniformPixelNoise::default())
            .unwrap();
        assert_eq!(views.len(), 6);
        assert!(views.iter().all(|v| v.len() == board.len()));
    }

    #[test]
    fn noisy_views_stay_within_the_noise_bound() {
        let board = grid_points(5, 4, 0.04);
        let camera = CameraMatrix::new(800.0, 800.0, 640.0, 360.0);
        let dist = DistortionCoefficients::default();
        let poses = orbit_poses(&board, 3, 0.6, 0.3);
        let clean = project_views(&camera, &dist, &poses, &board, &UniformPixelNoise::default())
            .unwrap();
        let noise = UniformPixelNoise::new(3, 0.5);
        let noisy = project_views(&camera, &dist, &poses, &board, &noise).unwrap();
        let mut moved = false;
        for (c, n) in clean.iter().zip(&noisy) {
            for (a, b) in c.image_points().iter().zip(n.image_points()) {
                let d = b - a;
                assert!(d.x.abs() <= 0.5 + 1e-9 && d.y.abs() <= 0.5 + 1e-9);
                moved |= d.norm() > 0.0;
            }
        }
        assert!(moved);
    }

    #[test]
    fn points_behind_the_camera_are_rejected() {
        let camera = CameraMatrix::new(800.0, 800.0, 640.0, 360.0);
        let dist = DistortionCoefficients::default();
        let pose = Pose::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        assert!(project_view(&camera, &dist, &pose, &grid_points(3, 3, 0.1)).is_err());
    }
}
