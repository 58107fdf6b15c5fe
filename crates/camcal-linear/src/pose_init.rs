//! Per-view pose initialization.

use crate::homography::dlt_homography;
use crate::planar_pose::PlanarPoseSolver;
use crate::pnp::dlt_pose;
use camcal_core::{
    undistort_points, CalibError, CameraMatrix, DistortionCoefficients, Mat3, Pose, Pt2, Pt3,
    Real, Vec3, View, PLANAR_Z_TOLERANCE,
};
use log::debug;

/// Scatter eigenvalue ratio (smallest / largest) at or below which a rig
/// counts as planar.
pub const PLANARITY_RATIO: Real = 1e-9;

/// Strategy estimating one view's rig-to-camera pose for known intrinsics.
///
/// Implementations report geometric failures as plain errors; the caller
/// attributes them to a view with [`CalibError::in_view`].
pub trait PoseEstimator: Sync {
    fn estimate(
        &self,
        view: &View,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
    ) -> Result<Pose, CalibError>;
}

impl<T: PoseEstimator + ?Sized> PoseEstimator for &T {
    fn estimate(
        &self,
        view: &View,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
    ) -> Result<Pose, CalibError> {
        (**self).estimate(view, camera, dist)
    }
}

/// Closed-form pose: homography decomposition for planar rigs, DLT otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPoseEstimator;

/// Frame in which a planar rig lies on `Z = 0`: `q = rotation · (p − origin)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFrame {
    pub rotation: Mat3,
    pub origin: Vec3,
}

impl PlaneFrame {
    pub fn to_plane(&self, p: &Pt3) -> Pt2 {
        let q = self.rotation * (p.coords - self.origin);
        Pt2::new(q.x, q.y)
    }
}

/// Plane frame of a rig, or `None` when the points span 3D.
///
/// Rigs already on `Z = 0` keep their axes and are only re-centred; other
/// planar rigs get the principal axes of their scatter.
pub fn plane_frame(points: &[Pt3]) -> Result<Option<PlaneFrame>, CalibError> {
    if points.is_empty() {
        return Err(CalibError::DegenerateGeometry("empty rig".into()));
    }
    let n = points.len() as Real;
    let centroid = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;

    if points.iter().all(|p| p.z.abs() <= PLANAR_Z_TOLERANCE) {
        return Ok(Some(PlaneFrame {
            rotation: Mat3::identity(),
            origin: Vec3::new(centroid.x, centroid.y, 0.0),
        }));
    }

    let scatter = points.iter().fold(Mat3::zeros(), |acc, p| {
        let d = p.coords - centroid;
        acc + d * d.transpose()
    });
    let eig = scatter.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let (largest, smallest) = (eig.eigenvalues[order[0]], eig.eigenvalues[order[2]]);
    if !(largest > 0.0) {
        return Err(CalibError::DegenerateGeometry("coincident rig points".into()));
    }
    if smallest > PLANARITY_RATIO * largest {
        return Ok(None);
    }

    let e1 = eig.eigenvectors.column(order[0]).into_owned();
    let e2 = eig.eigenvectors.column(order[1]).into_owned();
    let e3 = e1.cross(&e2);
    Ok(Some(PlaneFrame {
        rotation: Mat3::from_rows(&[e1.transpose(), e2.transpose(), e3.transpose()]),
        origin: centroid,
    }))
}

impl PoseEstimator for LinearPoseEstimator {
    fn estimate(
        &self,
        view: &View,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
    ) -> Result<Pose, CalibError> {
        let normalized: Vec<Pt2> = undistort_points(view.image_points(), camera, dist)
            .into_iter()
            .map(Pt2::from)
            .collect();
        let points = view.object_points();

        let pose = match plane_frame(points)? {
            Some(frame) => {
                let plane: Vec<Pt2> = points.iter().map(|p| frame.to_plane(p)).collect();
                let h = dlt_homography(&plane, &normalized)?;
                let unit = CameraMatrix::new(1.0, 1.0, 0.0, 0.0);
                let local = PlanarPoseSolver::from_homography(&unit, &h)?;
                let rotation = local.rotation() * frame.rotation;
                Pose::from_rotation(&rotation, local.tvec - rotation * frame.origin)
            }
            None => {
                debug!("non-planar rig with {} points, using DLT pose", points.len());
                dlt_pose(points, &normalized)?
            }
        };

        let mean_depth = points
            .iter()
            .map(|p| pose.transform_point(p).z)
            .sum::<Real>()
            / points.len() as Real;
        if !(mean_depth > 0.0) {
            return Err(CalibError::DegenerateGeometry(format!(
                "rig lies behind the camera (mean depth {mean_depth:.3e})"
            )));
        }
        Ok(pose)
    }
}
