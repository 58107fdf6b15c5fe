use camcal_core::{project_to_so3, CalibError, CameraMatrix, Mat3, Pose, Real};

/// Linear pose initialisation from a homography and intrinsics.
///
/// Implements the classic decomposition of a plane-induced homography
/// `H ∝ K [r1 r2 t]` for a target lying on its own `Z = 0` plane.
#[derive(Debug, Clone, Copy)]
pub struct PlanarPoseSolver;

/// Estimate the pose of a planar target (`Z = 0`) relative to the camera.
pub fn estimate_planar_pose_from_h(camera: &CameraMatrix, h: &Mat3) -> Result<Pose, CalibError> {
    PlanarPoseSolver::from_homography(camera, h)
}

impl PlanarPoseSolver {
    /// Decompose `H` (plane → pixels) into the rig-to-camera pose.
    ///
    /// The sign of `H` is chosen so the plane origin lies in front of the
    /// camera, and `[r1 r2 r1×r2]` is projected onto SO(3).
    pub fn from_homography(camera: &CameraMatrix, h: &Mat3) -> Result<Pose, CalibError> {
        let k_inv = camera.k_inverse();
        let mut r1 = k_inv * h.column(0);
        let mut r2 = k_inv * h.column(1);
        let mut t = k_inv * h.column(2);

        // Scale factor λ: average of the first two column norms.
        let norm1 = r1.norm();
        let norm2 = r2.norm();
        if !(norm1 > Real::EPSILON && norm2 > Real::EPSILON) {
            return Err(CalibError::DegenerateGeometry(
                "homography columns vanish; cannot recover the plane pose".into(),
            ));
        }
        let lambda = 2.0 / (norm1 + norm2);
        r1 *= lambda;
        r2 *= lambda;
        t *= lambda;

        if t.z < 0.0 {
            r1 = -r1;
            r2 = -r2;
            t = -t;
        }

        let r_approx = Mat3::from_columns(&[r1, r2, r1.cross(&r2)]);
        let r = project_to_so3(&r_approx);
        Ok(Pose::from_rotation(&r, t))
    }
}
