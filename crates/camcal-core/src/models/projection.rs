use crate::{
    rodrigues_point_jacobian_factor, skew, CameraMatrix, DistortionCoefficients, Mat2, Mat23,
    Mat3, Pose, Pt2, Pt3, Real, TiltedSensor, Vec2, Vec3,
};
use nalgebra::SMatrix;

/// Derivatives of one projected pixel.
#[derive(Clone, Debug)]
pub struct ProjectionJacobian {
    /// Columns `fx, fy, cx, cy`.
    pub intrinsics: SMatrix<Real, 2, 4>,
    /// Columns `k1 … tauY` (all 14, regardless of the active model).
    pub distortion: SMatrix<Real, 2, 14>,
    pub rvec: Mat23,
    pub tvec: Mat23,
}

/// Full forward model for one pose: rig point → pixel.
///
/// Caches everything that depends only on the pose and the lens parameters so
/// that projecting many points of one view stays cheap.
#[derive(Clone, Debug)]
pub struct Projector<'a> {
    camera: &'a CameraMatrix,
    dist: &'a DistortionCoefficients,
    rotation: Mat3,
    rot_factor: Mat3,
    tvec: Vec3,
    sensor: TiltedSensor,
}

impl<'a> Projector<'a> {
    pub fn new(camera: &'a CameraMatrix, dist: &'a DistortionCoefficients, pose: &Pose) -> Self {
        let rotation = pose.rotation();
        Self {
            camera,
            dist,
            rot_factor: rodrigues_point_jacobian_factor(&pose.rvec, &rotation),
            rotation,
            tvec: pose.tvec,
            sensor: dist.sensor(),
        }
    }

    /// Ideal normalized coordinates and inverse depth.
    ///
    /// A point exactly on the camera plane uses inverse depth 1.
    fn normalize(&self, p: &Pt3) -> (Vec3, Real) {
        let pc = self.rotation * p.coords + self.tvec;
        let iz = if pc.z != 0.0 { 1.0 / pc.z } else { 1.0 };
        (pc, iz)
    }

    pub fn project(&self, p: &Pt3) -> Pt2 {
        let (pc, iz) = self.normalize(p);
        let distorted = self.dist.distort(&Vec2::new(pc.x * iz, pc.y * iz));
        self.camera.to_pixel(&self.sensor.apply(&distorted))
    }

    pub fn project_with_jacobian(&self, p: &Pt3) -> (Pt2, ProjectionJacobian) {
        let (pc, iz) = self.normalize(p);
        let (x, y) = (pc.x * iz, pc.y * iz);
        let lens = self.dist.distort_with_jacobian(&Vec2::new(x, y));
        let (xt, d_tilt, d_tau) = self.sensor.apply_with_jacobian(&lens.distorted);

        let cam = self.camera;
        let focal = Mat2::new(cam.fx, 0.0, 0.0, cam.fy);
        let pixel = cam.to_pixel(&xt);

        #[rustfmt::skip]
        let intrinsics = SMatrix::<Real, 2, 4>::new(
            xt.x, 0.0,  1.0, 0.0,
            0.0,  xt.y, 0.0, 1.0,
        );

        let f_tilt = focal * d_tilt;
        let mut distortion = SMatrix::<Real, 2, 14>::zeros();
        distortion
            .fixed_view_mut::<2, 12>(0, 0)
            .copy_from(&(f_tilt * lens.d_coeffs));
        distortion
            .fixed_view_mut::<2, 2>(0, 12)
            .copy_from(&(focal * d_tau));

        let d_norm = Mat23::new(iz, 0.0, -x * iz, 0.0, iz, -y * iz);
        let d_cam = f_tilt * lens.d_point * d_norm;
        let d_rot = -(self.rotation * skew(&p.coords) * self.rot_factor);

        (
            pixel,
            ProjectionJacobian {
                intrinsics,
                distortion,
                rvec: d_cam * d_rot,
                tvec: d_cam,
            },
        )
    }
}

/// Project a rig point to pixels.
pub fn project_point(
    p: &Pt3,
    pose: &Pose,
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
) -> Pt2 {
    Projector::new(camera, dist, pose).project(p)
}

/// Project a set of rig points to pixels.
pub fn project_points(
    points: &[Pt3],
    pose: &Pose,
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
) -> Vec<Pt2> {
    let projector = Projector::new(camera, dist, pose);
    points.iter().map(|p| projector.project(p)).collect()
}

/// Project a rig point and differentiate with respect to intrinsics,
/// distortion and pose.
pub fn project_point_with_jacobian(
    p: &Pt3,
    pose: &Pose,
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
) -> (Pt2, ProjectionJacobian) {
    Projector::new(camera, dist, pose).project_with_jacobian(p)
}

/// Map observed pixels to ideal (undistorted) normalized coordinates.
pub fn undistort_points(
    pixels: &[Pt2],
    camera: &CameraMatrix,
    dist: &DistortionCoefficients,
) -> Vec<Vec2> {
    pixels
        .iter()
        .map(|px| dist.undistort_normalized(&camera.to_normalized(px)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (CameraMatrix, DistortionCoefficients, Pose) {
        let camera = CameraMatrix::new(900.0, 880.0, 640.0, 360.0);
        let dist = DistortionCoefficients::from_slice(&[
            -0.2, 0.05, 1e-3, -2e-3, 0.01, 0.03, -0.02, 0.01, 2e-3, -1e-3, 1e-3, 5e-4, 0.02, -0.01,
        ])
        .unwrap();
        let pose = Pose::new(Vec3::new(0.2, -0.3, 0.1), Vec3::new(0.05, -0.02, 0.8));
        (camera, dist, pose)
    }

    #[test]
    fn pinhole_projection_without_distortion() {
        let camera = CameraMatrix::new(800.0, 800.0, 320.0, 240.0);
        let dist = DistortionCoefficients::default();
        let pose = Pose::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 2.0));
        let px = project_point(&Pt3::new(0.5, -0.25, 0.0), &pose, &camera, &dist);
        assert!((px - Pt2::new(520.0, 140.0)).norm() < 1e-12);
    }

    #[test]
    fn zero_depth_uses_unit_inverse_depth() {
        let camera = CameraMatrix::new(10.0, 10.0, 0.0, 0.0);
        let dist = DistortionCoefficients::default();
        let pose = Pose::identity();
        let px = project_point(&Pt3::new(0.5, 0.25, 0.0), &pose, &camera, &dist);
        assert!((px - Pt2::new(5.0, 2.5)).norm() < 1e-12);
    }

    #[test]
    fn undistort_points_recovers_ideal_coordinates() {
        let (camera, dist, pose) = setup();
        let p = Pt3::new(0.1, 0.05, 0.0);
        let px = project_point(&p, &pose, &camera, &dist);
        let ideal = undistort_points(&[px], &camera, &dist)[0];
        let pc = pose.transform_point(&p);
        assert!((ideal - Vec2::new(pc.x / pc.z, pc.y / pc.z)).norm() < 1e-9);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let (camera, dist, pose) = setup();
        let p = Pt3::new(0.12, -0.07, 0.03);
        let (px, jac) = project_point_with_jacobian(&p, &pose, &camera, &dist);
        assert!((px - project_point(&p, &pose, &camera, &dist)).norm() < 1e-12);

        let h = 1e-6;
        let check = |analytic: Vec2, plus: Pt2, minus: Pt2, what: &str| {
            let numeric = (plus - minus) / (2.0 * h);
            let scale = numeric.norm().max(1.0);
            let err = (analytic - numeric).norm() / scale;
            assert!(err < 1e-6, "{what}: analytic {analytic:?} numeric {numeric:?}");
        };

        for i in 0..4 {
            let mut kp = camera.to_array();
            let mut km = camera.to_array();
            kp[i] += h;
            km[i] -= h;
            check(
                jac.intrinsics.column(i).into_owned(),
                project_point(&p, &pose, &CameraMatrix::from_array(kp), &dist),
                project_point(&p, &pose, &CameraMatrix::from_array(km), &dist),
                "intrinsics",
            );
        }
        for i in 0..14 {
            let mut dp = dist.clone();
            let mut dm = dist.clone();
            dp.set(i, dist.get(i) + h);
            dm.set(i, dist.get(i) - h);
            check(
                jac.distortion.column(i).into_owned(),
                project_point(&p, &pose, &camera, &dp),
                project_point(&p, &pose, &camera, &dm),
                "distortion",
            );
        }
        for i in 0..3 {
            let mut rp = pose;
            let mut rm = pose;
            rp.rvec[i] += h;
            rm.rvec[i] -= h;
            check(
                jac.rvec.column(i).into_owned(),
                project_point(&p, &rp, &camera, &dist),
                project_point(&p, &rm, &camera, &dist),
                "rvec",
            );
            let mut tp = pose;
            let mut tm = pose;
            tp.tvec[i] += h;
            tm.tvec[i] -= h;
            check(
                jac.tvec.column(i).into_owned(),
                project_point(&p, &tp, &camera, &dist),
                project_point(&p, &tm, &camera, &dist),
                "tvec",
            );
        }
    }
}
