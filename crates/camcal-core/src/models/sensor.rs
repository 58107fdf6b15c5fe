use crate::{Mat2, Mat3, Real, Vec2, Vec3};

/// Tilted (Scheimpflug) sensor stage, compatible with OpenCV's
/// `computeTiltProjectionMatrix`.
///
/// `Mτ = projZ(Rxy)·Rxy` with `Rxy = Ry(τy)·Rx(τx)`; a distorted normalized
/// point `p` maps to `dehom(Mτ·[p, 1])`.
#[derive(Clone, Debug, PartialEq)]
pub struct TiltedSensor {
    matrix: Mat3,
    inverse: Mat3,
    d_tau_x: Mat3,
    d_tau_y: Mat3,
}

impl TiltedSensor {
    pub fn new(tau_x: Real, tau_y: Real) -> Self {
        let (s_tx, c_tx) = tau_x.sin_cos();
        let (s_ty, c_ty) = tau_y.sin_cos();

        let rot_x = Mat3::new(1.0, 0.0, 0.0, 0.0, c_tx, s_tx, 0.0, -s_tx, c_tx);
        let rot_y = Mat3::new(c_ty, 0.0, -s_ty, 0.0, 1.0, 0.0, s_ty, 0.0, c_ty);
        let d_rot_x = Mat3::new(0.0, 0.0, 0.0, 0.0, -s_tx, c_tx, 0.0, -c_tx, -s_tx);
        let d_rot_y = Mat3::new(-s_ty, 0.0, -c_ty, 0.0, 0.0, 0.0, c_ty, 0.0, -s_ty);

        let rot_xy = rot_y * rot_x;
        let matrix = proj_z(&rot_xy) * rot_xy;

        let d_tilt =
            |d_rot_xy: Mat3| proj_z_derivative(&d_rot_xy) * rot_xy + proj_z(&rot_xy) * d_rot_xy;
        let d_tau_x = d_tilt(rot_y * d_rot_x);
        let d_tau_y = d_tilt(d_rot_y * rot_x);

        // Singular only at |τ| = π/2, far outside any physical tilt.
        let inverse = matrix.try_inverse().unwrap_or_else(Mat3::identity);

        Self {
            matrix,
            inverse,
            d_tau_x,
            d_tau_y,
        }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn matrix(&self) -> &Mat3 {
        &self.matrix
    }

    /// Distorted normalized point → sensor plane.
    pub fn apply(&self, p: &Vec2) -> Vec2 {
        dehomogenize(&(self.matrix * Vec3::new(p.x, p.y, 1.0)))
    }

    /// Sensor plane → distorted normalized point.
    pub fn unapply(&self, p: &Vec2) -> Vec2 {
        dehomogenize(&(self.inverse * Vec3::new(p.x, p.y, 1.0)))
    }

    /// [`Self::apply`] together with `∂/∂p` and the `(τx, τy)` columns.
    pub fn apply_with_jacobian(&self, p: &Vec2) -> (Vec2, Mat2, Mat2) {
        let ph = Vec3::new(p.x, p.y, 1.0);
        let v = self.matrix * ph;
        let w = v.z;
        let out = Vec2::new(v.x / w, v.y / w);
        let m = &self.matrix;

        let d_point = Mat2::new(
            (m[(0, 0)] - out.x * m[(2, 0)]) / w,
            (m[(0, 1)] - out.x * m[(2, 1)]) / w,
            (m[(1, 0)] - out.y * m[(2, 0)]) / w,
            (m[(1, 1)] - out.y * m[(2, 1)]) / w,
        );

        let column = |dm: &Mat3| {
            let dv = dm * ph;
            Vec2::new((dv.x - out.x * dv.z) / w, (dv.y - out.y * dv.z) / w)
        };
        let d_tau = Mat2::from_columns(&[column(&self.d_tau_x), column(&self.d_tau_y)]);

        (out, d_point, d_tau)
    }
}

impl Default for TiltedSensor {
    fn default() -> Self {
        Self::identity()
    }
}

fn proj_z(r: &Mat3) -> Mat3 {
    Mat3::new(
        r[(2, 2)],
        0.0,
        -r[(0, 2)],
        0.0,
        r[(2, 2)],
        -r[(1, 2)],
        0.0,
        0.0,
        1.0,
    )
}

fn proj_z_derivative(dr: &Mat3) -> Mat3 {
    Mat3::new(
        dr[(2, 2)],
        0.0,
        -dr[(0, 2)],
        0.0,
        dr[(2, 2)],
        -dr[(1, 2)],
        0.0,
        0.0,
        0.0,
    )
}

fn dehomogenize(v: &Vec3) -> Vec2 {
    Vec2::new(v.x / v.z, v.y / v.z)
}
