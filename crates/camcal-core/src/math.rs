//! Mathematical utilities and type definitions.

use nalgebra::{
    Isometry3, Matrix2, Matrix2x3, Matrix3, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3,
};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 2×2 matrix with [`Real`] entries.
pub type Mat2 = Matrix2<Real>;
/// 2×3 matrix with [`Real`] entries.
pub type Mat23 = Matrix2x3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Convert a 2D point in Euclidean coordinates into homogeneous coordinates.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Convert a 3D homogeneous vector back to a 2D point.
///
/// The caller is responsible for ensuring that `w != 0`.
pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Cross-product matrix `[v]ₓ` such that `[v]ₓ·u = v × u`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rotation matrix of a Rodrigues (axis·angle) vector.
pub fn rotation_from_rvec(rvec: &Vec3) -> Mat3 {
    *Rotation3::from_scaled_axis(*rvec).matrix()
}

/// Rodrigues vector of a rotation matrix.
///
/// The input is re-orthonormalized first, so slightly non-orthogonal matrices
/// coming out of linear estimators are accepted.
pub fn rvec_from_rotation(r: &Mat3) -> Vec3 {
    Rotation3::from_matrix(&project_to_so3(r)).scaled_axis()
}

/// Closest rotation (Frobenius norm) to `m`, with the determinant forced to +1.
pub fn project_to_so3(m: &Mat3) -> Mat3 {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Mat3::identity();
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }
    r
}

/// Right factor `F` of the Rodrigues point derivative.
///
/// For `R = R(ω)` and any point `p`, `∂(R·p)/∂ω = −R·[p]ₓ·F`. `F` depends only
/// on `ω`, so it is computed once per pose and reused for every point.
pub fn rodrigues_point_jacobian_factor(rvec: &Vec3, rotation: &Mat3) -> Mat3 {
    let theta2 = rvec.norm_squared();
    if theta2 < 1e-18 {
        return Mat3::identity();
    }
    (rvec * rvec.transpose() + (rotation.transpose() - Mat3::identity()) * skew(rvec)) / theta2
}
