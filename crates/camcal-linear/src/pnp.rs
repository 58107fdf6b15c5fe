//! Direct Linear Transform pose for non-coplanar rigs.
//!
//! Linear least-squares solution of `x ~ [R | t] X` on Hartley-normalized rig
//! points, with the rotation block projected onto SO(3).

use crate::math::{normalize_points_3d, null_vector};
use camcal_core::{project_to_so3, CalibError, Mat3, Pose, Pt2, Pt3, Real};
use nalgebra::{DMatrix, Matrix3x4};

/// Minimum correspondences for the DLT pose.
pub const MIN_DLT_POINTS: usize = 6;

/// Relative singular value gap below which the DLT system is rank deficient
/// (coplanar or collinear rig points).
pub const DLT_RANK_TOL: Real = 1e-10;

/// Linear pose from rig points and their ideal normalized image coordinates.
///
/// Returns the rig-to-camera transform.
pub fn dlt_pose(world: &[Pt3], normalized: &[Pt2]) -> Result<Pose, CalibError> {
    let n = world.len();
    if normalized.len() != n {
        return Err(CalibError::InvalidInput(format!(
            "world / image point counts must match: {n} vs {}",
            normalized.len()
        )));
    }
    if n < MIN_DLT_POINTS {
        return Err(CalibError::DegenerateGeometry(format!(
            "DLT pose needs at least {MIN_DLT_POINTS} non-coplanar points, got {n}"
        )));
    }

    let (world_n, t_world) = normalize_points_3d(world)
        .ok_or_else(|| CalibError::DegenerateGeometry("coincident rig points".into()))?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (pw, pi)) in world_n.iter().zip(normalized.iter()).enumerate() {
        let (x, y, z) = (pw.x, pw.y, pw.z);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u * x;
        a[(r0, 9)] = -u * y;
        a[(r0, 10)] = -u * z;
        a[(r0, 11)] = -u;

        a[(r1, 4)] = x;
        a[(r1, 5)] = y;
        a[(r1, 6)] = z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -v * x;
        a[(r1, 9)] = -v * y;
        a[(r1, 10)] = -v * z;
        a[(r1, 11)] = -v;
    }

    let (p, sv) = null_vector(&a)
        .ok_or_else(|| CalibError::LinearSolve("SVD failed in DLT pose".into()))?;
    let sigma_max = sv.last().copied().unwrap_or(0.0);
    if sigma_max <= 0.0 || sv[1] < DLT_RANK_TOL * sigma_max {
        return Err(CalibError::DegenerateGeometry(
            "DLT pose system is rank deficient (coplanar points?)".into(),
        ));
    }

    // De-normalize the rig points: P = P_norm · T_world.
    let p_mtx = Matrix3x4::from_row_slice(p.as_slice()) * t_world;
    let m: Mat3 = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();

    // Scale from the average row norm, signed so that det(R) > 0.
    let mut s = (m.row(0).norm() + m.row(1).norm() + m.row(2).norm()) / 3.0;
    if m.determinant() < 0.0 {
        s = -s;
    }
    if s.abs() <= Real::EPSILON {
        return Err(CalibError::DegenerateGeometry(
            "DLT pose has a vanishing rotation block".into(),
        ));
    }

    let r = project_to_so3(&(m / s));
    let t = p_mtx.column(3) / s;
    Ok(Pose::from_rotation(&r, t))
}
