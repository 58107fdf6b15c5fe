//! Plane-to-image homography by normalized DLT.

use crate::math::{normalize_points_2d, null_vector};
use camcal_core::{from_homogeneous, to_homogeneous, CalibError, Mat3, Pt2, Real};
use nalgebra::DMatrix;

/// Second-smallest singular value, relative to the largest, below which the
/// DLT system is rank deficient.
pub const HOMOGRAPHY_RANK_TOL: Real = 1e-10;

/// Estimate `H` such that `image ~ H · plane` (normalized DLT).
///
/// `plane` holds rig `(X, Y)` coordinates, `image` the matching observations
/// (pixels or normalized coordinates). The result is scaled so `H[2,2] = 1`
/// when that entry is not vanishing.
///
/// # Errors
///
/// [`CalibError::DegenerateGeometry`] for fewer than 4 points, coincident or
/// collinear points, or a rank-deficient system.
pub fn dlt_homography(plane: &[Pt2], image: &[Pt2]) -> Result<Mat3, CalibError> {
    let n = plane.len();
    if image.len() != n {
        return Err(CalibError::InvalidInput(format!(
            "plane / image point counts must match: {n} vs {}",
            image.len()
        )));
    }
    if n < 4 {
        return Err(CalibError::DegenerateGeometry(format!(
            "homography needs at least 4 correspondences, got {n}"
        )));
    }

    let (plane_n, t_plane) = normalize_points_2d(plane)
        .ok_or_else(|| CalibError::DegenerateGeometry("coincident rig points".into()))?;
    let (image_n, t_image) = normalize_points_2d(image)
        .ok_or_else(|| CalibError::DegenerateGeometry("coincident image points".into()))?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in plane_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let (h, sv) = null_vector(&a)
        .ok_or_else(|| CalibError::LinearSolve("SVD failed in homography DLT".into()))?;
    let sigma_max = sv.last().copied().unwrap_or(0.0);
    if sigma_max <= 0.0 || sv[1] < HOMOGRAPHY_RANK_TOL * sigma_max {
        return Err(CalibError::DegenerateGeometry(
            "homography system is rank deficient (collinear points?)".into(),
        ));
    }

    let h_norm = Mat3::from_row_slice(h.as_slice());
    if h_norm.determinant().abs() < HOMOGRAPHY_RANK_TOL * h_norm.norm().powi(3) {
        return Err(CalibError::DegenerateGeometry(
            "homography is singular (collinear image points?)".into(),
        ));
    }

    let t_image_inv = t_image
        .try_inverse()
        .ok_or_else(|| CalibError::LinearSolve("normalization not invertible".into()))?;
    let mut h_mat = t_image_inv * h_norm * t_plane;

    let scale = h_mat[(2, 2)];
    if scale.abs() > Real::EPSILON {
        h_mat /= scale;
    } else {
        h_mat /= h_mat.norm();
    }
    Ok(h_mat)
}

/// Map a plane point through `H`.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Pt2 {
    from_homogeneous(&(h * to_homogeneous(p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Pt2> {
        vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn basic_homography() {
        let img: Vec<Pt2> = square().iter().map(|p| Pt2::new(2.0 * p.x, 2.0 * p.y)).collect();
        let h = dlt_homography(&square(), &img).unwrap();
        assert!((h[(0, 0)] - 2.0).abs() < 1e-9);
        assert!((h[(2, 2)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn recovers_projective_map_from_four_points() {
        let h_gt = Mat3::new(1.2, 0.1, 30.0, -0.05, 0.9, 12.0, 1e-3, -2e-3, 1.0);
        let plane = square();
        let img: Vec<Pt2> = plane.iter().map(|p| apply_homography(&h_gt, p)).collect();
        let h = dlt_homography(&plane, &img).unwrap();
        assert!((h - h_gt).norm() < 1e-8, "got {h}");
    }

    #[test]
    fn three_points_are_degenerate() {
        let plane = vec![Pt2::new(0.0, 0.0), Pt2::new(1.0, 1.0), Pt2::new(2.0, 2.0)];
        let err = dlt_homography(&plane, &plane).unwrap_err();
        assert!(matches!(err, CalibError::DegenerateGeometry(_)));
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let plane: Vec<Pt2> = (0..6).map(|i| Pt2::new(i as Real, 2.0 * i as Real)).collect();
        let img: Vec<Pt2> = plane.iter().map(|p| Pt2::new(p.x * 3.0 + 1.0, p.y - 4.0)).collect();
        let err = dlt_homography(&plane, &img).unwrap_err();
        assert!(matches!(err, CalibError::DegenerateGeometry(_)), "{err}");
    }
}
