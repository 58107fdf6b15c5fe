//! Numerical helpers shared by the linear solvers.
//!
//! Hartley normalization centres a point set at the origin and scales it so
//! the mean distance is `√2` (2D) or `√3` (3D), which keeps DLT systems well
//! conditioned. See Hartley & Zisserman, "Multiple View Geometry", Alg. 4.2.

use camcal_core::{Mat3, Mat4, Pt2, Pt3, Real};
use nalgebra::{DMatrix, DVector};

/// Hartley normalization for 2D points.
///
/// Returns the normalized points and `T` with `p_norm = T · p_hom`, or `None`
/// when the input is empty or every point coincides.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let c = points.iter().fold(Pt2::origin().coords, |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - c).norm()).sum::<Real>() / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = Real::sqrt(2.0) / mean_dist;
    let t = Mat3::new(
        scale,
        0.0,
        -scale * c.x,
        0.0,
        scale,
        -scale * c.y,
        0.0,
        0.0,
        1.0,
    );
    let norm = points
        .iter()
        .map(|p| Pt2::from((p.coords - c) * scale))
        .collect();
    Some((norm, t))
}

/// Hartley normalization for 3D points, the analog of [`normalize_points_2d`].
pub fn normalize_points_3d(points: &[Pt3]) -> Option<(Vec<Pt3>, Mat4)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let c = points.iter().fold(Pt3::origin().coords, |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - c).norm()).sum::<Real>() / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = Real::sqrt(3.0) / mean_dist;
    #[rustfmt::skip]
    let t = Mat4::new(
        scale, 0.0,   0.0,   -scale * c.x,
        0.0,   scale, 0.0,   -scale * c.y,
        0.0,   0.0,   scale, -scale * c.z,
        0.0,   0.0,   0.0,   1.0,
    );
    let norm = points
        .iter()
        .map(|p| Pt3::from((p.coords - c) * scale))
        .collect();
    Some((norm, t))
}

/// Null vector of a homogeneous system `A x = 0`.
///
/// Returns the right singular vector of the smallest singular value together
/// with the singular values sorted ascending. Systems with fewer rows than
/// columns are zero-padded so the null space is part of the decomposition.
pub(crate) fn null_vector(a: &DMatrix<Real>) -> Option<(DVector<Real>, Vec<Real>)> {
    let cols = a.ncols();
    let padded;
    let a = if a.nrows() < cols {
        let mut m = DMatrix::<Real>::zeros(cols, cols);
        m.view_mut((0, 0), (a.nrows(), cols)).copy_from(a);
        padded = m;
        &padded
    } else {
        a
    };

    let svd = a.clone().svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.total_cmp(y.1))?;
    let mut sorted: Vec<Real> = svd.singular_values.iter().copied().collect();
    sorted.sort_by(|x, y| x.total_cmp(y));
    Some((v_t.row(idx).transpose(), sorted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_points_have_unit_scale() {
        let pts = vec![
            Pt2::new(100.0, 200.0),
            Pt2::new(150.0, 250.0),
            Pt2::new(120.0, 220.0),
            Pt2::new(90.0, 260.0),
        ];
        let (norm, t) = normalize_points_2d(&pts).unwrap();
        let mean = norm.iter().fold(Pt2::origin().coords, |a, p| a + p.coords) / 4.0;
        assert!(mean.norm() < 1e-12);
        let mean_dist = norm.iter().map(|p| p.coords.norm()).sum::<Real>() / 4.0;
        assert!((mean_dist - Real::sqrt(2.0)).abs() < 1e-12);

        let mapped = t * camcal_core::to_homogeneous(&pts[1]);
        assert!((camcal_core::from_homogeneous(&mapped) - norm[1]).norm() < 1e-12);
    }

    #[test]
    fn coincident_points_are_rejected() {
        let pts = vec![Pt2::new(1.0, 1.0); 5];
        assert!(normalize_points_2d(&pts).is_none());
        assert!(normalize_points_3d(&[Pt3::new(0.0, 0.0, 1.0); 4]).is_none());
    }

    #[test]
    fn null_vector_of_wide_system() {
        // x + y - z = 0 and x - y = 0 → null space spanned by (1, 1, 2).
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, -1.0, 1.0, -1.0, 0.0]);
        let (v, sv) = null_vector(&a).unwrap();
        let dir = &v / v[0];
        assert!((dir - DVector::from_vec(vec![1.0, 1.0, 2.0])).norm() < 1e-12);
        assert!(sv[0] < 1e-12);
    }
}
