//! Zhang's closed-form intrinsics from plane homographies, with zero skew.
//!
//! Each homography `H = [h1 h2 h3]` of a `Z = 0` rig gives two linear
//! constraints on the image of the absolute conic `B ∝ K⁻ᵀK⁻¹`:
//! `h1ᵀBh2 = 0` and `h1ᵀBh1 = h2ᵀBh2`. With zero skew `B12 = 0`, and since
//! `B33 > 0` for every valid `K`, fixing `B33 = 1` leaves the inhomogeneous
//! unknowns `(B11, B22, B13, B23)`:
//!
//! ```text
//! cx = −B13/B11    cy = −B23/B22
//! λ  = 1 − B13²/B11 − B23²/B22
//! fx = √(λ/B11)    fy = √(λ/B22)
//! ```
//!
//! Homographies are first mapped into image-size-normalized coordinates
//! (centre at the origin, longest side of unit length) and scaled to unit
//! Frobenius norm, so every row of the system has a comparable magnitude.

use crate::solver::LinearSolver;
use camcal_core::{CalibError, CameraMatrix, ImageSize, Mat3, Pt2, Real};
use nalgebra::{DMatrix, DVector, SVector};

/// Minimum number of plane homographies for closed-form intrinsics.
pub const MIN_HOMOGRAPHIES: usize = 2;

/// Optional constraints applied while solving.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZhangConstraints {
    /// Hold `fx / fy` at this ratio; the unknowns collapse to `(B11, B13, B23)`.
    pub aspect_ratio: Option<Real>,
    /// Hold the principal point (pixels); only the focal lengths are solved.
    pub principal_point: Option<Pt2>,
}

/// `[B11, B22, B13, B23, B33]` coefficients of `hiᵀ B hj`.
fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 5> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<Real, 5>::new(
        hi[0] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    )
}

fn constraint_rows(h: &Mat3) -> [SVector<Real, 5>; 2] {
    [v_ij(h, 0, 1), v_ij(h, 0, 0) - v_ij(h, 1, 1)]
}

/// Estimate `fx, fy, cx, cy` from at least [`MIN_HOMOGRAPHIES`] plane
/// homographies (plane → pixels).
///
/// # Errors
///
/// - [`CalibError::InsufficientViews`] with fewer than two homographies,
/// - [`CalibError::InvalidInput`] for a zero image size or a non-positive
///   aspect ratio,
/// - [`CalibError::DegenerateGeometry`] when the recovered conic is not
///   positive definite (all views parallel, pure translations, ...),
/// - [`CalibError::LinearSolve`] when the solver finds no solution.
pub fn estimate_intrinsics<S: LinearSolver + ?Sized>(
    homographies: &[Mat3],
    image_size: ImageSize,
    constraints: &ZhangConstraints,
    solver: &S,
) -> Result<CameraMatrix, CalibError> {
    if homographies.len() < MIN_HOMOGRAPHIES {
        return Err(CalibError::InsufficientViews(format!(
            "closed-form intrinsics need at least {MIN_HOMOGRAPHIES} planar views, got {}; \
             supply an initial camera matrix with use_intrinsic_guess",
            homographies.len()
        )));
    }
    image_size.validate()?;
    if let Some(a) = constraints.aspect_ratio {
        if !(a.is_finite() && a > 0.0) {
            return Err(CalibError::InvalidInput(format!(
                "fixed aspect ratio must be positive, got {a}"
            )));
        }
    }

    let c0 = image_size.center();
    let s = 1.0 / image_size.width.max(image_size.height) as Real;
    let to_unit = Mat3::new(s, 0.0, -s * c0.x, 0.0, s, -s * c0.y, 0.0, 0.0, 1.0);
    let hs: Vec<Mat3> = homographies
        .iter()
        .map(|h| {
            let hn = to_unit * h;
            hn / hn.norm()
        })
        .collect();

    let k = match constraints.principal_point {
        None => solve_with_free_principal_point(&hs, constraints.aspect_ratio, solver)?,
        Some(pp) => {
            let pp_unit = Pt2::new(s * (pp.x - c0.x), s * (pp.y - c0.y));
            solve_with_fixed_principal_point(&hs, pp_unit, constraints.aspect_ratio, solver)?
        }
    };

    let mut camera = CameraMatrix::new(k.fx / s, k.fy / s, k.cx / s + c0.x, k.cy / s + c0.y);
    if let Some(pp) = constraints.principal_point {
        camera.cx = pp.x;
        camera.cy = pp.y;
    }
    if !camera.is_finite() {
        return Err(CalibError::DegenerateGeometry(
            "closed-form intrinsics are not finite".into(),
        ));
    }
    Ok(camera)
}

fn solve_with_free_principal_point<S: LinearSolver + ?Sized>(
    hs: &[Mat3],
    aspect: Option<Real>,
    solver: &S,
) -> Result<CameraMatrix, CalibError> {
    let cols = if aspect.is_some() { 3 } else { 4 };
    let mut a = DMatrix::<Real>::zeros(2 * hs.len(), cols);
    let mut b = DVector::<Real>::zeros(2 * hs.len());

    for (k, h) in hs.iter().enumerate() {
        for (r, v) in constraint_rows(h).iter().enumerate() {
            let row = 2 * k + r;
            match aspect {
                Some(ar) => {
                    a[(row, 0)] = v[0] + ar * ar * v[1];
                    a[(row, 1)] = v[2];
                    a[(row, 2)] = v[3];
                }
                None => {
                    for c in 0..4 {
                        a[(row, c)] = v[c];
                    }
                }
            }
            b[row] = -v[4];
        }
    }

    let x = solver
        .solve(&a, &b)
        .ok_or_else(|| CalibError::LinearSolve("Zhang system has no solution".into()))?;
    let (b11, b22, b13, b23) = match aspect {
        Some(ar) => (x[0], ar * ar * x[0], x[1], x[2]),
        None => (x[0], x[1], x[2], x[3]),
    };

    if !(b11 > 0.0 && b22 > 0.0) {
        return Err(CalibError::DegenerateGeometry(format!(
            "absolute conic is not positive definite (B11 = {b11:.3e}, B22 = {b22:.3e})"
        )));
    }
    let lambda = 1.0 - b13 * b13 / b11 - b23 * b23 / b22;
    if !(lambda > 0.0) {
        return Err(CalibError::DegenerateGeometry(format!(
            "non-positive conic scale λ = {lambda:.3e}"
        )));
    }

    Ok(CameraMatrix::new(
        (lambda / b11).sqrt(),
        (lambda / b22).sqrt(),
        -b13 / b11,
        -b23 / b22,
    ))
}

fn solve_with_fixed_principal_point<S: LinearSolver + ?Sized>(
    hs: &[Mat3],
    pp: Pt2,
    aspect: Option<Real>,
    solver: &S,
) -> Result<CameraMatrix, CalibError> {
    // With the principal point moved to the origin, B = diag(1/fx², 1/fy², 1).
    let shift = Mat3::new(1.0, 0.0, -pp.x, 0.0, 1.0, -pp.y, 0.0, 0.0, 1.0);
    let cols = if aspect.is_some() { 1 } else { 2 };
    let mut a = DMatrix::<Real>::zeros(2 * hs.len(), cols);
    let mut b = DVector::<Real>::zeros(2 * hs.len());

    for (k, h) in hs.iter().enumerate() {
        let shifted = shift * h;
        for (r, v) in constraint_rows(&shifted).iter().enumerate() {
            let row = 2 * k + r;
            match aspect {
                Some(ar) => a[(row, 0)] = v[0] + ar * ar * v[1],
                None => {
                    a[(row, 0)] = v[0];
                    a[(row, 1)] = v[1];
                }
            }
            b[row] = -v[4];
        }
    }

    let x = solver
        .solve(&a, &b)
        .ok_or_else(|| CalibError::LinearSolve("Zhang system has no solution".into()))?;
    let (b11, b22) = match aspect {
        Some(ar) => (x[0], ar * ar * x[0]),
        None => (x[0], x[1]),
    };
    if !(b11 > 0.0 && b22 > 0.0) {
        return Err(CalibError::DegenerateGeometry(format!(
            "focal constraints are not positive (1/fx² = {b11:.3e}, 1/fy² = {b22:.3e})"
        )));
    }

    Ok(CameraMatrix::new(
        1.0 / b11.sqrt(),
        1.0 / b22.sqrt(),
        pp.x,
        pp.y,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::DecompMethod;
    use camcal_core::{rotation_from_rvec, Vec3};

    fn ground_truth() -> CameraMatrix {
        CameraMatrix::new(900.0, 880.0, 650.0, 340.0)
    }

    fn homographies(k: &CameraMatrix) -> Vec<Mat3> {
        let poses = [
            (Vec3::new(0.3, 0.1, 0.05), Vec3::new(-0.1, -0.05, 1.0)),
            (Vec3::new(-0.2, 0.35, -0.1), Vec3::new(0.05, -0.1, 1.2)),
            (Vec3::new(0.1, -0.3, 0.2), Vec3::new(-0.05, 0.02, 0.9)),
            (Vec3::new(-0.25, -0.2, 0.0), Vec3::new(0.1, 0.1, 1.1)),
        ];
        poses
            .iter()
            .map(|(rvec, t)| {
                let r = rotation_from_rvec(rvec);
                let mut rt = Mat3::zeros();
                rt.set_column(0, &r.column(0));
                rt.set_column(1, &r.column(1));
                rt.set_column(2, t);
                k.k_matrix() * rt
            })
            .collect()
    }

    fn assert_close(k: &CameraMatrix, gt: &CameraMatrix, tol: Real) {
        let diff = k
            .to_array()
            .iter()
            .zip(gt.to_array())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, Real::max);
        assert!(diff < tol, "estimated {k:?}, expected {gt:?}");
    }

    #[test]
    fn recovers_intrinsics_from_exact_homographies() {
        let gt = ground_truth();
        let size = ImageSize::new(1280, 720);
        for method in [DecompMethod::Svd, DecompMethod::Lu] {
            let constraints = ZhangConstraints::default();
            let k = estimate_intrinsics(&homographies(&gt), size, &constraints, &method).unwrap();
            assert_close(&k, &gt, 1e-6);
        }
    }

    #[test]
    fn two_views_suffice() {
        let gt = ground_truth();
        let hs = homographies(&gt);
        let k = estimate_intrinsics(
            &hs[..2],
            ImageSize::new(1280, 720),
            &ZhangConstraints::default(),
            &DecompMethod::Svd,
        )
        .unwrap();
        assert_close(&k, &gt, 1e-6);
    }

    #[test]
    fn fixed_aspect_ratio_is_honored() {
        let gt = ground_truth();
        let constraints = ZhangConstraints {
            aspect_ratio: Some(gt.fx / gt.fy),
            principal_point: None,
        };
        let k = estimate_intrinsics(
            &homographies(&gt),
            ImageSize::new(1280, 720),
            &constraints,
            &DecompMethod::Svd,
        )
        .unwrap();
        assert_close(&k, &gt, 1e-6);
        assert!((k.fx / k.fy - gt.fx / gt.fy).abs() < 1e-12);
    }

    #[test]
    fn fixed_principal_point_is_honored() {
        let gt = ground_truth();
        for aspect in [None, Some(gt.fx / gt.fy)] {
            let constraints = ZhangConstraints {
                aspect_ratio: aspect,
                principal_point: Some(Pt2::new(gt.cx, gt.cy)),
            };
            let k = estimate_intrinsics(
                &homographies(&gt),
                ImageSize::new(1280, 720),
                &constraints,
                &DecompMethod::Svd,
            )
            .unwrap();
            assert_close(&k, &gt, 1e-6);
            assert_eq!((k.cx, k.cy), (gt.cx, gt.cy));
        }
    }

    #[test]
    fn one_view_is_not_enough() {
        let hs = homographies(&ground_truth());
        let err = estimate_intrinsics(
            &hs[..1],
            ImageSize::new(1280, 720),
            &ZhangConstraints::default(),
            &DecompMethod::Svd,
        )
        .unwrap_err();
        match err {
            CalibError::InsufficientViews(msg) => assert!(msg.contains("use_intrinsic_guess")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_positive_aspect_ratio_is_invalid() {
        let constraints = ZhangConstraints {
            aspect_ratio: Some(0.0),
            principal_point: None,
        };
        let err = estimate_intrinsics(
            &homographies(&ground_truth()),
            ImageSize::new(1280, 720),
            &constraints,
            &DecompMethod::Svd,
        )
        .unwrap_err();
        assert!(matches!(err, CalibError::InvalidInput(_)));
    }
}
