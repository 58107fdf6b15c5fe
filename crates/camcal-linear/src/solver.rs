//! Least-squares solve strategies.
//!
//! Both the intrinsic initializer and the Levenberg–Marquardt refiner solve
//! small dense systems through [`LinearSolver`], so the decomposition is
//! chosen once (by [`DecompMethod`]) and shared.

use camcal_core::Real;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Pivot ratio above which an LU solve is considered ill-conditioned.
pub const LU_CONDITION_LIMIT: Real = 1e12;

/// Solves `A x = b` in the least-squares sense.
pub trait LinearSolver {
    /// Returns `None` when the system has no usable solution.
    fn solve(&self, a: &DMatrix<Real>, b: &DVector<Real>) -> Option<DVector<Real>>;
}

/// SVD-based pseudo-inverse solve. Robust to rank deficiency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvdSolver {
    /// Singular values below `rel_eps · σ_max` are treated as zero.
    pub rel_eps: Real,
}

impl Default for SvdSolver {
    fn default() -> Self {
        Self {
            rel_eps: Real::EPSILON,
        }
    }
}

impl LinearSolver for SvdSolver {
    fn solve(&self, a: &DMatrix<Real>, b: &DVector<Real>) -> Option<DVector<Real>> {
        if a.nrows() != b.len() || a.ncols() == 0 {
            return None;
        }
        let svd = a.clone().svd(true, true);
        let sigma_max = svd.singular_values.max();
        if !(sigma_max.is_finite() && sigma_max > 0.0) {
            return None;
        }
        svd.solve(b, self.rel_eps * sigma_max)
            .ok()
            .filter(|x| x.iter().all(|v| v.is_finite()))
    }
}

/// LU with partial pivoting; rectangular systems go through the normal
/// equations. Falls back to [`SvdSolver`] when the pivot ratio exceeds
/// [`LU_CONDITION_LIMIT`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LuSolver;

impl LinearSolver for LuSolver {
    fn solve(&self, a: &DMatrix<Real>, b: &DVector<Real>) -> Option<DVector<Real>> {
        if a.nrows() != b.len() || a.ncols() == 0 {
            return None;
        }
        let (lhs, rhs) = if a.is_square() {
            (a.clone(), b.clone())
        } else {
            (a.tr_mul(a), a.tr_mul(b))
        };

        let lu = lhs.lu();
        let pivots = lu.u().diagonal().abs();
        let (min_pivot, max_pivot) = (pivots.min(), pivots.max());
        if min_pivot == 0.0 || max_pivot / min_pivot > LU_CONDITION_LIMIT {
            debug!(
                "LU pivot ratio {:.3e} above limit, falling back to SVD",
                max_pivot / min_pivot
            );
            return SvdSolver::default().solve(a, b);
        }
        lu.solve(&rhs).filter(|x| x.iter().all(|v| v.is_finite()))
    }
}

/// Decomposition used for every least-squares solve of a calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompMethod {
    #[default]
    Svd,
    Lu,
}

impl LinearSolver for DecompMethod {
    fn solve(&self, a: &DMatrix<Real>, b: &DVector<Real>) -> Option<DVector<Real>> {
        match self {
            DecompMethod::Svd => SvdSolver::default().solve(a, b),
            DecompMethod::Lu => LuSolver.solve(a, b),
        }
    }
}
