//! Reprojection residuals and their Jacobian.
//!
//! Each view depends only on the shared intrinsics/distortion block and its
//! own pose, so the Jacobian is evaluated per view (in parallel) as two dense
//! blocks: `2n × free_shared` and `2n × 6`. The normal equations are then
//! assembled exploiting that arrow structure: every view contributes to the
//! shared/shared block, its own pose/pose block, and the two couplings.

use crate::layout::{ActiveParameterMask, ParamLayout};
use crate::lm::{NllsProblem, NormalEquations};
use camcal_core::{
    CalibError, CameraMatrix, DistortionCoefficients, Pose, ProjectionJacobian, Projector, Real,
    Vec2, View,
};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Residuals and Jacobian blocks of one view.
#[derive(Debug, Clone)]
pub struct ViewBlock {
    /// `observed − predicted`, x then y per point.
    pub residuals: DVector<Real>,
    /// Derivatives over the free shared parameters.
    pub shared: DMatrix<Real>,
    /// Derivatives over `rvec, tvec` (2n × 6).
    pub pose: DMatrix<Real>,
}

/// Joint reprojection problem over all views.
#[derive(Debug, Clone)]
pub struct ReprojectionProblem<'a> {
    views: &'a [View],
    layout: ParamLayout,
    num_residuals: usize,
}

impl<'a> ReprojectionProblem<'a> {
    pub fn new(views: &'a [View], layout: ParamLayout) -> Result<Self, CalibError> {
        if views.len() != layout.num_views() {
            return Err(CalibError::InvalidInput(format!(
                "layout has {} pose blocks for {} views",
                layout.num_views(),
                views.len()
            )));
        }
        let num_residuals = 2 * views.iter().map(View::len).sum::<usize>();
        Ok(Self {
            views,
            layout,
            num_residuals,
        })
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn views(&self) -> &[View] {
        self.views
    }

    pub fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    pub fn num_points(&self) -> usize {
        self.num_residuals / 2
    }

    fn shared_params(&self, x: &DVector<Real>) -> (CameraMatrix, DistortionCoefficients) {
        (self.layout.camera(x), self.layout.distortion(x))
    }

    fn view_residuals_with(
        &self,
        x: &DVector<Real>,
        view_idx: usize,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
    ) -> DVector<Real> {
        let view = &self.views[view_idx];
        let pose = self.layout.pose(x, view_idx);
        let projector = Projector::new(camera, dist, &pose);
        let mut r = DVector::<Real>::zeros(2 * view.len());
        for (i, (p, obs)) in view
            .object_points()
            .iter()
            .zip(view.image_points())
            .enumerate()
        {
            let pred = projector.project(p);
            r[2 * i] = obs.x - pred.x;
            r[2 * i + 1] = obs.y - pred.y;
        }
        r
    }

    /// Residual vectors, one per view.
    pub fn view_residuals(&self, x: &DVector<Real>) -> Vec<DVector<Real>> {
        let (camera, dist) = self.shared_params(x);
        (0..self.views.len())
            .into_par_iter()
            .map(|v| self.view_residuals_with(x, v, &camera, &dist))
            .collect()
    }

    /// Derivative column of one free shared parameter.
    fn shared_column(&self, jac: &ProjectionJacobian, global: usize) -> Vec2 {
        let mut col: Vec2 = if global < CameraMatrix::DIM {
            jac.intrinsics.column(global).into_owned()
        } else {
            jac.distortion.column(global - CameraMatrix::DIM).into_owned()
        };
        if global == ActiveParameterMask::FY {
            if let Some(a) = self.layout.aspect_ratio() {
                col += jac.intrinsics.column(ActiveParameterMask::FX) * a;
            }
        }
        col
    }

    fn linearize_view(
        &self,
        x: &DVector<Real>,
        view_idx: usize,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
    ) -> ViewBlock {
        let view = &self.views[view_idx];
        let pose: Pose = self.layout.pose(x, view_idx);
        let projector = Projector::new(camera, dist, &pose);
        let free_shared = self.layout.free_shared();

        let rows = 2 * view.len();
        let mut residuals = DVector::<Real>::zeros(rows);
        let mut shared = DMatrix::<Real>::zeros(rows, free_shared.len());
        let mut pose_block = DMatrix::<Real>::zeros(rows, Pose::DIM);

        for (i, (p, obs)) in view
            .object_points()
            .iter()
            .zip(view.image_points())
            .enumerate()
        {
            let (pred, jac) = projector.project_with_jacobian(p);
            let r0 = 2 * i;
            residuals[r0] = obs.x - pred.x;
            residuals[r0 + 1] = obs.y - pred.y;

            for (c, &g) in free_shared.iter().enumerate() {
                let col = self.shared_column(&jac, g);
                shared[(r0, c)] = col.x;
                shared[(r0 + 1, c)] = col.y;
            }
            pose_block.fixed_view_mut::<2, 3>(r0, 0).copy_from(&jac.rvec);
            pose_block.fixed_view_mut::<2, 3>(r0, 3).copy_from(&jac.tvec);
        }

        ViewBlock {
            residuals,
            shared,
            pose: pose_block,
        }
    }

    /// Residuals and Jacobian blocks of every view, evaluated in parallel.
    pub fn linearize(&self, x: &DVector<Real>) -> Vec<ViewBlock> {
        let (camera, dist) = self.shared_params(x);
        (0..self.views.len())
            .into_par_iter()
            .map(|v| self.linearize_view(x, v, &camera, &dist))
            .collect()
    }

    /// Dense Jacobian over the free parameters (rows as in [`NllsProblem::residuals`]).
    pub fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let blocks = self.linearize(x);
        let ns = self.layout.num_free_shared();
        let mut j = DMatrix::<Real>::zeros(self.num_residuals, self.layout.num_free());
        let mut row = 0;
        for (v, b) in blocks.iter().enumerate() {
            let rows = b.residuals.len();
            j.view_mut((row, 0), (rows, ns)).copy_from(&b.shared);
            j.view_mut((row, self.layout.free_pose_column(v)), (rows, Pose::DIM))
                .copy_from(&b.pose);
            row += rows;
        }
        j
    }

    /// Standard deviation of every entry of the parameter vector.
    ///
    /// Uses `σ²·(JᵀJ)⁻¹` with `σ² = Σr² / (m − n_free)`. Fixed entries get
    /// zero; a tied `fx` inherits `a·σ(fy)`. `None` when there are no more
    /// residuals than free parameters or `JᵀJ` cannot be inverted.
    pub fn std_deviations(&self, x: &DVector<Real>) -> Option<DVector<Real>> {
        let n_free = self.layout.num_free();
        if self.num_residuals <= n_free {
            return None;
        }
        let ne = self.normal_equations(x);
        let sigma2 = self.residuals(x).norm_squared() / (self.num_residuals - n_free) as Real;
        let max_diag = ne.jtj.diagonal().max();
        let cov = ne.jtj.pseudo_inverse(max_diag * 1e-15).ok()?;

        let mut std = DVector::<Real>::zeros(self.layout.len());
        for (k, &g) in self.layout.free_indices().iter().enumerate() {
            std[g] = (cov[(k, k)].max(0.0) * sigma2).sqrt();
        }
        if let Some(a) = self.layout.aspect_ratio() {
            std[ActiveParameterMask::FX] = a * std[ActiveParameterMask::FY];
        }
        Some(std)
    }
}

impl NllsProblem for ReprojectionProblem<'_> {
    fn num_free(&self) -> usize {
        self.layout.num_free()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let per_view = self.view_residuals(x);
        let mut r = DVector::<Real>::zeros(self.num_residuals);
        let mut row = 0;
        for rv in per_view {
            r.rows_mut(row, rv.len()).copy_from(&rv);
            row += rv.len();
        }
        r
    }

    fn normal_equations(&self, x: &DVector<Real>) -> NormalEquations {
        let blocks = self.linearize(x);
        let n = self.layout.num_free();
        let ns = self.layout.num_free_shared();
        let mut jtj = DMatrix::<Real>::zeros(n, n);
        let mut jtr = DVector::<Real>::zeros(n);

        for (v, b) in blocks.iter().enumerate() {
            let po = self.layout.free_pose_column(v);
            let coupling = b.shared.tr_mul(&b.pose);

            let mut shared_block = jtj.view_mut((0, 0), (ns, ns));
            shared_block += b.shared.tr_mul(&b.shared);
            jtj.view_mut((0, po), (ns, Pose::DIM)).copy_from(&coupling);
            jtj.view_mut((po, 0), (Pose::DIM, ns))
                .copy_from(&coupling.transpose());
            jtj.view_mut((po, po), (Pose::DIM, Pose::DIM))
                .copy_from(&b.pose.tr_mul(&b.pose));

            let mut shared_rhs = jtr.rows_mut(0, ns);
            shared_rhs += b.shared.tr_mul(&b.residuals);
            jtr.rows_mut(po, Pose::DIM)
                .copy_from(&b.pose.tr_mul(&b.residuals));
        }

        NormalEquations { jtj, jtr }
    }

    fn apply_step(&self, x: &DVector<Real>, delta: &DVector<Real>) -> DVector<Real> {
        self.layout.apply_step(x, delta)
    }
}
