//! Levenberg–Marquardt refiner.
//!
//! Each iteration solves the damped normal equations
//! `(JᵀJ + λI)·δ = Jᵀr` with the configured [`LinearSolver`], applies `δ` to
//! the free parameters and keeps the step only if the squared error drops.
//! Accepted steps divide `λ` by ten; rejected steps multiply it by ten and
//! retry without counting an iteration.
//!
//! ```text
//! Initialized → Iterating → Converged | MaxIterationsReached | Diverged
//! ```

use camcal_core::{CalibError, Real};
use camcal_linear::{DecompMethod, LinearSolver};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Iteration cap used when the criteria do not count iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Nonlinear least-squares problem over a vector of free parameters.
///
/// Residuals are `observed − model(x)`; the normal equations use the
/// Jacobian of `model(x)` with respect to the free parameters, so the
/// Gauss–Newton step is `x ← x + δ` with `JᵀJ·δ = Jᵀr`.
pub trait NllsProblem {
    /// Number of free parameters (the length of `δ`).
    fn num_free(&self) -> usize;

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    fn normal_equations(&self, x: &DVector<Real>) -> NormalEquations;

    /// Apply a free-parameter update, leaving fixed entries untouched.
    fn apply_step(&self, x: &DVector<Real>, delta: &DVector<Real>) -> DVector<Real>;
}

/// `JᵀJ` and `Jᵀr` restricted to the free parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    pub jtj: DMatrix<Real>,
    pub jtr: DVector<Real>,
}

/// Which termination tests are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Count,
    Eps,
    CountEps,
}

/// Termination criteria.
///
/// A criterion whose kind is not selected still falls back to a default
/// (`f64::EPSILON` for the tolerance, [`DEFAULT_MAX_ITERATIONS`] for the
/// count), so every run terminates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermCriteria {
    pub kind: TermKind,
    pub max_count: usize,
    pub epsilon: Real,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            kind: TermKind::CountEps,
            max_count: 30,
            epsilon: Real::EPSILON,
        }
    }
}

impl TermCriteria {
    pub fn new(kind: TermKind, max_count: usize, epsilon: Real) -> Self {
        Self {
            kind,
            max_count,
            epsilon,
        }
    }

    pub fn count(max_count: usize) -> Self {
        Self::new(TermKind::Count, max_count, Real::EPSILON)
    }

    pub fn eps(epsilon: Real) -> Self {
        Self::new(TermKind::Eps, DEFAULT_MAX_ITERATIONS, epsilon)
    }

    pub fn max_iterations(&self) -> usize {
        match self.kind {
            TermKind::Count | TermKind::CountEps => self.max_count,
            TermKind::Eps => DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn tolerance(&self) -> Real {
        match self.kind {
            TermKind::Eps | TermKind::CountEps => self.epsilon,
            TermKind::Count => Real::EPSILON,
        }
    }

    pub fn validate(&self) -> Result<(), CalibError> {
        if matches!(self.kind, TermKind::Count | TermKind::CountEps) && self.max_count == 0 {
            return Err(CalibError::InvalidInput(
                "termination criteria need max_count > 0".into(),
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(CalibError::InvalidInput(format!(
                "termination epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmStatus {
    /// A tolerance was met, or no descent step exists at any damping.
    Converged,
    /// The iteration cap was hit first.
    MaxIterationsReached,
    /// The error or the damped system became unusable; the best parameters
    /// found so far are returned.
    Diverged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LmState {
    Initialized,
    Iterating,
    Finished(LmStatus),
}

/// Summary of one refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmReport {
    pub status: LmStatus,
    /// Accepted steps.
    pub iterations: usize,
    pub rejected_steps: usize,
    /// Sum of squared residuals at the start.
    pub initial_error: Real,
    /// Sum of squared residuals at the returned parameters.
    pub final_error: Real,
    /// Damping at termination.
    pub lambda: Real,
}

impl LmReport {
    pub fn converged(&self) -> bool {
        self.status == LmStatus::Converged
    }
}

impl fmt::Display for LmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "status:          {:?}", self.status)?;
        writeln!(f, "iterations:      {}", self.iterations)?;
        writeln!(f, "rejected steps:  {}", self.rejected_steps)?;
        writeln!(f, "initial error:   {:.6e}", self.initial_error)?;
        writeln!(f, "final error:     {:.6e}", self.final_error)?;
        write!(f, "final damping:   {:.3e}", self.lambda)
    }
}

/// Levenberg–Marquardt minimizer.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt<S = DecompMethod> {
    criteria: TermCriteria,
    solver: S,
    damping_scale: Real,
    damping_min: Real,
    damping_max: Real,
    damping_factor: Real,
}

impl LevenbergMarquardt<DecompMethod> {
    pub fn new(criteria: TermCriteria) -> Self {
        Self {
            criteria,
            solver: DecompMethod::Svd,
            damping_scale: 1e-3,
            damping_min: 1e-15,
            damping_max: 1e16,
            damping_factor: 10.0,
        }
    }
}

impl Default for LevenbergMarquardt<DecompMethod> {
    fn default() -> Self {
        Self::new(TermCriteria::default())
    }
}

impl<S: LinearSolver> LevenbergMarquardt<S> {
    /// Use another linear solver for the damped system.
    pub fn with_solver<T: LinearSolver>(self, solver: T) -> LevenbergMarquardt<T> {
        LevenbergMarquardt {
            criteria: self.criteria,
            solver,
            damping_scale: self.damping_scale,
            damping_min: self.damping_min,
            damping_max: self.damping_max,
            damping_factor: self.damping_factor,
        }
    }

    /// Initial `λ` relative to the largest diagonal entry of `JᵀJ`.
    pub fn with_damping_scale(mut self, scale: Real) -> Self {
        self.damping_scale = scale;
        self
    }

    /// Absolute damping bounds; reaching `max` ends the run.
    pub fn with_damping_bounds(mut self, min: Real, max: Real) -> Self {
        self.damping_min = min;
        self.damping_max = max;
        self
    }

    pub fn criteria(&self) -> &TermCriteria {
        &self.criteria
    }

    /// Minimize starting at `x0`. Returns the best parameters found.
    pub fn minimize<P: NllsProblem + ?Sized>(
        &self,
        problem: &P,
        x0: DVector<Real>,
    ) -> (DVector<Real>, LmReport) {
        let max_iterations = self.criteria.max_iterations();
        let eps = self.criteria.tolerance();

        let mut x = x0;
        let mut error = problem.residuals(&x).norm_squared();
        let mut report = LmReport {
            status: LmStatus::Converged,
            iterations: 0,
            rejected_steps: 0,
            initial_error: error,
            final_error: error,
            lambda: 0.0,
        };

        let mut state = LmState::Initialized;
        let mut lambda = 0.0;
        let mut ne = NormalEquations {
            jtj: DMatrix::zeros(0, 0),
            jtr: DVector::zeros(0),
        };

        while let LmState::Initialized | LmState::Iterating = state {
            state = match state {
                LmState::Initialized => {
                    if !error.is_finite() {
                        warn!("initial error is not finite; refinement skipped");
                        LmState::Finished(LmStatus::Diverged)
                    } else if problem.num_free() == 0 {
                        debug!("no free parameters; nothing to refine");
                        LmState::Finished(LmStatus::Converged)
                    } else {
                        ne = problem.normal_equations(&x);
                        let max_diag = ne.jtj.diagonal().max();
                        lambda = self.damping_scale * if max_diag > 0.0 { max_diag } else { 1.0 };
                        debug!(
                            "LM start: {} free parameters, error {:.6e}, lambda {:.3e}",
                            problem.num_free(),
                            error,
                            lambda
                        );
                        LmState::Iterating
                    }
                }
                LmState::Iterating => {
                    if report.iterations >= max_iterations {
                        LmState::Finished(LmStatus::MaxIterationsReached)
                    } else {
                        self.iterate(
                            problem,
                            &mut x,
                            &mut error,
                            &mut ne,
                            &mut lambda,
                            eps,
                            &mut report,
                        )
                    }
                }
                finished => finished,
            };
        }

        if let LmState::Finished(status) = state {
            report.status = status;
        }
        report.final_error = error;
        report.lambda = lambda;

        match report.status {
            LmStatus::MaxIterationsReached => warn!(
                "LM did not converge in {} iterations (error {:.6e} -> {:.6e})",
                report.iterations, report.initial_error, report.final_error
            ),
            LmStatus::Diverged => warn!(
                "LM diverged after {} iterations; keeping error {:.6e}",
                report.iterations, report.final_error
            ),
            LmStatus::Converged => debug!(
                "LM converged after {} iterations ({} rejected): error {:.6e} -> {:.6e}",
                report.iterations, report.rejected_steps, report.initial_error, report.final_error
            ),
        }
        (x, report)
    }

    /// One damped step attempt.
    #[allow(clippy::too_many_arguments)]
    fn iterate<P: NllsProblem + ?Sized>(
        &self,
        problem: &P,
        x: &mut DVector<Real>,
        error: &mut Real,
        ne: &mut NormalEquations,
        lambda: &mut Real,
        eps: Real,
        report: &mut LmReport,
    ) -> LmState {
        let mut damped = ne.jtj.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] += *lambda;
        }

        let delta = self
            .solver
            .solve(&damped, &ne.jtr)
            .filter(|d| d.iter().all(|v| v.is_finite()));
        let Some(delta) = delta else {
            report.rejected_steps += 1;
            *lambda *= self.damping_factor;
            return if *lambda > self.damping_max {
                LmState::Finished(LmStatus::Diverged)
            } else {
                LmState::Iterating
            };
        };

        let x_new = problem.apply_step(x, &delta);
        let new_error = problem.residuals(&x_new).norm_squared();

        if new_error.is_finite() && new_error < *error {
            let reduction = (*error - new_error) / *error;
            let update = (&x_new - &*x).norm();
            let scale = x.norm();

            *x = x_new;
            *error = new_error;
            *lambda = (*lambda / self.damping_factor).max(self.damping_min);
            report.iterations += 1;
            *ne = problem.normal_equations(x);

            debug!(
                "LM iter {}: error {:.6e}, lambda {:.3e}, |dx| {:.3e}",
                report.iterations, new_error, *lambda, update
            );

            if update <= eps * scale || reduction <= eps {
                LmState::Finished(LmStatus::Converged)
            } else {
                LmState::Iterating
            }
        } else {
            report.rejected_steps += 1;
            *lambda *= self.damping_factor;
            if *lambda > self.damping_max {
                debug!("damping saturated at {:.3e}; no descent step left", *lambda);
                LmState::Finished(LmStatus::Converged)
            } else {
                LmState::Iterating
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exponential decay `y = a·exp(b·t)` fitted to exact samples.
    struct ExpFit {
        t: Vec<Real>,
        y: Vec<Real>,
    }

    impl ExpFit {
        fn new(a: Real, b: Real) -> Self {
            let t: Vec<Real> = (0..20).map(|i| i as Real * 0.1).collect();
            let y = t.iter().map(|t| a * (b * t).exp()).collect();
            Self { t, y }
        }

        fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_fn(self.t.len(), 2, |i, c| {
                let e = (x[1] * self.t[i]).exp();
                if c == 0 {
                    e
                } else {
                    x[0] * self.t[i] * e
                }
            })
        }
    }

    impl NllsProblem for ExpFit {
        fn num_free(&self) -> usize {
            2
        }

        fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_fn(self.t.len(), |i, _| self.y[i] - x[0] * (x[1] * self.t[i]).exp())
        }

        fn normal_equations(&self, x: &DVector<Real>) -> NormalEquations {
            let j = self.jacobian(x);
            let r = self.residuals(x);
            NormalEquations {
                jtj: j.tr_mul(&j),
                jtr: j.tr_mul(&r),
            }
        }

        fn apply_step(&self, x: &DVector<Real>, delta: &DVector<Real>) -> DVector<Real> {
            x + delta
        }
    }

    #[test]
    fn fits_exponential_decay() {
        let problem = ExpFit::new(2.0, -1.5);
        let lm = LevenbergMarquardt::new(TermCriteria::new(TermKind::CountEps, 200, 1e-14));
        let (x, report) = lm.minimize(&problem, DVector::from_vec(vec![1.0, 0.0]));
        assert!((x[0] - 2.0).abs() < 1e-8, "a = {}", x[0]);
        assert!((x[1] + 1.5).abs() < 1e-8, "b = {}", x[1]);
        assert!(report.converged(), "{report}");
        assert!(report.final_error <= report.initial_error);
    }

    #[test]
    fn lu_solver_gives_the_same_answer() {
        let problem = ExpFit::new(2.0, -1.5);
        let lm = LevenbergMarquardt::new(TermCriteria::new(TermKind::CountEps, 200, 1e-14))
            .with_solver(DecompMethod::Lu);
        let (x, _) = lm.minimize(&problem, DVector::from_vec(vec![1.0, 0.0]));
        assert!((x[0] - 2.0).abs() < 1e-8 && (x[1] + 1.5).abs() < 1e-8);
    }

    #[test]
    fn reports_max_iterations() {
        let problem = ExpFit::new(2.0, -1.5);
        let lm = LevenbergMarquardt::new(TermCriteria::count(1));
        let (_, report) = lm.minimize(&problem, DVector::from_vec(vec![1.0, 0.0]));
        assert_eq!(report.status, LmStatus::MaxIterationsReached);
        assert!(!report.converged());
        assert_eq!(report.iterations, 1);
        assert!(report.final_error < report.initial_error);
    }

    #[test]
    fn non_finite_start_diverges_without_moving() {
        let problem = ExpFit::new(2.0, -1.5);
        let x0 = DVector::from_vec(vec![Real::NAN, 0.0]);
        let (x, report) = LevenbergMarquardt::default().minimize(&problem, x0);
        assert_eq!(report.status, LmStatus::Diverged);
        assert!(x[0].is_nan());
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn exact_start_converges_immediately() {
        let problem = ExpFit::new(2.0, -1.5);
        let (x, report) = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_vec(vec![2.0, -1.5]));
        assert_eq!(report.status, LmStatus::Converged);
        assert_eq!(x, DVector::from_vec(vec![2.0, -1.5]));
        assert_eq!(report.final_error, 0.0);
    }

    #[test]
    fn criteria_defaults_and_validation() {
        let c = TermCriteria::default();
        assert_eq!((c.kind, c.max_count, c.epsilon), (TermKind::CountEps, 30, Real::EPSILON));
        assert_eq!(TermCriteria::eps(1e-6).max_iterations(), DEFAULT_MAX_ITERATIONS);
        assert_eq!(TermCriteria::count(5).tolerance(), Real::EPSILON);
        assert!(TermCriteria::count(0).validate().is_err());
        assert!(TermCriteria::new(TermKind::Eps, 0, 1e-6).validate().is_ok());

        let parsed: TermCriteria = serde_json::from_str(r#"{"max_count": 50}"#).unwrap();
        assert_eq!(parsed.max_count, 50);
        assert_eq!(parsed.kind, TermKind::CountEps);
    }
}
