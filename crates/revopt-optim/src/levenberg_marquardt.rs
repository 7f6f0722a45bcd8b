//! Levenberg-Marquardt optimizer with box constraints.
//!
//! Minimizes either a sum of squares `F(x) = sum_i f_i(x)^2` or a general
//! objective with an analytic Hessian. Each iteration minimizes the damped
//! quadratic model
//!
//! ```text
//! min  0.5 dx' (Q + λ diag(1/s^2)) dx + g' dx
//! s.t. l - x_k <= dx <= u - x_k
//! ```
//!
//! with the [`QuadraticProgram`] solver, so bounds are handled exactly
//! instead of by clipping a normal-equations step.
//!
//! # Problem modes
//!
//! | constructor | requests | model |
//! |---|---|---|
//! | [`with_jacobian`](LevenbergMarquardt::with_jacobian) | `Vector`, `VectorJacobian` | `Q = 2J'J`, `g = 2J'f` |
//! | [`with_residuals`](LevenbergMarquardt::with_residuals) | `Vector` | same, `J` by finite differences |
//! | [`with_hessian`](LevenbergMarquardt::with_hessian) | `Function`, `FunctionGradientHessian` | `Q = H`, `g = ∇F` |
//!
//! With acceleration type 1 the Jacobian is refreshed only every few
//! iterations and evolved by Broyden rank-one updates in between. Stopping
//! tests on the step, the gradient and the function change are only trusted
//! on a freshly computed model; on a stale one they trigger a refresh.
//!
//! # Damping
//!
//! The damping `λ` starts at `0.001 max_i |Q_ii| s_i^2`. Rejected or poorly
//! predicted steps multiply it by `2ν` and double `ν`; well predicted steps
//! (ratio above 0.5) shrink it by a factor 0.33 and reset `ν`.

use crate::quadratic_programming::{ActiveBound, QuadraticProgram};
use log::{debug, info, warn};
use revopt_core::{
    cost_function::{CostFunction, LeastSquaresProblem},
    error::{OptimizerError, Result},
    numerical_diff::NumericalJacobian,
    optimizer::{Optimizer, Report, Request, StoppingCriterion, TerminationReason},
    types::{check_bounds, check_tolerance, check_vector, constants, normalize_scale, scaled_norm, DMatrix, DVector, Real},
};

const LAMBDA_UP: Real = 2.0;
const LAMBDA_DOWN: Real = 0.33;
const RATIO_LOW: Real = 0.1;
const RATIO_HIGH: Real = 0.5;

/// Model age allowed between Jacobian refreshes in analytic Jacobian mode.
const SECANT_AGE_ANALYTIC: usize = 3;

/// Kind of information the caller provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProblemKind {
    /// Residual vector, Jacobian by finite differences
    Residuals,
    /// Residual vector and analytic Jacobian
    ResidualsJacobian,
    /// Scalar function with gradient and Hessian
    Hessian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    RefreshBase,
    RefreshSample,
    Model,
    Solve,
    Trial,
    Report,
    Checks,
    Done,
}

/// Reverse-communication Levenberg-Marquardt engine.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    n: usize,
    m: usize,
    kind: ProblemKind,
    x: DVector,
    /// Function value, written by the caller in [`ProblemKind::Hessian`] mode
    pub f: Real,
    /// Residual vector, written by the caller in residual modes
    pub fi: DVector,
    /// Jacobian (`m x n`), written on `Request::VectorJacobian`
    pub j: DMatrix,
    /// Gradient, written on `Request::FunctionGradientHessian`
    pub g: DVector,
    /// Hessian, written on `Request::FunctionGradientHessian`
    pub h: DMatrix,

    // configuration
    x0: DVector,
    criterion: StoppingCriterion,
    s: DVector,
    stpmax: Real,
    lower: DVector,
    upper: DVector,
    max_age: usize,
    xrep: bool,

    // run state
    stage: Stage,
    request: Option<Request>,
    report: Report,
    qp: QuadraticProgram,
    finite_differences: Option<NumericalJacobian>,
    xb: DVector,
    fbase: Real,
    fibase: DVector,
    jac: DMatrix,
    gbase: DVector,
    quad: DMatrix,
    age: usize,
    lambda: Option<Real>,
    nu: Real,
    dx: DVector,
    xt: DVector,
    fold: Real,
    step_fresh: bool,
}

impl LevenbergMarquardt {
    /// Sum of squares with analytic Jacobian (`m` residuals).
    pub fn with_jacobian(n: usize, m: usize, x0: &DVector) -> Result<Self> {
        Self::build(n, m, x0, ProblemKind::ResidualsJacobian, None)
    }

    /// Sum of squares with a finite-difference Jacobian of step `diff_step`.
    pub fn with_residuals(n: usize, m: usize, x0: &DVector, diff_step: Real) -> Result<Self> {
        Self::build(n, m, x0, ProblemKind::Residuals, Some(diff_step))
    }

    /// General objective with analytic gradient and Hessian.
    pub fn with_hessian(n: usize, x0: &DVector) -> Result<Self> {
        Self::build(n, 0, x0, ProblemKind::Hessian, None)
    }

    fn build(
        n: usize,
        m: usize,
        x0: &DVector,
        kind: ProblemKind,
        diff_step: Option<Real>,
    ) -> Result<Self> {
        if n == 0 {
            return Err(OptimizerError::invalid_argument("n", "must be positive"));
        }
        if kind != ProblemKind::Hessian && m == 0 {
            return Err(OptimizerError::invalid_argument("m", "must be positive"));
        }
        check_vector("x0", x0, n)?;
        let finite_differences = match diff_step {
            Some(h) => Some(NumericalJacobian::new(h)?),
            None => None,
        };
        let x0 = x0.rows(0, n).into_owned();
        Ok(Self {
            n,
            m,
            kind,
            x: x0.clone(),
            f: 0.0,
            fi: DVector::zeros(m),
            j: DMatrix::zeros(m, n),
            g: DVector::zeros(n),
            h: DMatrix::zeros(n, n),
            x0: x0.clone(),
            criterion: StoppingCriterion::default(),
            s: DVector::from_element(n, 1.0),
            stpmax: 0.0,
            lower: DVector::from_element(n, Real::NEG_INFINITY),
            upper: DVector::from_element(n, Real::INFINITY),
            max_age: 0,
            xrep: false,
            stage: Stage::Idle,
            request: None,
            report: Report::default(),
            qp: QuadraticProgram::new(n)?,
            finite_differences,
            xb: x0.clone(),
            fbase: 0.0,
            fibase: DVector::zeros(m),
            jac: DMatrix::zeros(m, n),
            gbase: DVector::zeros(n),
            quad: DMatrix::zeros(n, n),
            age: 0,
            lambda: None,
            nu: 1.0,
            dx: DVector::zeros(n),
            xt: x0,
            fold: 0.0,
            step_fresh: true,
        })
    }

    /// Problem dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Number of residuals, `0` in Hessian mode.
    pub fn residual_count(&self) -> usize {
        self.m
    }

    /// What the caller provides.
    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    /// Point at which the pending request must be evaluated.
    pub fn x(&self) -> &DVector {
        &self.x
    }

    /// Sets the stopping conditions; all zero selects `eps_x = 1e-6`.
    pub fn set_cond(&mut self, eps_g: Real, eps_f: Real, eps_x: Real, max_its: usize) -> Result<()> {
        self.criterion = StoppingCriterion::from_parts(eps_g, eps_f, eps_x, max_its)?;
        Ok(())
    }

    /// Current stopping conditions.
    pub fn criterion(&self) -> &StoppingCriterion {
        &self.criterion
    }

    /// Sets the per-variable scale.
    pub fn set_scale(&mut self, s: &DVector) -> Result<()> {
        self.s = normalize_scale(s, self.n)?;
        Ok(())
    }

    /// Limits the length of every step, `0` for no limit.
    pub fn set_stp_max(&mut self, stpmax: Real) -> Result<()> {
        check_tolerance("stpmax", stpmax)?;
        self.stpmax = stpmax;
        Ok(())
    }

    /// Sets box constraints; infinite entries mean "unbounded".
    pub fn set_bc(&mut self, lower: &DVector, upper: &DVector) -> Result<()> {
        check_bounds("bndl", lower, self.n)?;
        check_bounds("bndu", upper, self.n)?;
        if lower.rows(0, self.n).iter().any(|v| *v == Real::INFINITY) {
            return Err(OptimizerError::invalid_argument("bndl", "lower bound is +INF"));
        }
        if upper.rows(0, self.n).iter().any(|v| *v == Real::NEG_INFINITY) {
            return Err(OptimizerError::invalid_argument("bndu", "upper bound is -INF"));
        }
        self.lower.copy_from(&lower.rows(0, self.n));
        self.upper.copy_from(&upper.rows(0, self.n));
        Ok(())
    }

    /// Jacobian update policy.
    ///
    /// `0` recomputes the model every iteration, `1` uses Broyden updates
    /// between periodic refreshes (residual modes only). `2` is accepted as `0`.
    pub fn set_acc_type(&mut self, acc_type: i32) -> Result<()> {
        match acc_type {
            0 | 2 => {
                if acc_type == 2 {
                    debug!("LM acceleration type 2 treated as 0");
                }
                self.max_age = 0;
            }
            1 => {
                self.max_age = match self.kind {
                    ProblemKind::Hessian => {
                        return Err(OptimizerError::incompatible(
                            "secant updates need a residual vector, not a Hessian",
                        ))
                    }
                    ProblemKind::Residuals => 2 * self.n,
                    ProblemKind::ResidualsJacobian => SECANT_AGE_ANALYTIC,
                };
            }
            other => {
                return Err(OptimizerError::invalid_argument(
                    "acc_type",
                    format!("unknown acceleration type {}", other),
                ))
            }
        }
        Ok(())
    }

    /// Enables `Request::Report` after every accepted step.
    pub fn set_xrep(&mut self, xrep: bool) {
        self.xrep = xrep;
    }

    /// Restarts from `x0` with the current configuration.
    pub fn restart(&mut self, x0: &DVector) -> Result<()> {
        check_vector("x0", x0, self.n)?;
        self.x0.copy_from(&x0.rows(0, self.n));
        self.x.copy_from(&self.x0);
        self.stage = Stage::Idle;
        self.request = None;
        self.report = Report::default();
        Ok(())
    }

    /// Pending request, `None` once the run is over.
    pub fn request(&self) -> Option<Request> {
        self.request
    }

    /// Report of the current run.
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Current damping parameter, `None` before the first model.
    pub fn damping(&self) -> Option<Real> {
        self.lambda
    }

    /// Best point found so far and the report.
    pub fn results(&self) -> (DVector, Report) {
        (self.xb.clone(), self.report.clone())
    }

    /// Copies the best point and the report into caller-owned buffers.
    pub fn results_buffered(&self, x: &mut DVector, report: &mut Report) -> Result<()> {
        if x.len() < self.n {
            return Err(OptimizerError::dimension_mismatch("x", self.n, x.len()));
        }
        x.rows_mut(0, self.n).copy_from(&self.xb);
        *report = self.report.clone();
        Ok(())
    }

    /// Runs a residual-mode engine to completion.
    pub fn optimize_least_squares<P: LeastSquaresProblem + ?Sized>(
        &mut self,
        problem: &P,
    ) -> Result<Report> {
        while self.iterate() {
            match self.request {
                Some(Request::Vector) => problem.residuals(&self.x, &mut self.fi)?,
                Some(Request::VectorJacobian) => {
                    problem.residuals_and_jacobian(&self.x, &mut self.fi, &mut self.j)?
                }
                Some(Request::Report) => {
                    debug!("LM iteration {}: f = {:e}", self.report.iterations, self.fbase)
                }
                Some(other) => {
                    return Err(OptimizerError::protocol(format!(
                        "{:?} cannot be answered by a least-squares problem",
                        other
                    )))
                }
                None => {}
            }
        }
        Ok(self.report.clone())
    }

    /// Runs a Hessian-mode engine to completion.
    pub fn optimize<C: CostFunction + ?Sized>(&mut self, problem: &C) -> Result<Report> {
        while self.iterate() {
            match self.request {
                Some(Request::Function) => self.f = problem.cost(&self.x)?,
                Some(Request::FunctionGradientHessian) => {
                    self.f = problem.cost_gradient_hessian(&self.x, &mut self.g, &mut self.h)?;
                }
                Some(Request::Report) => {
                    debug!("LM iteration {}: f = {:e}", self.report.iterations, self.fbase)
                }
                Some(other) => {
                    return Err(OptimizerError::protocol(format!(
                        "{:?} cannot be answered by a scalar cost function",
                        other
                    )))
                }
                None => {}
            }
        }
        Ok(self.report.clone())
    }

    /// Advances the engine. Returns `true` while a request is pending.
    pub fn iterate(&mut self) -> bool {
        self.request = None;
        loop {
            match self.stage {
                Stage::Idle => {
                    if self.report.termination.is_some() {
                        return false;
                    }
                    self.report = Report::default();
                    if (0..self.n).any(|i| self.lower[i] > self.upper[i]) {
                        return self.terminate(TerminationReason::InconsistentConstraints);
                    }
                    self.xb = self.x0.clone();
                    clamp_to_box(&mut self.xb, &self.lower, &self.upper);
                    self.lambda = None;
                    self.nu = 1.0;
                    return self.begin_refresh();
                }
                Stage::RefreshBase => match self.kind {
                    ProblemKind::ResidualsJacobian => {
                        self.report.function_evaluations += 1;
                        self.report.jacobian_evaluations += 1;
                        self.fibase.copy_from(&self.fi);
                        self.jac.copy_from(&self.j);
                        self.build_least_squares_model();
                        self.age = 0;
                        self.stage = Stage::Model;
                    }
                    ProblemKind::Residuals => {
                        self.report.function_evaluations += 1;
                        self.fibase.copy_from(&self.fi);
                        if let Some(fd) = self.finite_differences.as_mut() {
                            fd.start(&self.xb, &self.s, self.m, &self.lower, &self.upper);
                        }
                        self.stage = Stage::RefreshSample;
                        if self.next_sample() {
                            return true;
                        }
                    }
                    ProblemKind::Hessian => {
                        self.report.function_evaluations += 1;
                        self.report.gradient_evaluations += 1;
                        self.report.hessian_evaluations += 1;
                        self.fbase = self.f;
                        self.gbase.copy_from(&self.g);
                        self.quad.copy_from(&self.h);
                        self.age = 0;
                        self.stage = Stage::Model;
                    }
                },
                Stage::RefreshSample => {
                    if self.request_pending_sample() {
                        return true;
                    }
                }
                Stage::Model => {
                    if let Err(err) = self.qp.set_quadratic_term(&self.quad, true) {
                        return self.abort(err);
                    }
                    if self.lambda.is_none() {
                        let seed = (0..self.n)
                            .map(|i| self.quad[(i, i)].abs() * self.s[i] * self.s[i])
                            .fold(0.0, Real::max)
                            * 0.001;
                        self.lambda = Some(if seed > 0.0 { seed } else { 1.0 });
                        self.nu = 1.0;
                    }
                    if self.bounded_gradient_norm() <= self.criterion.eps_g {
                        if self.age == 0 {
                            return self.terminate(TerminationReason::Converged);
                        }
                        return self.begin_refresh();
                    }
                    self.stage = Stage::Solve;
                }
                Stage::Solve => match self.solve_subproblem() {
                    Ok(None) => {}
                    Ok(Some(pending)) => return pending,
                    Err(err) => return self.abort(err),
                },
                Stage::Trial => {
                    self.report.function_evaluations += 1;
                    let ft = match self.kind {
                        ProblemKind::Hessian => self.f,
                        _ => self.fi.norm_squared(),
                    };
                    if !(ft < self.fbase) {
                        if self.age > 0 {
                            debug!("LM step rejected on a stale model, refreshing");
                            return self.begin_refresh();
                        }
                        if !self.increase_lambda() {
                            return self.terminate(TerminationReason::DampingOverflow);
                        }
                        self.stage = Stage::Solve;
                        continue;
                    }
                    if let Some(reason) = self.accept_step(ft) {
                        return self.terminate(reason);
                    }
                    self.stage = Stage::Report;
                    if self.xrep {
                        self.x.copy_from(&self.xb);
                        self.f = self.fbase;
                        self.request = Some(Request::Report);
                        return true;
                    }
                }
                Stage::Report => {
                    self.stage = Stage::Checks;
                }
                Stage::Checks => {
                    if self.criterion.iterations_exhausted(self.report.iterations) {
                        return self.terminate(TerminationReason::MaxIterations);
                    }
                    if self.criterion.function_converged(self.fold, self.fbase) {
                        if self.step_fresh {
                            return self.terminate(TerminationReason::FunctionTolerance);
                        }
                        return self.begin_refresh();
                    }
                    if self.age > self.max_age || self.kind == ProblemKind::Hessian {
                        return self.begin_refresh();
                    }
                    self.secant_update();
                    self.stage = Stage::Model;
                }
                Stage::Done => return false,
            }
        }
    }

    /// Requests a fresh model at the base point.
    fn begin_refresh(&mut self) -> bool {
        self.x.copy_from(&self.xb);
        self.stage = Stage::RefreshBase;
        self.request = Some(match self.kind {
            ProblemKind::Residuals => Request::Vector,
            ProblemKind::ResidualsJacobian => Request::VectorJacobian,
            ProblemKind::Hessian => Request::FunctionGradientHessian,
        });
        true
    }

    /// Records the answer to the pending sample and moves to the next one.
    fn request_pending_sample(&mut self) -> bool {
        self.report.function_evaluations += 1;
        if let Some(fd) = self.finite_differences.as_mut() {
            fd.record(&self.fi);
        }
        self.next_sample()
    }

    /// Issues the next sample; assembles the model once all samples are done.
    fn next_sample(&mut self) -> bool {
        let sample = self.finite_differences.as_ref().and_then(|fd| fd.next_sample());
        match sample {
            Some((i, value)) => {
                self.x.copy_from(&self.xb);
                self.x[i] = value;
                self.request = Some(Request::Vector);
                true
            }
            None => {
                if let Some(fd) = self.finite_differences.as_ref() {
                    self.jac.copy_from(fd.jacobian());
                }
                self.report.jacobian_evaluations += 1;
                self.x.copy_from(&self.xb);
                self.build_least_squares_model();
                self.age = 0;
                self.stage = Stage::Model;
                false
            }
        }
    }

    fn build_least_squares_model(&mut self) {
        self.fbase = self.fibase.norm_squared();
        self.gbase = self.jac.tr_mul(&self.fibase) * 2.0;
        self.quad = self.jac.tr_mul(&self.jac) * 2.0;
    }

    /// Broyden update of the Jacobian from the last accepted step.
    fn secant_update(&mut self) {
        let dxx = self.dx.norm_squared();
        if dxx > 0.0 {
            // fibase still holds the residuals of the previous base point
            let residual = &self.fi - &self.fibase - &self.jac * &self.dx;
            self.jac.ger(1.0 / dxx, &residual, &self.dx, 1.0);
        }
        self.fibase.copy_from(&self.fi);
        self.build_least_squares_model();
        debug!("LM secant update, model age {}", self.age);
    }

    /// Scaled norm of the anti-gradient with components that would leave
    /// the box removed.
    fn bounded_gradient_norm(&self) -> Real {
        let mut v = -self.gbase.clone();
        for i in 0..self.n {
            if (self.xb[i] <= self.lower[i] && v[i] < 0.0) || (self.xb[i] >= self.upper[i] && v[i] > 0.0) {
                v[i] = 0.0;
            }
        }
        scaled_norm(&v, &self.s)
    }

    fn increase_lambda(&mut self) -> bool {
        let lambda = self.lambda.unwrap_or(1.0);
        if lambda.ln() + LAMBDA_UP.ln() + self.nu.ln() > constants::MAX_REAL.ln() {
            return false;
        }
        let increased = lambda * LAMBDA_UP * self.nu;
        self.lambda = Some(increased);
        self.nu *= 2.0;
        debug!("LM damping increased to {:e}", increased);
        true
    }

    fn decrease_lambda(&mut self) {
        let lambda = self.lambda.unwrap_or(1.0);
        self.lambda = Some((lambda * LAMBDA_DOWN).max(constants::MIN_REAL));
        self.nu = 1.0;
    }

    /// Solves damped sub-problems until a trial point is ready.
    ///
    /// Returns `Some(pending)` when `iterate` must return, `None` to continue.
    fn solve_subproblem(&mut self) -> Result<Option<bool>> {
        let lambda = self.lambda.unwrap_or(1.0);
        let damped = DVector::from_fn(self.n, |i, _| {
            self.quad[(i, i)] + lambda / (self.s[i] * self.s[i])
        });
        self.qp.rewrite_diagonal(&damped)?;
        self.qp.set_linear_term(&self.gbase)?;
        self.qp.set_bc(&(&self.lower - &self.xb), &(&self.upper - &self.xb))?;
        self.qp.set_starting_point(&DVector::zeros(self.n))?;
        let qp_report = self.qp.optimize();
        self.report.cholesky_decompositions += qp_report.cholesky_decompositions;

        match qp_report.termination {
            Some(TerminationReason::InconsistentConstraints) => {
                return Ok(Some(self.terminate(TerminationReason::InconsistentConstraints)));
            }
            Some(TerminationReason::IndefiniteQuadratic) => {
                if !self.increase_lambda() {
                    return Ok(Some(self.terminate(TerminationReason::DampingOverflow)));
                }
                return Ok(None);
            }
            _ => {}
        }

        self.dx.copy_from(self.qp.solution());
        if self.stpmax > 0.0 && self.dx.norm() > self.stpmax {
            if !self.increase_lambda() {
                return Ok(Some(self.terminate(TerminationReason::DampingOverflow)));
            }
            return Ok(None);
        }

        let step_norm = self
            .dx
            .iter()
            .zip(self.s.iter())
            .map(|(v, s)| (v / s) * (v / s))
            .sum::<Real>()
            .sqrt();
        if step_norm <= self.criterion.eps_x {
            if self.age == 0 {
                return Ok(Some(self.terminate(TerminationReason::StepTolerance)));
            }
            return Ok(Some(self.begin_refresh()));
        }

        self.xt = &self.xb + &self.dx;
        clamp_to_box(&mut self.xt, &self.lower, &self.upper);
        for (i, bound) in self.qp.active_constraints().iter().enumerate() {
            match bound {
                ActiveBound::Lower | ActiveBound::Fixed => self.xt[i] = self.lower[i],
                ActiveBound::Upper => self.xt[i] = self.upper[i],
                ActiveBound::Free => {}
            }
        }
        self.x.copy_from(&self.xt);
        self.stage = Stage::Trial;
        self.request = Some(match self.kind {
            ProblemKind::Hessian => Request::Function,
            _ => Request::Vector,
        });
        Ok(Some(true))
    }

    /// Updates the damping from the prediction ratio and advances the base
    /// point. Returns a termination reason if the damping overflowed.
    fn accept_step(&mut self, ft: Real) -> Option<TerminationReason> {
        let dx = &self.xt - &self.xb;
        let predicted = -(self.gbase.dot(&dx) + 0.5 * dx.dot(&(&self.quad * &dx)));
        let actual = self.fbase - ft;
        let ratio = if predicted > 0.0 { actual / predicted } else { 0.0 };
        if ratio < RATIO_LOW {
            if !self.increase_lambda() {
                return Some(TerminationReason::TooStringent);
            }
        } else if ratio > RATIO_HIGH {
            self.decrease_lambda();
        }

        self.report.iterations += 1;
        self.step_fresh = self.age == 0;
        self.fold = self.fbase;
        self.dx = dx;
        self.xb.copy_from(&self.xt);
        self.fbase = ft;
        if self.kind == ProblemKind::Hessian {
            self.f = ft;
        }
        self.age += 1;
        None
    }

    /// Stops the run on a configuration error raised mid-run.
    fn abort(&mut self, err: OptimizerError) -> bool {
        warn!("LM stopped on non-finite model data: {}", err);
        self.terminate(TerminationReason::RoundingErrors)
    }

    fn terminate(&mut self, reason: TerminationReason) -> bool {
        info!("LM terminated after {} iterations: {}", self.report.iterations, reason);
        self.report.termination = Some(reason);
        self.x.copy_from(&self.xb);
        self.stage = Stage::Done;
        self.request = None;
        false
    }
}

fn clamp_to_box(v: &mut DVector, lower: &DVector, upper: &DVector) {
    for i in 0..v.len() {
        v[i] = v[i].max(lower[i]).min(upper[i]);
    }
}

impl Optimizer for LevenbergMarquardt {
    fn name(&self) -> &str {
        "Levenberg-Marquardt"
    }

    fn iterate(&mut self) -> bool {
        LevenbergMarquardt::iterate(self)
    }

    fn request(&self) -> Option<Request> {
        self.request
    }

    fn report(&self) -> &Report {
        &self.report
    }
}
