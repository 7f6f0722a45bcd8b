//! Nonlinear conjugate gradient optimizer.
//!
//! Conjugate gradient methods build search directions that are conjugate
//! with respect to the local curvature, which makes them converge much
//! faster than steepest descent at the cost of only a few vectors of memory.
//!
//! # Algorithm Overview
//!
//! At each iteration the engine:
//! 1. Runs a Moré-Thuente line search along the current direction `d_k`
//! 2. Preconditions the new gradient, `p = H^{-1} g_{k+1}`
//! 3. Chooses `beta` with the configured formula
//! 4. Sets `d_{k+1} = -p + beta d_k`
//!
//! # Supported Formulas
//!
//! With `y_k = g_{k+1} - g_k`:
//!
//! - **Dai-Yuan (DY)**: β = <g_{k+1}, p> / <y_k, d_k>
//! - **Hybrid DY/HS** (default): β = max(0, min(β_DY, β_HS)) with
//!   β_HS = <p, y_k> / <y_k, d_k>
//!
//! Beta is reset to zero (a restart) every `3 + N` iterations and after
//! every line search that does not satisfy the Wolfe conditions. Ten
//! consecutive failed line searches stop the run with
//! [`TerminationReason::TooStringent`].
//!
//! # Reverse communication
//!
//! ```rust
//! use revopt_core::prelude::*;
//! use revopt_optim::ConjugateGradient;
//!
//! # fn main() -> revopt_core::Result<()> {
//! let mut cg = ConjugateGradient::new(2, &DVector::from_vec(vec![0.0, 0.0]))?;
//! cg.set_cond(0.0, 0.0, 1e-10, 0)?;
//! while cg.iterate() {
//!     if cg.request() == Some(Request::FunctionGradient) {
//!         let x = cg.x().clone();
//!         cg.f = (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2);
//!         cg.g[0] = 2.0 * (x[0] - 1.0);
//!         cg.g[1] = 2.0 * (x[1] - 2.0);
//!     }
//! }
//! let (x, report) = cg.results();
//! assert!(report.termination.unwrap().is_success());
//! assert!((x[0] - 1.0).abs() < 1e-6);
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Dai & Yuan, "A nonlinear conjugate gradient method with a strong global
//!   convergence property" (1999)
//! - Dai & Yuan, "An efficient hybrid conjugate gradient method for
//!   unconstrained optimization" (2001)

use crate::evaluation::GradientEvaluator;
use log::{debug, info, warn};
use revopt_core::{
    cost_function::CostFunction,
    error::{OptimizerError, Result},
    line_search::{LineSearchParams, LineSearchStatus, LineSearchStep, MoreThuente},
    optimizer::{Optimizer, Report, Request, StoppingCriterion, TerminationReason},
    preconditioner::Preconditioner,
    types::{check_tolerance, check_vector, normalize_scale, scaled_norm, DMatrix, DVector, Real},
};

/// Consecutive failed line searches tolerated before giving up.
const MAX_LINE_SEARCH_FAILURES: usize = 10;

/// Beta formula of the CG engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CgVariant {
    /// Dai-Yuan
    DaiYuan,
    /// Hybrid Dai-Yuan / Hestenes-Stiefel, clamped to be non-negative
    #[default]
    Hybrid,
}

/// Suspension points used by the BLEIC engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    /// Direction and base point are final; a step limit may be set.
    LineSearchStart,
    /// The line search finished; step and point are readable.
    LineSearchEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    InitialEvaluation,
    InitialReport,
    InitialChecks,
    PreLineSearch,
    LineSearchBegin,
    LineSearchEvaluation,
    PostLineSearch,
    Update,
    Checks,
    Done,
}

/// Reverse-communication nonlinear conjugate gradient engine.
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    n: usize,
    x: DVector,
    /// Function value at [`x`](Self::x), written by the caller
    pub f: Real,
    /// Gradient at [`x`](Self::x), written by the caller
    pub g: DVector,

    // configuration
    x0: DVector,
    criterion: StoppingCriterion,
    s: DVector,
    stpmax: Real,
    suggested_step: Real,
    xrep: bool,
    variant: CgVariant,
    preconditioner: Preconditioner,
    scale_preconditioner: bool,
    hooks: bool,

    // run state
    stage: Stage,
    request: Option<Request>,
    hook: Option<Hook>,
    report: Report,
    terminate_requested: bool,
    evaluator: GradientEvaluator,
    line_search: MoreThuente,
    xk: DVector,
    fk: Real,
    gk: DVector,
    d: DVector,
    stp: Real,
    step_limit: Real,
    ls_status: LineSearchStatus,
    ls_step: Real,
    since_restart: usize,
    failures: usize,
    fold: Real,
    step_norm: Real,
    last_wolfe: bool,
    moved: bool,
}

impl ConjugateGradient {
    /// Creates an engine for `n` variables with analytic gradient, starting at `x0`.
    ///
    /// Defaults: `eps_x = 1e-6`, unit scale, identity preconditioner, hybrid beta.
    pub fn new(n: usize, x0: &DVector) -> Result<Self> {
        Self::build(n, x0, None)
    }

    /// Creates an engine that differentiates numerically with step `diff_step`.
    ///
    /// Every gradient costs `1 + 4N` function evaluations.
    pub fn with_numerical_gradient(n: usize, x0: &DVector, diff_step: Real) -> Result<Self> {
        Self::build(n, x0, Some(diff_step))
    }

    fn build(n: usize, x0: &DVector, diff_step: Option<Real>) -> Result<Self> {
        if n == 0 {
            return Err(OptimizerError::invalid_argument("n", "must be positive"));
        }
        check_vector("x0", x0, n)?;
        let evaluator = match diff_step {
            Some(h) => GradientEvaluator::numeric(n, h)?,
            None => GradientEvaluator::analytic(n),
        };
        let x0 = x0.rows(0, n).into_owned();
        Ok(Self {
            n,
            x: x0.clone(),
            f: 0.0,
            g: DVector::zeros(n),
            x0: x0.clone(),
            criterion: StoppingCriterion::default(),
            s: DVector::from_element(n, 1.0),
            stpmax: 0.0,
            suggested_step: 0.0,
            xrep: false,
            variant: CgVariant::default(),
            preconditioner: Preconditioner::Identity,
            scale_preconditioner: false,
            hooks: false,
            stage: Stage::Idle,
            request: None,
            hook: None,
            report: Report::default(),
            terminate_requested: false,
            evaluator,
            line_search: MoreThuente::new(LineSearchParams::for_conjugate_gradient()),
            xk: x0,
            fk: 0.0,
            gk: DVector::zeros(n),
            d: DVector::zeros(n),
            stp: 0.0,
            step_limit: 0.0,
            ls_status: LineSearchStatus::InvalidInput,
            ls_step: 0.0,
            since_restart: 0,
            failures: 0,
            fold: 0.0,
            step_norm: 0.0,
            last_wolfe: false,
            moved: false,
        })
    }

    /// Problem dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Point at which the pending request must be evaluated.
    pub fn x(&self) -> &DVector {
        &self.x
    }

    /// Sets the stopping conditions.
    ///
    /// All zero selects `eps_x = 1e-6`; `max_its = 0` means unlimited.
    pub fn set_cond(&mut self, eps_g: Real, eps_f: Real, eps_x: Real, max_its: usize) -> Result<()> {
        self.criterion = StoppingCriterion::from_parts(eps_g, eps_f, eps_x, max_its)?;
        Ok(())
    }

    /// Current stopping conditions.
    pub fn criterion(&self) -> &StoppingCriterion {
        &self.criterion
    }

    /// Sets the per-variable scale; entries must be non-zero, signs are dropped.
    pub fn set_scale(&mut self, s: &DVector) -> Result<()> {
        self.s = normalize_scale(s, self.n)?;
        if self.scale_preconditioner {
            self.preconditioner = Preconditioner::scale(&self.s);
        }
        Ok(())
    }

    /// Enables `Request::Report` after every iteration.
    pub fn set_xrep(&mut self, xrep: bool) {
        self.xrep = xrep;
    }

    /// Selects the beta formula.
    pub fn set_cg_type(&mut self, variant: CgVariant) {
        self.variant = variant;
    }

    /// Limits the step length of every line search, `0` for no limit.
    pub fn set_step_max(&mut self, stpmax: Real) -> Result<()> {
        check_tolerance("stpmax", stpmax)?;
        self.stpmax = stpmax;
        Ok(())
    }

    /// Suggests the length of the first step, `0` restores the automatic choice.
    pub fn suggest_initial_step(&mut self, stp: Real) -> Result<()> {
        check_tolerance("stp", stp)?;
        self.suggested_step = stp;
        Ok(())
    }

    /// Removes preconditioning.
    pub fn set_precondition_default(&mut self) {
        self.scale_preconditioner = false;
        self.preconditioner = Preconditioner::Identity;
    }

    /// Uses `diag(d)` as Hessian approximation; entries must be positive.
    pub fn set_precondition_diag(&mut self, d: &DVector) -> Result<()> {
        self.preconditioner = Preconditioner::diagonal(d, self.n)?;
        self.scale_preconditioner = false;
        Ok(())
    }

    /// Replaces the variable part of the diagonal preconditioner.
    pub fn set_precondition_diag_var_part(&mut self, d2: &DVector) -> Result<()> {
        self.preconditioner.set_variable_part(d2)
    }

    /// Uses the scaling vector as diagonal preconditioner, `H^{-1} = diag(s^2)`.
    pub fn set_precondition_scale(&mut self) {
        self.scale_preconditioner = true;
        self.preconditioner = Preconditioner::scale(&self.s);
    }

    /// Uses `H = diag(d) + V'diag(c)V` applied through the Woodbury identity.
    pub fn set_precondition_low_rank(&mut self, d: &DVector, c: &DVector, v: &DMatrix) -> Result<()> {
        self.preconditioner = Preconditioner::low_rank(d, c, v, self.n)?;
        self.scale_preconditioner = false;
        Ok(())
    }

    /// Asks the engine to stop with code 8 at the next safe point.
    pub fn request_termination(&mut self) {
        self.terminate_requested = true;
    }

    /// Restarts from `x0` with the current configuration.
    pub fn restart(&mut self, x0: &DVector) -> Result<()> {
        check_vector("x0", x0, self.n)?;
        self.restart_from(&x0.rows(0, self.n).into_owned());
        Ok(())
    }

    pub(crate) fn restart_from(&mut self, x0: &DVector) {
        self.x0.copy_from(x0);
        self.x.copy_from(&self.x0);
        self.stage = Stage::Idle;
        self.request = None;
        self.hook = None;
        self.report = Report::default();
        self.terminate_requested = false;
        self.evaluator.reset();
    }

    /// Pending request, `None` once the run is over.
    pub fn request(&self) -> Option<Request> {
        self.request
    }

    /// Report of the current run.
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Best point found so far and the report.
    pub fn results(&self) -> (DVector, Report) {
        (self.xk.clone(), self.report.clone())
    }

    /// Copies the best point and the report into caller-owned buffers.
    pub fn results_buffered(&self, x: &mut DVector, report: &mut Report) -> Result<()> {
        if x.len() < self.n {
            return Err(OptimizerError::dimension_mismatch("x", self.n, x.len()));
        }
        x.rows_mut(0, self.n).copy_from(&self.xk);
        *report = self.report.clone();
        Ok(())
    }

    /// Runs to completion, answering requests with `problem`.
    pub fn optimize<C: CostFunction + ?Sized>(&mut self, problem: &C) -> Result<Report> {
        while self.iterate() {
            match self.request {
                Some(Request::Function) => self.f = problem.cost(&self.x)?,
                Some(Request::FunctionGradient) => {
                    self.f = problem.cost_and_gradient(&self.x, &mut self.g)?;
                }
                Some(Request::Report) => debug!("CG iteration {}: f = {:e}", self.report.iterations, self.f),
                Some(other) => {
                    return Err(OptimizerError::protocol(format!(
                        "unexpected {:?} request",
                        other
                    )))
                }
                None => {}
            }
        }
        Ok(self.report.clone())
    }

    /// Advances the engine. Returns `true` while a request (or hook) is pending.
    pub fn iterate(&mut self) -> bool {
        self.request = None;
        self.hook = None;
        loop {
            match self.stage {
                Stage::Idle => {
                    if self.report.termination.is_some() {
                        return false;
                    }
                    self.report = Report::default();
                    self.failures = 0;
                    self.since_restart = 0;
                    self.xk.copy_from(&self.x0);
                    self.stage = Stage::InitialEvaluation;
                    let point = self.x0.clone();
                    return self.begin_evaluation(&point);
                }
                Stage::InitialEvaluation => {
                    if self.continue_evaluation() {
                        return true;
                    }
                    self.xk.copy_from(&self.x);
                    self.fk = self.f;
                    self.gk.copy_from(&self.g);
                    self.stage = Stage::InitialReport;
                    if self.xrep {
                        self.request = Some(Request::Report);
                        return true;
                    }
                }
                Stage::InitialReport => {
                    self.stage = Stage::InitialChecks;
                }
                Stage::InitialChecks => {
                    if self.terminate_requested {
                        return self.terminate(TerminationReason::UserRequested);
                    }
                    if scaled_norm(&self.gk, &self.s) <= self.criterion.eps_g {
                        return self.terminate(TerminationReason::Converged);
                    }
                    self.d = -self.preconditioner.applied(&self.gk);
                    self.stp = self.initial_step();
                    self.stage = Stage::PreLineSearch;
                }
                Stage::PreLineSearch => {
                    self.step_limit = 0.0;
                    self.stage = Stage::LineSearchBegin;
                    if self.hooks {
                        self.hook = Some(Hook::LineSearchStart);
                        return true;
                    }
                }
                Stage::LineSearchBegin => {
                    if let Some(pending) = self.begin_line_search() {
                        return pending;
                    }
                }
                Stage::LineSearchEvaluation => {
                    if self.continue_evaluation() {
                        return true;
                    }
                    let dg = self.g.dot(&self.d);
                    match self.line_search.next(self.f, dg) {
                        LineSearchStep::Evaluate(stp) => {
                            let point = &self.xk + &self.d * stp;
                            return self.begin_evaluation(&point);
                        }
                        LineSearchStep::Finished(status, stp) => {
                            self.ls_status = status;
                            self.ls_step = stp;
                            self.stage = Stage::PostLineSearch;
                        }
                    }
                }
                Stage::PostLineSearch => {
                    self.stage = Stage::Update;
                    if self.hooks {
                        self.hook = Some(Hook::LineSearchEnd);
                        return true;
                    }
                }
                Stage::Update => {
                    self.update_direction();
                    self.stage = Stage::Checks;
                    if self.xrep {
                        self.request = Some(Request::Report);
                        return true;
                    }
                }
                Stage::Checks => {
                    if let Some(reason) = self.stopping_reason() {
                        return self.terminate(reason);
                    }
                    self.stage = Stage::PreLineSearch;
                }
                Stage::Done => return false,
            }
        }
    }

    fn begin_evaluation(&mut self, point: &DVector) -> bool {
        self.request = Some(self.evaluator.begin(point, &mut self.x));
        true
    }

    fn continue_evaluation(&mut self) -> bool {
        self.request = self
            .evaluator
            .resume(&mut self.x, &mut self.f, &mut self.g, &self.s, &mut self.report);
        self.request.is_some()
    }

    /// Starts the line search. Returns `Some(true)` when an evaluation is pending.
    fn begin_line_search(&mut self) -> Option<bool> {
        let dg0 = self.gk.dot(&self.d);
        let length_cap = self.length_cap();
        let cap = match (length_cap > 0.0, self.step_limit > 0.0) {
            (true, true) => length_cap.min(self.step_limit),
            (true, false) => length_cap,
            (false, true) => self.step_limit,
            (false, false) => 0.0,
        };
        if cap > 0.0 && self.stp > cap {
            self.stp = cap;
        }
        match self.line_search.start(self.fk, dg0, self.stp, cap) {
            Ok(stp) => {
                self.stage = Stage::LineSearchEvaluation;
                let point = &self.xk + &self.d * stp;
                Some(self.begin_evaluation(&point))
            }
            Err(status) => {
                warn!("CG line search rejected its input: {}", status);
                self.ls_status = status;
                self.ls_step = 0.0;
                self.x.copy_from(&self.xk);
                self.f = self.fk;
                self.g.copy_from(&self.gk);
                self.stage = Stage::PostLineSearch;
                None
            }
        }
    }

    /// Processes the line search outcome and computes the next direction.
    fn update_direction(&mut self) {
        self.report.iterations += 1;
        self.last_wolfe = self.ls_status.is_wolfe();
        self.moved = true;
        // A step truncated by the step limit still made sufficient decrease.
        if self.last_wolfe || self.ls_status == LineSearchStatus::AtMaximumStep {
            self.failures = 0;
        } else {
            self.failures += 1;
            debug!(
                "CG line search failed ({}), {} consecutive failures",
                self.ls_status, self.failures
            );
            if self.f > self.fk {
                self.x.copy_from(&self.xk);
                self.f = self.fk;
                self.g.copy_from(&self.gk);
                self.moved = false;
            }
        }

        let pg = self.preconditioner.applied(&self.g);
        self.since_restart += 1;
        let mut beta = 0.0;
        if self.last_wolfe && self.since_restart < 3 + self.n {
            let y = &self.g - &self.gk;
            let yd = y.dot(&self.d);
            if yd != 0.0 {
                let dai_yuan = self.g.dot(&pg) / yd;
                beta = match self.variant {
                    CgVariant::DaiYuan => dai_yuan,
                    CgVariant::Hybrid => {
                        let hestenes_stiefel = pg.dot(&y) / yd;
                        dai_yuan.min(hestenes_stiefel).max(0.0)
                    }
                };
            }
        } else {
            debug!("CG restart after {} iterations", self.since_restart);
            self.since_restart = 0;
        }

        let mut dn = &self.d * beta - &pg;
        if dn.dot(&self.g) >= 0.0 {
            dn = -pg;
        }

        self.fold = self.fk;
        let step = &self.x - &self.xk;
        self.step_norm = step
            .iter()
            .zip(self.s.iter())
            .map(|(v, s)| (v / s) * (v / s))
            .sum::<Real>()
            .sqrt();
        self.xk.copy_from(&self.x);
        self.fk = self.f;
        self.gk.copy_from(&self.g);
        self.d = dn;
        self.stp = if self.last_wolfe && self.ls_step > 0.0 {
            self.ls_step
        } else {
            self.initial_step()
        };
    }

    fn stopping_reason(&self) -> Option<TerminationReason> {
        if self.terminate_requested {
            return Some(TerminationReason::UserRequested);
        }
        if scaled_norm(&self.gk, &self.s) <= self.criterion.eps_g {
            return Some(TerminationReason::Converged);
        }
        if self.criterion.iterations_exhausted(self.report.iterations) {
            return Some(TerminationReason::MaxIterations);
        }
        if self.last_wolfe && self.criterion.function_converged(self.fold, self.fk) {
            return Some(TerminationReason::FunctionTolerance);
        }
        if self.moved && self.step_norm <= self.criterion.eps_x {
            return Some(TerminationReason::StepTolerance);
        }
        if self.failures >= MAX_LINE_SEARCH_FAILURES {
            return Some(TerminationReason::TooStringent);
        }
        None
    }

    fn initial_step(&self) -> Real {
        let stp = if self.suggested_step > 0.0 {
            self.suggested_step
        } else if !self.preconditioner.is_identity() {
            1.0
        } else {
            let norm = self.d.norm();
            if norm > 0.0 {
                1.0 / norm
            } else {
                1.0
            }
        };
        let cap = self.length_cap();
        if cap > 0.0 {
            stp.min(cap)
        } else {
            stp
        }
    }

    /// Bound on the line search parameter that keeps `|stp d| <= stpmax`, `0` when unbounded.
    fn length_cap(&self) -> Real {
        let norm = self.d.norm();
        if self.stpmax > 0.0 && norm > 0.0 {
            self.stpmax / norm
        } else {
            0.0
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> bool {
        info!("CG terminated after {} iterations: {}", self.report.iterations, reason);
        self.report.termination = Some(reason);
        self.x.copy_from(&self.xk);
        self.f = self.fk;
        self.stage = Stage::Done;
        self.request = None;
        false
    }

    // Crate-internal access used by the BLEIC engine.

    pub(crate) fn enable_hooks(&mut self) {
        self.hooks = true;
    }

    pub(crate) fn hook(&self) -> Option<Hook> {
        self.hook
    }

    pub(crate) fn direction(&self) -> &DVector {
        &self.d
    }

    pub(crate) fn base_point(&self) -> &DVector {
        &self.xk
    }

    pub(crate) fn set_step_limit(&mut self, limit: Real) {
        self.step_limit = limit;
    }

    pub(crate) fn last_step(&self) -> Real {
        self.ls_step
    }

    pub(crate) fn base_value(&self) -> Real {
        self.fk
    }

    pub(crate) fn set_max_iterations(&mut self, max_iterations: usize) {
        self.criterion.max_iterations = max_iterations;
    }

    /// Installs already validated settings.
    pub(crate) fn configure(&mut self, criterion: StoppingCriterion, s: DVector, stpmax: Real) {
        self.criterion = criterion;
        self.s = s;
        self.stpmax = stpmax;
    }
}

impl Optimizer for ConjugateGradient {
    fn name(&self) -> &str {
        match self.variant {
            CgVariant::DaiYuan => "CG-DY",
            CgVariant::Hybrid => "CG-DY/HS",
        }
    }

    fn iterate(&mut self) -> bool {
        ConjugateGradient::iterate(self)
    }

    fn request(&self) -> Option<Request> {
        self.request
    }

    fn report(&self) -> &Report {
        &self.report
    }
}
