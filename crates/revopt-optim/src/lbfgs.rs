//! Limited-memory BFGS optimizer.
//!
//! L-BFGS approximates the inverse Hessian using the `m` most recent
//! correction pairs `(s_i, y_i)`, where `s_i = x_{i+1} - x_i` and
//! `y_i = g_{i+1} - g_i`. The pairs live in a circular buffer indexed by
//! `iteration mod m`.
//!
//! ## Two-Loop Recursion Algorithm
//!
//! ```text
//! q = g_k
//! for i = k-1, k-2, ..., k-m:
//!     α_i = ρ_i * <s_i, q>
//!     q = q - α_i * y_i
//!
//! r = H_0 * q  // γ_k q, or the preconditioner
//!
//! for i = k-m, k-m+1, ..., k-1:
//!     β = ρ_i * <y_i, r>
//!     r = r + (α_i - β) * s_i
//!
//! return -r  // Search direction
//! ```
//!
//! with `ρ_i = 1 / <y_i, s_i>` and `γ_k = <s, y> / <y, y>` from the newest pair.
//! A Moré-Thuente search with the curvature constant `0.9` picks the step.
//!
//! # Termination
//!
//! Besides the usual 1/2/4/5/8 codes, a correction pair with `<y, s> == 0`
//! or `<y, y> == 0` stops the run with [`TerminationReason::RoundingErrors`]:
//! the engine cannot make further progress at working precision.
//!
//! # References
//!
//! - Nocedal & Wright, "Numerical Optimization" (2006)
//! - Liu & Nocedal, "On the limited memory BFGS method for large scale
//!   optimization" (1989)

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

/// Correction pairs of the limited-memory approximation.
#[derive(Debug, Clone)]
struct CorrectionHistory {
    s: Vec<DVector>,
    y: Vec<DVector>,
    rho: Vec<Real>,
    /// Pairs accepted since the last reset
    count: usize,
    gamma: Real,
}

impl CorrectionHistory {
    fn new(n: usize, m: usize) -> Self {
        Self {
            s: vec![DVector::zeros(n); m],
            y: vec![DVector::zeros(n); m],
            rho: vec![0.0; m],
            count: 0,
            gamma: 1.0,
        }
    }

    fn capacity(&self) -> usize {
        self.rho.len()
    }

    fn stored(&self) -> usize {
        self.count.min(self.capacity())
    }

    fn clear(&mut self) {
        self.count = 0;
        self.gamma = 1.0;
    }

    fn push(&mut self, s: &DVector, y: &DVector, ys: Real, yy: Real) {
        let slot = self.count % self.capacity();
        self.s[slot].copy_from(s);
        self.y[slot].copy_from(y);
        self.rho[slot] = 1.0 / ys;
        self.gamma = ys / yy;
        self.count += 1;
    }

    /// Two-loop recursion, returns `-H_k g`.
    fn direction(&self, g: &DVector, preconditioner: &Preconditioner) -> DVector {
        let m = self.capacity();
        let stored = self.stored();
        let mut alpha = vec![0.0; stored];
        let mut q = g.clone();

        for j in 0..stored {
            let i = (self.count - 1 - j) % m;
            alpha[j] = self.rho[i] * self.s[i].dot(&q);
            q.axpy(-alpha[j], &self.y[i], 1.0);
        }

        let mut r = if preconditioner.is_identity() {
            q * self.gamma
        } else {
            preconditioner.applied(&q)
        };

        for j in (0..stored).rev() {
            let i = (self.count - 1 - j) % m;
            let beta = self.rho[i] * self.y[i].dot(&r);
            r.axpy(alpha[j] - beta, &self.s[i], 1.0);
        }
        -r
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    InitialEvaluation,
    InitialReport,
    InitialChecks,
    LineSearchBegin,
    LineSearchEvaluation,
    Update,
    Checks,
    Done,
}

/// Reverse-communication L-BFGS engine.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    n: usize,
    x: DVector,
    /// Function value at [`x`](Self::x), written by the caller
    pub f: Real,
    /// Gradient at [`x`](Self::x), written by the caller
    pub g: DVector,

    x0: DVector,
    criterion: StoppingCriterion,
    s: DVector,
    stpmax: Real,
    xrep: bool,
    preconditioner: Preconditioner,
    scale_preconditioner: bool,

    stage: Stage,
    request: Option<Request>,
    report: Report,
    terminate_requested: bool,
    evaluator: GradientEvaluator,
    line_search: MoreThuente,
    history: CorrectionHistory,
    xk: DVector,
    fk: Real,
    gk: DVector,
    d: DVector,
    stp: Real,
    ls_status: LineSearchStatus,
    fold: Real,
    step: DVector,
}

impl Lbfgs {
    /// Creates an engine for `n` variables keeping `m` correction pairs, `1 <= m <= n`.
    pub fn new(n: usize, m: usize, x0: &DVector) -> Result<Self> {
        Self::build(n, m, x0, None)
    }

    /// Creates an engine that differentiates numerically with step `diff_step`.
    pub fn with_numerical_gradient(n: usize, m: usize, x0: &DVector, diff_step: Real) -> Result<Self> {
        Self::build(n, m, x0, Some(diff_step))
    }

    fn build(n: usize, m: usize, x0: &DVector, diff_step: Option<Real>) -> Result<Self> {
        if n == 0 {
            return Err(OptimizerError::invalid_argument("n", "must be positive"));
        }
        if m == 0 || m > n {
            return Err(OptimizerError::invalid_argument(
                "m",
                format!("memory depth must lie in [1, {}], got {}", n, m),
            ));
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
            xrep: false,
            preconditioner: Preconditioner::Identity,
            scale_preconditioner: false,
            stage: Stage::Idle,
            request: None,
            report: Report::default(),
            terminate_requested: false,
            evaluator,
            line_search: MoreThuente::new(LineSearchParams::for_lbfgs()),
            history: CorrectionHistory::new(n, m),
            xk: x0,
            fk: 0.0,
            gk: DVector::zeros(n),
            d: DVector::zeros(n),
            stp: 0.0,
            ls_status: LineSearchStatus::InvalidInput,
            fold: 0.0,
            step: DVector::zeros(n),
        })
    }

    /// Problem dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Memory depth.
    pub fn memory(&self) -> usize {
        self.history.capacity()
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
        if self.scale_preconditioner {
            self.preconditioner = Preconditioner::scale(&self.s);
        }
        Ok(())
    }

    /// Enables `Request::Report` after every iteration.
    pub fn set_xrep(&mut self, xrep: bool) {
        self.xrep = xrep;
    }

    /// Limits the step length of every line search, `0` for no limit.
    pub fn set_step_max(&mut self, stpmax: Real) -> Result<()> {
        check_tolerance("stpmax", stpmax)?;
        self.stpmax = stpmax;
        Ok(())
    }

    /// Restores the default scaling of the recursion.
    pub fn set_precondition_default(&mut self) {
        self.scale_preconditioner = false;
        self.preconditioner = Preconditioner::Identity;
    }

    /// Uses a dense approximate Hessian given by its Cholesky factor.
    pub fn set_precondition_cholesky(&mut self, p: &DMatrix, is_upper: bool) -> Result<()> {
        self.preconditioner = Preconditioner::cholesky(p, self.n, is_upper)?;
        self.scale_preconditioner = false;
        Ok(())
    }

    /// Uses `diag(d)` as the initial Hessian approximation.
    pub fn set_precondition_diag(&mut self, d: &DVector) -> Result<()> {
        self.preconditioner = Preconditioner::diagonal(d, self.n)?;
        self.scale_preconditioner = false;
        Ok(())
    }

    /// Uses `diag(1/s^2)` as the initial Hessian approximation.
    pub fn set_precondition_scale(&mut self) {
        self.scale_preconditioner = true;
        self.preconditioner = Preconditioner::scale(&self.s);
    }

    /// Asks the engine to stop with code 8 at the next safe point.
    pub fn request_termination(&mut self) {
        self.terminate_requested = true;
    }

    /// Restarts from `x0`, dropping the stored correction pairs.
    pub fn restart(&mut self, x0: &DVector) -> Result<()> {
        check_vector("x0", x0, self.n)?;
        self.x0.copy_from(&x0.rows(0, self.n));
        self.x.copy_from(&self.x0);
        self.stage = Stage::Idle;
        self.request = None;
        self.report = Report::default();
        self.terminate_requested = false;
        self.evaluator.reset();
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
                Some(Request::Report) => {
                    debug!("L-BFGS iteration {}: f = {:e}", self.report.iterations, self.f)
                }
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
                    self.history.clear();
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
                    self.stp = if self.preconditioner.is_identity() {
                        1.0 / self.d.norm()
                    } else {
                        1.0
                    };
                    self.stage = Stage::LineSearchBegin;
                }
                Stage::LineSearchBegin => {
                    let dg0 = self.gk.dot(&self.d);
                    let cap = self.length_cap();
                    if cap > 0.0 {
                        self.stp = self.stp.min(cap);
                    }
                    match self.line_search.start(self.fk, dg0, self.stp, cap) {
                        Ok(stp) => {
                            self.stage = Stage::LineSearchEvaluation;
                            let point = &self.xk + &self.d * stp;
                            return self.begin_evaluation(&point);
                        }
                        Err(status) => {
                            warn!("L-BFGS line search rejected its input: {}", status);
                            self.ls_status = status;
                            self.x.copy_from(&self.xk);
                            self.f = self.fk;
                            self.g.copy_from(&self.gk);
                            self.stage = Stage::Update;
                        }
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
                        LineSearchStep::Finished(status, _) => {
                            self.ls_status = status;
                            self.stage = Stage::Update;
                        }
                    }
                }
                Stage::Update => {
                    self.report.iterations += 1;
                    if !self.ls_status.is_wolfe() {
                        debug!("L-BFGS line search finished with {}", self.ls_status);
                        if self.f > self.fk {
                            self.x.copy_from(&self.xk);
                            self.f = self.fk;
                            self.g.copy_from(&self.gk);
                        }
                    }
                    self.fold = self.fk;
                    self.step = &self.x - &self.xk;
                    self.stage = Stage::Checks;
                    if self.xrep {
                        self.request = Some(Request::Report);
                        return true;
                    }
                }
                Stage::Checks => {
                    if let Some(reason) = self.stopping_reason() {
                        self.accept_point();
                        return self.terminate(reason);
                    }
                    if let Some(reason) = self.update_memory() {
                        return self.terminate(reason);
                    }
                    self.accept_point();
                    self.d = self.history.direction(&self.gk, &self.preconditioner);
                    self.stp = 1.0;
                    self.stage = Stage::LineSearchBegin;
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

    /// Bound on the line search parameter that keeps `|stp d| <= stpmax`, `0` when unbounded.
    fn length_cap(&self) -> Real {
        let norm = self.d.norm();
        if self.stpmax > 0.0 && norm > 0.0 {
            self.stpmax / norm
        } else {
            0.0
        }
    }

    fn stopping_reason(&self) -> Option<TerminationReason> {
        if self.terminate_requested {
            return Some(TerminationReason::UserRequested);
        }
        if scaled_norm(&self.g, &self.s) <= self.criterion.eps_g {
            return Some(TerminationReason::Converged);
        }
        if self.criterion.iterations_exhausted(self.report.iterations) {
            return Some(TerminationReason::MaxIterations);
        }
        if self.criterion.function_converged(self.fold, self.f) {
            return Some(TerminationReason::FunctionTolerance);
        }
        let step_norm = self
            .step
            .iter()
            .zip(self.s.iter())
            .map(|(v, s)| (v / s) * (v / s))
            .sum::<Real>()
            .sqrt();
        if step_norm <= self.criterion.eps_x {
            return Some(TerminationReason::StepTolerance);
        }
        None
    }

    /// Stores the new correction pair. Returns a termination reason when the
    /// pair is numerically degenerate.
    fn update_memory(&mut self) -> Option<TerminationReason> {
        let y = &self.g - &self.gk;
        let ys = y.dot(&self.step);
        let yy = y.dot(&y);
        if ys == 0.0 || yy == 0.0 {
            return Some(TerminationReason::RoundingErrors);
        }
        if ys < 0.0 {
            debug!("L-BFGS negative curvature pair discarded, memory reset");
            self.history.clear();
        } else {
            self.history.push(&self.step, &y, ys, yy);
        }
        None
    }

    fn accept_point(&mut self) {
        self.xk.copy_from(&self.x);
        self.fk = self.f;
        self.gk.copy_from(&self.g);
    }

    fn terminate(&mut self, reason: TerminationReason) -> bool {
        info!("L-BFGS terminated after {} iterations: {}", self.report.iterations, reason);
        self.report.termination = Some(reason);
        self.x.copy_from(&self.xk);
        self.f = self.fk;
        self.stage = Stage::Done;
        self.request = None;
        false
    }
}

impl Optimizer for Lbfgs {
    fn name(&self) -> &str {
        "L-BFGS"
    }

    fn iterate(&mut self) -> bool {
        Lbfgs::iterate(self)
    }

    fn request(&self) -> Option<Request> {
        self.request
    }

    fn report(&self) -> &Report {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use revopt_core::cost_function::QuadraticCost;

    #[derive(Debug)]
    struct Rosenbrock;

    impl CostFunction for Rosenbrock {
        fn cost(&self, x: &DVector) -> Result<Real> {
            Ok(100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2))
        }

        fn cost_and_gradient(&self, x: &DVector, g: &mut DVector) -> Result<Real> {
            let t = x[1] - x[0] * x[0];
            g[0] = -400.0 * t * x[0] - 2.0 * (1.0 - x[0]);
            g[1] = 200.0 * t;
            self.cost(x)
        }
    }

    #[test]
    fn test_lbfgs_creation() {
        let x0 = DVector::zeros(3);
        assert!(Lbfgs::new(3, 0, &x0).is_err());
        assert!(Lbfgs::new(3, 4, &x0).is_err());
        let lbfgs = Lbfgs::new(3, 3, &x0).unwrap();
        assert_eq!(lbfgs.memory(), 3);
        assert_eq!(lbfgs.criterion().eps_x, 1e-6);
    }

    #[test]
    fn test_history_two_loop_matches_bfgs_on_single_pair() {
        // With one pair and gamma scaling, H y = s must hold (secant equation).
        let mut history = CorrectionHistory::new(2, 2);
        let s = DVector::from_vec(vec![1.0, 0.5]);
        let y = DVector::from_vec(vec![2.0, 3.0]);
        let ys = y.dot(&s);
        history.push(&s, &y, ys, y.dot(&y));
        let d = history.direction(&y, &Preconditioner::Identity);
        assert_relative_eq!(-d, s, epsilon = 1e-12);
    }

    #[test]
    fn test_lbfgs_rosenbrock() {
        let mut lbfgs = Lbfgs::new(2, 2, &DVector::from_vec(vec![-1.2, 1.0])).unwrap();
        lbfgs.set_cond(1e-10, 0.0, 0.0, 500).unwrap();
        let report = lbfgs.optimize(&Rosenbrock).unwrap();
        assert!(report.termination.unwrap().is_success(), "{}", report);
        let (x, _) = lbfgs.results();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lbfgs_quadratic_with_cholesky_preconditioner() {
        let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
        let b = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        let expected = -a.clone().cholesky().unwrap().solve(&b);
        let u = a.clone().cholesky().unwrap().l().transpose();
        let problem = QuadraticCost::new(a, b).unwrap();

        let mut lbfgs = Lbfgs::new(3, 2, &DVector::zeros(3)).unwrap();
        lbfgs.set_cond(1e-10, 0.0, 0.0, 0).unwrap();
        lbfgs.set_precondition_cholesky(&u, true).unwrap();
        let report = lbfgs.optimize(&problem).unwrap();
        // The exact Hessian turns the first step into a Newton step.
        assert!(report.iterations <= 2, "{}", report);
        let (x, _) = lbfgs.results();
        assert_relative_eq!(x, expected, epsilon = 1e-8);
    }

    #[test]
    fn test_lbfgs_iteration_cap_and_report_requests() {
        let mut lbfgs = Lbfgs::new(2, 1, &DVector::from_vec(vec![-1.2, 1.0])).unwrap();
        lbfgs.set_cond(0.0, 0.0, 0.0, 3).unwrap();
        lbfgs.set_xrep(true);
        let mut reports = 0;
        while lbfgs.iterate() {
            match lbfgs.request() {
                Some(Request::FunctionGradient) => {
                    let x = lbfgs.x().clone();
                    lbfgs.f = Rosenbrock.cost_and_gradient(&x, &mut lbfgs.g).unwrap();
                }
                Some(Request::Report) => reports += 1,
                _ => {}
            }
        }
        assert_eq!(lbfgs.report().termination, Some(TerminationReason::MaxIterations));
        assert_eq!(lbfgs.report().iterations, 3);
        assert_eq!(reports, 4);
    }

    #[test]
    fn test_lbfgs_numerical_gradient() {
        let mut lbfgs =
            Lbfgs::with_numerical_gradient(2, 2, &DVector::from_vec(vec![-1.2, 1.0]), 1e-6).unwrap();
        lbfgs.set_cond(1e-6, 0.0, 1e-10, 500).unwrap();
        lbfgs.optimize(&Rosenbrock).unwrap();
        let (x, report) = lbfgs.results();
        assert!(report.termination.unwrap().is_success());
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_lbfgs_restart_clears_state() {
        let mut lbfgs = Lbfgs::new(2, 2, &DVector::from_vec(vec![-1.2, 1.0])).unwrap();
        lbfgs.set_cond(1e-8, 0.0, 0.0, 0).unwrap();
        let first = lbfgs.optimize(&Rosenbrock).unwrap();
        lbfgs.restart(&DVector::from_vec(vec![-1.2, 1.0])).unwrap();
        let second = lbfgs.optimize(&Rosenbrock).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lbfgs_step_max_bounds_step_length() {
        let problem = QuadraticCost::new(
            DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0])),
            DVector::from_vec(vec![-2.0, -4.0]),
        )
        .unwrap();
        let mut lbfgs = Lbfgs::new(2, 2, &DVector::zeros(2)).unwrap();
        lbfgs.set_cond(1e-8, 0.0, 0.0, 200).unwrap();
        lbfgs.set_step_max(0.1).unwrap();
        lbfgs.set_xrep(true);

        let mut previous = DVector::zeros(2);
        let mut longest: Real = 0.0;
        while lbfgs.iterate() {
            match lbfgs.request() {
                Some(Request::FunctionGradient) => {
                    let x = lbfgs.x().clone();
                    lbfgs.f = problem.cost_and_gradient(&x, &mut lbfgs.g).unwrap();
                }
                Some(Request::Report) => {
                    let x = lbfgs.x().clone();
                    longest = longest.max((&x - &previous).norm());
                    previous = x;
                }
                _ => {}
            }
        }
        assert!(longest <= 0.1 + 1e-12, "step of length {}", longest);
        assert!(lbfgs.report().termination.unwrap().is_success());
        let (x, _) = lbfgs.results();
        assert_relative_eq!(x, DVector::from_vec(vec![1.0, 2.0]), epsilon = 1e-6);
    }

    #[test]
    fn test_lbfgs_degenerate_correction_pair() {
        // Linear objective: the gradient never changes, so y = 0.
        #[derive(Debug)]
        struct Slope;

        impl CostFunction for Slope {
            fn cost(&self, x: &DVector) -> Result<Real> {
                Ok(-x[0] - x[1])
            }

            fn cost_and_gradient(&self, x: &DVector, g: &mut DVector) -> Result<Real> {
                g.fill(-1.0);
                self.cost(x)
            }
        }

        let mut lbfgs = Lbfgs::new(2, 2, &DVector::zeros(2)).unwrap();
        lbfgs.set_cond(1e-300, 0.0, 0.0, 0).unwrap();
        lbfgs.set_step_max(1.0).unwrap();
        let report = lbfgs.optimize(&Slope).unwrap();
        assert_eq!(report.termination, Some(TerminationReason::RoundingErrors));
        assert_eq!(report.code(), -2);
        assert_eq!(report.iterations, 1);
    }
}
