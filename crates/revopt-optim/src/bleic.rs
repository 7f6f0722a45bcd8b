//! Bound and linear equality/inequality constrained optimizer (BLEIC).
//!
//! BLEIC minimizes a smooth function subject to box constraints `l <= x <= u`
//! and general linear constraints `C x (>=, =, <=) d` by driving the
//! [`ConjugateGradient`] engine on a projected problem.
//!
//! # Algorithm Overview
//!
//! - Every inequality row gets a slack variable `σ >= 0`, turning the
//!   constraint set into equalities `A y = b` plus bounds on the augmented
//!   vector `y = (x / t, σ)`.
//! - Preconditioning is a change of variables `x = t .* y` (`t = 1`, `t = s`
//!   or `t = 1/sqrt(d)`). Function values are always requested at
//!   `clamp(t .* y, l, u)`, so reported points satisfy the box exactly.
//! - Variables sitting on a bound form the active set. They are frozen,
//!   the equality rows are re-orthonormalized over the remaining columns and
//!   the inner CG minimizes
//!
//!   ```text
//!   Φ(z) = F(P(z)) + pen * ||z - P(z)||^2
//!   ```
//!
//!   where `P` projects onto the current feasible affine subspace.
//! - During every line search the step is capped where the ray leaves the
//!   box; the blocking variable and any other variable that lands on its
//!   bound join the active set and CG restarts from the new point.
//! - Between inner runs, variables whose projected anti-gradient points into
//!   the feasible region are released.
//!
//! The outer loop stops when the step between two inner runs falls below
//! `eps_x` or the active set stops changing ([`TerminationReason::Converged`]).
//! It reports [`TerminationReason::MaxIterations`] when the inner iteration
//! budget is spent, or when the linear constraints are still violated by more
//! than `eps_i` after 20 outer iterations.
//! [`TerminationReason::TooStringent`] is never produced by this engine.

use crate::conjugate_gradient::{ConjugateGradient, Hook};
use crate::evaluation::GradientEvaluator;
use log::{debug, info, warn};
use revopt_core::{
    cost_function::CostFunction,
    error::{OptimizerError, Result},
    linalg::{orthonormalize_rows, OrthonormalRows},
    optimizer::{Optimizer, Report, Request, StoppingCriterion, TerminationReason},
    types::{
        check_bounds, check_matrix, check_tolerance, check_vector, constants, normalize_scale,
        DMatrix, DVector, Real,
    },
};

/// Outer iterations before the engine gives up.
const MAX_OUTER_ITERATIONS: usize = 20;

/// Weight of the distance-to-subspace penalty.
const PENALTY: Real = 100.0;

/// Alternating projection sweeps allowed to find a feasible start.
const MAX_FEASIBILITY_SWEEPS: usize = 10_000;

/// Relative distance below which a variable counts as sitting on its bound.
const ACTIVATION_TOLERANCE: Real = 1000.0 * constants::MACHINE_EPSILON;

/// Step caps below this value activate the blocking variable at once.
const MIN_STEP_LIMIT: Real = 1.0e-50;

/// Relation of a linear constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    /// `c'x >= d`
    GreaterOrEqual,
    /// `c'x = d`
    Equal,
    /// `c'x <= d`
    LessOrEqual,
}

impl ConstraintKind {
    /// Maps the sign convention `> 0`, `0`, `< 0` to a relation.
    pub fn from_sign(sign: i32) -> Self {
        match sign.signum() {
            1 => ConstraintKind::GreaterOrEqual,
            0 => ConstraintKind::Equal,
            _ => ConstraintKind::LessOrEqual,
        }
    }

    /// Coefficient of the slack variable, `None` for equalities.
    fn slack_coefficient(&self) -> Option<Real> {
        match self {
            ConstraintKind::GreaterOrEqual => Some(-1.0),
            ConstraintKind::Equal => None,
            ConstraintKind::LessOrEqual => Some(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Transform {
    Identity,
    Diagonal(DVector),
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    OuterEvaluation,
    Inner,
    InnerEvaluation,
    OuterReport,
    Done,
}

/// Variable that limits the current line search.
#[derive(Debug, Clone, Copy)]
struct Blocking {
    index: usize,
    cap: Real,
    bound: Real,
}

/// Reverse-communication BLEIC engine.
#[derive(Debug, Clone)]
pub struct Bleic {
    n: usize,
    x: DVector,
    /// Function value at [`x`](Self::x), written by the caller
    pub f: Real,
    /// Gradient at [`x`](Self::x), written by the caller
    pub g: DVector,

    // configuration
    x0: DVector,
    lower: DVector,
    upper: DVector,
    c: DMatrix,
    d: DVector,
    kinds: Vec<ConstraintKind>,
    inner: StoppingCriterion,
    outer_eps_x: Real,
    outer_eps_i: Real,
    max_iterations: usize,
    stpmax: Real,
    s: DVector,
    transform: Transform,
    xrep: bool,

    // run state
    stage: Stage,
    request: Option<Request>,
    report: Report,
    terminate_requested: bool,
    evaluator: GradientEvaluator,
    cg: ConjugateGradient,
    t: DVector,
    lower_y: DVector,
    upper_y: DVector,
    a: DMatrix,
    b: DVector,
    equality_rows: OrthonormalRows,
    projection: OrthonormalRows,
    active: Vec<Option<Real>>,
    y: DVector,
    z: DVector,
    p: DVector,
    blocking: Option<Blocking>,
    inner_active: Vec<bool>,
    last_step: Real,
    infeasibility: Real,
}

impl Bleic {
    /// Creates an engine for `n` variables with analytic gradient.
    pub fn new(n: usize, x0: &DVector) -> Result<Self> {
        Self::build(n, x0, None)
    }

    /// Creates an engine that differentiates numerically with step `diff_step`.
    ///
    /// Sample points never leave the box.
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
        let cg = ConjugateGradient::new(n, &x0)?;
        let empty = OrthonormalRows {
            q: DMatrix::zeros(0, n),
            rhs: DVector::zeros(0),
            dropped_residual: 0.0,
        };
        Ok(Self {
            n,
            x: x0.clone(),
            f: 0.0,
            g: DVector::zeros(n),
            x0: x0.clone(),
            lower: DVector::from_element(n, Real::NEG_INFINITY),
            upper: DVector::from_element(n, Real::INFINITY),
            c: DMatrix::zeros(0, n),
            d: DVector::zeros(0),
            kinds: Vec::new(),
            inner: StoppingCriterion::default(),
            outer_eps_x: 1.0e-6,
            outer_eps_i: 1.0e-6,
            max_iterations: 0,
            stpmax: 0.0,
            s: DVector::from_element(n, 1.0),
            transform: Transform::Identity,
            xrep: false,
            stage: Stage::Idle,
            request: None,
            report: Report::default(),
            terminate_requested: false,
            evaluator,
            cg,
            t: DVector::from_element(n, 1.0),
            lower_y: DVector::from_element(n, Real::NEG_INFINITY),
            upper_y: DVector::from_element(n, Real::INFINITY),
            a: DMatrix::zeros(0, n),
            b: DVector::zeros(0),
            equality_rows: empty.clone(),
            projection: empty,
            active: vec![None; n],
            y: x0.clone(),
            z: x0.clone(),
            p: x0,
            blocking: None,
            inner_active: vec![false; n],
            last_step: 0.0,
            infeasibility: 0.0,
        })
    }

    /// Number of main variables.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Point at which the pending request must be evaluated.
    pub fn x(&self) -> &DVector {
        &self.x
    }

    /// Sets box constraints; infinite entries mean "unbounded".
    ///
    /// `lower > upper` is accepted here and reported as code -3 by the run.
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

    /// Sets `k` linear constraints. Row `i` of `c` holds the coefficients
    /// followed by the right-hand side, `c` is `k x (n + 1)`.
    pub fn set_lc(&mut self, c: &DMatrix, kinds: &[ConstraintKind], k: usize) -> Result<()> {
        check_matrix("c", c, k, self.n + 1)?;
        if kinds.len() < k {
            return Err(OptimizerError::dimension_mismatch("ct", k, kinds.len()));
        }
        self.c = c.view((0, 0), (k, self.n)).into_owned();
        self.d = c.view((0, self.n), (k, 1)).column(0).into_owned();
        self.kinds = kinds[..k].to_vec();
        Ok(())
    }

    /// Tolerances of the inner CG runs; all zero selects `eps_x = 1e-6`.
    pub fn set_inner_cond(&mut self, eps_g: Real, eps_f: Real, eps_x: Real) -> Result<()> {
        self.inner = StoppingCriterion::from_parts(eps_g, eps_f, eps_x, 0)?;
        Ok(())
    }

    /// Outer step tolerance and infeasibility tolerance, both positive.
    pub fn set_outer_cond(&mut self, eps_x: Real, eps_i: Real) -> Result<()> {
        check_tolerance("eps_x", eps_x)?;
        check_tolerance("eps_i", eps_i)?;
        if eps_x == 0.0 || eps_i == 0.0 {
            return Err(OptimizerError::invalid_argument(
                "eps_x/eps_i",
                "outer tolerances must be positive",
            ));
        }
        self.outer_eps_x = eps_x;
        self.outer_eps_i = eps_i;
        Ok(())
    }

    /// Caps the total number of inner iterations, `0` for unlimited.
    ///
    /// The cap is shared by all inner runs of a session.
    pub fn set_max_its(&mut self, max_its: usize) {
        self.max_iterations = max_its;
    }

    /// Limits the step length of every line search, `0` for no limit.
    ///
    /// A positive limit combined with a non-default preconditioner stops the
    /// run with code -10.
    pub fn set_stp_max(&mut self, stpmax: Real) -> Result<()> {
        check_tolerance("stpmax", stpmax)?;
        self.stpmax = stpmax;
        Ok(())
    }

    /// Sets the per-variable scale.
    pub fn set_scale(&mut self, s: &DVector) -> Result<()> {
        self.s = normalize_scale(s, self.n)?;
        Ok(())
    }

    /// Removes preconditioning.
    pub fn set_prec_default(&mut self) {
        self.transform = Transform::Identity;
    }

    /// Preconditions with the diagonal Hessian estimate `d`, entries positive.
    pub fn set_prec_diag(&mut self, d: &DVector) -> Result<()> {
        check_vector("d", d, self.n)?;
        if d.rows(0, self.n).iter().any(|v| *v <= 0.0) {
            return Err(OptimizerError::invalid_argument(
                "d",
                "diagonal entries must be positive",
            ));
        }
        self.transform = Transform::Diagonal(d.rows(0, self.n).into_owned());
        Ok(())
    }

    /// Preconditions with the scaling vector.
    pub fn set_prec_scale(&mut self) {
        self.transform = Transform::Scale;
    }

    /// Enables `Request::Report` after every outer iteration.
    pub fn set_xrep(&mut self, xrep: bool) {
        self.xrep = xrep;
    }

    /// Asks the engine to stop with code 8 at the next safe point.
    pub fn request_termination(&mut self) {
        self.terminate_requested = true;
        self.cg.request_termination();
    }

    /// Restarts from `x0` with the current configuration.
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

    /// Largest violation of the linear constraints at the current point.
    pub fn debug_infeasibility(&self) -> Real {
        self.infeasibility
    }

    /// Solution and report.
    pub fn results(&self) -> (DVector, Report) {
        (self.user_point(&self.y), self.report.clone())
    }

    /// Copies the solution and the report into caller-owned buffers.
    pub fn results_buffered(&self, x: &mut DVector, report: &mut Report) -> Result<()> {
        if x.len() < self.n {
            return Err(OptimizerError::dimension_mismatch("x", self.n, x.len()));
        }
        x.rows_mut(0, self.n).copy_from(&self.user_point(&self.y));
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
                Some(Request::Report) => debug!(
                    "BLEIC outer iteration {}: f = {:e}",
                    self.report.outer_iterations, self.f
                ),
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
                    if let Some(reason) = self.setup() {
                        return self.terminate(reason);
                    }
                    self.stage = Stage::OuterEvaluation;
                    let point = self.user_point(&self.y);
                    return self.begin_evaluation(&point);
                }
                Stage::OuterEvaluation => {
                    if self.continue_evaluation() {
                        return true;
                    }
                    let gradient = self.gradient_in_y();
                    let (released, changed) = self.select_active_set(&gradient);
                    if self.report.outer_iterations > 0 {
                        let small_step = self.last_step <= self.outer_eps_x;
                        if small_step || (released == 0 && !changed) {
                            return self.terminate(TerminationReason::Converged);
                        }
                        if self.report.outer_iterations >= MAX_OUTER_ITERATIONS
                            && self.infeasibility > self.outer_eps_i
                        {
                            warn!(
                                "BLEIC still infeasible after {} outer iterations ({:e})",
                                self.report.outer_iterations, self.infeasibility
                            );
                            return self.terminate(TerminationReason::MaxIterations);
                        }
                    }
                    self.start_inner();
                    self.stage = Stage::Inner;
                }
                Stage::Inner => {
                    if self.cg.iterate() {
                        match self.cg.hook() {
                            Some(Hook::LineSearchStart) => self.limit_step(),
                            Some(Hook::LineSearchEnd) => self.commit_activations(),
                            None => {
                                self.z.copy_from(self.cg.x());
                                self.p = self.project(&self.z);
                                self.stage = Stage::InnerEvaluation;
                                let point = self.user_point(&self.p);
                                return self.begin_evaluation(&point);
                            }
                        }
                        continue;
                    }
                    self.finish_inner();
                    self.stage = Stage::OuterReport;
                    if self.xrep {
                        self.x = self.user_point(&self.y);
                        self.f = self.cg.f;
                        self.request = Some(Request::Report);
                        return true;
                    }
                }
                Stage::InnerEvaluation => {
                    if self.continue_evaluation() {
                        return true;
                    }
                    self.feed_inner();
                    self.stage = Stage::Inner;
                }
                Stage::OuterReport => {
                    if self.terminate_requested {
                        return self.terminate(TerminationReason::UserRequested);
                    }
                    if self.max_iterations > 0 && self.report.iterations >= self.max_iterations {
                        return self.terminate(TerminationReason::MaxIterations);
                    }
                    self.stage = Stage::OuterEvaluation;
                    let point = self.user_point(&self.y);
                    return self.begin_evaluation(&point);
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

    /// Builds the augmented problem and finds a feasible starting point.
    fn setup(&mut self) -> Option<TerminationReason> {
        if self.stpmax > 0.0 && self.transform != Transform::Identity {
            warn!("BLEIC step limit cannot be combined with preconditioning");
            return Some(TerminationReason::IncompatibleSettings);
        }
        if (0..self.n).any(|i| self.lower[i] > self.upper[i]) {
            return Some(TerminationReason::InconsistentConstraints);
        }

        let n = self.n;
        let k = self.kinds.len();
        let slack_rows: Vec<usize> = (0..k)
            .filter(|&r| self.kinds[r].slack_coefficient().is_some())
            .collect();
        let nn = n + slack_rows.len();

        self.t = DVector::from_fn(nn, |i, _| {
            if i >= n {
                return 1.0;
            }
            match &self.transform {
                Transform::Identity => 1.0,
                Transform::Diagonal(d) => 1.0 / d[i].sqrt(),
                Transform::Scale => self.s[i],
            }
        });
        self.lower_y = DVector::from_fn(nn, |i, _| if i < n { self.lower[i] / self.t[i] } else { 0.0 });
        self.upper_y =
            DVector::from_fn(nn, |i, _| if i < n { self.upper[i] / self.t[i] } else { Real::INFINITY });

        self.a = DMatrix::zeros(k, nn);
        for r in 0..k {
            for j in 0..n {
                self.a[(r, j)] = self.c[(r, j)] * self.t[j];
            }
        }
        for (slot, &r) in slack_rows.iter().enumerate() {
            if let Some(coef) = self.kinds[r].slack_coefficient() {
                self.a[(r, n + slot)] = coef;
            }
        }
        self.b = self.d.clone();

        let mut y = DVector::zeros(nn);
        for i in 0..n {
            y[i] = self.x0[i] / self.t[i];
        }
        for (slot, &r) in slack_rows.iter().enumerate() {
            let residual = self.c.row(r).transpose().dot(&self.x0) - self.d[r];
            // c'x - d = -coef * σ
            y[n + slot] = match self.kinds[r] {
                ConstraintKind::GreaterOrEqual => residual.max(0.0),
                _ => (-residual).max(0.0),
            };
        }

        self.equality_rows = orthonormalize_rows(&self.a, &self.b);
        if self.equality_rows.dropped_residual > constants::MACHINE_EPSILON.sqrt() {
            warn!(
                "BLEIC linear constraints are inconsistent (residual {:e})",
                self.equality_rows.dropped_residual
            );
            return Some(TerminationReason::InconsistentConstraints);
        }

        // Alternating projections between the affine subspace and the box.
        let rows = self.equality_rows.clone();
        self.clip_y(&mut y);
        for sweep in 0..MAX_FEASIBILITY_SWEEPS {
            let correction = &rows.q * &y - &rows.rhs;
            let projected = &y - rows.q.tr_mul(&correction);
            let mut clipped = projected.clone();
            self.clip_y(&mut clipped);
            let box_violation = (&clipped - &projected).amax();
            y = clipped;
            if box_violation <= self.outer_eps_i * 1.0e-3 {
                debug!("BLEIC feasible start after {} projection sweeps", sweep + 1);
                break;
            }
        }
        self.infeasibility = self.equality_infeasibility(&y);
        if self.infeasibility > self.outer_eps_i {
            warn!(
                "BLEIC could not find a feasible point (infeasibility {:e})",
                self.infeasibility
            );
            return Some(TerminationReason::InconsistentConstraints);
        }

        self.active = vec![None; nn];
        self.inner_active = vec![false; nn];
        self.projection = self.equality_rows.clone();
        self.y = y;
        self.z = self.y.clone();
        self.p = self.y.clone();
        self.blocking = None;
        self.last_step = 0.0;
        if self.evaluator.is_numeric() {
            self.evaluator.set_bounds(self.lower.clone(), self.upper.clone());
        }
        self.cg = match ConjugateGradient::new(nn, &self.y) {
            Ok(cg) => cg,
            Err(err) => {
                warn!("BLEIC inner solver could not be created: {}", err);
                return Some(TerminationReason::IncompatibleSettings);
            }
        };
        self.cg.enable_hooks();
        None
    }

    fn clip_y(&self, y: &mut DVector) {
        for i in 0..y.len() {
            y[i] = y[i].max(self.lower_y[i]).min(self.upper_y[i]);
        }
    }

    /// Maps an augmented point to user coordinates, clamped to the box.
    fn user_point(&self, y: &DVector) -> DVector {
        DVector::from_fn(self.n, |i, _| {
            (self.t[i] * y[i]).max(self.lower[i]).min(self.upper[i])
        })
    }

    fn equality_infeasibility(&self, y: &DVector) -> Real {
        if self.b.is_empty() {
            return 0.0;
        }
        (&self.a * y - &self.b).amax()
    }

    /// Gradient of the objective with respect to the augmented variables.
    fn gradient_in_y(&self) -> DVector {
        DVector::from_fn(self.t.len(), |i, _| if i < self.n { self.t[i] * self.g[i] } else { 0.0 })
    }

    fn near_lower(&self, i: usize, value: Real) -> bool {
        let l = self.lower_y[i];
        l.is_finite() && value <= l + ACTIVATION_TOLERANCE * l.abs().max(1.0)
    }

    fn near_upper(&self, i: usize, value: Real) -> bool {
        let u = self.upper_y[i];
        u.is_finite() && value >= u - ACTIVATION_TOLERANCE * u.abs().max(1.0)
    }

    /// Re-orthonormalizes the equality rows over the free variables.
    fn rebuild_projection(&mut self) {
        let mut a = self.a.clone();
        let mut b = self.b.clone();
        for (j, fixed) in self.active.iter().enumerate() {
            if let Some(value) = fixed {
                for r in 0..a.nrows() {
                    b[r] -= a[(r, j)] * value;
                    a[(r, j)] = 0.0;
                }
            }
        }
        self.projection = orthonormalize_rows(&a, &b);
        if self.projection.dropped_residual > constants::MACHINE_EPSILON.sqrt() {
            debug!(
                "BLEIC active set conflicts with the equality rows (residual {:e})",
                self.projection.dropped_residual
            );
        }
    }

    /// Projects `z` onto the feasible subspace of the current active set.
    fn project(&self, z: &DVector) -> DVector {
        let mut p = z.clone();
        for (i, fixed) in self.active.iter().enumerate() {
            if let Some(value) = fixed {
                p[i] = *value;
            }
        }
        if self.projection.rank() > 0 {
            let correction = &self.projection.q * &p - &self.projection.rhs;
            p -= self.projection.q.tr_mul(&correction);
        }
        p
    }

    /// Projects a gradient onto the directions allowed by the active set.
    fn project_gradient(&self, v: &DVector) -> DVector {
        let mut w = v.clone();
        for (i, fixed) in self.active.iter().enumerate() {
            if fixed.is_some() {
                w[i] = 0.0;
            }
        }
        self.projection.project_null_space(&w)
    }

    /// Activates every variable on a bound, then releases those whose
    /// projected anti-gradient points into the box.
    ///
    /// Returns the number of released variables and whether the active set
    /// differs from the one the last inner run ended with.
    fn select_active_set(&mut self, gradient: &DVector) -> (usize, bool) {
        let nn = self.t.len();
        let direction = -self.equality_rows.project_null_space(gradient);
        let mut released = 0;
        for i in 0..nn {
            let value = self.y[i];
            self.active[i] = if self.lower_y[i] == self.upper_y[i] {
                Some(self.lower_y[i])
            } else if self.near_lower(i, value) {
                if direction[i] > 0.0 {
                    released += 1;
                    None
                } else {
                    Some(self.lower_y[i])
                }
            } else if self.near_upper(i, value) {
                if direction[i] < 0.0 {
                    released += 1;
                    None
                } else {
                    Some(self.upper_y[i])
                }
            } else {
                None
            };
        }
        if released > 0 {
            debug!("BLEIC released {} constraints", released);
        }
        let changed = (0..nn).any(|i| self.active[i].is_some() != self.inner_active[i]);
        self.rebuild_projection();
        self.y = self.project(&self.y);
        (released, changed)
    }

    /// Inner iterations left under [`set_max_its`](Self::set_max_its), `None` when unlimited.
    fn remaining_iterations(&self) -> Option<usize> {
        (self.max_iterations > 0).then(|| self.max_iterations.saturating_sub(self.report.iterations))
    }

    /// Inner criterion limited to the remaining iteration budget.
    fn inner_criterion(&self) -> StoppingCriterion {
        let mut criterion = self.inner;
        if let Some(left) = self.remaining_iterations() {
            criterion.max_iterations = left;
        }
        criterion
    }

    fn start_inner(&mut self) {
        let nn = self.t.len();
        let scale = DVector::from_fn(nn, |i, _| if i < self.n { self.s[i] / self.t[i] } else { 1.0 });
        self.cg.configure(self.inner_criterion(), scale, self.stpmax);
        self.cg.restart_from(&self.y);
        self.blocking = None;
    }

    /// Restarts CG from the projection of `z` after the active set grew.
    fn restart_inner(&mut self, z: &DVector) {
        // CG checks its budget before every line search, so some is left here.
        self.report.iterations += self.cg.report().iterations;
        self.rebuild_projection();
        self.y = self.project(z);
        self.cg.set_max_iterations(self.inner_criterion().max_iterations);
        self.cg.restart_from(&self.y);
        self.blocking = None;
    }

    /// Caps the next line search where the ray leaves the box.
    fn limit_step(&mut self) {
        let d = self.cg.direction();
        let base = self.cg.base_point();
        let mut blocking: Option<Blocking> = None;
        for i in 0..d.len() {
            if self.active[i].is_some() {
                continue;
            }
            let (cap, bound) = if d[i] < 0.0 && self.lower_y[i].is_finite() {
                ((self.lower_y[i] - base[i]) / d[i], self.lower_y[i])
            } else if d[i] > 0.0 && self.upper_y[i].is_finite() {
                ((self.upper_y[i] - base[i]) / d[i], self.upper_y[i])
            } else {
                continue;
            };
            if blocking.map_or(true, |b| cap < b.cap) {
                blocking = Some(Blocking { index: i, cap, bound });
            }
        }
        match blocking {
            Some(b) if b.cap <= MIN_STEP_LIMIT => {
                debug!("BLEIC activates variable {} before the line search", b.index);
                self.active[b.index] = Some(b.bound);
                let z = base.clone();
                self.restart_inner(&z);
            }
            Some(b) => {
                self.cg.set_step_limit(b.cap);
                self.blocking = Some(b);
            }
            None => self.blocking = None,
        }
    }

    /// Commits the variables that reached their bounds during the line search.
    fn commit_activations(&mut self) {
        let blocking = self.blocking.take();
        if self.cg.f > self.cg.base_value() {
            return;
        }
        let mut z = self.cg.x().clone();
        let mut activated = 0;
        if let Some(b) = blocking {
            if self.cg.last_step() >= b.cap {
                self.active[b.index] = Some(b.bound);
                activated += 1;
            }
        }
        for i in 0..z.len() {
            if self.active[i].is_some() {
                continue;
            }
            if self.near_lower(i, z[i]) {
                self.active[i] = Some(self.lower_y[i]);
                activated += 1;
            } else if self.near_upper(i, z[i]) {
                self.active[i] = Some(self.upper_y[i]);
                activated += 1;
            }
        }
        if activated == 0 {
            return;
        }
        for (i, fixed) in self.active.iter().enumerate() {
            if let Some(value) = fixed {
                z[i] = *value;
            }
        }
        debug!("BLEIC activated {} constraints during the line search", activated);
        self.restart_inner(&z);
    }

    /// Turns the caller's answer into `Φ` and its gradient for CG.
    fn feed_inner(&mut self) {
        let gradient = self.gradient_in_y();
        let offset = &self.z - &self.p;
        self.cg.f = self.f + PENALTY * offset.norm_squared();
        self.cg.g = self.project_gradient(&gradient) + offset * (2.0 * PENALTY);
    }

    fn finish_inner(&mut self) {
        self.report.iterations += self.cg.report().iterations;
        self.report.outer_iterations += 1;
        debug!(
            "BLEIC inner run finished: {}",
            self.cg
                .report()
                .termination
                .map_or_else(|| "no termination".to_string(), |r| r.to_string())
        );
        let (z, _) = self.cg.results();
        let y_new = self.project(&z);
        let x_old = self.user_point(&self.y);
        let x_new = self.user_point(&y_new);
        self.last_step = (&x_new - &x_old)
            .iter()
            .zip(self.s.iter())
            .map(|(v, s)| (v / s) * (v / s))
            .sum::<Real>()
            .sqrt();
        self.y = y_new;
        self.inner_active = self.active.iter().map(Option::is_some).collect();
        self.infeasibility = self.equality_infeasibility(&self.y);
    }

    fn terminate(&mut self, reason: TerminationReason) -> bool {
        info!(
            "BLEIC terminated after {} outer iterations: {}",
            self.report.outer_iterations, reason
        );
        self.report.termination = Some(reason);
        if self.y.len() >= self.n {
            self.x = self.user_point(&self.y);
        }
        self.stage = Stage::Done;
        self.request = None;
        false
    }
}

impl Optimizer for Bleic {
    fn name(&self) -> &str {
        "BLEIC"
    }

    fn iterate(&mut self) -> bool {
        Bleic::iterate(self)
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

    fn shifted_sphere() -> QuadraticCost {
        QuadraticCost::new(
            DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0])),
            DVector::from_vec(vec![-2.0, -4.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_constraint_kind_from_sign() {
        assert_eq!(ConstraintKind::from_sign(3), ConstraintKind::GreaterOrEqual);
        assert_eq!(ConstraintKind::from_sign(0), ConstraintKind::Equal);
        assert_eq!(ConstraintKind::from_sign(-1), ConstraintKind::LessOrEqual);
    }

    #[test]
    fn test_unconstrained_run() {
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        bleic.set_inner_cond(0.0, 0.0, 1e-10).unwrap();
        let report = bleic.optimize(&shifted_sphere()).unwrap();
        assert_eq!(report.termination, Some(TerminationReason::Converged));
        let (x, _) = bleic.results();
        assert_relative_eq!(x, DVector::from_vec(vec![1.0, 2.0]), epsilon = 1e-6);
    }

    #[test]
    fn test_upper_bound_is_exact() {
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        bleic
            .set_bc(
                &DVector::from_element(2, Real::NEG_INFINITY),
                &DVector::from_vec(vec![0.5, Real::INFINITY]),
            )
            .unwrap();
        bleic.set_inner_cond(0.0, 0.0, 1e-10).unwrap();
        let report = bleic.optimize(&shifted_sphere()).unwrap();
        assert_eq!(report.code(), 4);
        let (x, _) = bleic.results();
        assert_eq!(x[0], 0.5);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_inequality_via_slack() {
        // x + y <= 1, the minimizer of the sphere lies outside.
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        let c = DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]);
        bleic.set_lc(&c, &[ConstraintKind::LessOrEqual], 1).unwrap();
        bleic.set_inner_cond(0.0, 0.0, 1e-10).unwrap();
        let report = bleic.optimize(&shifted_sphere()).unwrap();
        assert!(report.termination.unwrap().is_success(), "{}", report);
        let (x, _) = bleic.results();
        assert_relative_eq!(x, DVector::from_vec(vec![0.0, 1.0]), epsilon = 1e-5);
        assert!(bleic.debug_infeasibility() <= 1e-6);
    }

    #[test]
    fn test_equality_constraint() {
        let mut bleic = Bleic::new(2, &DVector::from_vec(vec![3.0, -1.0])).unwrap();
        let c = DMatrix::from_row_slice(1, 3, &[1.0, -1.0, 0.0]);
        bleic.set_lc(&c, &[ConstraintKind::Equal], 1).unwrap();
        bleic.set_inner_cond(0.0, 0.0, 1e-10).unwrap();
        bleic.optimize(&shifted_sphere()).unwrap();
        let (x, _) = bleic.results();
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-5);
        assert_relative_eq!(x[1], 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_infeasible_bounds_and_constraints() {
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        bleic
            .set_bc(&DVector::from_vec(vec![1.0, 0.0]), &DVector::from_vec(vec![0.0, 1.0]))
            .unwrap();
        assert_eq!(bleic.optimize(&shifted_sphere()).unwrap().code(), -3);

        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        let c = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 1.0, 0.0, 2.0]);
        bleic
            .set_lc(&c, &[ConstraintKind::Equal, ConstraintKind::Equal], 2)
            .unwrap();
        assert_eq!(bleic.optimize(&shifted_sphere()).unwrap().code(), -3);
    }

    #[test]
    fn test_step_max_with_preconditioner_is_incompatible() {
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        bleic.set_stp_max(1.0).unwrap();
        bleic.set_prec_scale();
        let report = bleic.optimize(&shifted_sphere()).unwrap();
        assert_eq!(report.code(), -10);
    }

    #[test]
    fn test_feasible_run_continues_past_outer_limit() {
        // f = (x - y)^2 + (y + 1)^2 with x <= 0, minimizer (-1, -1). From (0, 3)
        // the bound on x holds during the first inner run and is released after.
        #[derive(Debug)]
        struct Coupled;

        impl CostFunction for Coupled {
            fn cost(&self, x: &DVector) -> Result<Real> {
                Ok((x[0] - x[1]).powi(2) + (x[1] + 1.0).powi(2))
            }

            fn cost_and_gradient(&self, x: &DVector, g: &mut DVector) -> Result<Real> {
                g[0] = 2.0 * (x[0] - x[1]);
                g[1] = -2.0 * (x[0] - x[1]) + 2.0 * (x[1] + 1.0);
                self.cost(x)
            }
        }

        let mut bleic = Bleic::new(2, &DVector::from_vec(vec![0.0, 3.0])).unwrap();
        bleic
            .set_bc(
                &DVector::from_element(2, Real::NEG_INFINITY),
                &DVector::from_vec(vec![0.0, Real::INFINITY]),
            )
            .unwrap();
        bleic.set_inner_cond(0.0, 0.0, 1e-10).unwrap();
        bleic.set_xrep(true);

        let mut reports = 0;
        while bleic.iterate() {
            match bleic.request() {
                Some(Request::FunctionGradient) => {
                    let x = bleic.x().clone();
                    bleic.f = Coupled.cost_and_gradient(&x, &mut bleic.g).unwrap();
                }
                Some(Request::Report) => {
                    reports += 1;
                    if reports == 1 {
                        assert_eq!(bleic.x()[0], 0.0);
                        // Pretend the outer limit is reached while the point is feasible.
                        bleic.report.outer_iterations = MAX_OUTER_ITERATIONS;
                    }
                }
                other => panic!("unexpected request {:?}", other),
            }
        }

        assert!(reports >= 2);
        assert_eq!(bleic.report().termination, Some(TerminationReason::Converged));
        let (x, _) = bleic.results();
        assert_relative_eq!(x, DVector::from_vec(vec![-1.0, -1.0]), epsilon = 1e-5);
    }

    #[test]
    fn test_step_max_bounds_trial_points() {
        let problem = shifted_sphere();
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        bleic.set_stp_max(0.1).unwrap();
        bleic.set_inner_cond(0.0, 0.0, 1e-10).unwrap();

        let mut previous: Option<DVector> = None;
        let mut longest: Real = 0.0;
        while bleic.iterate() {
            if bleic.request() == Some(Request::FunctionGradient) {
                let x = bleic.x().clone();
                if let Some(p) = &previous {
                    longest = longest.max((&x - p).norm());
                }
                bleic.f = problem.cost_and_gradient(&x, &mut bleic.g).unwrap();
                previous = Some(x);
            }
        }
        // Trial points of one search lie within 0.1 of its base point.
        assert!(longest <= 0.2 + 1e-12, "jump of length {}", longest);
        assert!(bleic.report().termination.unwrap().is_success());
        let (x, _) = bleic.results();
        assert_relative_eq!(x, DVector::from_vec(vec![1.0, 2.0]), epsilon = 1e-6);
    }

    #[test]
    fn test_setter_validation() {
        let mut bleic = Bleic::new(2, &DVector::zeros(2)).unwrap();
        assert!(bleic.set_outer_cond(0.0, 1e-6).is_err());
        assert!(bleic.set_outer_cond(1e-6, -1.0).is_err());
        assert!(bleic.set_inner_cond(f64::NAN, 0.0, 0.0).is_err());
        assert!(bleic.set_prec_diag(&DVector::from_vec(vec![1.0, 0.0])).is_err());
        assert!(bleic
            .set_lc(&DMatrix::zeros(1, 2), &[ConstraintKind::Equal], 1)
            .is_err());
        assert!(bleic
            .set_lc(&DMatrix::zeros(2, 3), &[ConstraintKind::Equal], 2)
            .is_err());
    }
}
