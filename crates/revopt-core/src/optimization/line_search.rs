//! Moré-Thuente line search in reverse-communication form.
//!
//! This module implements the safeguarded cubic/quadratic interpolation line
//! search of Moré and Thuente ("Line search algorithms with guaranteed
//! sufficient decrease", ACM TOMS 20, 1994). It is shared by the conjugate
//! gradient, L-BFGS and BLEIC engines.
//!
//! # Mathematical Foundation
//!
//! Given a point x, a descent direction d and the one-dimensional function
//! φ(α) = f(x + α d), find α > 0 satisfying the **strong Wolfe conditions**:
//!
//! 1. Sufficient decrease: φ(α) ≤ φ(0) + ftol · α · φ'(0)
//! 2. Curvature: |φ'(α)| ≤ gtol · |φ'(0)|
//!
//! with 0 < ftol < gtol < 1. The search maintains an interval of uncertainty
//! [stx, sty] and shrinks it with safeguarded interpolation steps
//! (`update_interval`). While the modified function
//! ψ(α) = φ(α) - φ(0) - ftol · α · φ'(0) has not produced a non-positive
//! value with non-negative derivative, steps are chosen from ψ instead of φ.
//!
//! # Reverse communication
//!
//! The search never evaluates the objective. The caller drives it:
//!
//! ```rust
//! use revopt_core::optimization::line_search::{LineSearchParams, LineSearchStep, MoreThuente};
//!
//! // φ(α) = (α - 3)², φ(0) = 9, φ'(0) = -6
//! let mut ls = MoreThuente::new(LineSearchParams::for_conjugate_gradient());
//! let mut stp = ls.start(9.0, -6.0, 1.0, 0.0).unwrap();
//! loop {
//!     let (f, dg) = ((stp - 3.0) * (stp - 3.0), 2.0 * (stp - 3.0));
//!     match ls.next(f, dg) {
//!         LineSearchStep::Evaluate(trial) => stp = trial,
//!         LineSearchStep::Finished(status, accepted) => {
//!             assert!(status.is_wolfe());
//!             assert!((accepted - 3.0).abs() < 1.0);
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! After `Finished`, the last point the caller evaluated is the point at the
//! returned step, so no re-evaluation is needed.

use crate::{
    error::{OptimizerError, Result},
    types::{constants, Real},
};
use std::fmt;

const XTRAPF: Real = 4.0;
const P5: Real = 0.5;
const P66: Real = 0.66;

/// Parameters of the Moré-Thuente line search.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSearchParams {
    /// Sufficient decrease constant
    pub ftol: Real,
    /// Curvature constant
    pub gtol: Real,
    /// Relative width below which the interval of uncertainty is too small
    pub xtol: Real,
    /// Smallest admissible step
    pub stpmin: Real,
    /// Largest admissible step
    pub stpmax: Real,
    /// Maximum number of function evaluations per search
    pub max_evaluations: usize,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            ftol: 1.0e-4,
            gtol: 0.9,
            xtol: 100.0 * constants::MACHINE_EPSILON,
            stpmin: 1.0e-50,
            stpmax: 1.0e50,
            max_evaluations: 20,
        }
    }
}

impl LineSearchParams {
    /// Parameters used by the conjugate gradient engine (tight curvature).
    pub fn for_conjugate_gradient() -> Self {
        Self {
            gtol: 0.3,
            ..Self::default()
        }
    }

    /// Parameters used by the L-BFGS engine (loose curvature).
    pub fn for_lbfgs() -> Self {
        Self {
            gtol: 0.9,
            ..Self::default()
        }
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::InvalidArgument` if a tolerance is negative,
    /// the step bounds are not ordered or no evaluation is allowed.
    pub fn validate(&self) -> Result<()> {
        if !(self.ftol > 0.0 && self.ftol < 1.0) {
            return Err(OptimizerError::invalid_argument("ftol", "must lie in (0, 1)"));
        }
        if !(self.gtol > 0.0 && self.gtol < 1.0) {
            return Err(OptimizerError::invalid_argument("gtol", "must lie in (0, 1)"));
        }
        if !(self.xtol >= 0.0) {
            return Err(OptimizerError::invalid_argument("xtol", "must be non-negative"));
        }
        if !(self.stpmin >= 0.0 && self.stpmax > self.stpmin) {
            return Err(OptimizerError::invalid_argument(
                "stpmax",
                "must exceed stpmin, which must be non-negative",
            ));
        }
        if self.max_evaluations == 0 {
            return Err(OptimizerError::invalid_argument(
                "max_evaluations",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Outcome of a line search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchStatus {
    /// Invalid input, or the direction is not a descent direction
    InvalidInput,
    /// Strong Wolfe conditions hold
    Wolfe,
    /// Relative width of the interval of uncertainty is at most `xtol`
    IntervalTooSmall,
    /// Evaluation budget exhausted
    TooManyEvaluations,
    /// Step is at the lower bound `stpmin`
    AtMinimumStep,
    /// Step is at the upper bound `stpmax`
    AtMaximumStep,
    /// Rounding errors prevent further progress
    RoundingErrors,
}

impl LineSearchStatus {
    /// MINPACK-compatible integer code.
    pub fn code(&self) -> i32 {
        match self {
            LineSearchStatus::InvalidInput => 0,
            LineSearchStatus::Wolfe => 1,
            LineSearchStatus::IntervalTooSmall => 2,
            LineSearchStatus::TooManyEvaluations => 3,
            LineSearchStatus::AtMinimumStep => 4,
            LineSearchStatus::AtMaximumStep => 5,
            LineSearchStatus::RoundingErrors => 6,
        }
    }

    /// Returns `true` if the strong Wolfe conditions hold.
    pub fn is_wolfe(&self) -> bool {
        matches!(self, LineSearchStatus::Wolfe)
    }
}

impl fmt::Display for LineSearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Next action requested by the line search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSearchStep {
    /// Evaluate φ and φ' at this step and call [`MoreThuente::next`].
    Evaluate(Real),
    /// The search is over; the step is where φ was last evaluated.
    Finished(LineSearchStatus, Real),
}

/// Interval endpoint: step, function value and derivative.
#[derive(Debug, Clone, Copy, Default)]
struct Endpoint {
    stp: Real,
    f: Real,
    dg: Real,
}

/// Reverse-communication Moré-Thuente line search.
#[derive(Debug, Clone)]
pub struct MoreThuente {
    params: LineSearchParams,
    stpmax: Real,
    stp: Real,
    finit: Real,
    dginit: Real,
    dgtest: Real,
    x: Endpoint,
    y: Endpoint,
    stmin: Real,
    stmax: Real,
    width: Real,
    width1: Real,
    brackt: bool,
    stage1: bool,
    infoc: i32,
    nfev: usize,
}

impl MoreThuente {
    /// Creates a line search with the given parameters.
    pub fn new(params: LineSearchParams) -> Self {
        Self {
            params,
            stpmax: params.stpmax,
            stp: 0.0,
            finit: 0.0,
            dginit: 0.0,
            dgtest: 0.0,
            x: Endpoint::default(),
            y: Endpoint::default(),
            stmin: 0.0,
            stmax: 0.0,
            width: 0.0,
            width1: 0.0,
            brackt: false,
            stage1: true,
            infoc: 1,
            nfev: 0,
        }
    }

    /// Parameters of this search.
    pub fn params(&self) -> &LineSearchParams {
        &self.params
    }

    /// Function evaluations performed by the current search.
    pub fn evaluations(&self) -> usize {
        self.nfev
    }

    /// Starts a new search from φ(0) = `f0`, φ'(0) = `dg0`.
    ///
    /// `stp` is the initial trial step. A positive `stpmax` tightens the
    /// configured upper bound for this search only. Returns the first step to
    /// evaluate, or [`LineSearchStatus::InvalidInput`] when `stp` is not
    /// positive or `d` is not a descent direction.
    pub fn start(
        &mut self,
        f0: Real,
        dg0: Real,
        stp: Real,
        stpmax: Real,
    ) -> std::result::Result<Real, LineSearchStatus> {
        self.stpmax = if stpmax > 0.0 {
            stpmax.min(self.params.stpmax)
        } else {
            self.params.stpmax
        };
        if !(stp > 0.0) || self.stpmax < self.params.stpmin || !(dg0 < 0.0) {
            return Err(LineSearchStatus::InvalidInput);
        }

        self.stp = stp;
        self.brackt = false;
        self.stage1 = true;
        self.infoc = 1;
        self.nfev = 0;
        self.finit = f0;
        self.dginit = dg0;
        self.dgtest = self.params.ftol * dg0;
        self.width = self.stpmax - self.params.stpmin;
        self.width1 = self.width / P5;
        self.x = Endpoint {
            stp: 0.0,
            f: f0,
            dg: dg0,
        };
        self.y = self.x;
        Ok(self.propose())
    }

    /// Feeds φ and φ' at the last proposed step.
    pub fn next(&mut self, f: Real, dg: Real) -> LineSearchStep {
        self.nfev += 1;
        let ftest1 = self.finit + self.stp * self.dgtest;

        if let Some(status) = self.convergence_status(f, dg, ftest1) {
            return LineSearchStep::Finished(status, self.stp);
        }

        if self.stage1 && f <= ftest1 && dg >= self.params.ftol.min(self.params.gtol) * self.dginit {
            self.stage1 = false;
        }

        if self.stage1 && f <= self.x.f && f > ftest1 {
            // Interpolate on the modified function ψ.
            let dgtest = self.dgtest;
            let mut xm = Endpoint {
                stp: self.x.stp,
                f: self.x.f - self.x.stp * dgtest,
                dg: self.x.dg - dgtest,
            };
            let mut ym = Endpoint {
                stp: self.y.stp,
                f: self.y.f - self.y.stp * dgtest,
                dg: self.y.dg - dgtest,
            };
            let trial = Endpoint {
                stp: self.stp,
                f: f - self.stp * dgtest,
                dg: dg - dgtest,
            };
            self.infoc = self.update_interval(&mut xm, &mut ym, trial);
            self.x = Endpoint {
                stp: xm.stp,
                f: xm.f + xm.stp * dgtest,
                dg: xm.dg + dgtest,
            };
            self.y = Endpoint {
                stp: ym.stp,
                f: ym.f + ym.stp * dgtest,
                dg: ym.dg + dgtest,
            };
        } else {
            let mut x = self.x;
            let mut y = self.y;
            self.infoc = self.update_interval(&mut x, &mut y, Endpoint { stp: self.stp, f, dg });
            self.x = x;
            self.y = y;
        }

        if self.brackt {
            let span = (self.y.stp - self.x.stp).abs();
            if span >= P66 * self.width1 {
                self.stp = self.x.stp + P5 * (self.y.stp - self.x.stp);
            }
            self.width1 = self.width;
            self.width = span;
        }

        LineSearchStep::Evaluate(self.propose())
    }

    fn convergence_status(&self, f: Real, dg: Real, ftest1: Real) -> Option<LineSearchStatus> {
        let p = &self.params;
        let mut status = None;
        if (self.brackt && (self.stp <= self.stmin || self.stp >= self.stmax)) || self.infoc == 0 {
            status = Some(LineSearchStatus::RoundingErrors);
        }
        if self.stp == self.stpmax && f <= ftest1 && dg <= self.dgtest {
            status = Some(LineSearchStatus::AtMaximumStep);
        }
        if self.stp == p.stpmin && (f > ftest1 || dg >= self.dgtest) {
            status = Some(LineSearchStatus::AtMinimumStep);
        }
        if self.nfev >= p.max_evaluations {
            status = Some(LineSearchStatus::TooManyEvaluations);
        }
        if self.brackt && self.stmax - self.stmin <= p.xtol * self.stmax {
            status = Some(LineSearchStatus::IntervalTooSmall);
        }
        if f <= ftest1 && dg.abs() <= -p.gtol * self.dginit {
            status = Some(LineSearchStatus::Wolfe);
        }
        status
    }

    /// Computes the interval bounds and the next trial step.
    fn propose(&mut self) -> Real {
        if self.brackt {
            self.stmin = self.x.stp.min(self.y.stp);
            self.stmax = self.x.stp.max(self.y.stp);
        } else {
            self.stmin = self.x.stp;
            self.stmax = self.stp + XTRAPF * (self.stp - self.x.stp);
        }

        self.stp = self.stp.max(self.params.stpmin).min(self.stpmax);

        let unusable = (self.brackt && (self.stp <= self.stmin || self.stp >= self.stmax))
            || self.nfev + 1 >= self.params.max_evaluations
            || self.infoc == 0
            || (self.brackt && self.stmax - self.stmin <= self.params.xtol * self.stmax);
        if unusable {
            self.stp = self.x.stp;
        }
        self.stp
    }

    /// Safeguarded step update (MINPACK `cstep`).
    ///
    /// `x` is the endpoint with the least function value, `y` the other
    /// endpoint, `t` the current trial. Returns 0 on invalid input, otherwise
    /// the case (1-4) that produced the new trial step.
    fn update_interval(&mut self, x: &mut Endpoint, y: &mut Endpoint, t: Endpoint) -> i32 {
        let (stmin, stmax) = (self.stmin, self.stmax);
        if (self.brackt && (t.stp <= x.stp.min(y.stp) || t.stp >= x.stp.max(y.stp)))
            || x.dg * (t.stp - x.stp) >= 0.0
            || stmax < stmin
        {
            return 0;
        }

        let sgnd = t.dg * x.dg.signum();
        let info;
        let bound;
        let stpf;

        if t.f > x.f {
            // Higher function value: the minimum is bracketed.
            info = 1;
            bound = true;
            let theta = 3.0 * (x.f - t.f) / (t.stp - x.stp) + x.dg + t.dg;
            let s = theta.abs().max(x.dg.abs()).max(t.dg.abs());
            let mut gamma = s * ((theta / s).powi(2) - (x.dg / s) * (t.dg / s)).max(0.0).sqrt();
            if t.stp < x.stp {
                gamma = -gamma;
            }
            let p = (gamma - x.dg) + theta;
            let q = ((gamma - x.dg) + gamma) + t.dg;
            let stpc = x.stp + (p / q) * (t.stp - x.stp);
            let stpq = x.stp + ((x.dg / ((x.f - t.f) / (t.stp - x.stp) + x.dg)) / 2.0) * (t.stp - x.stp);
            stpf = if (stpc - x.stp).abs() < (stpq - x.stp).abs() {
                stpc
            } else {
                stpc + (stpq - stpc) / 2.0
            };
            self.brackt = true;
        } else if sgnd < 0.0 {
            // Derivatives of opposite sign: the minimum is bracketed.
            info = 2;
            bound = false;
            let theta = 3.0 * (x.f - t.f) / (t.stp - x.stp) + x.dg + t.dg;
            let s = theta.abs().max(x.dg.abs()).max(t.dg.abs());
            let mut gamma = s * ((theta / s).powi(2) - (x.dg / s) * (t.dg / s)).max(0.0).sqrt();
            if t.stp > x.stp {
                gamma = -gamma;
            }
            let p = (gamma - t.dg) + theta;
            let q = ((gamma - t.dg) + gamma) + x.dg;
            let stpc = t.stp + (p / q) * (x.stp - t.stp);
            let stpq = t.stp + (t.dg / (t.dg - x.dg)) * (x.stp - t.stp);
            stpf = if (stpc - t.stp).abs() > (stpq - t.stp).abs() {
                stpc
            } else {
                stpq
            };
            self.brackt = true;
        } else if t.dg.abs() < x.dg.abs() {
            // Same sign, decreasing derivative magnitude.
            info = 3;
            bound = true;
            let theta = 3.0 * (x.f - t.f) / (t.stp - x.stp) + x.dg + t.dg;
            let s = theta.abs().max(x.dg.abs()).max(t.dg.abs());
            let mut gamma = s * ((theta / s).powi(2) - (x.dg / s) * (t.dg / s)).max(0.0).sqrt();
            if t.stp > x.stp {
                gamma = -gamma;
            }
            let p = (gamma - t.dg) + theta;
            let q = (gamma + (x.dg - t.dg)) + gamma;
            let r = p / q;
            let stpc = if r < 0.0 && gamma != 0.0 {
                t.stp + r * (x.stp - t.stp)
            } else if t.stp > x.stp {
                stmax
            } else {
                stmin
            };
            let stpq = t.stp + (t.dg / (t.dg - x.dg)) * (x.stp - t.stp);
            let dc = (t.stp - stpc).abs();
            let dq = (t.stp - stpq).abs();
            stpf = if (self.brackt && dc < dq) || (!self.brackt && dc > dq) {
                stpc
            } else {
                stpq
            };
        } else {
            // Same sign, derivative magnitude does not decrease.
            info = 4;
            bound = false;
            stpf = if self.brackt {
                let theta = 3.0 * (t.f - y.f) / (y.stp - t.stp) + y.dg + t.dg;
                let s = theta.abs().max(y.dg.abs()).max(t.dg.abs());
                let mut gamma = s * ((theta / s).powi(2) - (y.dg / s) * (t.dg / s)).max(0.0).sqrt();
                if t.stp > y.stp {
                    gamma = -gamma;
                }
                let p = (gamma - t.dg) + theta;
                let q = ((gamma - t.dg) + gamma) + y.dg;
                t.stp + (p / q) * (y.stp - t.stp)
            } else if t.stp > x.stp {
                stmax
            } else {
                stmin
            };
        }

        if t.f > x.f {
            *y = t;
        } else {
            if sgnd < 0.0 {
                *y = *x;
            }
            *x = t;
        }

        let mut stp = stpf.min(stmax).max(stmin);
        if self.brackt && bound {
            let mid = x.stp + P66 * (y.stp - x.stp);
            stp = if y.stp > x.stp { mid.min(stp) } else { mid.max(stp) };
        }
        self.stp = stp;
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Runs a search on φ given as a closure returning (φ, φ').
    fn run<F>(params: LineSearchParams, phi: F, stp: Real, stpmax: Real) -> (LineSearchStatus, Real, usize)
    where
        F: Fn(Real) -> (Real, Real),
    {
        let mut ls = MoreThuente::new(params);
        let (f0, dg0) = phi(0.0);
        let mut stp = match ls.start(f0, dg0, stp, stpmax) {
            Ok(s) => s,
            Err(status) => return (status, 0.0, 0),
        };
        loop {
            let (f, dg) = phi(stp);
            match ls.next(f, dg) {
                LineSearchStep::Evaluate(s) => stp = s,
                LineSearchStep::Finished(status, s) => return (status, s, ls.evaluations()),
            }
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(LineSearchParams::default().validate().is_ok());
        assert!(LineSearchParams::for_conjugate_gradient().validate().is_ok());
        assert!(LineSearchParams::for_lbfgs().validate().is_ok());

        let bad = LineSearchParams {
            gtol: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = LineSearchParams {
            max_evaluations: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_quadratic_satisfies_strong_wolfe() {
        let phi = |a: Real| ((a - 3.0).powi(2), 2.0 * (a - 3.0));
        for params in [LineSearchParams::for_conjugate_gradient(), LineSearchParams::for_lbfgs()] {
            let (status, stp, nfev) = run(params, phi, 1.0, 0.0);
            assert_eq!(status, LineSearchStatus::Wolfe);
            let (f, dg) = phi(stp);
            assert!(f <= 9.0 + params.ftol * stp * -6.0);
            assert!(dg.abs() <= params.gtol * 6.0);
            assert!(nfev <= params.max_evaluations);
        }
    }

    #[test]
    fn test_unit_step_accepted_immediately() {
        // Minimum exactly at the initial trial.
        let phi = |a: Real| ((a - 1.0).powi(2), 2.0 * (a - 1.0));
        let (status, stp, nfev) = run(LineSearchParams::default(), phi, 1.0, 0.0);
        assert_eq!(status, LineSearchStatus::Wolfe);
        assert_relative_eq!(stp, 1.0);
        assert_eq!(nfev, 1);
    }

    #[test]
    fn test_overshoot_is_bracketed() {
        // Initial step far beyond the minimizer at 0.01.
        let phi = |a: Real| ((a - 0.01).powi(2), 2.0 * (a - 0.01));
        let (status, stp, _) = run(LineSearchParams::for_conjugate_gradient(), phi, 100.0, 0.0);
        assert_eq!(status, LineSearchStatus::Wolfe);
        assert!((stp - 0.01).abs() < 0.01);
    }

    #[test]
    fn test_step_cap_reported() {
        // Unbounded linear decrease hits the per-search cap.
        let phi = |a: Real| (-a, -1.0);
        let (status, stp, _) = run(LineSearchParams::default(), phi, 1.0, 5.0);
        assert_eq!(status, LineSearchStatus::AtMaximumStep);
        assert_eq!(stp, 5.0);
    }

    #[test]
    fn test_ascent_direction_rejected() {
        let phi = |a: Real| (a, 1.0);
        let (status, _, nfev) = run(LineSearchParams::default(), phi, 1.0, 0.0);
        assert_eq!(status, LineSearchStatus::InvalidInput);
        assert_eq!(nfev, 0);
        assert_eq!(status.code(), 0);
    }

    #[test]
    fn test_evaluation_budget() {
        let params = LineSearchParams {
            max_evaluations: 2,
            gtol: 1e-6,
            ..Default::default()
        };
        let phi = |a: Real| (a.powi(4) - a, 4.0 * a.powi(3) - 1.0);
        let (status, _, nfev) = run(params, phi, 10.0, 0.0);
        assert!(nfev <= 2);
        assert_ne!(status, LineSearchStatus::InvalidInput);
    }
}
