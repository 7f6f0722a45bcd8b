//! Reverse-communication protocol, stopping criteria and run reports.
//!
//! Every engine of this library is a resumable state machine. Instead of
//! calling a user-supplied function, the engine suspends and tells its caller
//! what it needs through a [`Request`]:
//!
//! ```text
//! while engine.iterate() {
//!     match engine.request() {
//!         Some(Request::FunctionGradient) => { /* write f and g at engine.x() */ }
//!         Some(Request::Report) => { /* progress, nothing to supply */ }
//!         ...
//!     }
//! }
//! ```
//!
//! The caller computes the requested quantity at the engine's current point,
//! stores it in the engine's public fields and calls `iterate` again. When
//! `iterate` returns `false` the run is over and the [`Report`] holds a
//! [`TerminationReason`].
//!
//! # Termination codes
//!
//! Numerical outcomes are not errors. They are encoded as signed codes:
//! negative codes mean that no usable solution was produced, positive codes
//! mean that a solution was found with the corresponding level of confidence.
//!
//! | code | reason |
//! |-----:|--------|
//! | -10 | incompatible settings |
//! | -5 | indefinite quadratic term |
//! | -3 | inconsistent constraints |
//! | -2 | rounding errors prevent progress |
//! | -1 | damping parameter overflow |
//! | 1 | relative function change below `eps_f` |
//! | 2 | relative step below `eps_x` |
//! | 4 | scaled gradient below `eps_g` (or solver-specific success) |
//! | 5 | iteration cap reached |
//! | 7 | stopping conditions too stringent |
//! | 8 | termination requested by the caller |

use crate::{
    error::Result,
    types::{check_tolerance, constants, Real},
};
use std::fmt;

/// Quantity an engine is waiting for.
///
/// Exactly one request is pending after `iterate` returns `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Request {
    /// Objective value `f` at the current point.
    Function,
    /// Objective value `f` and gradient `g`.
    FunctionGradient,
    /// Objective value `f`, gradient `g` and Hessian `h`.
    FunctionGradientHessian,
    /// Residual vector `fi`.
    Vector,
    /// Residual vector `fi` and Jacobian `j`.
    VectorJacobian,
    /// A new iterate is available; nothing needs to be supplied.
    Report,
}

impl Request {
    /// Returns `true` for requests that require the caller to supply data.
    pub fn needs_input(&self) -> bool {
        !matches!(self, Request::Report)
    }
}

/// Reason why an engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminationReason {
    /// Settings that cannot be combined were requested
    IncompatibleSettings,
    /// Quadratic term is not positive definite on the free subspace
    IndefiniteQuadratic,
    /// Bounds or linear constraints admit no feasible point
    InconsistentConstraints,
    /// Rounding errors prevent further improvement; the best point is kept
    RoundingErrors,
    /// Damping parameter overflowed before a step was accepted
    DampingOverflow,
    /// Relative function improvement fell below `eps_f`
    FunctionTolerance,
    /// Relative scaled step fell below `eps_x`
    StepTolerance,
    /// Scaled gradient fell below `eps_g`, or the solver converged
    Converged,
    /// Iteration budget exhausted
    MaxIterations,
    /// Stopping conditions are too stringent; no further progress possible
    TooStringent,
    /// Caller asked for termination
    UserRequested,
}

impl TerminationReason {
    /// Signed integer code of this reason.
    pub fn code(&self) -> i32 {
        match self {
            TerminationReason::IncompatibleSettings => -10,
            TerminationReason::IndefiniteQuadratic => -5,
            TerminationReason::InconsistentConstraints => -3,
            TerminationReason::RoundingErrors => -2,
            TerminationReason::DampingOverflow => -1,
            TerminationReason::FunctionTolerance => 1,
            TerminationReason::StepTolerance => 2,
            TerminationReason::Converged => 4,
            TerminationReason::MaxIterations => 5,
            TerminationReason::TooStringent => 7,
            TerminationReason::UserRequested => 8,
        }
    }

    /// Reason for a signed integer code, if the code is known.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -10 => TerminationReason::IncompatibleSettings,
            -5 => TerminationReason::IndefiniteQuadratic,
            -3 => TerminationReason::InconsistentConstraints,
            -2 => TerminationReason::RoundingErrors,
            -1 => TerminationReason::DampingOverflow,
            1 => TerminationReason::FunctionTolerance,
            2 => TerminationReason::StepTolerance,
            4 => TerminationReason::Converged,
            5 => TerminationReason::MaxIterations,
            7 => TerminationReason::TooStringent,
            8 => TerminationReason::UserRequested,
            _ => return None,
        })
    }

    /// Returns `true` when the run produced a usable solution.
    pub fn is_success(&self) -> bool {
        self.code() > 0
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminationReason::IncompatibleSettings => "incompatible settings",
            TerminationReason::IndefiniteQuadratic => "quadratic term is indefinite",
            TerminationReason::InconsistentConstraints => "inconsistent constraints",
            TerminationReason::RoundingErrors => "rounding errors prevent progress",
            TerminationReason::DampingOverflow => "damping parameter overflow",
            TerminationReason::FunctionTolerance => "relative function change is small",
            TerminationReason::StepTolerance => "relative step is small",
            TerminationReason::Converged => "converged",
            TerminationReason::MaxIterations => "iteration limit reached",
            TerminationReason::TooStringent => "stopping conditions too stringent",
            TerminationReason::UserRequested => "termination requested",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

/// Counters and outcome of an optimization run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Report {
    /// Accepted iterations (inner iterations for two-level engines)
    pub iterations: usize,
    /// Outer iterations of two-level engines (BLEIC, QP)
    pub outer_iterations: usize,
    /// Function (or residual vector) evaluations
    pub function_evaluations: usize,
    /// Gradient evaluations
    pub gradient_evaluations: usize,
    /// Jacobian evaluations
    pub jacobian_evaluations: usize,
    /// Hessian evaluations
    pub hessian_evaluations: usize,
    /// Cholesky factorizations
    pub cholesky_decompositions: usize,
    /// Outcome, `None` while the run is in progress
    pub termination: Option<TerminationReason>,
}

impl Report {
    /// Signed termination code, `0` while the run is in progress.
    pub fn code(&self) -> i32 {
        self.termination.map_or(0, |r| r.code())
    }

    /// Returns `true` if the run is over.
    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.termination {
            Some(reason) => write!(f, "{}", reason)?,
            None => write!(f, "running")?,
        }
        write!(
            f,
            ": {} iterations, {} function and {} gradient evaluations",
            self.iterations, self.function_evaluations, self.gradient_evaluations
        )?;
        if self.outer_iterations > 0 {
            write!(f, ", {} outer iterations", self.outer_iterations)?;
        }
        if self.jacobian_evaluations > 0 {
            write!(f, ", {} Jacobian evaluations", self.jacobian_evaluations)?;
        }
        if self.hessian_evaluations > 0 {
            write!(f, ", {} Hessian evaluations", self.hessian_evaluations)?;
        }
        if self.cholesky_decompositions > 0 {
            write!(f, ", {} Cholesky factorizations", self.cholesky_decompositions)?;
        }
        Ok(())
    }
}

/// Stopping conditions shared by the iterative engines.
///
/// - **eps_g**: stop when the scaled gradient norm `||g .* s|| <= eps_g`
/// - **eps_f**: stop when `|f_k - f_{k+1}| <= eps_f * max(|f_k|, |f_{k+1}|, 1)`
/// - **eps_x**: stop when the scaled step `||(x_{k+1} - x_k) ./ s|| <= eps_x`
/// - **max_iterations**: stop after that many iterations, `0` means unlimited
///
/// Setting every condition to zero selects `eps_x = 1e-6` automatically (see
/// [`normalized`](Self::normalized)).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoppingCriterion {
    /// Scaled gradient tolerance
    pub eps_g: Real,
    /// Relative function change tolerance
    pub eps_f: Real,
    /// Scaled step tolerance
    pub eps_x: Real,
    /// Iteration cap, `0` for unlimited
    pub max_iterations: usize,
}

impl Default for StoppingCriterion {
    fn default() -> Self {
        Self {
            eps_g: 0.0,
            eps_f: 0.0,
            eps_x: constants::DEFAULT_EPS_X,
            max_iterations: 0,
        }
    }
}

impl StoppingCriterion {
    /// Creates the default criterion (`eps_x = 1e-6`, unlimited iterations).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scaled gradient tolerance.
    pub fn with_eps_g(mut self, eps_g: Real) -> Self {
        self.eps_g = eps_g;
        self
    }

    /// Sets the relative function change tolerance.
    pub fn with_eps_f(mut self, eps_f: Real) -> Self {
        self.eps_f = eps_f;
        self
    }

    /// Sets the scaled step tolerance.
    pub fn with_eps_x(mut self, eps_x: Real) -> Self {
        self.eps_x = eps_x;
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Validates the tolerances.
    pub fn validate(&self) -> Result<()> {
        check_tolerance("eps_g", self.eps_g)?;
        check_tolerance("eps_f", self.eps_f)?;
        check_tolerance("eps_x", self.eps_x)?;
        Ok(())
    }

    /// Returns a copy where an all-zero criterion is replaced by `eps_x = 1e-6`.
    pub fn normalized(self) -> Self {
        if self.eps_g == 0.0 && self.eps_f == 0.0 && self.eps_x == 0.0 && self.max_iterations == 0 {
            Self {
                eps_x: constants::DEFAULT_EPS_X,
                ..self
            }
        } else {
            self
        }
    }

    /// Builds a validated, normalized criterion from raw values.
    pub fn from_parts(eps_g: Real, eps_f: Real, eps_x: Real, max_iterations: usize) -> Result<Self> {
        let criterion = Self {
            eps_g,
            eps_f,
            eps_x,
            max_iterations,
        };
        criterion.validate()?;
        Ok(criterion.normalized())
    }

    /// Returns `true` once `iterations` reached the cap.
    pub fn iterations_exhausted(&self, iterations: usize) -> bool {
        self.max_iterations > 0 && iterations >= self.max_iterations
    }

    /// Relative function change test.
    pub fn function_converged(&self, f_old: Real, f_new: Real) -> bool {
        (f_old - f_new).abs() <= self.eps_f * f_old.abs().max(f_new.abs()).max(1.0)
    }
}

/// Uniform driving interface of the reverse-communication engines.
pub trait Optimizer: fmt::Debug {
    /// Human-readable algorithm name used in logs.
    fn name(&self) -> &str;

    /// Advances the engine until it needs input or terminates.
    ///
    /// Returns `true` while more work remains.
    fn iterate(&mut self) -> bool;

    /// Pending request, `None` once the engine terminated.
    fn request(&self) -> Option<Request>;

    /// Report of the current run.
    fn report(&self) -> &Report;
}
