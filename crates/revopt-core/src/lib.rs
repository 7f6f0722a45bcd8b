//! Core types and building blocks for reverse-communication optimizers.
//!
//! This crate provides everything the dense optimizers of `revopt-optim`
//! share: error types, the request/report protocol, stopping criteria, the
//! Moré-Thuente line search, preconditioners, finite differences and a few
//! dense linear algebra helpers.
//!
//! # Key Concepts
//!
//! - **Reverse communication**: engines never call user code; they suspend
//!   with a [`Request`] and resume when the caller has supplied the value
//! - **Termination reasons**: numerical outcomes are reported as signed
//!   codes in a [`Report`], never as errors
//! - **Scaling**: per-variable scales make stopping tests dimensionless
//!
//! # Modules
//!
//! - [`cost_function`]: cost-function traits used by the convenience drivers
//! - [`error`]: configuration error type
//! - [`line_search`]: Moré-Thuente line search
//! - [`linalg`]: Cholesky and Gram-Schmidt helpers
//! - [`numerical_diff`]: finite-difference gradients and Jacobians
//! - [`optimizer`]: requests, reports, termination reasons, stopping criteria
//! - [`preconditioner`]: preconditioners for CG and L-BFGS
//! - [`types`]: scalar aliases, constants and validation helpers

pub mod core;
pub mod numerical;
pub mod optimization;

pub use crate::core::{cost_function, error, types};
pub use numerical::{linalg, numerical_diff};
pub use optimization::{line_search, optimizer, preconditioner};

// Re-export commonly used items at the crate root
pub use error::{OptimizerError, Result};
pub use optimizer::{Optimizer, Report, Request, StoppingCriterion, TerminationReason};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use revopt_core::prelude::*;
///
/// let criterion = StoppingCriterion::new().with_eps_g(1e-8);
/// assert!(criterion.validate().is_ok());
/// ```
pub mod prelude {
    pub use crate::cost_function::{CostFunction, LeastSquaresProblem, QuadraticCost};
    pub use crate::error::{OptimizerError, Result};
    pub use crate::line_search::{
        LineSearchParams, LineSearchStatus, LineSearchStep, MoreThuente,
    };
    pub use crate::numerical_diff::{NumericalGradient, NumericalJacobian};
    pub use crate::optimizer::{
        Optimizer, Report, Request, StoppingCriterion, TerminationReason,
    };
    pub use crate::preconditioner::{LowRankCorrection, Preconditioner};
    pub use crate::types::{constants, DMatrix, DVector, Real};
}
