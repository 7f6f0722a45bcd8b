//! # RevOpt
//!
//! Dense nonlinear optimization driven by reverse communication.
//!
//! This crate re-exports the building blocks of `revopt-core` and the
//! engines of `revopt-optim` under a single name:
//!
//! - [`ConjugateGradient`] and [`Lbfgs`] for smooth unconstrained problems
//! - [`Bleic`] for bound and linear constraints
//! - [`LevenbergMarquardt`] for least squares with optional box constraints
//! - [`QuadraticProgram`] for convex quadratics with box constraints
//!
//! ## Quick Start
//!
//! ```rust
//! use revopt::prelude::*;
//!
//! #[derive(Debug)]
//! struct Bowl;
//!
//! impl CostFunction for Bowl {
//!     fn cost(&self, x: &DVector) -> Result<Real> {
//!         Ok((x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2))
//!     }
//!
//!     fn cost_and_gradient(&self, x: &DVector, g: &mut DVector) -> Result<Real> {
//!         g[0] = 2.0 * (x[0] - 2.0);
//!         g[1] = 2.0 * (x[1] + 1.0);
//!         self.cost(x)
//!     }
//! }
//!
//! let mut cg = ConjugateGradient::new(2, &DVector::zeros(2)).unwrap();
//! cg.set_cond(1e-10, 0.0, 0.0, 0).unwrap();
//! let report = cg.optimize(&Bowl).unwrap();
//! assert!(report.code() > 0);
//! let (x, _) = cg.results();
//! assert!((x[0] - 2.0).abs() < 1e-6);
//! ```
//!
//! ## Features
//!
//! - `std` (default): standard library support
//! - `serde`: serialization of reports, criteria and enums
//! - `full`: all of the above

pub use revopt_core::{
    cost_function, error, line_search, linalg, numerical_diff, optimizer, preconditioner, types,
};
pub use revopt_optim::{
    bleic, conjugate_gradient, lbfgs, levenberg_marquardt, quadratic_programming,
};

pub use revopt_core::{OptimizerError, Report, Request, Result, StoppingCriterion, TerminationReason};
pub use revopt_optim::{
    ActiveBound, Bleic, CgVariant, ConjugateGradient, ConstraintKind, Lbfgs, LevenbergMarquardt,
    ProblemKind, QuadraticProgram,
};

pub use nalgebra;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use revopt_optim::prelude::*;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use crate::prelude::{DMatrix, DVector, Real};

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_termination_codes_roundtrip_through_facade() {
        for code in [-10, -5, -3, -2, -1, 1, 2, 4, 5, 7, 8] {
            let reason = TerminationReason::from_code(code).unwrap();
            assert_eq!(reason.code(), code);
        }
        assert!(TerminationReason::from_code(3).is_none());
    }

    #[test]
    fn test_qp_and_lm_agree_through_facade() {
        // min 0.5 x'Ax + b'x with x <= 0.25, both bounds active at the solution.
        let a = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_vec(vec![-2.0, -1.0]);
        let lower = DVector::from_element(2, Real::NEG_INFINITY);
        let upper = DVector::from_element(2, 0.25);

        let mut qp = QuadraticProgram::new(2).unwrap();
        qp.set_quadratic_term(&a, true).unwrap();
        qp.set_linear_term(&b).unwrap();
        qp.set_bc(&lower, &upper).unwrap();
        assert_eq!(qp.optimize().termination, Some(TerminationReason::Converged));

        let problem = cost_function::QuadraticCost::new(a, b).unwrap();
        let mut lm = LevenbergMarquardt::with_hessian(2, &DVector::zeros(2)).unwrap();
        lm.set_bc(&lower, &upper).unwrap();
        lm.set_cond(0.0, 0.0, 1e-12, 0).unwrap();
        let report = lm.optimize(&problem).unwrap();
        assert!(report.termination.unwrap().is_success(), "{}", report);

        let (x, _) = lm.results();
        assert_relative_eq!(x, qp.solution().clone(), epsilon = 1e-8);
        assert_eq!(qp.active_constraints()[0], ActiveBound::Upper);
    }
}
