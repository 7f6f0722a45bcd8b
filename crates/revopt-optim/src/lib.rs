//! RevOpt Optimization - dense reverse-communication optimizers.
//!
//! Every engine in this crate is a state machine: [`iterate`] advances it
//! until it needs a function value, a gradient, a residual vector or a
//! Jacobian, then returns `true` with the pending [`Request`]. The caller
//! evaluates the problem at `x()`, writes the result into the engine's
//! public fields and calls `iterate` again. A `false` return means the run
//! is over; the outcome is in the [`Report`].
//!
//! # Available Optimizers
//!
//! - **CG**: nonlinear conjugate gradient (Dai-Yuan and hybrid DY/HS)
//! - **L-BFGS**: limited-memory quasi-Newton with optional preconditioning
//! - **BLEIC**: bound and linear equality/inequality constrained minimization
//! - **LM**: Levenberg-Marquardt for least squares and Hessian-based problems
//! - **QP**: box-constrained convex quadratic programming
//!
//! # Examples
//!
//! ```rust
//! use revopt_optim::Lbfgs;
//! use revopt_core::{optimizer::Request, types::DVector};
//!
//! let mut state = Lbfgs::new(2, 2, &DVector::from_vec(vec![3.0, -1.0])).unwrap();
//! state.set_cond(1e-10, 0.0, 0.0, 100).unwrap();
//! while state.iterate() {
//!     if state.request() == Some(Request::FunctionGradient) {
//!         let x = state.x().clone();
//!         state.f = (x[0] - 1.0).powi(2) + 4.0 * x[1] * x[1];
//!         state.g[0] = 2.0 * (x[0] - 1.0);
//!         state.g[1] = 8.0 * x[1];
//!     }
//! }
//! let (x, report) = state.results();
//! assert!(report.code() > 0);
//! assert!((x[0] - 1.0).abs() < 1e-6);
//! ```
//!
//! [`iterate`]: revopt_core::optimizer::Optimizer::iterate
//! [`Request`]: revopt_core::optimizer::Request
//! [`Report`]: revopt_core::optimizer::Report

mod evaluation;

pub mod bleic;
pub mod conjugate_gradient;
pub mod lbfgs;
pub mod levenberg_marquardt;
pub mod quadratic_programming;

// Re-export main optimizers for convenience
pub use bleic::{Bleic, ConstraintKind};
pub use conjugate_gradient::{CgVariant, ConjugateGradient};
pub use lbfgs::Lbfgs;
pub use levenberg_marquardt::{LevenbergMarquardt, ProblemKind};
pub use quadratic_programming::{ActiveBound, QuadraticProgram};

// Re-export commonly used items from core
pub use revopt_core::{
    optimizer::{Optimizer, Report, Request, StoppingCriterion, TerminationReason},
    preconditioner::Preconditioner,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        ActiveBound, Bleic, CgVariant, ConjugateGradient, ConstraintKind, Lbfgs,
        LevenbergMarquardt, ProblemKind, QuadraticProgram,
    };
    pub use revopt_core::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use revopt_core::types::DVector;

    #[test]
    fn test_exports() {
        let x0 = DVector::zeros(3);
        let engines: Vec<Box<dyn Optimizer>> = vec![
            Box::new(ConjugateGradient::new(3, &x0).unwrap()),
            Box::new(Lbfgs::new(3, 3, &x0).unwrap()),
            Box::new(Bleic::new(3, &x0).unwrap()),
            Box::new(LevenbergMarquardt::with_jacobian(3, 2, &x0).unwrap()),
        ];
        for engine in &engines {
            assert!(!engine.name().is_empty());
            assert!(engine.request().is_none());
        }
        assert_eq!(CgVariant::default(), CgVariant::Hybrid);
        assert_eq!(ActiveBound::default(), ActiveBound::Free);
    }
}
