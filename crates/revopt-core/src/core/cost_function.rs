//! Cost function interfaces for the convenience drivers.
//!
//! The engines themselves never call user code: they suspend and ask the
//! caller for values (see [`Request`](crate::optimization::optimizer::Request)).
//! The traits in this module let the `optimize` drivers answer those requests
//! automatically.
//!
//! - [`CostFunction`]: scalar objective with optional gradient and Hessian
//! - [`LeastSquaresProblem`]: residual vector `f_i(x)` with optional Jacobian,
//!   minimized as `F(x) = sum_i f_i(x)^2`

use crate::{
    error::{OptimizerError, Result},
    types::{DMatrix, DVector, Real},
};
use std::fmt::Debug;

/// Scalar objective `F: R^n -> R`.
pub trait CostFunction: Debug {
    /// Evaluates the objective at `x`.
    fn cost(&self, x: &DVector) -> Result<Real>;

    /// Evaluates the objective and writes its gradient into `gradient`.
    ///
    /// # Default Implementation
    ///
    /// Returns an evaluation error. Engines created in numerical
    /// differentiation mode only ever call [`cost`](Self::cost).
    fn cost_and_gradient(&self, x: &DVector, gradient: &mut DVector) -> Result<Real> {
        let _ = (x, gradient);
        Err(OptimizerError::evaluation(
            "gradient not implemented for this cost function",
        ))
    }

    /// Evaluates the objective, its gradient and its Hessian.
    ///
    /// # Default Implementation
    ///
    /// Returns an evaluation error. Override for the function/gradient/Hessian
    /// mode of the Levenberg-Marquardt engine.
    fn cost_gradient_hessian(
        &self,
        x: &DVector,
        gradient: &mut DVector,
        hessian: &mut DMatrix,
    ) -> Result<Real> {
        let _ = (x, gradient, hessian);
        Err(OptimizerError::evaluation(
            "Hessian not implemented for this cost function",
        ))
    }
}

/// Vector of residuals `f_i: R^n -> R^m`.
pub trait LeastSquaresProblem: Debug {
    /// Writes the residual vector at `x` into `fi`.
    fn residuals(&self, x: &DVector, fi: &mut DVector) -> Result<()>;

    /// Writes residuals and the `m x n` Jacobian at `x`.
    ///
    /// # Default Implementation
    ///
    /// Returns an evaluation error; problems driven through the
    /// finite-difference mode never need it.
    fn residuals_and_jacobian(
        &self,
        x: &DVector,
        fi: &mut DVector,
        jac: &mut DMatrix,
    ) -> Result<()> {
        let _ = (x, fi, jac);
        Err(OptimizerError::evaluation(
            "Jacobian not implemented for this problem",
        ))
    }
}

/// Convex quadratic `F(x) = 0.5 x'Ax + b'x`.
///
/// Used throughout the test-suite and benchmarks as a problem with a known
/// minimizer `-A^{-1}b`.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    a: DMatrix,
    b: DVector,
}

impl QuadraticCost {
    /// Creates a quadratic from a symmetric matrix and a linear term.
    pub fn new(a: DMatrix, b: DVector) -> Result<Self> {
        let n = b.len();
        if a.nrows() != n || a.ncols() != n {
            return Err(OptimizerError::dimension_mismatch(
                "a",
                format!("({n}, {n})"),
                format!("({}, {})", a.nrows(), a.ncols()),
            ));
        }
        Ok(Self { a, b })
    }

    /// Problem dimension.
    pub fn dimension(&self) -> usize {
        self.b.len()
    }

    /// Quadratic term.
    pub fn matrix(&self) -> &DMatrix {
        &self.a
    }

    /// Linear term.
    pub fn linear(&self) -> &DVector {
        &self.b
    }
}

impl CostFunction for QuadraticCost {
    fn cost(&self, x: &DVector) -> Result<Real> {
        Ok(0.5 * x.dot(&(&self.a * x)) + self.b.dot(x))
    }

    fn cost_and_gradient(&self, x: &DVector, gradient: &mut DVector) -> Result<Real> {
        let ax = &self.a * x;
        gradient.copy_from(&(&ax + &self.b));
        Ok(0.5 * x.dot(&ax) + self.b.dot(x))
    }

    fn cost_gradient_hessian(
        &self,
        x: &DVector,
        gradient: &mut DVector,
        hessian: &mut DMatrix,
    ) -> Result<Real> {
        hessian.copy_from(&self.a);
        self.cost_and_gradient(x, gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Debug)]
    struct ValueOnly;

    impl CostFunction for ValueOnly {
        fn cost(&self, x: &DVector) -> Result<Real> {
            Ok(x.norm_squared())
        }
    }

    #[test]
    fn test_quadratic_cost() {
        let a = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0]));
        let b = DVector::from_vec(vec![-2.0, -4.0]);
        let q = QuadraticCost::new(a, b).unwrap();

        let x = DVector::from_vec(vec![1.0, 2.0]);
        let mut g = DVector::zeros(2);
        let f = q.cost_and_gradient(&x, &mut g).unwrap();
        assert_relative_eq!(f, -5.0);
        assert_relative_eq!(g.norm(), 0.0);

        let mut h = DMatrix::zeros(2, 2);
        q.cost_gradient_hessian(&x, &mut g, &mut h).unwrap();
        assert_relative_eq!(h[(0, 0)], 2.0);
        assert_relative_eq!(h[(0, 1)], 0.0);
    }

    #[test]
    fn test_quadratic_dimension_check() {
        let a = DMatrix::zeros(2, 3);
        let b = DVector::zeros(2);
        assert!(QuadraticCost::new(a, b).is_err());
    }

    #[test]
    fn test_default_derivatives_are_errors() {
        let f = ValueOnly;
        let x = DVector::zeros(2);
        let mut g = DVector::zeros(2);
        assert_eq!(f.cost(&x).unwrap(), 0.0);
        assert!(matches!(
            f.cost_and_gradient(&x, &mut g),
            Err(OptimizerError::Evaluation { .. })
        ));
    }
}
