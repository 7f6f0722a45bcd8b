//! Integration tests for revopt-optim
//!
//! These tests run every engine on the same problems and check that they
//! agree with each other and with the closed-form solution.

mod common;

use approx::assert_relative_eq;
use common::{tridiagonal, WeightedResiduals};
use revopt_core::{
    cost_function::CostFunction,
    optimizer::{Optimizer, TerminationReason},
    types::{DMatrix, DVector, Real},
};
use revopt_optim::{Bleic, ConjugateGradient, Lbfgs, LevenbergMarquardt, QuadraticProgram};

#[test]
fn test_all_engines_agree_on_a_quadratic() {
    let n = 6;
    let problem = tridiagonal(n);
    let x0 = DVector::from_fn(n, |i, _| i as Real - 2.0);

    let mut qp = QuadraticProgram::new(n).unwrap();
    qp.set_quadratic_term(problem.matrix(), true).unwrap();
    qp.set_linear_term(problem.linear()).unwrap();
    qp.optimize();
    let exact = qp.solution().clone();

    let mut cg = ConjugateGradient::new(n, &x0).unwrap();
    cg.set_cond(1e-10, 0.0, 0.0, 0).unwrap();
    cg.optimize(&problem).unwrap();

    let mut lbfgs = Lbfgs::new(n, 4, &x0).unwrap();
    lbfgs.set_cond(1e-10, 0.0, 0.0, 0).unwrap();
    lbfgs.optimize(&problem).unwrap();

    let mut bleic = Bleic::new(n, &x0).unwrap();
    bleic.set_inner_cond(1e-10, 0.0, 0.0).unwrap();
    bleic.optimize(&problem).unwrap();

    let mut lm = LevenbergMarquardt::with_hessian(n, &x0).unwrap();
    lm.set_cond(0.0, 0.0, 1e-12, 0).unwrap();
    lm.optimize(&problem).unwrap();

    for x in [cg.results().0, lbfgs.results().0, bleic.results().0, lm.results().0] {
        assert_relative_eq!(x, exact, epsilon = 1e-7);
    }
    let engines: [&dyn Optimizer; 4] = [&cg, &lbfgs, &bleic, &lm];
    for engine in engines {
        let reason = engine.report().termination.unwrap();
        assert!(reason.is_success(), "{}: {}", engine.name(), reason);
    }
}

#[test]
fn test_least_squares_matches_normal_equations() {
    // Overdetermined linear fit: residuals are J x - y.
    #[derive(Debug)]
    struct LinearFit {
        design: DMatrix,
        observed: DVector,
    }

    impl revopt_core::cost_function::LeastSquaresProblem for LinearFit {
        fn residuals(&self, x: &DVector, fi: &mut DVector) -> revopt_core::error::Result<()> {
            fi.copy_from(&(&self.design * x - &self.observed));
            Ok(())
        }

        fn residuals_and_jacobian(
            &self,
            x: &DVector,
            fi: &mut DVector,
            jac: &mut DMatrix,
        ) -> revopt_core::error::Result<()> {
            self.residuals(x, fi)?;
            jac.copy_from(&self.design);
            Ok(())
        }
    }

    let design = DMatrix::from_row_slice(
        5,
        2,
        &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0],
    );
    let observed = DVector::from_vec(vec![1.1, 2.9, 5.2, 6.8, 9.1]);
    let normal = design.tr_mul(&design);
    let expected = normal
        .cholesky()
        .unwrap()
        .solve(&design.tr_mul(&observed));

    let problem = LinearFit { design, observed };
    let mut lm = LevenbergMarquardt::with_jacobian(2, 5, &DVector::zeros(2)).unwrap();
    lm.set_cond(0.0, 0.0, 1e-12, 0).unwrap();
    let report = lm.optimize_least_squares(&problem).unwrap();

    assert!(report.termination.unwrap().is_success(), "{}", report);
    assert_relative_eq!(lm.results().0, expected, epsilon = 1e-8);
}

#[test]
fn test_termination_request_is_honoured_by_every_first_order_engine() {
    let problem = WeightedResiduals {
        weights: DVector::from_vec(vec![1.0, 10.0, 100.0]),
        target: DVector::from_vec(vec![1.0, -1.0, 0.5]),
    };
    let sum_of_squares = |x: &DVector| -> Real {
        let mut fi = DVector::zeros(3);
        revopt_core::cost_function::LeastSquaresProblem::residuals(&problem, x, &mut fi).unwrap();
        fi.norm_squared()
    };
    let x0 = DVector::zeros(3);

    let mut cg = ConjugateGradient::with_numerical_gradient(3, &x0, 1e-6).unwrap();
    cg.request_termination();
    let mut lbfgs = Lbfgs::with_numerical_gradient(3, 2, &x0, 1e-6).unwrap();
    lbfgs.request_termination();

    while cg.iterate() {
        let x = cg.x().clone();
        cg.f = sum_of_squares(&x);
    }
    while lbfgs.iterate() {
        let x = lbfgs.x().clone();
        lbfgs.f = sum_of_squares(&x);
    }

    assert_eq!(cg.report().termination, Some(TerminationReason::UserRequested));
    assert_eq!(lbfgs.report().termination, Some(TerminationReason::UserRequested));
    assert_eq!(cg.results().0, x0);
    assert_eq!(lbfgs.results().0, x0);
}

#[test]
fn test_quadratic_cost_is_minimized_by_the_qp_and_cg_alike() {
    let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
    let b = DVector::from_vec(vec![1.0, -2.0, 3.0]);
    let problem = revopt_core::cost_function::QuadraticCost::new(a.clone(), b.clone()).unwrap();

    let mut qp = QuadraticProgram::new(3).unwrap();
    qp.set_quadratic_term(&a, true).unwrap();
    qp.set_linear_term(&b).unwrap();
    qp.optimize();

    let mut cg = ConjugateGradient::new(3, &DVector::zeros(3)).unwrap();
    cg.set_cond(1e-12, 0.0, 0.0, 0).unwrap();
    cg.optimize(&problem).unwrap();

    let f_qp = problem.cost(qp.solution()).unwrap();
    let f_cg = problem.cost(&cg.results().0).unwrap();
    assert_relative_eq!(f_qp, f_cg, epsilon = 1e-12);
    assert_relative_eq!(qp.objective(qp.solution()), f_qp, epsilon = 1e-12);
}
