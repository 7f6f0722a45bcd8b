//! Integration tests for the L-BFGS engine

mod common;

use approx::assert_relative_eq;
use common::{bowl, tridiagonal, Rosenbrock};
use pretty_assertions::assert_eq;
use revopt_core::{
    cost_function::CostFunction,
    optimizer::Request,
    types::{DMatrix, DVector, Real},
};
use revopt_optim::Lbfgs;

#[test]
fn test_bowl_from_origin() {
    let mut state = Lbfgs::new(2, 2, &DVector::zeros(2)).unwrap();
    state.set_cond(0.0, 0.0, 1e-8, 0).unwrap();
    let report = state.optimize(&bowl()).unwrap();

    assert!(report.termination.unwrap().is_success(), "{}", report);
    let (x, _) = state.results();
    assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(x[1], 2.0, epsilon = 1e-6);
}

#[test]
fn test_quadratic_exactness_with_small_memory() {
    let n = 20;
    let problem = tridiagonal(n);
    for m in [1, 3, 7] {
        let mut state = Lbfgs::new(n, m, &DVector::zeros(n)).unwrap();
        state.set_cond(1e-10, 0.0, 0.0, 0).unwrap();
        let report = state.optimize(&problem).unwrap();
        assert!(report.termination.unwrap().is_success(), "m = {}: {}", m, report);
        let (x, _) = state.results();
        for i in 0..n {
            assert_relative_eq!(x[i], 1.0, epsilon = 1e-7);
        }
    }
}

#[test]
fn test_diagonal_preconditioner_on_badly_scaled_quadratic() {
    let n = 6;
    let diagonal = DVector::from_fn(n, |i, _| (10.0 as Real).powi(i as i32));
    let problem = revopt_core::cost_function::QuadraticCost::new(
        DMatrix::from_diagonal(&diagonal),
        -diagonal.clone(),
    )
    .unwrap();

    let mut plain = Lbfgs::new(n, 3, &DVector::zeros(n)).unwrap();
    plain.set_cond(1e-8, 0.0, 0.0, 1000).unwrap();
    let plain_report = plain.optimize(&problem).unwrap();

    let mut preconditioned = Lbfgs::new(n, 3, &DVector::zeros(n)).unwrap();
    preconditioned.set_cond(1e-8, 0.0, 0.0, 1000).unwrap();
    preconditioned.set_precondition_diag(&diagonal).unwrap();
    let report = preconditioned.optimize(&problem).unwrap();

    assert!(report.termination.unwrap().is_success(), "{}", report);
    assert!(report.iterations <= plain_report.iterations);
    let (x, _) = preconditioned.results();
    for i in 0..n {
        assert_relative_eq!(x[i], 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_reported_values_never_increase() {
    let mut state = Lbfgs::new(2, 5, &DVector::from_vec(vec![-1.2, 1.0])).unwrap();
    state.set_cond(1e-8, 0.0, 0.0, 200).unwrap();
    state.set_xrep(true);

    let mut values = Vec::new();
    while state.iterate() {
        match state.request() {
            Some(Request::FunctionGradient) => {
                let x = state.x().clone();
                state.f = Rosenbrock.cost_and_gradient(&x, &mut state.g).unwrap();
            }
            Some(Request::Report) => values.push(state.f),
            other => panic!("unexpected request {:?}", other),
        }
    }

    assert!(values.len() > 2);
    for pair in values.windows(2) {
        assert!(pair[1] <= pair[0], "{} followed by {}", pair[0], pair[1]);
    }
}

#[test]
fn test_restart_matches_fresh_state() {
    let x0 = DVector::from_vec(vec![-1.2, 1.0, -1.2, 1.0]);
    let mut fresh = Lbfgs::new(4, 3, &x0).unwrap();
    fresh.set_cond(1e-8, 0.0, 0.0, 300).unwrap();
    let fresh_report = fresh.optimize(&Rosenbrock).unwrap();

    let mut reused = Lbfgs::new(4, 3, &DVector::zeros(4)).unwrap();
    reused.set_cond(1e-8, 0.0, 0.0, 300).unwrap();
    reused.optimize(&Rosenbrock).unwrap();
    reused.restart(&x0).unwrap();
    let reused_report = reused.optimize(&Rosenbrock).unwrap();

    assert_eq!(fresh_report, reused_report);
    assert_eq!(fresh.results().0, reused.results().0);
}

#[test]
fn test_results_buffered_accepts_longer_buffer() {
    let mut state = Lbfgs::new(2, 2, &DVector::zeros(2)).unwrap();
    state.set_cond(1e-10, 0.0, 0.0, 0).unwrap();
    state.optimize(&bowl()).unwrap();

    let mut x = DVector::from_element(4, Real::NAN);
    let mut report = Default::default();
    state.results_buffered(&mut x, &mut report).unwrap();
    assert_relative_eq!(x[0], 1.0, epsilon = 1e-8);
    assert_relative_eq!(x[1], 2.0, epsilon = 1e-8);
    assert!(x[2].is_nan());
    assert_eq!(&report, state.report());

    let mut short = DVector::zeros(1);
    assert!(state.results_buffered(&mut short, &mut report).is_err());
}
