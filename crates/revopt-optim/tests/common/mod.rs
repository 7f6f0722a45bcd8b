//! Problems shared by the integration tests.

#![allow(dead_code)]

use revopt_core::{
    cost_function::{CostFunction, LeastSquaresProblem, QuadraticCost},
    error::Result,
    types::{DMatrix, DVector, Real},
};

/// `f(x, y) = (x - 1)^2 + (y - 2)^2`, i.e. `A = diag(2, 2)`, `b = (-2, -4)`
/// up to the constant 5.
pub fn bowl() -> QuadraticCost {
    QuadraticCost::new(
        DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0])),
        DVector::from_vec(vec![-2.0, -4.0]),
    )
    .unwrap()
}

/// Tridiagonal SPD quadratic of dimension `n` with minimizer `(1, ..., 1)`.
pub fn tridiagonal(n: usize) -> QuadraticCost {
    let mut a = DMatrix::zeros(n, n);
    for i in 0..n {
        a[(i, i)] = 4.0;
        if i + 1 < n {
            a[(i, i + 1)] = -1.0;
            a[(i + 1, i)] = -1.0;
        }
    }
    let b = -(&a * DVector::from_element(n, 1.0));
    QuadraticCost::new(a, b).unwrap()
}

/// Extended Rosenbrock function in even dimension.
#[derive(Debug)]
pub struct Rosenbrock;

impl CostFunction for Rosenbrock {
    fn cost(&self, x: &DVector) -> Result<Real> {
        let mut f = 0.0;
        for k in (0..x.len()).step_by(2) {
            f += 100.0 * (x[k + 1] - x[k] * x[k]).powi(2) + (1.0 - x[k]).powi(2);
        }
        Ok(f)
    }

    fn cost_and_gradient(&self, x: &DVector, g: &mut DVector) -> Result<Real> {
        for k in (0..x.len()).step_by(2) {
            let t = x[k + 1] - x[k] * x[k];
            g[k] = -400.0 * t * x[k] - 2.0 * (1.0 - x[k]);
            g[k + 1] = 200.0 * t;
        }
        self.cost(x)
    }
}

/// Residuals `r_i = x_i - target_i` scaled by `weights_i`.
#[derive(Debug)]
pub struct WeightedResiduals {
    pub weights: DVector,
    pub target: DVector,
}

impl LeastSquaresProblem for WeightedResiduals {
    fn residuals(&self, x: &DVector, fi: &mut DVector) -> Result<()> {
        for i in 0..self.target.len() {
            fi[i] = self.weights[i] * (x[i] - self.target[i]);
        }
        Ok(())
    }

    fn residuals_and_jacobian(&self, x: &DVector, fi: &mut DVector, jac: &mut DMatrix) -> Result<()> {
        self.residuals(x, fi)?;
        jac.fill(0.0);
        for i in 0..self.target.len() {
            jac[(i, i)] = self.weights[i];
        }
        Ok(())
    }
}

/// Exponential decay fit `y = a exp(-b t)` to noiseless samples.
#[derive(Debug)]
pub struct ExponentialFit {
    pub t: Vec<Real>,
    pub y: Vec<Real>,
}

impl ExponentialFit {
    pub fn new(a: Real, b: Real, samples: usize) -> Self {
        let t: Vec<Real> = (0..samples).map(|i| i as Real * 0.25).collect();
        let y = t.iter().map(|ti| a * (-b * ti).exp()).collect();
        Self { t, y }
    }
}

impl LeastSquaresProblem for ExponentialFit {
    fn residuals(&self, x: &DVector, fi: &mut DVector) -> Result<()> {
        for (i, (ti, yi)) in self.t.iter().zip(self.y.iter()).enumerate() {
            fi[i] = x[0] * (-x[1] * ti).exp() - yi;
        }
        Ok(())
    }

    fn residuals_and_jacobian(&self, x: &DVector, fi: &mut DVector, jac: &mut DMatrix) -> Result<()> {
        self.residuals(x, fi)?;
        for (i, ti) in self.t.iter().enumerate() {
            let e = (-x[1] * ti).exp();
            jac[(i, 0)] = e;
            jac[(i, 1)] = -x[0] * ti * e;
        }
        Ok(())
    }
}
