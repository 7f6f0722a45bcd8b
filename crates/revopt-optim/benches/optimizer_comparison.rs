//! Benchmarks comparing the engines on shared problems
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use revopt_core::{
    cost_function::{CostFunction, LeastSquaresProblem, QuadraticCost},
    error::Result,
    types::{DMatrix, DVector, Real},
};
use revopt_optim::{Bleic, CgVariant, ConjugateGradient, Lbfgs, LevenbergMarquardt, QuadraticProgram};

/// Extended Rosenbrock function
#[derive(Debug)]
struct Rosenbrock;

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

/// Rosenbrock residuals `(10 (x_{2k+1} - x_{2k}^2), 1 - x_{2k})`
#[derive(Debug)]
struct RosenbrockResiduals;

impl LeastSquaresProblem for RosenbrockResiduals {
    fn residuals(&self, x: &DVector, fi: &mut DVector) -> Result<()> {
        for k in (0..x.len()).step_by(2) {
            fi[k] = 10.0 * (x[k + 1] - x[k] * x[k]);
            fi[k + 1] = 1.0 - x[k];
        }
        Ok(())
    }

    fn residuals_and_jacobian(&self, x: &DVector, fi: &mut DVector, jac: &mut DMatrix) -> Result<()> {
        self.residuals(x, fi)?;
        jac.fill(0.0);
        for k in (0..x.len()).step_by(2) {
            jac[(k, k)] = -20.0 * x[k];
            jac[(k, k + 1)] = 10.0;
            jac[(k + 1, k)] = -1.0;
        }
        Ok(())
    }
}

fn laplacian(n: usize) -> QuadraticCost {
    let mut a = DMatrix::zeros(n, n);
    for i in 0..n {
        a[(i, i)] = 2.0;
        if i + 1 < n {
            a[(i, i + 1)] = -1.0;
            a[(i + 1, i)] = -1.0;
        }
    }
    QuadraticCost::new(a, DVector::from_element(n, -1.0)).unwrap()
}

fn starting_point(n: usize) -> DVector {
    DVector::from_fn(n, |i, _| if i % 2 == 0 { -1.2 } else { 1.0 })
}

fn benchmark_rosenbrock(c: &mut Criterion) {
    let mut group = c.benchmark_group("rosenbrock");

    for &dim in &[10, 50, 100] {
        let x0 = starting_point(dim);

        for variant in [CgVariant::DaiYuan, CgVariant::Hybrid] {
            group.bench_with_input(
                BenchmarkId::new(format!("cg_{:?}", variant), dim),
                &dim,
                |b, &dim| {
                    b.iter(|| {
                        let mut cg = ConjugateGradient::new(dim, &x0).unwrap();
                        cg.set_cg_type(variant);
                        cg.set_cond(1e-6, 0.0, 0.0, 2000).unwrap();
                        black_box(cg.optimize(&Rosenbrock).unwrap())
                    })
                },
            );
        }

        for &memory in &[3, 7] {
            group.bench_with_input(
                BenchmarkId::new(format!("lbfgs_m{}", memory), dim),
                &dim,
                |b, &dim| {
                    b.iter(|| {
                        let mut lbfgs = Lbfgs::new(dim, memory, &x0).unwrap();
                        lbfgs.set_cond(1e-6, 0.0, 0.0, 2000).unwrap();
                        black_box(lbfgs.optimize(&Rosenbrock).unwrap())
                    })
                },
            );
        }

        group.bench_with_input(BenchmarkId::new("lm", dim), &dim, |b, &dim| {
            b.iter(|| {
                let mut lm = LevenbergMarquardt::with_jacobian(dim, dim, &x0).unwrap();
                lm.set_cond(0.0, 0.0, 1e-10, 500).unwrap();
                black_box(lm.optimize_least_squares(&RosenbrockResiduals).unwrap())
            })
        });
    }

    group.finish();
}

fn benchmark_bounded_quadratic(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_quadratic");

    for &dim in &[10, 50, 100] {
        let problem = laplacian(dim);
        let lower = DVector::from_element(dim, Real::NEG_INFINITY);
        let upper = DVector::from_element(dim, 5.0);

        group.bench_with_input(BenchmarkId::new("qp", dim), &dim, |b, &dim| {
            b.iter(|| {
                let mut qp = QuadraticProgram::new(dim).unwrap();
                qp.set_quadratic_term(problem.matrix(), true).unwrap();
                qp.set_linear_term(problem.linear()).unwrap();
                qp.set_bc(&lower, &upper).unwrap();
                black_box(qp.optimize())
            })
        });

        group.bench_with_input(BenchmarkId::new("bleic", dim), &dim, |b, &dim| {
            b.iter(|| {
                let mut bleic = Bleic::new(dim, &DVector::zeros(dim)).unwrap();
                bleic.set_bc(&lower, &upper).unwrap();
                bleic.set_inner_cond(1e-6, 0.0, 0.0).unwrap();
                black_box(bleic.optimize(&problem).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_rosenbrock, benchmark_bounded_quadratic);
criterion_main!(benches);
