//! Dense convex quadratic programming with box constraints.
//!
//! Solves
//!
//! ```text
//! min  0.5 (x - x0)' A (x - x0) + b' (x - x0)
//! s.t. l <= x <= u
//! ```
//!
//! with a Cholesky-based active-set iteration. The objective is known in
//! closed form, so [`QuadraticProgram::optimize`] runs synchronously without
//! reverse communication.
//!
//! The diagonal of `A` is stored apart from the off-diagonal part, which
//! lets [`rewrite_diagonal`](QuadraticProgram::rewrite_diagonal) change the
//! damping of a Levenberg-Marquardt model without touching the rest.
//!
//! # Example
//!
//! ```rust
//! use revopt_core::prelude::*;
//! use revopt_optim::QuadraticProgram;
//!
//! # fn main() -> revopt_core::Result<()> {
//! let mut qp = QuadraticProgram::new(2)?;
//! qp.set_quadratic_term(&DMatrix::identity(2, 2), true)?;
//! qp.set_linear_term(&DVector::from_vec(vec![-2.0, -2.0]))?;
//! qp.set_bc(
//!     &DVector::from_vec(vec![f64::NEG_INFINITY, 0.0]),
//!     &DVector::from_vec(vec![f64::INFINITY, 1.0]),
//! )?;
//! let report = qp.optimize();
//! assert_eq!(report.termination, Some(TerminationReason::Converged));
//! let (x, _) = qp.results();
//! assert!((x[0] - 2.0).abs() < 1e-12 && (x[1] - 1.0).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

use log::{debug, info, warn};
use revopt_core::{
    error::{OptimizerError, Result},
    linalg::{symmetric_from_triangle, try_cholesky},
    optimizer::{Report, TerminationReason},
    types::{check_bounds, check_matrix, check_vector, DMatrix, DVector, Real},
};

/// Outer iterations allowed to settle the active set of `n` variables.
fn outer_iteration_limit(n: usize) -> usize {
    5 * n + 10
}

/// State of a variable with respect to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActiveBound {
    /// Not constrained at the current point
    #[default]
    Free,
    /// At its lower bound, gradient pointing outwards
    Lower,
    /// At its upper bound, gradient pointing outwards
    Upper,
    /// Lower and upper bounds coincide
    Fixed,
}

impl ActiveBound {
    /// Returns `true` unless the variable is free.
    pub fn is_active(&self) -> bool {
        !matches!(self, ActiveBound::Free)
    }
}

/// Dense box-constrained convex QP solver.
#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    n: usize,
    diagonal: DVector,
    off_diagonal: DMatrix,
    b: DVector,
    origin: DVector,
    start: Option<DVector>,
    lower: DVector,
    upper: DVector,
    x: DVector,
    active: Vec<ActiveBound>,
    report: Report,
}

impl QuadraticProgram {
    /// Creates a solver for `n` variables: `A = 0`, `b = 0`, no bounds.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(OptimizerError::invalid_argument("n", "must be positive"));
        }
        Ok(Self {
            n,
            diagonal: DVector::zeros(n),
            off_diagonal: DMatrix::zeros(n, n),
            b: DVector::zeros(n),
            origin: DVector::zeros(n),
            start: None,
            lower: DVector::from_element(n, Real::NEG_INFINITY),
            upper: DVector::from_element(n, Real::INFINITY),
            x: DVector::zeros(n),
            active: vec![ActiveBound::Free; n],
            report: Report::default(),
        })
    }

    /// Problem dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Sets `A` from its upper (`is_upper`) or lower triangle.
    pub fn set_quadratic_term(&mut self, a: &DMatrix, is_upper: bool) -> Result<()> {
        check_matrix("a", a, self.n, self.n)?;
        let full = symmetric_from_triangle(a, self.n, is_upper);
        self.diagonal = full.diagonal();
        self.off_diagonal = full;
        self.off_diagonal.fill_diagonal(0.0);
        Ok(())
    }

    /// Replaces the diagonal of `A`, keeping the off-diagonal part.
    pub fn rewrite_diagonal(&mut self, d: &DVector) -> Result<()> {
        check_vector("d", d, self.n)?;
        self.diagonal.copy_from(&d.rows(0, self.n));
        Ok(())
    }

    /// Sets the linear term `b`.
    pub fn set_linear_term(&mut self, b: &DVector) -> Result<()> {
        check_vector("b", b, self.n)?;
        self.b.copy_from(&b.rows(0, self.n));
        Ok(())
    }

    /// Sets the origin `x0` of the shifted objective.
    pub fn set_origin(&mut self, x0: &DVector) -> Result<()> {
        check_vector("x0", x0, self.n)?;
        self.origin.copy_from(&x0.rows(0, self.n));
        Ok(())
    }

    /// Sets the point the box iteration starts from; it is clipped into the box.
    pub fn set_starting_point(&mut self, x: &DVector) -> Result<()> {
        check_vector("x", x, self.n)?;
        self.start = Some(x.rows(0, self.n).into_owned());
        Ok(())
    }

    /// Sets box constraints; infinite entries mean "unbounded".
    pub fn set_bc(&mut self, lower: &DVector, upper: &DVector) -> Result<()> {
        check_bounds("bndl", lower, self.n)?;
        check_bounds("bndu", upper, self.n)?;
        if lower.rows(0, self.n).iter().any(|v| *v == Real::INFINITY) {
            return Err(OptimizerError::invalid_argument("bndl", "lower bound is +INF"));
        }
        if upper.rows(0, self.n).iter().any(|v| *v == Real::NEG_INFINITY) {
            return Err(OptimizerError::invalid_argument("bndu", "upper bound is -INF"));
        }
        self.lower.copy_from(&lower.rows(0, self.n));
        self.upper.copy_from(&upper.rows(0, self.n));
        Ok(())
    }

    /// Selects the Cholesky algorithm, the only one available.
    pub fn set_algo_cholesky(&mut self) {}

    /// Full quadratic term `A`.
    pub fn quadratic_term(&self) -> DMatrix {
        let mut a = self.off_diagonal.clone();
        a.set_diagonal(&self.diagonal);
        a
    }

    /// Objective value at `x`.
    pub fn objective(&self, x: &DVector) -> Real {
        let z = x - &self.origin;
        let mut az = &self.off_diagonal * &z;
        az += self.diagonal.component_mul(&z);
        0.5 * z.dot(&az) + self.b.dot(&z)
    }

    fn gradient(&self, x: &DVector) -> DVector {
        let z = x - &self.origin;
        let mut g = &self.off_diagonal * &z;
        g += self.diagonal.component_mul(&z);
        g + &self.b
    }

    fn is_bounded(&self) -> bool {
        self.lower.iter().any(|v| v.is_finite()) || self.upper.iter().any(|v| v.is_finite())
    }

    fn clip(&self, x: &mut DVector) {
        for i in 0..self.n {
            x[i] = x[i].max(self.lower[i]).min(self.upper[i]);
        }
    }

    /// Solves the problem and returns the report.
    pub fn optimize(&mut self) -> Report {
        self.report = Report::default();
        self.active = vec![ActiveBound::Free; self.n];
        let reason = if (0..self.n).any(|i| self.lower[i] > self.upper[i]) {
            self.x = self.start.clone().unwrap_or_else(|| self.origin.clone());
            TerminationReason::InconsistentConstraints
        } else if self.is_bounded() {
            self.solve_box()
        } else {
            self.solve_unconstrained()
        };
        debug!(
            "QP finished after {} outer iterations, {} factorizations",
            self.report.outer_iterations, self.report.cholesky_decompositions
        );
        if !reason.is_success() {
            info!("QP terminated: {}", reason);
        }
        self.report.termination = Some(reason);
        self.report.clone()
    }

    fn solve_unconstrained(&mut self) -> TerminationReason {
        self.report.outer_iterations = 1;
        self.report.iterations = 1;
        self.report.cholesky_decompositions = 1;
        match try_cholesky(self.quadratic_term()) {
            Some(chol) => {
                self.x = &self.origin - chol.solve(&self.b);
                TerminationReason::Converged
            }
            None => {
                self.x = self.origin.clone();
                TerminationReason::IndefiniteQuadratic
            }
        }
    }

    fn solve_box(&mut self) -> TerminationReason {
        let n = self.n;
        let mut x = self.start.clone().unwrap_or_else(|| self.origin.clone());
        self.clip(&mut x);
        let mut f = self.objective(&x);
        let mut previous: Option<Vec<ActiveBound>> = None;
        let a = self.quadratic_term();

        let limit = outer_iteration_limit(n);
        loop {
            if self.report.outer_iterations >= limit {
                warn!(
                    "QP active set still changing after {} outer iterations, keeping f = {:e}",
                    limit, f
                );
                break;
            }
            self.report.outer_iterations += 1;
            self.report.iterations += 1;

            let g = self.gradient(&x);
            let active: Vec<ActiveBound> = (0..n)
                .map(|i| {
                    if self.lower[i] == self.upper[i] {
                        ActiveBound::Fixed
                    } else if x[i] == self.lower[i] && g[i] >= 0.0 {
                        ActiveBound::Lower
                    } else if x[i] == self.upper[i] && g[i] <= 0.0 {
                        ActiveBound::Upper
                    } else {
                        ActiveBound::Free
                    }
                })
                .collect();
            if previous.as_ref() == Some(&active) {
                break;
            }
            self.active = active.clone();
            previous = Some(active);

            let free: Vec<usize> = (0..n).filter(|&i| !self.active[i].is_active()).collect();
            if free.is_empty() {
                break;
            }

            // Fixed variables enter the free sub-problem through a linear term.
            let z = &x - &self.origin;
            let k = free.len();
            let a_ff = DMatrix::from_fn(k, k, |r, c| a[(free[r], free[c])]);
            let rhs = DVector::from_fn(k, |r, _| {
                let i = free[r];
                let mut v = self.b[i];
                for j in 0..n {
                    if self.active[j].is_active() {
                        v += a[(i, j)] * z[j];
                    }
                }
                v
            });
            self.report.cholesky_decompositions += 1;
            let chol = match try_cholesky(a_ff) {
                Some(chol) => chol,
                None => {
                    self.x = x;
                    return TerminationReason::IndefiniteQuadratic;
                }
            };
            let z_free = -chol.solve(&rhs);

            let mut target = x.clone();
            for (r, &i) in free.iter().enumerate() {
                target[i] = self.origin[i] + z_free[r];
            }

            let mut clipped = target.clone();
            self.clip(&mut clipped);
            let f_clipped = self.objective(&clipped);
            if f_clipped < f {
                x = clipped;
                f = f_clipped;
                continue;
            }

            let direction = &target - &x;
            let mut t_max: Real = 1.0;
            for i in 0..n {
                if direction[i] < 0.0 && self.lower[i].is_finite() {
                    t_max = t_max.min((self.lower[i] - x[i]) / direction[i]);
                } else if direction[i] > 0.0 && self.upper[i].is_finite() {
                    t_max = t_max.min((self.upper[i] - x[i]) / direction[i]);
                }
            }
            let mut stepped = &x + &direction * t_max.max(0.0);
            self.clip(&mut stepped);
            let f_stepped = self.objective(&stepped);
            if f_stepped < f {
                x = stepped;
                f = f_stepped;
                continue;
            }
            debug!("QP stopped: no strict decrease at f = {:e}", f);
            break;
        }
        self.x = x;
        TerminationReason::Converged
    }

    /// Solution and report.
    pub fn results(&self) -> (DVector, Report) {
        (self.x.clone(), self.report.clone())
    }

    /// Copies the solution and the report into caller-owned buffers.
    pub fn results_buffered(&self, x: &mut DVector, report: &mut Report) -> Result<()> {
        if x.len() < self.n {
            return Err(OptimizerError::dimension_mismatch("x", self.n, x.len()));
        }
        x.rows_mut(0, self.n).copy_from(&self.x);
        *report = self.report.clone();
        Ok(())
    }

    /// Solution of the last [`optimize`](Self::optimize) call.
    pub fn solution(&self) -> &DVector {
        &self.x
    }

    /// Bound state of each variable at the last outer iteration.
    pub fn active_constraints(&self) -> &[ActiveBound] {
        &self.active
    }
}
