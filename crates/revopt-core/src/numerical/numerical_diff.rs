//! Finite-difference derivatives driven by reverse communication.
//!
//! Both differentiators work the same way: [`start`](NumericalGradient::start)
//! builds a list of sample points around `x`, the engine asks its caller for
//! the function at every sample returned by `next_sample`, feeds each value back
//! with `record`, and reads the derivative once no sample remains.
//!
//! The gradient uses the 4-point stencil
//!
//! ```text
//! g_i = (8 (f(x + h/2) - f(x - h/2)) - (f(x + h) - f(x - h))) / (6 h),   h = diff_step * s_i
//! ```
//!
//! When box constraints are attached and a stencil point would leave the box,
//! the coordinate falls back to a two-point difference between the clipped
//! points `max(x_i - h, l_i)` and `min(x_i + h, u_i)`. Fixed variables
//! (`l_i == u_i`) get a zero derivative without any evaluation.

use crate::{
    error::{OptimizerError, Result},
    types::{DMatrix, DVector, Real},
};

/// One evaluation of the stencil: coordinate, its value and its weight.
#[derive(Debug, Clone, Copy)]
struct Sample {
    index: usize,
    value: Real,
    weight: Real,
}

fn check_diff_step(diff_step: Real) -> Result<()> {
    if !diff_step.is_finite() {
        return Err(OptimizerError::not_finite("diff_step"));
    }
    if diff_step <= 0.0 {
        return Err(OptimizerError::invalid_argument(
            "diff_step",
            "must be positive",
        ));
    }
    Ok(())
}

/// Two clipped samples for coordinate `i`, or none when the variable is fixed.
fn clipped_pair(samples: &mut Vec<Sample>, i: usize, xi: Real, h: Real, lo: Real, hi: Real) {
    let a = (xi - h).max(lo);
    let b = (xi + h).min(hi);
    if b > a {
        let w = 1.0 / (b - a);
        samples.push(Sample { index: i, value: a, weight: -w });
        samples.push(Sample { index: i, value: b, weight: w });
    }
}

/// Reverse-communication numerical gradient.
#[derive(Debug, Clone)]
pub struct NumericalGradient {
    diff_step: Real,
    bounds: Option<(DVector, DVector)>,
    samples: Vec<Sample>,
    cursor: usize,
    gradient: DVector,
}

impl NumericalGradient {
    /// Creates a differentiator with relative step `diff_step`.
    pub fn new(diff_step: Real) -> Result<Self> {
        check_diff_step(diff_step)?;
        Ok(Self {
            diff_step,
            bounds: None,
            samples: Vec::new(),
            cursor: 0,
            gradient: DVector::zeros(0),
        })
    }

    /// Differentiation step.
    pub fn diff_step(&self) -> Real {
        self.diff_step
    }

    /// Restricts sample points to the box `[lower, upper]`.
    pub fn set_bounds(&mut self, lower: DVector, upper: DVector) {
        self.bounds = Some((lower, upper));
    }

    /// Removes the box restriction.
    pub fn clear_bounds(&mut self) {
        self.bounds = None;
    }

    /// Plans the samples around `x` with per-variable scale `s`.
    pub fn start(&mut self, x: &DVector, s: &DVector) {
        let n = x.len();
        self.samples.clear();
        self.cursor = 0;
        self.gradient = DVector::zeros(n);
        for i in 0..n {
            let h = self.diff_step * s[i];
            let xi = x[i];
            let (lo, hi) = match &self.bounds {
                Some((l, u)) => (l[i], u[i]),
                None => (Real::NEG_INFINITY, Real::INFINITY),
            };
            if xi - h >= lo && xi + h <= hi {
                let w = 1.0 / (6.0 * h);
                self.samples.push(Sample { index: i, value: xi - h, weight: w });
                self.samples.push(Sample { index: i, value: xi - 0.5 * h, weight: -8.0 * w });
                self.samples.push(Sample { index: i, value: xi + 0.5 * h, weight: 8.0 * w });
                self.samples.push(Sample { index: i, value: xi + h, weight: -w });
            } else {
                clipped_pair(&mut self.samples, i, xi, h, lo, hi);
            }
        }
    }

    /// Next sample: the coordinate to change and its value, `None` when done.
    pub fn next_sample(&self) -> Option<(usize, Real)> {
        self.samples.get(self.cursor).map(|p| (p.index, p.value))
    }

    /// Records `f` at the current sample and advances.
    pub fn record(&mut self, f: Real) {
        if let Some(p) = self.samples.get(self.cursor) {
            self.gradient[p.index] += p.weight * f;
            self.cursor += 1;
        }
    }

    /// Total number of samples of the current plan.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Gradient assembled from the recorded values.
    pub fn gradient(&self) -> &DVector {
        &self.gradient
    }
}

/// Reverse-communication numerical Jacobian of a residual vector.
///
/// Uses a central two-point difference per column, clipped to the box.
#[derive(Debug, Clone)]
pub struct NumericalJacobian {
    diff_step: Real,
    samples: Vec<Sample>,
    cursor: usize,
    jacobian: DMatrix,
}

impl NumericalJacobian {
    /// Creates a differentiator with relative step `diff_step`.
    pub fn new(diff_step: Real) -> Result<Self> {
        check_diff_step(diff_step)?;
        Ok(Self {
            diff_step,
            samples: Vec::new(),
            cursor: 0,
            jacobian: DMatrix::zeros(0, 0),
        })
    }

    /// Differentiation step.
    pub fn diff_step(&self) -> Real {
        self.diff_step
    }

    /// Plans the samples around `x` for `m` residuals.
    pub fn start(&mut self, x: &DVector, s: &DVector, m: usize, lower: &DVector, upper: &DVector) {
        let n = x.len();
        self.samples.clear();
        self.cursor = 0;
        self.jacobian = DMatrix::zeros(m, n);
        for i in 0..n {
            clipped_pair(&mut self.samples, i, x[i], self.diff_step * s[i], lower[i], upper[i]);
        }
    }

    /// Next sample: the coordinate to change and its value, `None` when done.
    pub fn next_sample(&self) -> Option<(usize, Real)> {
        self.samples.get(self.cursor).map(|p| (p.index, p.value))
    }

    /// Records the residual vector at the current sample and advances.
    pub fn record(&mut self, fi: &DVector) {
        if let Some(p) = self.samples.get(self.cursor) {
            let mut column = self.jacobian.column_mut(p.index);
            column.axpy(p.weight, fi, 1.0);
            self.cursor += 1;
        }
    }

    /// Jacobian assembled from the recorded values.
    pub fn jacobian(&self) -> &DMatrix {
        &self.jacobian
    }
}
