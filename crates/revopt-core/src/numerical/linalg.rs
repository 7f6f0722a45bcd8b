//! Dense linear algebra helpers on top of `nalgebra`.
//!
//! The engines only need a handful of primitives: building a symmetric
//! matrix from one triangle, a Cholesky factorization that reports failure
//! instead of panicking, and a Gram-Schmidt sweep that orthonormalizes the
//! rows of a linear constraint system `C x = b` while carrying the right-hand
//! side along.

use crate::types::{constants, DMatrix, DVector, Real};
use nalgebra::{Cholesky, Dyn};

/// Builds the full symmetric `n x n` matrix from the upper or lower triangle of `a`.
pub fn symmetric_from_triangle(a: &DMatrix, n: usize, is_upper: bool) -> DMatrix {
    DMatrix::from_fn(n, n, |i, j| {
        let (r, c) = if (i <= j) == is_upper { (i, j) } else { (j, i) };
        a[(r, c)]
    })
}

/// Cholesky factorization, `None` if `a` is not numerically positive definite.
///
/// Only the lower triangle of `a` is read.
pub fn try_cholesky(a: DMatrix) -> Option<Cholesky<Real, Dyn>> {
    if a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let chol = Cholesky::new(a)?;
    let l = chol.l_dirty();
    let n = l.nrows();
    let max_diag = (0..n).map(|i| l[(i, i)].abs()).fold(0.0, Real::max);
    let min_diag = (0..n).map(|i| l[(i, i)].abs()).fold(Real::INFINITY, Real::min);
    // Reject factors whose condition estimate is at the level of rounding noise.
    if n > 0 && min_diag * min_diag <= max_diag * max_diag * 100.0 * constants::MACHINE_EPSILON {
        return None;
    }
    Some(chol)
}

/// Row-orthonormalized linear system produced by [`orthonormalize_rows`].
#[derive(Debug, Clone)]
pub struct OrthonormalRows {
    /// Orthonormal rows spanning the row space of the input, `rank x n`
    pub q: DMatrix,
    /// Right-hand side transformed with the rows
    pub rhs: DVector,
    /// Largest right-hand side residual of a dropped (dependent) row,
    /// relative to the magnitude of its original right-hand side
    pub dropped_residual: Real,
}

impl OrthonormalRows {
    /// Number of independent rows.
    pub fn rank(&self) -> usize {
        self.q.nrows()
    }

    /// Minimum-norm solution of `q x = rhs`.
    pub fn minimum_norm_point(&self) -> DVector {
        self.q.tr_mul(&self.rhs)
    }

    /// Orthogonal projection of `v` onto the null space of the rows.
    pub fn project_null_space(&self, v: &DVector) -> DVector {
        if self.rank() == 0 {
            return v.clone();
        }
        let coef = &self.q * v;
        v - self.q.tr_mul(&coef)
    }
}

/// Modified Gram-Schmidt on the rows of `c` (`k x n`) with right-hand side `b`.
///
/// Rows whose remaining norm falls below `10000 * eps` times their original
/// norm are linearly dependent on the previous ones and are dropped; their
/// right-hand side residual is reported so the caller can detect an
/// inconsistent system.
pub fn orthonormalize_rows(c: &DMatrix, b: &DVector) -> OrthonormalRows {
    let (k, n) = c.shape();
    let threshold = constants::degenerate_row_threshold();
    let mut rows: Vec<DVector> = Vec::with_capacity(k);
    let mut rhs: Vec<Real> = Vec::with_capacity(k);
    let mut dropped_residual: Real = 0.0;

    for i in 0..k {
        let mut row: DVector = c.row(i).transpose();
        let mut bi = b[i];
        let original = row.norm();
        // Two passes keep the rows orthogonal to working precision.
        for _ in 0..2 {
            for (q, qb) in rows.iter().zip(rhs.iter()) {
                let coef = row.dot(q);
                row.axpy(-coef, q, 1.0);
                bi -= coef * qb;
            }
        }
        let norm = row.norm();
        if original == 0.0 || norm <= threshold * original {
            let scale = b[i].abs().max(original).max(1.0);
            dropped_residual = dropped_residual.max(bi.abs() / scale);
            continue;
        }
        rows.push(row / norm);
        rhs.push(bi / norm);
    }

    let mut q = DMatrix::zeros(rows.len(), n);
    for (i, row) in rows.iter().enumerate() {
        q.set_row(i, &row.transpose());
    }
    OrthonormalRows {
        q,
        rhs: DVector::from_vec(rhs),
        dropped_residual,
    }
}
