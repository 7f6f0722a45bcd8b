//! Preconditioners for the CG and L-BFGS engines.
//!
//! A preconditioner approximates the inverse Hessian `H^{-1}` and is applied
//! to the gradient when the search direction is formed. Each variant carries
//! exactly the data it needs:
//!
//! - [`Preconditioner::Identity`]: no preconditioning
//! - [`Preconditioner::Diagonal`]: `H = diag(d_const + d_var)`, where the
//!   variable part can be replaced cheaply between runs
//! - [`Preconditioner::Scale`]: `H^{-1} v = v .* s^2`, using the scaling
//!   vector as an implicit diagonal Hessian estimate
//! - [`Preconditioner::LowRank`]: `H = D + V'CV` applied via the Woodbury
//!   identity with a pre-factorized correction block
//! - [`Preconditioner::Cholesky`]: `H = U'U` given by its triangular factor

use crate::{
    error::{OptimizerError, Result},
    numerical::linalg::try_cholesky,
    types::{check_matrix, check_vector, DMatrix, DVector, Real},
};
use log::warn;
use nalgebra::{Cholesky, Dyn};

/// Low-rank correction `H = D + V'CV` in Woodbury form.
#[derive(Debug, Clone)]
pub struct LowRankCorrection {
    d: DVector,
    v: DMatrix,
    /// Cholesky factor of `diag(1/c) + V D^{-1} V'`
    block: Option<Cholesky<Real, Dyn>>,
}

impl LowRankCorrection {
    /// Builds the correction from diagonal `d` (length n), weights `c`
    /// (length k) and rows `v` (`k x n`).
    ///
    /// If the correction block is not positive definite the correction is
    /// dropped and only the diagonal part is used.
    pub fn new(d: &DVector, c: &DVector, v: &DMatrix, n: usize) -> Result<Self> {
        let k = c.len();
        check_positive_diagonal("d", d, n)?;
        check_vector("c", c, k)?;
        check_matrix("v", v, k, n)?;

        let d = d.rows(0, n).into_owned();
        let v = v.view((0, 0), (k, n)).into_owned();
        let block = if k == 0 {
            None
        } else if c.iter().any(|ci| *ci <= 0.0) {
            warn!("low-rank preconditioner has non-positive weights, using diagonal part only");
            None
        } else {
            let mut vd = v.clone();
            for (j, mut col) in vd.column_iter_mut().enumerate() {
                col /= d[j];
            }
            let mut b = &vd * v.transpose();
            for i in 0..k {
                b[(i, i)] += 1.0 / c[i];
            }
            let chol = try_cholesky(b);
            if chol.is_none() {
                warn!("low-rank preconditioner correction is not positive definite, using diagonal part only");
            }
            chol
        };
        Ok(Self { d, v, block })
    }

    /// Returns `true` if the low-rank part is in use.
    pub fn has_correction(&self) -> bool {
        self.block.is_some()
    }

    fn apply(&self, x: &mut DVector) {
        x.component_div_assign(&self.d);
        if let Some(block) = &self.block {
            // H^{-1}x = D^{-1}x - D^{-1}V' B^{-1} V D^{-1}x
            let t = block.solve(&(&self.v * &*x));
            let mut corr = self.v.tr_mul(&t);
            corr.component_div_assign(&self.d);
            *x -= corr;
        }
    }
}

/// Inverse-Hessian approximation applied to gradients.
#[derive(Debug, Clone, Default)]
pub enum Preconditioner {
    /// No preconditioning.
    #[default]
    Identity,
    /// Diagonal Hessian `diag(constant + variable)`.
    Diagonal {
        /// Constant part
        constant: DVector,
        /// Cheaply updatable part
        variable: DVector,
    },
    /// Scale-based preconditioner `H^{-1} = diag(s^2)`.
    Scale {
        /// Scaling vector
        s: DVector,
    },
    /// Low-rank corrected diagonal.
    LowRank(LowRankCorrection),
    /// Dense Hessian approximation given by an upper triangular factor `U`, `H = U'U`.
    Cholesky {
        /// Upper triangular factor
        factor: DMatrix,
    },
}

fn check_positive_diagonal(parameter: &str, d: &DVector, n: usize) -> Result<()> {
    check_vector(parameter, d, n)?;
    if d.rows(0, n).iter().any(|v| *v <= 0.0) {
        return Err(OptimizerError::invalid_argument(
            parameter,
            "diagonal entries must be positive",
        ));
    }
    Ok(())
}

impl Preconditioner {
    /// Diagonal preconditioner with positive entries `d`.
    pub fn diagonal(d: &DVector, n: usize) -> Result<Self> {
        check_positive_diagonal("d", d, n)?;
        Ok(Preconditioner::Diagonal {
            constant: d.rows(0, n).into_owned(),
            variable: DVector::zeros(n),
        })
    }

    /// Scale-based preconditioner from a validated scaling vector.
    pub fn scale(s: &DVector) -> Self {
        Preconditioner::Scale { s: s.clone() }
    }

    /// Low-rank corrected diagonal `D + V'CV`.
    pub fn low_rank(d: &DVector, c: &DVector, v: &DMatrix, n: usize) -> Result<Self> {
        Ok(Preconditioner::LowRank(LowRankCorrection::new(d, c, v, n)?))
    }

    /// Dense preconditioner from the Cholesky factor of `H`.
    ///
    /// `p` holds either an upper triangular `U` (`H = U'U`) or a lower
    /// triangular `L` (`H = LL'`); the other triangle is ignored.
    pub fn cholesky(p: &DMatrix, n: usize, is_upper: bool) -> Result<Self> {
        check_matrix("p", p, n, n)?;
        let factor = DMatrix::from_fn(n, n, |i, j| {
            if i > j {
                0.0
            } else if is_upper {
                p[(i, j)]
            } else {
                p[(j, i)]
            }
        });
        if (0..n).any(|i| factor[(i, i)] == 0.0) {
            return Err(OptimizerError::invalid_argument(
                "p",
                "triangular factor has a zero diagonal entry",
            ));
        }
        Ok(Preconditioner::Cholesky { factor })
    }

    /// Replaces the variable part of a diagonal preconditioner.
    ///
    /// The combined diagonal `constant + variable` must stay positive.
    pub fn set_variable_part(&mut self, d2: &DVector) -> Result<()> {
        match self {
            Preconditioner::Diagonal { constant, variable } => {
                let n = constant.len();
                check_vector("d2", d2, n)?;
                if constant
                    .iter()
                    .zip(d2.iter())
                    .any(|(c, v)| c + v <= 0.0)
                {
                    return Err(OptimizerError::invalid_argument(
                        "d2",
                        "combined diagonal must be positive",
                    ));
                }
                variable.copy_from(&d2.rows(0, n));
                Ok(())
            }
            _ => Err(OptimizerError::incompatible(
                "variable diagonal part requires a diagonal preconditioner",
            )),
        }
    }

    /// Returns `true` for the identity preconditioner.
    pub fn is_identity(&self) -> bool {
        matches!(self, Preconditioner::Identity)
    }

    /// Name used in log messages.
    pub fn name(&self) -> &str {
        match self {
            Preconditioner::Identity => "identity",
            Preconditioner::Diagonal { .. } => "diagonal",
            Preconditioner::Scale { .. } => "scale",
            Preconditioner::LowRank(_) => "low-rank",
            Preconditioner::Cholesky { .. } => "cholesky",
        }
    }

    /// Applies `H^{-1}` to `x` in place.
    pub fn apply(&self, x: &mut DVector) {
        match self {
            Preconditioner::Identity => {}
            Preconditioner::Diagonal { constant, variable } => {
                for ((xi, c), v) in x.iter_mut().zip(constant.iter()).zip(variable.iter()) {
                    *xi /= c + v;
                }
            }
            Preconditioner::Scale { s } => {
                for (xi, si) in x.iter_mut().zip(s.iter()) {
                    *xi *= si * si;
                }
            }
            Preconditioner::LowRank(lr) => lr.apply(x),
            Preconditioner::Cholesky { factor } => {
                // U'U z = x
                factor.tr_solve_upper_triangular_mut(x);
                factor.solve_upper_triangular_mut(x);
            }
        }
    }

    /// Returns `H^{-1} x` as a new vector.
    pub fn applied(&self, x: &DVector) -> DVector {
        let mut out = x.clone();
        self.apply(&mut out);
        out
    }
}
