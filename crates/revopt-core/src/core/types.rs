//! Type definitions and aliases for dense optimization.
//!
//! All engines work in double precision over dynamically-sized `nalgebra`
//! storage. This module provides the aliases used throughout the library,
//! the numerical constants shared by the engines and a few validation
//! helpers used by every `create*`/`set*` operation.

use crate::error::{OptimizerError, Result};
use num_traits::Float;

/// Scalar type of every engine.
pub type Real = f64;

/// Type alias for a dynamically-sized vector.
pub type DVector = nalgebra::DVector<Real>;

/// Type alias for a dynamically-sized matrix.
pub type DMatrix = nalgebra::DMatrix<Real>;

/// Numerical constants.
pub mod constants {
    use super::Real;

    /// Machine epsilon.
    pub const MACHINE_EPSILON: Real = 5.0e-16;

    /// Largest value treated as finite by overflow guards.
    pub const MAX_REAL: Real = 1.0e300;

    /// Smallest positive value treated as non-zero.
    pub const MIN_REAL: Real = 1.0e-300;

    /// Step tolerance selected when every stopping condition is zero.
    pub const DEFAULT_EPS_X: Real = 1.0e-6;

    /// Norm threshold below which an orthogonalized constraint row is dropped.
    pub fn degenerate_row_threshold() -> Real {
        10000.0 * MACHINE_EPSILON
    }
}

/// Returns `true` if every element is finite.
pub fn all_finite<'a, T, I>(values: I) -> bool
where
    T: Float + 'a,
    I: IntoIterator<Item = &'a T>,
{
    values.into_iter().all(|v| v.is_finite())
}

/// Check that `v` has `expected` elements, all finite.
pub fn check_vector(parameter: &str, v: &DVector, expected: usize) -> Result<()> {
    if v.len() < expected {
        return Err(OptimizerError::dimension_mismatch(
            parameter,
            expected,
            v.len(),
        ));
    }
    if !all_finite(v.rows(0, expected).iter()) {
        return Err(OptimizerError::not_finite(parameter));
    }
    Ok(())
}

/// Check that `m` has at least `rows x cols` elements, all finite.
pub fn check_matrix(parameter: &str, m: &DMatrix, rows: usize, cols: usize) -> Result<()> {
    if m.nrows() < rows || m.ncols() < cols {
        return Err(OptimizerError::dimension_mismatch(
            parameter,
            format!("({rows}, {cols})"),
            format!("({}, {})", m.nrows(), m.ncols()),
        ));
    }
    if !all_finite(m.view((0, 0), (rows, cols)).iter()) {
        return Err(OptimizerError::not_finite(parameter));
    }
    Ok(())
}

/// Check a bound vector: NaN is rejected, infinities are allowed.
pub fn check_bounds(parameter: &str, v: &DVector, expected: usize) -> Result<()> {
    if v.len() < expected {
        return Err(OptimizerError::dimension_mismatch(
            parameter,
            expected,
            v.len(),
        ));
    }
    if v.rows(0, expected).iter().any(|b| b.is_nan()) {
        return Err(OptimizerError::not_finite(parameter));
    }
    Ok(())
}

/// Check a scalar tolerance: finite and non-negative.
pub fn check_tolerance(parameter: &str, value: Real) -> Result<()> {
    if !value.is_finite() {
        return Err(OptimizerError::not_finite(parameter));
    }
    if value < 0.0 {
        return Err(OptimizerError::invalid_argument(
            parameter,
            "must be non-negative",
        ));
    }
    Ok(())
}

/// Validate a scale vector and return its absolute value.
///
/// Entries must be finite and non-zero; the sign is discarded.
pub fn normalize_scale(s: &DVector, n: usize) -> Result<DVector> {
    check_vector("s", s, n)?;
    if s.rows(0, n).iter().any(|v| *v == 0.0) {
        return Err(OptimizerError::invalid_argument("s", "scale entries must be non-zero"));
    }
    Ok(s.rows(0, n).map(|v| v.abs()))
}

/// Scaled Euclidean norm `||v .* s||`.
pub fn scaled_norm(v: &DVector, s: &DVector) -> Real {
    v.iter()
        .zip(s.iter())
        .map(|(a, b)| (a * b) * (a * b))
        .sum::<Real>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constants() {
        assert!(constants::MACHINE_EPSILON > 0.0);
        assert!(constants::MIN_REAL < constants::MACHINE_EPSILON);
        assert!(constants::MAX_REAL.is_finite());
        assert_relative_eq!(constants::degenerate_row_threshold(), 5.0e-12);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite([1.0_f64, -2.0, 0.0].iter()));
        assert!(!all_finite([1.0_f64, f64::NAN].iter()));
        assert!(!all_finite([f64::INFINITY].iter()));
    }

    #[test]
    fn test_check_vector() {
        let v = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(check_vector("x", &v, 3).is_ok());
        assert!(check_vector("x", &v, 2).is_ok());
        assert!(matches!(
            check_vector("x", &v, 4),
            Err(OptimizerError::DimensionMismatch { .. })
        ));

        let bad = DVector::from_vec(vec![1.0, f64::NAN]);
        assert!(matches!(
            check_vector("x", &bad, 2),
            Err(OptimizerError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_check_bounds_accepts_infinity() {
        let l = DVector::from_vec(vec![f64::NEG_INFINITY, 0.0]);
        assert!(check_bounds("bndl", &l, 2).is_ok());
        let bad = DVector::from_vec(vec![f64::NAN, 0.0]);
        assert!(check_bounds("bndl", &bad, 2).is_err());
    }

    #[test]
    fn test_normalize_scale() {
        let s = DVector::from_vec(vec![-2.0, 0.5]);
        let abs = normalize_scale(&s, 2).unwrap();
        assert_eq!(abs[0], 2.0);
        assert_eq!(abs[1], 0.5);

        let zero = DVector::from_vec(vec![1.0, 0.0]);
        assert!(normalize_scale(&zero, 2).is_err());
    }

    #[test]
    fn test_scaled_norm() {
        let v = DVector::from_vec(vec![3.0, 4.0]);
        let s = DVector::from_vec(vec![1.0, 1.0]);
        assert_relative_eq!(scaled_norm(&v, &s), 5.0);
        let s = DVector::from_vec(vec![2.0, 0.0]);
        assert_relative_eq!(scaled_norm(&v, &s), 6.0);
    }

    #[test]
    fn test_check_tolerance() {
        assert!(check_tolerance("eps_g", 0.0).is_ok());
        assert!(check_tolerance("eps_g", -1.0).is_err());
        assert!(check_tolerance("eps_g", f64::NAN).is_err());
    }
}
