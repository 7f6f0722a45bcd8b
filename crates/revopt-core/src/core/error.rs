//! Error types for optimizer configuration and evaluation.
//!
//! Configuration mistakes (wrong vector length, non-finite input, a negative
//! tolerance, incompatible settings) are reported as [`OptimizerError`] by the
//! `create*` and `set*` operations of every engine. Numerical outcomes of a
//! run (convergence, stall, infeasibility) are *not* errors: they are recorded
//! as a [`TerminationReason`](crate::optimization::optimizer::TerminationReason)
//! in the run report.

use thiserror::Error;

/// Errors raised while configuring or driving an optimizer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// An argument is outside of its admissible range.
    ///
    /// This error occurs for negative tolerances, zero scale entries,
    /// non-positive dimensions and similar programmer errors.
    #[error("Invalid argument `{parameter}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter
        parameter: String,
        /// Description of why the value is rejected
        reason: String,
    },

    /// Vector or matrix has the wrong shape.
    #[error("Dimension mismatch for `{parameter}`: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the offending parameter
        parameter: String,
        /// Expected shape
        expected: String,
        /// Actual shape
        actual: String,
    },

    /// Argument contains NaN or an infinity where finite values are required.
    #[error("Argument `{parameter}` contains non-finite values")]
    NotFinite {
        /// Name of the offending parameter
        parameter: String,
    },

    /// Two settings cannot be combined.
    ///
    /// For example the step-length limit of the BLEIC engine together with a
    /// non-default preconditioner, or secant acceleration of the LM engine in
    /// function/gradient/Hessian mode.
    #[error("Incompatible settings: {reason}")]
    IncompatibleSettings {
        /// Description of the conflict
        reason: String,
    },

    /// A user-supplied cost function failed.
    #[error("Evaluation failed: {reason}")]
    Evaluation {
        /// Description of the failure
        reason: String,
    },

    /// The reverse-communication protocol was not followed by the caller.
    #[error("Protocol violation: {reason}")]
    ProtocolViolation {
        /// Description of the misuse
        reason: String,
    },
}

impl OptimizerError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument<S1, S2>(parameter: S1, reason: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S, E, A>(parameter: S, expected: E, actual: A) -> Self
    where
        S: Into<String>,
        E: std::fmt::Display,
        A: std::fmt::Display,
    {
        Self::DimensionMismatch {
            parameter: parameter.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a NotFinite error.
    pub fn not_finite<S: Into<String>>(parameter: S) -> Self {
        Self::NotFinite {
            parameter: parameter.into(),
        }
    }

    /// Create an IncompatibleSettings error.
    pub fn incompatible<S: Into<String>>(reason: S) -> Self {
        Self::IncompatibleSettings {
            reason: reason.into(),
        }
    }

    /// Create an Evaluation error.
    pub fn evaluation<S: Into<String>>(reason: S) -> Self {
        Self::Evaluation {
            reason: reason.into(),
        }
    }

    /// Create a ProtocolViolation error.
    pub fn protocol<S: Into<String>>(reason: S) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }
}

/// Result type alias for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = OptimizerError::invalid_argument("eps_g", "must be non-negative");
        assert!(matches!(err, OptimizerError::InvalidArgument { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid argument `eps_g`: must be non-negative"
        );

        let err = OptimizerError::dimension_mismatch("x0", 3, 4);
        assert!(matches!(err, OptimizerError::DimensionMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "Dimension mismatch for `x0`: expected 3, got 4"
        );
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            OptimizerError::not_finite("s"),
            OptimizerError::incompatible("step limit with diagonal preconditioner"),
            OptimizerError::evaluation("residual overflow"),
            OptimizerError::protocol("iterate called without a pending request"),
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_error_context() {
        let err = OptimizerError::dimension_mismatch("bndl", "5", "(4, 1)");
        if let OptimizerError::DimensionMismatch {
            parameter,
            expected,
            actual,
        } = err
        {
            assert_eq!(parameter, "bndl");
            assert_eq!(expected, "5");
            assert_eq!(actual, "(4, 1)");
        } else {
            panic!("Expected DimensionMismatch variant");
        }
    }
}
