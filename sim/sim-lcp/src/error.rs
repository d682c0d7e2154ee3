//! Error types for complementarity solves.

use thiserror::Error;

/// Reasons a complementarity solve can fail.
///
/// Singular basis matrices never surface here; they are absorbed by the
/// least-squares fallbacks inside the basis solve.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LcpError {
    /// No direction entry exceeds the pivot tolerance: the problem is
    /// infeasible or unbounded along the current ray.
    #[error("ray termination: no admissible pivot")]
    RayTermination,

    /// The minimum-ratio filter removed every candidate.
    #[error("zero tolerance too low: ratio test left no candidate")]
    ZeroToleranceTooLow,

    /// Pivot budget exhausted.
    #[error("iteration limit reached after {iterations} pivots")]
    IterationLimit {
        /// Pivots performed.
        iterations: usize,
    },

    /// No diagonal regularization in the sweep produced a valid solution.
    #[error("no valid solution for regularization 1e{min_exp}..1e{max_exp}")]
    RegularizationExhausted {
        /// First exponent tried.
        min_exp: i32,
        /// Exclusive upper exponent.
        max_exp: i32,
    },

    /// A principal block met by the fast path is not positive definite.
    #[error("principal block of size {size} is not positive definite")]
    NotPositiveDefinite {
        /// Size of the failing block.
        size: usize,
    },

    /// The fast path only handles symmetric matrices.
    #[error("matrix is not symmetric (max |M - Mᵀ| = {asymmetry:e})")]
    NotSymmetric {
        /// Largest entry of `|M - Mᵀ|`.
        asymmetry: f64,
    },

    /// A candidate pair failed the complementarity check.
    #[error("solution violates complementarity by {violation:e}")]
    InvalidSolution {
        /// Largest violation of `z ≥ 0`, `w ≥ 0` or `z∘w = 0`.
        violation: f64,
    },

    /// Matrix and vector sizes disagree.
    #[error("dimension mismatch: matrix is {rows}x{cols}, q has {len} entries")]
    DimensionMismatch {
        /// Matrix rows.
        rows: usize,
        /// Matrix columns.
        cols: usize,
        /// Length of q.
        len: usize,
    },

    /// Invalid solver configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl LcpError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if the failure came out of Lemke pivoting (as opposed to a
    /// malformed input).
    #[must_use]
    pub fn is_pivoting_failure(&self) -> bool {
        matches!(
            self,
            Self::RayTermination | Self::ZeroToleranceTooLow | Self::IterationLimit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LcpError::IterationLimit { iterations: 150 };
        assert!(err.to_string().contains("150"));

        let err = LcpError::RegularizationExhausted {
            min_exp: -20,
            max_exp: 20,
        };
        assert!(err.to_string().contains("1e-20"));
    }

    #[test]
    fn test_pivoting_failure_predicate() {
        assert!(LcpError::RayTermination.is_pivoting_failure());
        assert!(LcpError::ZeroToleranceTooLow.is_pivoting_failure());
        assert!(!LcpError::NotPositiveDefinite { size: 2 }.is_pivoting_failure());
        assert!(!LcpError::invalid_config("x").is_pivoting_failure());
    }
}
