//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur during simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Invalid joint ID referenced.
    #[error("invalid joint ID: {0}")]
    InvalidJointId(u64),

    /// Invalid geometry ID referenced.
    #[error("invalid geometry ID: {0}")]
    InvalidGeomId(u64),

    /// Invalid articulated body ID referenced.
    #[error("invalid articulated body ID: {0}")]
    InvalidArticulatedId(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// The body/joint tree is malformed.
    #[error("invalid topology: {reason}")]
    Topology {
        /// Description of the malformed relation.
        reason: String,
    },

    /// An inertia matrix could not be factored.
    #[error("singular inertia: {reason}")]
    SingularInertia {
        /// Where the singular matrix was met.
        reason: String,
    },

    /// A complementarity solve failed after every fallback.
    #[error("constraint solver failed: {reason}")]
    Solver {
        /// Description of the solver failure.
        reason: String,
    },

    /// An operation was called before the state it consumes was computed.
    #[error("precondition failed: {reason}")]
    PreconditionFailed {
        /// Description of the missing precondition.
        reason: String,
    },

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Constraints remain violated beyond what stabilization can correct.
    ///
    /// This is the unrecoverable physical-state signal: the caller has to
    /// halt or intervene.
    #[error(
        "constraint violation exceeds tolerance {tolerance}: \
         min distance {min_distance}, limit violation {limit_violation}"
    )]
    ConstraintViolation {
        /// Minimum pairwise signed distance after stabilization.
        min_distance: f64,
        /// Largest joint-limit overshoot after stabilization.
        limit_violation: f64,
        /// The configured tolerance.
        tolerance: f64,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create a topology error.
    #[must_use]
    pub fn topology(reason: impl Into<String>) -> Self {
        Self::Topology {
            reason: reason.into(),
        }
    }

    /// Create a singular inertia error.
    #[must_use]
    pub fn singular_inertia(reason: impl Into<String>) -> Self {
        Self::SingularInertia {
            reason: reason.into(),
        }
    }

    /// Create a solver error.
    #[must_use]
    pub fn solver(reason: impl Into<String>) -> Self {
        Self::Solver {
            reason: reason.into(),
        }
    }

    /// Create a precondition error.
    #[must_use]
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }

    /// Check if this is a solver failure.
    #[must_use]
    pub fn is_solver_error(&self) -> bool {
        matches!(self, Self::Solver { .. })
    }

    /// Check if this is the unrecoverable constraint violation signal.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidBodyId(42);
        assert!(err.to_string().contains("42"));

        let err = SimError::ConstraintViolation {
            min_distance: -0.25,
            limit_violation: 0.0,
            tolerance: 0.01,
        };
        assert!(err.to_string().contains("-0.25"));

        let err = SimError::diverged("NaN in velocity");
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_error_predicates() {
        let err = SimError::diverged("test");
        assert!(err.is_diverged());
        assert!(!err.is_config_error());

        assert!(SimError::invalid_config("bad value").is_config_error());
        assert!(SimError::InvalidTimestep(-1.0).is_config_error());
        assert!(SimError::solver("ray termination").is_solver_error());

        let err = SimError::ConstraintViolation {
            min_distance: -1.0,
            limit_violation: 0.0,
            tolerance: 0.1,
        };
        assert!(err.is_constraint_violation());
        assert!(!err.is_solver_error());
    }
}
