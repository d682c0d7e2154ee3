//! Joint-limit classification.
//!
//! A DOF joins the constraint set when its slack to either bound drops
//! below a threshold. Stabilization uses its `eps`, impacts the contact
//! distance threshold.

use sim_types::{JointId, JointLimits};

use crate::{LimitConstraint, LimitSide};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// State of one DOF with respect to its limits.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitState {
    /// Both bounds are further than the threshold.
    Free,

    /// Near or past the lower bound.
    /// Contains the slack `q - lower` (negative when past it).
    AtLower(f64),

    /// Near or past the upper bound.
    /// Contains the slack `upper - q` (negative when past it).
    AtUpper(f64),
}

impl LimitState {
    /// Classify a position against its limits.
    ///
    /// When both bounds are within `threshold` (a very narrow range), the
    /// one with less slack wins.
    #[must_use]
    pub fn classify(limits: &JointLimits, q: f64, threshold: f64) -> Self {
        let lower = limits.lower_slack(q);
        let upper = limits.upper_slack(q);
        let near_lower = limits.lower.is_finite() && lower < threshold;
        let near_upper = limits.upper.is_finite() && upper < threshold;

        match (near_lower, near_upper) {
            (true, true) if upper < lower => Self::AtUpper(upper),
            (true, _) => Self::AtLower(lower),
            (false, true) => Self::AtUpper(upper),
            (false, false) => Self::Free,
        }
    }

    /// Check if the DOF is at either limit.
    #[must_use]
    pub fn is_at_limit(&self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Penetration past the active bound (0 if free or inside).
    #[must_use]
    pub fn penetration(&self) -> f64 {
        match self {
            Self::Free => 0.0,
            Self::AtLower(s) | Self::AtUpper(s) => (-s).max(0.0),
        }
    }

    /// The constraint for this state, if a bound is active.
    #[must_use]
    pub fn to_constraint(self, joint: JointId, dof: usize) -> Option<LimitConstraint> {
        let (side, slack) = match self {
            Self::Free => return None,
            Self::AtLower(s) => (LimitSide::Lower, s),
            Self::AtUpper(s) => (LimitSide::Upper, s),
        };
        Some(LimitConstraint {
            joint,
            dof,
            side,
            slack,
        })
    }
}

/// Active limit constraints of one joint.
///
/// `limits` and `q` are per DOF.
#[must_use]
pub fn active_limits(
    joint: JointId,
    limits: &[JointLimits],
    q: &[f64],
    threshold: f64,
) -> Vec<LimitConstraint> {
    limits
        .iter()
        .zip(q)
        .enumerate()
        .filter_map(|(dof, (lim, &q))| {
            LimitState::classify(lim, q, threshold).to_constraint(joint, dof)
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_free_inside_range() {
        let limits = JointLimits::new(-1.0, 1.0);
        assert_eq!(LimitState::classify(&limits, 0.0, 1e-3), LimitState::Free);
        assert!(!LimitState::Free.is_at_limit());
    }

    #[test]
    fn test_near_and_past_bounds() {
        let limits = JointLimits::new(-1.0, 1.0);

        let near = LimitState::classify(&limits, 0.9995, 1e-3);
        assert!(matches!(near, LimitState::AtUpper(_)));
        assert_eq!(near.penetration(), 0.0);

        let past = LimitState::classify(&limits, -1.5, 1e-3);
        match past {
            LimitState::AtLower(s) => assert_relative_eq!(s, -0.5, epsilon = 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert_relative_eq!(past.penetration(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_unlimited_is_always_free() {
        let limits = JointLimits::unlimited();
        assert_eq!(LimitState::classify(&limits, 1e9, 1.0), LimitState::Free);
    }

    #[test]
    fn test_narrow_range_picks_tighter_side() {
        let limits = JointLimits::new(0.0, 0.001);
        assert!(matches!(
            LimitState::classify(&limits, 0.0009, 0.01),
            LimitState::AtUpper(_)
        ));
        assert!(matches!(
            LimitState::classify(&limits, 0.0001, 0.01),
            LimitState::AtLower(_)
        ));
    }

    #[test]
    fn test_active_limits_lists_constrained_dofs() {
        let limits = [JointLimits::new(-1.0, 1.0), JointLimits::new(0.0, 2.0)];
        let active = active_limits(JointId::new(4), &limits, &[0.2, -0.01], 1e-3);

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].dof, 1);
        assert_eq!(active[0].side, LimitSide::Lower);
        assert_relative_eq!(active[0].slack, -0.01, epsilon = 1e-12);
    }
}
