//! Joint kinds and limits for articulated bodies.
//!
//! Joints connect a parent link to a child link and describe the motion the
//! child may have relative to the parent. Only the single-axis joints the
//! engine integrates are modelled here.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a joint in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(pub u64);

impl JointId {
    /// Create a new joint ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Arena slot of this joint.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for JointId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Kind of joint, which fixes its degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// Rotation about a single axis.
    Revolute,
    /// Translation along a single axis.
    Prismatic,
    /// No relative motion.
    Fixed,
}

impl JointKind {
    /// Number of degrees of freedom.
    #[must_use]
    pub const fn dof(self) -> usize {
        match self {
            Self::Revolute | Self::Prismatic => 1,
            Self::Fixed => 0,
        }
    }

    /// Check if the joint rotates.
    #[must_use]
    pub const fn is_rotational(self) -> bool {
        matches!(self, Self::Revolute)
    }
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revolute => write!(f, "revolute"),
            Self::Prismatic => write!(f, "prismatic"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

/// Position limits of one joint DOF.
///
/// Unlimited sides are represented by infinities.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLimits {
    /// Lowest allowed position (angle for revolute, distance for prismatic).
    pub lower: f64,
    /// Highest allowed position.
    pub upper: f64,
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl JointLimits {
    /// Limits with the given bounds.
    #[must_use]
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// No limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Symmetric limits `[-bound, bound]`.
    #[must_use]
    pub fn symmetric(bound: f64) -> Self {
        Self {
            lower: -bound.abs(),
            upper: bound.abs(),
        }
    }

    /// Check if either side is finite.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.lower.is_finite() || self.upper.is_finite()
    }

    /// Check if a position lies inside the limits.
    #[must_use]
    pub fn contains(&self, q: f64) -> bool {
        q >= self.lower && q <= self.upper
    }

    /// Distance to the lower limit (negative when past it).
    #[must_use]
    pub fn lower_slack(&self, q: f64) -> f64 {
        q - self.lower
    }

    /// Distance to the upper limit (negative when past it).
    #[must_use]
    pub fn upper_slack(&self, q: f64) -> f64 {
        self.upper - q
    }

    /// How far the position lies outside the limits, zero when inside.
    #[must_use]
    pub fn overshoot(&self, q: f64) -> f64 {
        (-self.lower_slack(q)).max(-self.upper_slack(q)).max(0.0)
    }

    /// Time until a DOF moving at constant velocity `qd` reaches the limit
    /// it heads towards. Infinite when it moves away from both limits, zero
    /// when it already sits on or past the limit it moves into.
    #[must_use]
    pub fn time_to_limit(&self, q: f64, qd: f64) -> f64 {
        if qd > 0.0 && self.upper.is_finite() {
            ((self.upper - q) / qd).max(0.0)
        } else if qd < 0.0 && self.lower.is_finite() {
            ((self.lower - q) / qd).max(0.0)
        } else {
            f64::INFINITY
        }
    }

    /// Validate that the limits are well formed.
    pub fn validate(&self) -> crate::Result<()> {
        if self.lower.is_nan() || self.upper.is_nan() {
            return Err(crate::SimError::invalid_config("joint limit is NaN"));
        }
        if self.lower > self.upper {
            return Err(crate::SimError::invalid_config(format!(
                "joint lower limit {} exceeds upper limit {}",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_kind_dof() {
        assert_eq!(JointKind::Revolute.dof(), 1);
        assert_eq!(JointKind::Prismatic.dof(), 1);
        assert_eq!(JointKind::Fixed.dof(), 0);
        assert!(JointKind::Revolute.is_rotational());
        assert_eq!(JointKind::Prismatic.to_string(), "prismatic");
    }

    #[test]
    fn test_limits_slack_and_overshoot() {
        let limits = JointLimits::new(-1.0, 2.0);
        assert!(limits.is_limited());
        assert!(limits.contains(0.0));
        assert_eq!(limits.lower_slack(0.5), 1.5);
        assert_eq!(limits.upper_slack(0.5), 1.5);
        assert_eq!(limits.overshoot(0.5), 0.0);
        assert_eq!(limits.overshoot(2.5), 0.5);
        assert_eq!(limits.overshoot(-1.25), 0.25);
    }

    #[test]
    fn test_time_to_limit() {
        let limits = JointLimits::new(-1.0, 1.0);
        assert_eq!(limits.time_to_limit(0.0, 2.0), 0.5);
        assert_eq!(limits.time_to_limit(0.0, -0.5), 2.0);
        assert_eq!(limits.time_to_limit(0.0, 0.0), f64::INFINITY);
        assert_eq!(JointLimits::unlimited().time_to_limit(0.0, 1.0), f64::INFINITY);
        assert_eq!(limits.time_to_limit(1.2, 1.0), 0.0);
        assert_eq!(limits.time_to_limit(1.5, -1.0), 2.5);
    }

    #[test]
    fn test_limits_validation() {
        assert!(JointLimits::new(0.0, 1.0).validate().is_ok());
        assert!(JointLimits::new(1.0, 0.0).validate().is_err());
        assert!(JointLimits::unlimited().validate().is_ok());
    }
}
