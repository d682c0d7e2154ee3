//! Unilateral constraints: contacts and active joint limits.

use sim_contact::ContactPoint;
use sim_types::{BodyId, GeomId, JointId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type tag of a [`UnilateralConstraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintKind {
    /// Non-penetration between two geometries.
    Contact,
    /// A joint DOF at one of its position limits.
    Limit,
}

/// Which bound of a joint DOF is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitSide {
    /// `q ≥ lower`.
    Lower,
    /// `q ≤ upper`.
    Upper,
}

impl LimitSide {
    /// Sign of the DOF velocity that moves away from this limit.
    #[must_use]
    pub fn separating_sign(self) -> f64 {
        match self {
            Self::Lower => 1.0,
            Self::Upper => -1.0,
        }
    }
}

/// A contact between two geometries.
///
/// The contact normal points from B toward A, so `n·(v_A − v_B) > 0`
/// separates the pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactConstraint {
    /// First geometry.
    pub geom_a: GeomId,
    /// Second geometry.
    pub geom_b: GeomId,
    /// Body owning `geom_a`.
    pub body_a: BodyId,
    /// Body owning `geom_b`.
    pub body_b: BodyId,
    /// Contact point, normal and signed distance.
    pub contact: ContactPoint,
    /// Coulomb friction coefficient; zero is frictionless.
    pub friction: f64,
}

/// A joint DOF at (or past) one of its position limits.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LimitConstraint {
    /// The limited joint.
    pub joint: JointId,
    /// DOF index within the joint.
    pub dof: usize,
    /// The active bound.
    pub side: LimitSide,
    /// Signed distance to the bound, negative when past it.
    pub slack: f64,
}

/// A one-sided constraint the impact and stabilization problems enforce.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnilateralConstraint {
    /// Non-penetration.
    Contact(ContactConstraint),
    /// Joint limit.
    Limit(LimitConstraint),
}

impl UnilateralConstraint {
    /// The constraint-type tag.
    #[must_use]
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::Contact(_) => ConstraintKind::Contact,
            Self::Limit(_) => ConstraintKind::Limit,
        }
    }

    /// The contact, if this is one.
    #[must_use]
    pub fn as_contact(&self) -> Option<&ContactConstraint> {
        match self {
            Self::Contact(c) => Some(c),
            Self::Limit(_) => None,
        }
    }

    /// The limit, if this is one.
    #[must_use]
    pub fn as_limit(&self) -> Option<&LimitConstraint> {
        match self {
            Self::Limit(l) => Some(l),
            Self::Contact(_) => None,
        }
    }

    /// Signed violation measure: contact distance or limit slack.
    #[must_use]
    pub fn violation(&self) -> f64 {
        match self {
            Self::Contact(c) => c.contact.distance,
            Self::Limit(l) => l.slack,
        }
    }
}

impl From<ContactConstraint> for UnilateralConstraint {
    fn from(c: ContactConstraint) -> Self {
        Self::Contact(c)
    }
}

impl From<LimitConstraint> for UnilateralConstraint {
    fn from(l: LimitConstraint) -> Self {
        Self::Limit(l)
    }
}
