//! Handles for articulated bodies and the bodies that own generalized
//! coordinates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::BodyId;

/// Handle of an articulated body (a tree of links) in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArticulatedId(pub u64);

impl ArticulatedId {
    /// Create a new articulated body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Arena slot of this articulated body.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ArticulatedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Articulated({})", self.0)
    }
}

/// The dynamic body that owns a set of generalized coordinates.
///
/// A free rigid body is its own super body. Every link of an articulated body
/// maps to the articulated body, whose coordinates are the joint positions
/// plus (for floating bases) the base pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SuperBodyId {
    /// A free rigid body.
    Rigid(BodyId),
    /// An articulated body.
    Articulated(ArticulatedId),
}

impl std::fmt::Display for SuperBodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rigid(id) => write!(f, "{id}"),
            Self::Articulated(id) => write!(f, "{id}"),
        }
    }
}

/// Frame in which an articulated body's recursive dynamics are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReferenceFrame {
    /// World-aligned axes at the world origin.
    Global,
    /// Each link's own frame.
    #[default]
    Link,
}

/// Convention for generalized velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeneralizedConvention {
    /// Integration coordinates: base position and unit quaternion, with
    /// their time derivatives `[ṗ; q̇uat]`.
    Euler,
    /// Base motion as `[ṗ; ω]`, both in world coordinates.
    Spatial,
}
