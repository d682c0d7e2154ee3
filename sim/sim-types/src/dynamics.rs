//! Gravity and applied wrenches.

use nalgebra::{Point3, Vector3, Vector6};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Uniform gravitational field.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gravity {
    /// Acceleration due to gravity (m/s²).
    pub acceleration: Vector3<f64>,
}

impl Default for Gravity {
    fn default() -> Self {
        Self::earth()
    }
}

impl Gravity {
    /// Standard Earth gravity (9.81 m/s² in -Z direction).
    #[must_use]
    pub fn earth() -> Self {
        Self {
            acceleration: Vector3::new(0.0, 0.0, -9.81),
        }
    }

    /// Zero gravity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            acceleration: Vector3::zeros(),
        }
    }

    /// Custom gravity vector.
    #[must_use]
    pub const fn new(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }

    /// Force on a body of the given mass.
    #[must_use]
    pub fn force_on_mass(&self, mass: f64) -> Vector3<f64> {
        self.acceleration * mass
    }

    /// Potential energy of a mass at a point, relative to the origin.
    #[must_use]
    pub fn potential_energy(&self, mass: f64, point: &Point3<f64>) -> f64 {
        -mass * self.acceleration.dot(&point.coords)
    }
}

/// Force and torque applied to a body.
///
/// The torque is taken about whatever reference point the owner states
/// (the center of mass for body accumulators, the frame origin for spatial
/// vectors).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wrench {
    /// Linear force (N).
    pub force: Vector3<f64>,
    /// Torque (N·m).
    pub torque: Vector3<f64>,
}

impl Default for Wrench {
    fn default() -> Self {
        Self::zero()
    }
}

impl Wrench {
    /// Wrench with the given force and torque.
    #[must_use]
    pub const fn new(force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self { force, torque }
    }

    /// Zero wrench.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// Pure force.
    #[must_use]
    pub fn force(force: Vector3<f64>) -> Self {
        Self {
            force,
            torque: Vector3::zeros(),
        }
    }

    /// Force applied at an offset from the reference point.
    #[must_use]
    pub fn force_at(force: Vector3<f64>, offset: &Vector3<f64>) -> Self {
        Self {
            force,
            torque: offset.cross(&force),
        }
    }

    /// Spatial force vector `[torque; force]`.
    #[must_use]
    pub fn to_spatial(&self) -> Vector6<f64> {
        Vector6::new(
            self.torque.x,
            self.torque.y,
            self.torque.z,
            self.force.x,
            self.force.y,
            self.force.z,
        )
    }

    /// Wrench from a spatial force vector `[torque; force]`.
    #[must_use]
    pub fn from_spatial(v: &Vector6<f64>) -> Self {
        Self {
            torque: v.fixed_rows::<3>(0).into_owned(),
            force: v.fixed_rows::<3>(3).into_owned(),
        }
    }
}

impl std::ops::Add for Wrench {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            force: self.force + rhs.force,
            torque: self.torque + rhs.torque,
        }
    }
}

impl std::ops::AddAssign for Wrench {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.torque += rhs.torque;
    }
}
