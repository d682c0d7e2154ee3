//! Contact points and contact forces.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single contact between geometries A and B.
///
/// The normal points from B toward A: pushing A along `normal` separates the
/// pair. `distance` is the signed separation at the point, negative when
/// interpenetrating.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Contact location in world coordinates.
    pub point: Point3<f64>,
    /// Unit normal from B toward A.
    pub normal: Vector3<f64>,
    /// Signed separation (negative = interpenetration).
    pub distance: f64,
}

impl ContactPoint {
    /// Create a contact point.
    #[must_use]
    pub const fn new(point: Point3<f64>, normal: Vector3<f64>, distance: f64) -> Self {
        Self {
            point,
            normal,
            distance,
        }
    }

    /// Interpenetration depth, zero when separated.
    #[must_use]
    pub fn penetration(&self) -> f64 {
        (-self.distance).max(0.0)
    }

    /// The same contact seen from the other geometry.
    #[must_use]
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }

    /// Split a relative velocity (A minus B) into its normal component and
    /// tangential part. Positive normal component means separating.
    #[must_use]
    pub fn decompose_velocity(&self, relative_velocity: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let v_n = relative_velocity.dot(&self.normal);
        (v_n, relative_velocity - self.normal * v_n)
    }

    /// Two unit tangents spanning the contact plane.
    #[must_use]
    pub fn tangent_frame(&self) -> (Vector3<f64>, Vector3<f64>) {
        let n = self.normal;
        // Cross with the world axis least aligned with the normal.
        let helper = if n.x.abs() < 0.57 {
            Vector3::x()
        } else if n.y.abs() < 0.57 {
            Vector3::y()
        } else {
            Vector3::z()
        };
        let t1 = n.cross(&helper).normalize();
        let t2 = n.cross(&t1);
        (t1, t2)
    }
}

/// Force applied to A at a contact; B receives the negation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactForce {
    /// Normal component.
    pub normal: Vector3<f64>,
    /// Tangential (friction) component.
    pub friction: Vector3<f64>,
    /// Point of application in world coordinates.
    pub position: Point3<f64>,
}

impl ContactForce {
    /// Create a contact force.
    #[must_use]
    pub const fn new(normal: Vector3<f64>, friction: Vector3<f64>, position: Point3<f64>) -> Self {
        Self {
            normal,
            friction,
            position,
        }
    }

    /// No force.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros(), Point3::origin())
    }

    /// Normal plus friction.
    #[must_use]
    pub fn total(&self) -> Vector3<f64> {
        self.normal + self.friction
    }

    /// Torque of the total force about `point`.
    #[must_use]
    pub fn torque_about(&self, point: &Point3<f64>) -> Vector3<f64> {
        (self.position - point).cross(&self.total())
    }

    /// Whether the force is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.normal == Vector3::zeros() && self.friction == Vector3::zeros()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_penetration_is_negated_distance() {
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), -0.01);
        assert_relative_eq!(c.penetration(), 0.01);
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), 0.02);
        assert_eq!(c.penetration(), 0.0);
        assert_eq!(c.flipped().normal, -Vector3::z());
    }

    #[test]
    fn test_velocity_split() {
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), 0.0);
        let (vn, vt) = c.decompose_velocity(&Vector3::new(1.0, 2.0, -3.0));
        assert_eq!(vn, -3.0);
        assert_eq!(vt, Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_tangent_frame_is_orthonormal() {
        for n in [
            Vector3::z(),
            Vector3::x(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(0.0, -0.6, 0.8),
        ] {
            let c = ContactPoint::new(Point3::origin(), n, 0.0);
            let (t1, t2) = c.tangent_frame();
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert!(t1.dot(&n).abs() < 1e-12);
            assert!(t2.dot(&n).abs() < 1e-12);
            assert!(t1.dot(&t2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_torque_of_offset_force() {
        let f = ContactForce::new(Vector3::z(), Vector3::zeros(), Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(f.torque_about(&Point3::origin()), -Vector3::y());
        assert!(!f.is_zero());
        assert!(ContactForce::zero().is_zero());
    }
}
