//! Compliant (penalty) contact forces.
//!
//! Bodies flagged compliant are not handled by impacts and stabilization.
//! Interpenetration instead produces a spring-damper force:
//!
//! ```text
//! F_normal = k * d^p + c * ḋ
//! ```
//!
//! Where:
//! - `d` = penetration depth beyond the contact margin
//! - `ḋ` = penetration velocity (approaching = positive)
//! - `k` = stiffness
//! - `p` = stiffness power (1.0 = linear, >1 = superlinear)
//! - `c` = damping
//!
//! The normal force never pulls. Friction is regularized Coulomb: the
//! tangential force saturates at `μ·F_n` with a smooth `tanh` profile
//! around zero slip.

use nalgebra::Vector3;

use crate::{ContactForce, ContactParams, ContactPoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Penalty contact model.
///
/// # Example
///
/// ```
/// use sim_contact::{ContactModel, ContactParams, ContactPoint};
/// use nalgebra::{Point3, Vector3};
///
/// let model = ContactModel::new(ContactParams::rubber());
///
/// // 1 mm interpenetration, normal pointing up.
/// let contact = ContactPoint::new(Point3::origin(), Vector3::z(), -0.001);
///
/// // Sliding in X, approaching in Z.
/// let force = model.compute_force(&contact, &Vector3::new(0.1, 0.0, -0.5));
///
/// assert!(force.normal.z > 0.0);
/// assert!(force.friction.x < 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactModel {
    params: ContactParams,
    /// Slip speed over which friction ramps to its Coulomb bound.
    regularization_velocity: f64,
}

impl Default for ContactModel {
    fn default() -> Self {
        Self::new(ContactParams::default())
    }
}

impl ContactModel {
    /// Create a model with a 1 mm/s friction regularization.
    #[must_use]
    pub fn new(params: ContactParams) -> Self {
        Self {
            params,
            regularization_velocity: 0.001,
        }
    }

    /// Set the friction regularization velocity.
    #[must_use]
    pub fn with_regularization_velocity(mut self, velocity: f64) -> Self {
        self.regularization_velocity = velocity.max(1e-6);
        self
    }

    /// Contact parameters.
    #[must_use]
    pub fn params(&self) -> &ContactParams {
        &self.params
    }

    /// Force on A at one contact.
    ///
    /// `relative_velocity` is the velocity of A minus that of B at the
    /// contact point. B receives the negated force.
    #[must_use]
    pub fn compute_force(
        &self,
        contact: &ContactPoint,
        relative_velocity: &Vector3<f64>,
    ) -> ContactForce {
        let d = contact.penetration() - self.params.contact_margin;
        if d <= 0.0 {
            return ContactForce::zero();
        }

        let (v_n, v_t) = contact.decompose_velocity(relative_velocity);

        // v_n > 0 separates, so the approach speed is -v_n.
        let magnitude = self.normal_force_magnitude(d, -v_n);
        let friction = self.friction_force(&v_t, magnitude);

        ContactForce::new(contact.normal * magnitude, friction, contact.point)
    }

    fn normal_force_magnitude(&self, penetration: f64, approach_velocity: f64) -> f64 {
        let spring = self.params.stiffness * penetration.powf(self.params.stiffness_power);
        let damping = self.params.damping * approach_velocity;
        (spring + damping).max(0.0)
    }

    fn friction_force(&self, tangent_velocity: &Vector3<f64>, normal_magnitude: f64) -> Vector3<f64> {
        let mu = self.params.friction_coefficient;
        let speed = tangent_velocity.norm();
        if normal_magnitude <= 0.0 || mu <= 0.0 || speed < 1e-12 {
            return Vector3::zeros();
        }
        let scale = (speed / self.regularization_velocity).tanh();
        -tangent_velocity / speed * (mu * normal_magnitude * scale)
    }

    /// `dF_n/dd = k·p·d^(p-1)`, the local contact stiffness.
    #[must_use]
    pub fn normal_force_jacobian(&self, penetration: f64) -> f64 {
        if penetration <= 0.0 {
            return 0.0;
        }
        self.params.stiffness
            * self.params.stiffness_power
            * penetration.powf(self.params.stiffness_power - 1.0)
    }

    /// Elastic energy stored at a penetration, `k·d^(p+1)/(p+1)`.
    #[must_use]
    pub fn potential_energy(&self, penetration: f64) -> f64 {
        if penetration <= 0.0 {
            return 0.0;
        }
        let p = self.params.stiffness_power;
        self.params.stiffness * penetration.powf(p + 1.0) / (p + 1.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn linear(k: f64, c: f64, mu: f64) -> ContactModel {
        ContactModel::new(
            ContactParams::default()
                .with_stiffness(k)
                .with_damping(c)
                .with_friction(mu)
                .with_margin(0.0),
        )
    }

    #[test]
    fn test_separated_contact_has_no_force() {
        let model = ContactModel::default();
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), 0.01);
        assert!(model.compute_force(&c, &Vector3::new(0.0, 0.0, -1.0)).is_zero());
    }

    #[test]
    fn test_margin_delays_engagement() {
        let model = ContactModel::new(ContactParams::default().with_margin(0.01));
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), -0.005);
        assert!(model.compute_force(&c, &Vector3::zeros()).is_zero());
    }

    #[test]
    fn test_spring_and_damper_add() {
        let model = linear(1000.0, 10.0, 0.0);
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), -0.01);
        let f = model.compute_force(&c, &Vector3::new(0.0, 0.0, -2.0));
        assert_relative_eq!(f.normal.z, 1000.0 * 0.01 + 10.0 * 2.0, epsilon = 1e-9);
        assert_eq!(f.friction, Vector3::zeros());
    }

    #[test]
    fn test_separating_fast_never_pulls() {
        let model = linear(1000.0, 100.0, 0.0);
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), -0.001);
        let f = model.compute_force(&c, &Vector3::new(0.0, 0.0, 5.0));
        assert_eq!(f.normal.z, 0.0);
    }

    #[test]
    fn test_friction_saturates_at_coulomb_bound() {
        let model = linear(1000.0, 0.0, 0.5);
        let c = ContactPoint::new(Point3::origin(), Vector3::z(), -0.01);
        let f = model.compute_force(&c, &Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(f.friction.x, -0.5 * 10.0, epsilon = 1e-9);

        // Slow slip is smoothed.
        let slow = model.compute_force(&c, &Vector3::new(1e-4, 0.0, 0.0));
        assert!(slow.friction.x < 0.0 && slow.friction.x > -5.0);
    }

    #[test]
    fn test_energy_and_stiffness_of_linear_spring() {
        let model = linear(200.0, 0.0, 0.0);
        assert_relative_eq!(model.potential_energy(0.1), 0.5 * 200.0 * 0.01, epsilon = 1e-12);
        assert_relative_eq!(model.normal_force_jacobian(0.1), 200.0, epsilon = 1e-12);
        assert_eq!(model.potential_energy(-0.1), 0.0);
    }
}
