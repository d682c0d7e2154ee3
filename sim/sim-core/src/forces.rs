//! Forces applied every mini-step, and energy dissipation.
//!
//! Recurrent forces add to body force accumulators before forward dynamics.
//! Dissipation acts on velocities after they are integrated.

use sim_types::{GeneralizedConvention, Gravity, JointKind, Result, SuperBodyId};

use crate::world::World;

/// A force re-applied before every forward-dynamics evaluation.
pub trait RecurrentForce {
    /// Add this force to the world's accumulators.
    fn apply(&self, world: &mut World);
}

/// Uniform gravity on every moving body, through its center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityForce {
    /// Gravitational field.
    pub gravity: Gravity,
}

impl GravityForce {
    /// Gravity force for a field.
    #[must_use]
    pub const fn new(gravity: Gravity) -> Self {
        Self { gravity }
    }
}

impl Default for GravityForce {
    fn default() -> Self {
        Self::new(Gravity::earth())
    }
}

impl RecurrentForce for GravityForce {
    fn apply(&self, world: &mut World) {
        for body in world.bodies_mut().filter(|b| b.is_enabled()) {
            let f = self.gravity.force_on_mass(body.mass_properties().mass);
            body.add_force(&f);
        }
    }
}

/// Removes energy from velocities after integration over `h`.
pub trait Dissipation {
    /// Damp the world's velocities over an interval `h`.
    ///
    /// # Errors
    ///
    /// Returns an error if a velocity cannot be written back.
    fn apply(&self, world: &mut World, h: f64) -> Result<()>;
}

/// Exponential viscous damping: `v ← v·exp(−c·h)`.
///
/// Free-body and floating-base velocities use the linear and angular
/// coefficients; revolute joints use the angular one, prismatic joints the
/// linear one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViscousDissipation {
    /// Linear damping coefficient (1/s).
    pub linear: f64,
    /// Angular damping coefficient (1/s).
    pub angular: f64,
}

impl ViscousDissipation {
    /// Damping with the given coefficients.
    #[must_use]
    pub const fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

impl Dissipation for ViscousDissipation {
    fn apply(&self, world: &mut World, h: f64) -> Result<()> {
        let lin = (-self.linear * h).exp();
        let ang = (-self.angular * h).exp();

        for sb in world.super_bodies() {
            let mut v = world.generalized_velocity(sb, GeneralizedConvention::Spatial)?;
            let base_dof = match sb {
                SuperBodyId::Rigid(_) => 6,
                SuperBodyId::Articulated(ab) => world.articulated_body(ab)?.base_dof(),
            };
            if base_dof == 6 {
                v.rows_mut(0, 3).scale_mut(lin);
                v.rows_mut(3, 3).scale_mut(ang);
            }
            if let SuperBodyId::Articulated(ab) = sb {
                let joints = world.articulated_body(ab)?.joints().to_vec();
                let mut k = base_dof;
                for joint in joints {
                    let j = world.joint(joint)?;
                    let factor = match j.kind() {
                        JointKind::Prismatic => lin,
                        JointKind::Revolute | JointKind::Fixed => ang,
                    };
                    v.rows_mut(k, j.num_dof()).scale_mut(factor);
                    k += j.num_dof();
                }
            }
            world.set_generalized_velocity(sb, GeneralizedConvention::Spatial, &v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::joint::JointDef;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use sim_types::{MassProperties, Pose, ReferenceFrame, Twist};

    #[test]
    fn test_gravity_skips_static_bodies() {
        let mut world = World::new();
        let moving = world.add_rigid_body(Pose::identity(), MassProperties::sphere(2.0, 0.5)).unwrap();
        let ground = world.add_static_body(Pose::identity());
        GravityForce::default().apply(&mut world);

        assert_relative_eq!(world.body(moving).unwrap().force(), Vector3::new(0.0, 0.0, -2.0 * 9.81));
        assert_eq!(world.body(ground).unwrap().force(), Vector3::zeros());
    }

    #[test]
    fn test_viscous_damping_decays_exponentially() {
        let mut world = World::new();
        let id = world.add_rigid_body(Pose::identity(), MassProperties::sphere(1.0, 0.5)).unwrap();
        world
            .set_twist(id, &Twist::new(Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 4.0)))
            .unwrap();

        ViscousDissipation::new(1.0, 0.5).apply(&mut world, 0.1).unwrap();
        let twist = world.body(id).unwrap().twist();
        assert_relative_eq!(twist.linear.x, 2.0 * (-0.1f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(twist.angular.z, 4.0 * (-0.05f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_joint_rates_are_damped() {
        let mut world = World::new();
        let ab = world
            .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, ReferenceFrame::Link)
            .unwrap();
        let base = world.base_link(ab).unwrap();
        let (joint, _) = world
            .add_link(
                ab,
                base,
                &JointDef::prismatic(Vector3::x()).with_velocity(1.0),
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap();

        ViscousDissipation::new(2.0, 0.0).apply(&mut world, 0.5).unwrap();
        assert_relative_eq!(world.joint(joint).unwrap().qd()[0], (-1.0f64).exp(), epsilon = 1e-12);
    }
}
