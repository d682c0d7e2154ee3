//! The view of the multibody system the constraint layer works against.

use nalgebra::{DMatrix, DVector, Point3};
use sim_types::{BodyId, JointId, Result, SuperBodyId};

/// Generalized-coordinate access needed to assemble and apply constraint
/// problems.
///
/// Velocities here are in the spatial convention: a free rigid body has six
/// (linear then angular), an articulated body has its joint rates plus six
/// for a floating base. Implemented by the simulation world.
pub trait ConstraintDynamics {
    /// Super body owning a rigid body, `None` if the body is static.
    fn super_body(&self, body: BodyId) -> Option<SuperBodyId>;

    /// Super body and generalized-velocity index of a joint DOF.
    fn joint_dof(&self, joint: JointId, dof: usize) -> Option<(SuperBodyId, usize)>;

    /// Number of generalized velocities of a super body.
    fn num_generalized_velocities(&self, super_body: SuperBodyId) -> usize;

    /// Current generalized velocity of a super body.
    fn generalized_velocity(&self, super_body: SuperBodyId) -> DVector<f64>;

    /// Jacobian mapping the owning super body's generalized velocity to the
    /// world-frame velocity of a point fixed to `body` (3 rows).
    fn point_jacobian(&self, body: BodyId, point: &Point3<f64>) -> Result<DMatrix<f64>>;

    /// `M⁻¹·rhs` with the super body's generalized inertia.
    fn solve_generalized_inertia(
        &self,
        super_body: SuperBodyId,
        rhs: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>>;

    /// Add `dv` to a super body's generalized velocity.
    fn apply_velocity_change(&mut self, super_body: SuperBodyId, dv: &DVector<f64>) -> Result<()>;
}
