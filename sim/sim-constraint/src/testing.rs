//! Point-mass system for unit tests.

use nalgebra::{DMatrix, DVector, Point3, Vector3};
use sim_contact::ContactPoint;
use sim_types::{BodyId, GeomId, JointId, Result, SimError, SuperBodyId};

use crate::{ConstraintDynamics, ContactConstraint, UnilateralConstraint};

/// Free point masses with three translational velocities each.
///
/// Joint `k` is the Z coordinate of body `k`.
#[derive(Debug, Clone)]
pub(crate) struct PointMasses {
    pub masses: Vec<f64>,
    pub velocities: Vec<Vector3<f64>>,
    statics: Vec<BodyId>,
}

impl PointMasses {
    pub fn new(masses: &[f64]) -> Self {
        Self {
            masses: masses.to_vec(),
            velocities: vec![Vector3::zeros(); masses.len()],
            statics: Vec::new(),
        }
    }

    pub fn with_static(mut self, body: BodyId) -> Self {
        self.statics.push(body);
        self
    }

    pub fn with_velocity(mut self, body: usize, v: Vector3<f64>) -> Self {
        self.velocities[body] = v;
        self
    }

    /// Contact with A above B along +Z.
    pub fn contact(a: u64, b: u64, distance: f64) -> UnilateralConstraint {
        Self::contact_with_friction(a, b, distance, 0.0)
    }

    pub fn contact_with_friction(
        a: u64,
        b: u64,
        distance: f64,
        friction: f64,
    ) -> UnilateralConstraint {
        UnilateralConstraint::Contact(ContactConstraint {
            geom_a: GeomId::new(a),
            geom_b: GeomId::new(b),
            body_a: BodyId::new(a),
            body_b: BodyId::new(b),
            contact: ContactPoint::new(Point3::origin(), Vector3::z(), distance),
            friction,
        })
    }

    fn body_index(&self, sb: SuperBodyId) -> Option<usize> {
        match sb {
            SuperBodyId::Rigid(b) if b.index() < self.masses.len() => Some(b.index()),
            _ => None,
        }
    }
}

impl ConstraintDynamics for PointMasses {
    fn super_body(&self, body: BodyId) -> Option<SuperBodyId> {
        (body.index() < self.masses.len() && !self.statics.contains(&body))
            .then_some(SuperBodyId::Rigid(body))
    }

    fn joint_dof(&self, joint: JointId, dof: usize) -> Option<(SuperBodyId, usize)> {
        let body = BodyId::new(joint.raw());
        (dof == 0)
            .then(|| self.super_body(body))
            .flatten()
            .map(|sb| (sb, 2))
    }

    fn num_generalized_velocities(&self, _super_body: SuperBodyId) -> usize {
        3
    }

    fn generalized_velocity(&self, super_body: SuperBodyId) -> DVector<f64> {
        self.body_index(super_body)
            .map_or_else(|| DVector::zeros(3), |i| DVector::from_column_slice(self.velocities[i].as_slice()))
    }

    fn point_jacobian(&self, body: BodyId, _point: &Point3<f64>) -> Result<DMatrix<f64>> {
        if body.index() >= self.masses.len() {
            return Err(SimError::InvalidBodyId(body.raw()));
        }
        Ok(DMatrix::identity(3, 3))
    }

    fn solve_generalized_inertia(
        &self,
        super_body: SuperBodyId,
        rhs: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>> {
        let i = self
            .body_index(super_body)
            .ok_or_else(|| SimError::singular_inertia("unknown body"))?;
        Ok(rhs / self.masses[i])
    }

    fn apply_velocity_change(&mut self, super_body: SuperBodyId, dv: &DVector<f64>) -> Result<()> {
        let i = self
            .body_index(super_body)
            .ok_or_else(|| SimError::singular_inertia("unknown body"))?;
        self.velocities[i] += Vector3::new(dv[0], dv[1], dv[2]);
        Ok(())
    }
}
