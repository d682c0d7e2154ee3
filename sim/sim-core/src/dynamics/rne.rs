//! Recursive Newton-Euler over articulated bodies.
//!
//! The recursion runs over the link list of an [`ArticulatedBody`], whose
//! parents always precede their children:
//!
//! ```text
//! outward:  a_i = X_i·a_parent + S_i·q̈_i + v_i × (S_i·q̇_i)
//! inward:   f_i = I_i·a_i + v_i ×* (I_i·v_i) − f_ext_i,  f_parent += X_iᵀ·f_i
//! joints:   τ_i = S_iᵀ·f_i
//! ```
//!
//! In link coordinates `S` is constant and the velocity product is the
//! Coriolis term. In world coordinates every `X` is the identity and the
//! same product is `Ṡ·q̇`.
//!
//! A floating base contributes six generalized velocities `[ṗ; ω]` (world
//! velocity of the base origin, world angular velocity). Its spatial
//! acceleration is `S_base·[p̈; ω̇] + bias`.

use hashbrown::HashMap;
use nalgebra::{DVector, Matrix3, Matrix6};
use sim_types::{
    ArticulatedId, BodyId, JointId, ReferenceFrame, Result, SimError, Wrench,
};
use tracing::trace;

use crate::articulated::ArticulatedBody;
use crate::dynamics::spatial::{
    angular, linear, skew, spatial, spatial_cross_force, spatial_cross_motion, SpatialTransform,
    SpatialVector,
};
use crate::world::World;

/// Inputs of an inverse-dynamics query.
#[derive(Debug, Clone, Default)]
pub struct InvDynData {
    /// Desired joint accelerations. Missing joints accelerate at zero.
    pub qdd: HashMap<JointId, DVector<f64>>,
    /// Wrenches applied to links on top of their accumulated forces; the
    /// force acts through the link's center of mass.
    pub wrenches: HashMap<BodyId, Wrench>,
}

impl InvDynData {
    /// Empty query: zero accelerations, no extra wrenches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the desired acceleration of a joint.
    #[must_use]
    pub fn with_qdd(mut self, joint: JointId, qdd: DVector<f64>) -> Self {
        self.qdd.insert(joint, qdd);
        self
    }

    /// Add a wrench on a link.
    #[must_use]
    pub fn with_wrench(mut self, link: BodyId, wrench: Wrench) -> Self {
        self.wrenches.insert(link, wrench);
        self
    }
}

/// Recursive Newton-Euler algorithm.
///
/// # Example
///
/// ```
/// use sim_core::dynamics::{InvDynData, RneAlgorithm};
/// use sim_core::{JointDef, World};
/// use sim_types::{MassProperties, Pose, ReferenceFrame, Vector3};
///
/// let mut world = World::new();
/// let ab = world
///     .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, ReferenceFrame::Link)
///     .unwrap();
/// let base = world.base_link(ab).unwrap();
/// let (joint, _) = world
///     .add_link(ab, base, &JointDef::revolute(Vector3::z()), MassProperties::sphere(1.0, 0.1))
///     .unwrap();
///
/// let forces = RneAlgorithm.calc_inv_dyn(&world, ab, &InvDynData::new()).unwrap();
/// assert_eq!(forces[&joint].len(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RneAlgorithm;

impl RneAlgorithm {
    /// Joint forces that produce the requested joint accelerations.
    ///
    /// Gravity and other recurrent forces enter through each link's
    /// accumulated external force. A floating base is left force-free: its
    /// acceleration is whatever the joint forces produce.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown articulated body, a desired
    /// acceleration of the wrong length, or a singular composite inertia.
    pub fn calc_inv_dyn(
        &self,
        world: &World,
        ab: ArticulatedId,
        data: &InvDynData,
    ) -> Result<HashMap<JointId, DVector<f64>>> {
        let tree = TreeTerms::gather(world, ab, &data.wrenches)?;
        let articulated = world.articulated_body(ab)?;

        let mut qdd = DVector::zeros(tree.num_gv);
        for (k, &joint) in articulated.joints().iter().enumerate() {
            let Some(desired) = data.qdd.get(&joint) else {
                continue;
            };
            let dof = tree.axes[k + 1].len();
            if desired.len() != dof {
                return Err(SimError::invalid_config(format!(
                    "{joint} has {dof} DOF, desired acceleration has {}",
                    desired.len()
                )));
            }
            qdd.rows_mut(tree.offsets[k + 1], dof).copy_from(desired);
        }

        let tau = if tree.floating {
            tree.floating_base_inverse_dynamics(&qdd)?
        } else {
            tree.generalized_forces(&qdd, Terms::Full)
        };
        trace!(articulated = %ab, frame = ?tree.frame, "inverse dynamics");
        Ok(tree.per_joint(articulated, &tau))
    }

    /// Store each joint's constraint wrench in [`Joint::lambda`].
    ///
    /// `λ = f − S·(SᵀS)⁻¹·Sᵀ·f`, with `f` the force transmitted through the
    /// joint under the accelerations of the last forward dynamics. `Sᵀ·λ`
    /// vanishes, so `λ` only carries what the joint constrains.
    ///
    /// [`Joint::lambda`]: crate::Joint::lambda
    ///
    /// # Errors
    ///
    /// Returns [`SimError::PreconditionFailed`] if the state changed since
    /// the last forward dynamics.
    pub fn calc_constraint_forces(&self, world: &mut World, ab: ArticulatedId) -> Result<()> {
        let articulated = world.articulated_body(ab)?;
        if !articulated.accelerations_valid {
            return Err(SimError::precondition(format!(
                "{ab} has no accelerations for the current state; run forward dynamics first"
            )));
        }
        let links = articulated.links().to_vec();
        let joints = articulated.joints().to_vec();

        let tree = TreeTerms::gather(world, ab, &HashMap::new())?;
        let mut acc = Vec::with_capacity(links.len());
        for (k, &link) in links.iter().enumerate() {
            let stored = world.body(link)?.spatial_acceleration();
            acc.push(tree.to_frame[k].apply_motion(&stored));
        }
        let forces = tree.forces(&acc, Terms::Full);

        for (k, &joint) in joints.iter().enumerate() {
            let f = forces[k + 1];
            let lambda = constrained_part(&tree.axes[k + 1], &f);
            world.joint_slot(joint).lambda = lambda;
        }
        Ok(())
    }
}

/// Which terms of the recursion are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terms {
    /// Velocity products, bias and external forces included.
    Full,
    /// Only `I·a`: the recursion is linear in the accelerations.
    InertialOnly,
}

/// One articulated body's recursion inputs, expressed in its computation
/// frame. Index 0 is the base.
#[derive(Debug, Clone)]
pub(crate) struct TreeTerms {
    pub(crate) frame: ReferenceFrame,
    pub(crate) floating: bool,
    pub(crate) num_gv: usize,
    parent: Vec<usize>,
    /// `X_{i←parent}`; identity in world coordinates.
    x_parent: Vec<SpatialTransform>,
    /// Link coordinates to computation-frame coordinates.
    pub(crate) to_frame: Vec<SpatialTransform>,
    pub(crate) axes: Vec<Vec<SpatialVector>>,
    axes_dot: Vec<Vec<SpatialVector>>,
    pub(crate) offsets: Vec<usize>,
    qd: Vec<DVector<f64>>,
    velocity: Vec<SpatialVector>,
    inertia: Vec<Matrix6<f64>>,
    external: Vec<SpatialVector>,
    base_axes: Matrix6<f64>,
    base_bias: SpatialVector,
}

impl TreeTerms {
    pub(crate) fn gather(
        world: &World,
        ab: ArticulatedId,
        extra: &HashMap<BodyId, Wrench>,
    ) -> Result<Self> {
        let articulated: &ArticulatedBody = world.articulated_body(ab)?;
        let frame = articulated.reference_frame();
        let n = articulated.links().len();

        let mut tree = Self {
            frame,
            floating: articulated.is_floating_base(),
            num_gv: articulated.base_dof(),
            parent: Vec::with_capacity(n),
            x_parent: Vec::with_capacity(n),
            to_frame: Vec::with_capacity(n),
            axes: Vec::with_capacity(n),
            axes_dot: Vec::with_capacity(n),
            offsets: Vec::with_capacity(n),
            qd: Vec::with_capacity(n),
            velocity: Vec::with_capacity(n),
            inertia: Vec::with_capacity(n),
            external: Vec::with_capacity(n),
            base_axes: Matrix6::zeros(),
            base_bias: SpatialVector::zeros(),
        };

        for (k, &link) in articulated.links().iter().enumerate() {
            let body = world.body(link)?;
            let to_frame = match frame {
                ReferenceFrame::Link => SpatialTransform::identity(),
                ReferenceFrame::Global => SpatialTransform::from_pose(body.pose()).inverse(),
            };

            let mut external = body.external_spatial_force();
            if let Some(wrench) = extra.get(&link) {
                external += body.spatial_force_of(wrench);
            }

            let (parent, x_parent, axes, axes_dot, qd) = if k == 0 {
                (0, SpatialTransform::identity(), Vec::new(), Vec::new(), DVector::zeros(0))
            } else {
                let joint = world.joint(articulated.joints()[k - 1])?;
                let parent = articulated.link_index(joint.parent_link()).ok_or_else(|| {
                    SimError::topology(format!("{} parent missing from {ab}", joint.id()))
                })?;
                let x_parent = match frame {
                    ReferenceFrame::Link => {
                        SpatialTransform::between(world.body(joint.parent_link())?.pose(), body.pose())
                    }
                    ReferenceFrame::Global => SpatialTransform::identity(),
                };
                let axes = joint
                    .spatial_axes()
                    .iter()
                    .map(|s| to_frame.apply_motion(s))
                    .collect();
                let axes_dot = world.spatial_axes_dot(joint.id(), frame)?;
                (parent, x_parent, axes, axes_dot, joint.qd().clone())
            };

            tree.offsets.push(tree.num_gv);
            tree.num_gv += qd.len();
            tree.parent.push(parent);
            tree.x_parent.push(x_parent);
            tree.axes.push(axes);
            tree.axes_dot.push(axes_dot);
            tree.qd.push(qd);
            tree.velocity.push(to_frame.apply_motion(&body.spatial_velocity()));
            tree.inertia.push(to_frame.transform_inertia(&body.spatial_inertia()));
            tree.external.push(to_frame.apply_force(&external));
            tree.to_frame.push(to_frame);
        }

        if tree.floating {
            let base = world.body(articulated.base_link())?;
            let (axes, bias) = base_motion_subspace(base.pose(), &base.spatial_velocity(), frame);
            tree.base_axes = axes;
            tree.base_bias = bias;
        }
        Ok(tree)
    }

    pub(crate) fn len(&self) -> usize {
        self.parent.len()
    }

    /// Base spatial acceleration for a generalized acceleration.
    fn base_acceleration(&self, qdd: &DVector<f64>, terms: Terms) -> SpatialVector {
        if !self.floating {
            return SpatialVector::zeros();
        }
        let mut a = self.base_axes * qdd.fixed_rows::<6>(0);
        if terms == Terms::Full {
            a += self.base_bias;
        }
        a
    }

    /// Outward pass: link accelerations in the computation frame.
    pub(crate) fn accelerations(&self, qdd: &DVector<f64>, terms: Terms) -> Vec<SpatialVector> {
        self.accelerations_from(self.base_acceleration(qdd, terms), qdd, terms)
    }

    fn accelerations_from(
        &self,
        base: SpatialVector,
        qdd: &DVector<f64>,
        terms: Terms,
    ) -> Vec<SpatialVector> {
        let mut acc = Vec::with_capacity(self.len());
        acc.push(base);
        for k in 1..self.len() {
            let mut a = self.x_parent[k].apply_motion(&acc[self.parent[k]]);
            let mut s_qd = SpatialVector::zeros();
            let mut sdot_qd = SpatialVector::zeros();
            for (d, (s, sdot)) in self.axes[k].iter().zip(&self.axes_dot[k]).enumerate() {
                a += s * qdd[self.offsets[k] + d];
                s_qd += s * self.qd[k][d];
                sdot_qd += sdot * self.qd[k][d];
            }
            if terms == Terms::Full {
                a += sdot_qd + spatial_cross_motion(&self.velocity[k], &s_qd);
            }
            acc.push(a);
        }
        acc
    }

    /// Inward pass: force each link transmits to its subtree.
    pub(crate) fn forces(&self, acc: &[SpatialVector], terms: Terms) -> Vec<SpatialVector> {
        let mut f: Vec<SpatialVector> = (0..self.len())
            .map(|k| {
                let mut fk = self.inertia[k] * acc[k];
                if terms == Terms::Full {
                    let momentum = self.inertia[k] * self.velocity[k];
                    fk += spatial_cross_force(&self.velocity[k], &momentum) - self.external[k];
                }
                fk
            })
            .collect();
        for k in (1..self.len()).rev() {
            let carried = self.x_parent[k].apply_transpose_force(&f[k]);
            f[self.parent[k]] += carried;
        }
        f
    }

    /// Generalized forces `Sᵀ·f` for the given link forces.
    fn project(&self, f: &[SpatialVector]) -> DVector<f64> {
        let mut tau = DVector::zeros(self.num_gv);
        if self.floating {
            tau.fixed_rows_mut::<6>(0)
                .copy_from(&(self.base_axes.transpose() * f[0]));
        }
        for k in 1..self.len() {
            for (d, s) in self.axes[k].iter().enumerate() {
                tau[self.offsets[k] + d] = s.dot(&f[k]);
            }
        }
        tau
    }

    /// `H·q̈ + C` (with [`Terms::Full`]) or `H·q̈` (with
    /// [`Terms::InertialOnly`]), base included.
    pub(crate) fn generalized_forces(&self, qdd: &DVector<f64>, terms: Terms) -> DVector<f64> {
        let acc = self.accelerations(qdd, terms);
        self.project(&self.forces(&acc, terms))
    }

    /// Joint forces for desired joint accelerations with a force-free base.
    fn floating_base_inverse_dynamics(&self, qdd: &DVector<f64>) -> Result<DVector<f64>> {
        let acc = self.accelerations_from(SpatialVector::zeros(), qdd, Terms::Full);
        let z = self.forces(&acc, Terms::Full);

        let mut composite = self.inertia.clone();
        for k in (1..self.len()).rev() {
            let carried = self.x_parent[k].inverse().transform_inertia(&composite[k]);
            composite[self.parent[k]] += carried;
        }

        let a0 = -composite[0]
            .cholesky()
            .ok_or_else(|| SimError::singular_inertia("composite inertia of the floating base"))?
            .solve(&z[0]);

        let mut from_base = vec![SpatialTransform::identity(); self.len()];
        let mut tau = DVector::zeros(self.num_gv);
        for k in 1..self.len() {
            from_base[k] = from_base[self.parent[k]].then(&self.x_parent[k]);
            let f = composite[k] * from_base[k].apply_motion(&a0) + z[k];
            for (d, s) in self.axes[k].iter().enumerate() {
                tau[self.offsets[k] + d] = s.dot(&f);
            }
        }
        Ok(tau)
    }

    /// Split a generalized vector into per-joint pieces.
    pub(crate) fn per_joint(
        &self,
        articulated: &ArticulatedBody,
        values: &DVector<f64>,
    ) -> HashMap<JointId, DVector<f64>> {
        articulated
            .joints()
            .iter()
            .enumerate()
            .map(|(k, &joint)| {
                let dof = self.axes[k + 1].len();
                (joint, values.rows(self.offsets[k + 1], dof).into_owned())
            })
            .collect()
    }
}

/// `S_base` and the bias acceleration of a floating base whose generalized
/// velocity is `[ṗ; ω]` in world coordinates.
fn base_motion_subspace(
    pose: &sim_types::Pose,
    body_velocity: &SpatialVector,
    frame: ReferenceFrame,
) -> (Matrix6<f64>, SpatialVector) {
    let mut axes = Matrix6::zeros();
    match frame {
        ReferenceFrame::Link => {
            // [Rᵀ·ω̇; Rᵀ·p̈ − ω_b × v_b]
            let rt = pose.rotation_matrix().transpose();
            axes.fixed_view_mut::<3, 3>(0, 3).copy_from(&rt);
            axes.fixed_view_mut::<3, 3>(3, 0).copy_from(&rt);
            let w = angular(body_velocity);
            let v = linear(body_velocity);
            (axes, spatial(&nalgebra::Vector3::zeros(), &(-w.cross(&v))))
        }
        ReferenceFrame::Global => {
            // [ω̇; p̈ + p × ω̇ + ṗ × ω]
            axes.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());
            axes.fixed_view_mut::<3, 3>(3, 0).copy_from(&Matrix3::identity());
            axes.fixed_view_mut::<3, 3>(3, 3)
                .copy_from(&skew(&pose.position.coords));
            let w = pose.transform_vector(&angular(body_velocity));
            let p_dot = pose.transform_vector(&linear(body_velocity));
            (axes, spatial(&nalgebra::Vector3::zeros(), &p_dot.cross(&w)))
        }
    }
}

/// Component of `f` orthogonal to the joint's motion subspace.
fn constrained_part(axes: &[SpatialVector], f: &SpatialVector) -> SpatialVector {
    let mut lambda = *f;
    // Single-DOF and fixed joints only, so the axes never need
    // orthogonalizing against each other.
    for s in axes {
        let ss = s.dot(s);
        if ss > sim_types::NEAR_ZERO {
            lambda -= s * (s.dot(f) / ss);
        }
    }
    lambda
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::dynamics::forward::calc_fwd_dyn;
    use crate::joint::JointDef;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use sim_types::{Gravity, MassProperties, Pose};
    use std::f64::consts::FRAC_PI_2;

    fn add_gravity(world: &mut World) {
        let g = Gravity::earth();
        let loads: Vec<_> = world
            .bodies()
            .map(|b| (b.id(), g.force_on_mass(b.mass_properties().mass)))
            .collect();
        for (id, f) in loads {
            world.add_force(id, &f).unwrap();
        }
    }

    fn rod(frame: ReferenceFrame, q: f64) -> (World, ArticulatedId, JointId) {
        let mut world = World::new();
        let ab = world
            .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, frame)
            .unwrap();
        let base = world.base_link(ab).unwrap();
        let (joint, _) = world
            .add_link(
                ab,
                base,
                &JointDef::revolute(Vector3::y()).with_position(q),
                MassProperties::rod(2.0, 1.0, Vector3::new(0.0, 0.0, -0.5)),
            )
            .unwrap();
        (world, ab, joint)
    }

    #[test]
    fn test_holding_torque_of_horizontal_rod() {
        for frame in [ReferenceFrame::Link, ReferenceFrame::Global] {
            let (mut world, ab, joint) = rod(frame, FRAC_PI_2);
            add_gravity(&mut world);
            let tau = RneAlgorithm
                .calc_inv_dyn(&world, ab, &InvDynData::new())
                .unwrap();
            // COM sits at (-0.5, 0, 0); gravity's moment about +Y is -m·g·0.5.
            assert_relative_eq!(tau[&joint][0], 2.0 * 9.81 * 0.5, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_extra_wrench_cancels_gravity() {
        let (mut world, ab, joint) = rod(ReferenceFrame::Link, FRAC_PI_2);
        add_gravity(&mut world);
        let link = world.joint(joint).unwrap().child_link();
        let data = InvDynData::new().with_wrench(link, Wrench::force(Vector3::new(0.0, 0.0, 2.0 * 9.81)));
        let tau = RneAlgorithm.calc_inv_dyn(&world, ab, &data).unwrap();
        assert_relative_eq!(tau[&joint][0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_wrong_acceleration_length_is_rejected() {
        let (world, ab, joint) = rod(ReferenceFrame::Link, 0.0);
        let data = InvDynData::new().with_qdd(joint, DVector::zeros(2));
        assert!(RneAlgorithm.calc_inv_dyn(&world, ab, &data).unwrap_err().is_config_error());
    }

    #[test]
    fn test_constraint_forces_need_fresh_accelerations() {
        let (mut world, ab, joint) = rod(ReferenceFrame::Link, 0.3);
        let err = RneAlgorithm.calc_constraint_forces(&mut world, ab).unwrap_err();
        assert!(matches!(err, SimError::PreconditionFailed { .. }));

        add_gravity(&mut world);
        calc_fwd_dyn(&mut world).unwrap();
        RneAlgorithm.calc_constraint_forces(&mut world, ab).unwrap();
        let j = world.joint(joint).unwrap();
        let s = j.spatial_axes()[0];
        assert_relative_eq!(s.dot(&j.lambda()), 0.0, epsilon = 1e-10);

        world.set_joint_velocity(joint, &[1.0]).unwrap();
        assert!(RneAlgorithm.calc_constraint_forces(&mut world, ab).is_err());
    }

    #[test]
    fn test_fixed_joint_carries_full_weight() {
        let mut world = World::new();
        let ab = world
            .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, ReferenceFrame::Link)
            .unwrap();
        let base = world.base_link(ab).unwrap();
        let (joint, _) = world
            .add_link(
                ab,
                base,
                &JointDef::fixed().with_offset(Pose::from_position(Point3::new(0.0, 0.0, -1.0))),
                MassProperties::sphere(3.0, 0.1),
            )
            .unwrap();
        add_gravity(&mut world);
        calc_fwd_dyn(&mut world).unwrap();
        RneAlgorithm.calc_constraint_forces(&mut world, ab).unwrap();

        let lambda = world.joint(joint).unwrap().lambda();
        assert_relative_eq!(linear(&lambda), Vector3::new(0.0, 0.0, 3.0 * 9.81), epsilon = 1e-10);
    }
}
