//! The world arena and its generalized-coordinate interface.
//!
//! The [`World`] owns every rigid body, joint, articulated body and
//! collision geometry. Entities refer to each other by handle; a handle is
//! the entity's index in its arena and is never reused.
//!
//! Dynamic state is exposed per super body ([`SuperBodyId`]) through
//! generalized coordinates:
//!
//! | Super body | Euler coordinates | Spatial velocity |
//! |---|---|---|
//! | free rigid body | `[p; (w, x, y, z)]` | `[ṗ; ω]` |
//! | floating-base articulated | `[p; quat; q]` | `[ṗ; ω; q̇]` |
//! | fixed-base articulated | `q` | `q̇` |
//!
//! `ṗ` and `ω` are world-frame velocities of the body (or base) origin.
//! Euler velocities replace `ω` with the quaternion rate `½·[0, ω]⊗quat`.
//!
//! # Example
//!
//! ```
//! use sim_core::{JointDef, World};
//! use sim_types::{MassProperties, Point3, Pose, ReferenceFrame, SuperBodyId, Vector3};
//!
//! let mut world = World::new();
//! let ab = world
//!     .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, ReferenceFrame::Link)
//!     .unwrap();
//! let base = world.articulated_body(ab).unwrap().base_link();
//! let (_, link) = world
//!     .add_link(
//!         ab,
//!         base,
//!         &JointDef::revolute(Vector3::y()),
//!         MassProperties::rod(1.0, 1.0, Vector3::new(0.0, 0.0, -0.5)),
//!     )
//!     .unwrap();
//!
//! assert_eq!(world.parent_link(link).unwrap(), Some(base));
//! assert_eq!(world.generalized_coordinates(SuperBodyId::Articulated(ab)).unwrap().len(), 1);
//! ```

use nalgebra::{DMatrix, DVector, Matrix3, Point3, Quaternion, UnitQuaternion, Vector3};
use sim_constraint::{active_limits, ConstraintDynamics, ContactConstraint, UnilateralConstraint};
use sim_contact::{
    generate_contacts, signed_distance, CollisionGeometry, ContactParams, GeomMotion,
    PairwiseDistInfo, Primitive,
};
use sim_types::{
    ArticulatedId, BodyId, Compliance, GeneralizedConvention, GeomId, Gravity, JointId,
    MassProperties, Pose, ReferenceFrame, Result, SimError, SuperBodyId, Twist, NEAR_ZERO,
};
use tracing::debug;

use crate::articulated::ArticulatedBody;
use crate::body::RigidBody;
use crate::broad_phase::BroadPhaseEntry;
use crate::dynamics::forward;
use crate::dynamics::spatial::{angular, linear, skew, spatial, SpatialTransform, SpatialVector};
use crate::joint::{Joint, JointDef};

/// Arena of bodies, joints, articulated bodies and geometries.
#[derive(Debug, Clone, Default)]
pub struct World {
    bodies: Vec<RigidBody>,
    joints: Vec<Joint>,
    articulated: Vec<ArticulatedBody>,
    geometries: Vec<CollisionGeometry>,
}

impl World {
    /// Empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Construction ====================

    /// Add a free rigid body.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid mass properties or a non-finite pose.
    pub fn add_rigid_body(&mut self, pose: Pose, mass: MassProperties) -> Result<BodyId> {
        mass.validate()?;
        check_pose(&pose)?;
        let id = BodyId::new(self.bodies.len() as u64);
        self.bodies.push(RigidBody::new(id, pose, mass));
        debug!(body = %id, mass = mass.mass, "added rigid body");
        Ok(id)
    }

    /// Add a body that never moves.
    pub fn add_static_body(&mut self, pose: Pose) -> BodyId {
        let id = BodyId::new(self.bodies.len() as u64);
        let mut body = RigidBody::new(id, pose, MassProperties::sphere(1.0, 1.0));
        body.enabled = false;
        self.bodies.push(body);
        debug!(body = %id, "added static body");
        id
    }

    /// Add an articulated body consisting of its base link.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base mass properties or pose.
    pub fn add_articulated_body(
        &mut self,
        base_pose: Pose,
        base_mass: MassProperties,
        floating_base: bool,
        frame: ReferenceFrame,
    ) -> Result<ArticulatedId> {
        let base = self.add_rigid_body(base_pose, base_mass)?;
        let id = ArticulatedId::new(self.articulated.len() as u64);
        self.bodies[base.index()].articulated = Some(id);
        self.articulated
            .push(ArticulatedBody::new(id, base, floating_base, frame));
        debug!(articulated = %id, floating_base, "added articulated body");
        Ok(id)
    }

    /// Add a link below `parent`, connected by a new joint.
    ///
    /// # Errors
    ///
    /// Returns a topology error if `parent` is not a link of `ab`, and
    /// configuration errors for an invalid joint or mass.
    pub fn add_link(
        &mut self,
        ab: ArticulatedId,
        parent: BodyId,
        def: &JointDef,
        mass: MassProperties,
    ) -> Result<(JointId, BodyId)> {
        if self.articulated_body(ab)?.link_index(parent).is_none() {
            return Err(SimError::topology(format!("{parent} is not a link of {ab}")));
        }
        mass.validate()?;

        let joint_id = JointId::new(self.joints.len() as u64);
        let child = BodyId::new(self.bodies.len() as u64);
        let joint = Joint::from_def(joint_id, ab, parent, child, def)?;

        let mut body = RigidBody::new(child, joint.child_pose(&self.bodies[parent.index()].pose), mass);
        body.articulated = Some(ab);
        body.inner_joint = Some(joint_id);

        self.bodies.push(body);
        self.joints.push(joint);
        self.bodies[parent.index()].outer_joints.push(joint_id);
        let articulated = &mut self.articulated[ab.index()];
        articulated.links.push(child);
        articulated.joints.push(joint_id);

        self.update_kinematics(ab)?;
        debug!(articulated = %ab, joint = %joint_id, link = %child, kind = %def.kind, "added link");
        Ok((joint_id, child))
    }

    /// Attach a geometry at the body origin.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] for an unknown body.
    pub fn attach_geometry(&mut self, body: BodyId, primitive: Primitive) -> Result<GeomId> {
        self.attach_geometry_at(body, primitive, Pose::identity())
    }

    /// Attach a geometry placed relative to the body frame.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] for an unknown body.
    pub fn attach_geometry_at(
        &mut self,
        body: BodyId,
        primitive: Primitive,
        relative_pose: Pose,
    ) -> Result<GeomId> {
        self.body(body)?;
        check_pose(&relative_pose)?;
        let id = GeomId::new(self.geometries.len() as u64);
        self.geometries
            .push(CollisionGeometry::new(id, body, primitive).with_relative_pose(relative_pose));
        self.bodies[body.index()].geometries.push(id);
        Ok(id)
    }

    /// Set the surface material (friction) of a geometry.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry or invalid parameters.
    pub fn set_material(&mut self, geom: GeomId, material: ContactParams) -> Result<()> {
        material.validate()?;
        self.geometry_mut(geom)?.material = material;
        Ok(())
    }

    /// Make a body rigid or compliant (penalty-based).
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown body or invalid parameters.
    pub fn set_compliance(
        &mut self,
        body: BodyId,
        compliance: Compliance,
        penalty: ContactParams,
    ) -> Result<()> {
        penalty.validate()?;
        let b = self.body_mut(body)?;
        b.compliance = compliance;
        b.penalty = penalty;
        Ok(())
    }

    /// Enable or disable a free rigid body. Disabled bodies are static.
    ///
    /// # Errors
    ///
    /// Returns a topology error for links of articulated bodies.
    pub fn set_enabled(&mut self, body: BodyId, enabled: bool) -> Result<()> {
        let b = self.body_mut(body)?;
        if b.articulated.is_some() {
            return Err(SimError::topology(format!(
                "{body} is a link; links follow their articulated body"
            )));
        }
        b.enabled = enabled;
        Ok(())
    }

    // ==================== Lookup ====================

    /// Body by handle.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] for an unknown handle.
    pub fn body(&self, id: BodyId) -> Result<&RigidBody> {
        self.bodies
            .get(id.index())
            .ok_or(SimError::InvalidBodyId(id.raw()))
    }

    /// Mutable body, for force accumulation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] for an unknown handle.
    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(id.index())
            .ok_or(SimError::InvalidBodyId(id.raw()))
    }

    /// Joint by handle.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidJointId`] for an unknown handle.
    pub fn joint(&self, id: JointId) -> Result<&Joint> {
        self.joints
            .get(id.index())
            .ok_or(SimError::InvalidJointId(id.raw()))
    }

    pub(crate) fn joint_mut(&mut self, id: JointId) -> Result<&mut Joint> {
        self.joints
            .get_mut(id.index())
            .ok_or(SimError::InvalidJointId(id.raw()))
    }

    /// Articulated body by handle.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidArticulatedId`] for an unknown handle.
    pub fn articulated_body(&self, id: ArticulatedId) -> Result<&ArticulatedBody> {
        self.articulated
            .get(id.index())
            .ok_or(SimError::InvalidArticulatedId(id.raw()))
    }

    pub(crate) fn articulated_body_mut(&mut self, id: ArticulatedId) -> Result<&mut ArticulatedBody> {
        self.articulated
            .get_mut(id.index())
            .ok_or(SimError::InvalidArticulatedId(id.raw()))
    }

    /// Geometry by handle.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidGeomId`] for an unknown handle.
    pub fn geometry(&self, id: GeomId) -> Result<&CollisionGeometry> {
        self.geometries
            .get(id.index())
            .ok_or(SimError::InvalidGeomId(id.raw()))
    }

    fn geometry_mut(&mut self, id: GeomId) -> Result<&mut CollisionGeometry> {
        self.geometries
            .get_mut(id.index())
            .ok_or(SimError::InvalidGeomId(id.raw()))
    }

    /// All bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter()
    }

    pub(crate) fn bodies_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> {
        self.bodies.iter_mut()
    }

    /// All joints.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter()
    }

    /// All articulated bodies.
    pub fn articulated_bodies(&self) -> impl Iterator<Item = &ArticulatedBody> {
        self.articulated.iter()
    }

    /// All collision geometries.
    pub fn geometries(&self) -> impl Iterator<Item = &CollisionGeometry> {
        self.geometries.iter()
    }

    /// Number of bodies, links included.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    // ==================== Tree traversal ====================

    /// Base link of an articulated body.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown handle.
    pub fn base_link(&self, ab: ArticulatedId) -> Result<BodyId> {
        Ok(self.articulated_body(ab)?.base_link())
    }

    /// Parent link, `None` for a base or a free body.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown handle.
    pub fn parent_link(&self, link: BodyId) -> Result<Option<BodyId>> {
        match self.body(link)?.inner_joint {
            Some(j) => Ok(Some(self.joint(j)?.parent)),
            None => Ok(None),
        }
    }

    /// Child links in joint order.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown handle.
    pub fn child_links(&self, link: BodyId) -> Result<Vec<BodyId>> {
        self.body(link)?
            .outer_joints
            .iter()
            .map(|&j| self.joint(j).map(|joint| joint.child))
            .collect()
    }

    /// Inner joint of a link.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown handle.
    pub fn inner_joint(&self, link: BodyId) -> Result<Option<JointId>> {
        Ok(self.body(link)?.inner_joint)
    }

    /// Spatial axes of a joint in the given frame.
    ///
    /// `Link` axes are in the child link frame; `Global` axes are in world
    /// coordinates about the world origin.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown joint.
    pub fn spatial_axes(&self, joint: JointId, frame: ReferenceFrame) -> Result<Vec<SpatialVector>> {
        let j = self.joint(joint)?;
        let axes = j.spatial_axes();
        Ok(match frame {
            ReferenceFrame::Link => axes,
            ReferenceFrame::Global => {
                let to_world = SpatialTransform::from_pose(&self.body(j.child)?.pose).inverse();
                axes.iter().map(|s| to_world.apply_motion(s)).collect()
            }
        })
    }

    /// Time derivatives of the spatial axes in the given frame.
    ///
    /// This is the change of the axes relative to the child link. The motion
    /// of the link itself enters the recursion through `v × S·q̇`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown joint.
    pub fn spatial_axes_dot(
        &self,
        joint: JointId,
        frame: ReferenceFrame,
    ) -> Result<Vec<SpatialVector>> {
        let j = self.joint(joint)?;
        let dots = j.spatial_axes_dot();
        Ok(match frame {
            ReferenceFrame::Link => dots,
            ReferenceFrame::Global => {
                let to_world = SpatialTransform::from_pose(&self.body(j.child)?.pose).inverse();
                dots.iter().map(|s| to_world.apply_motion(s)).collect()
            }
        })
    }

    // ==================== Direct state access ====================

    /// Place a free body or the base of an articulated body.
    ///
    /// World-frame velocities are kept.
    ///
    /// # Errors
    ///
    /// Returns a topology error for non-base links.
    pub fn set_pose(&mut self, body: BodyId, pose: Pose) -> Result<()> {
        check_pose(&pose)?;
        let b = self.body_mut(body)?;
        if b.inner_joint.is_some() {
            return Err(SimError::topology(format!("{body} is placed by its inner joint")));
        }
        let twist = b.twist();
        b.pose = pose;
        b.set_twist(&twist);
        self.refresh_owner(body)
    }

    /// Set the world twist of a free body or a floating base.
    ///
    /// # Errors
    ///
    /// Returns a topology error for links whose velocity follows from joints.
    pub fn set_twist(&mut self, body: BodyId, twist: &Twist) -> Result<()> {
        let movable = self.body(body)?.inner_joint.is_none()
            && match self.body(body)?.articulated {
                Some(ab) => self.articulated_body(ab)?.floating_base,
                None => true,
            };
        if !movable {
            return Err(SimError::topology(format!("{body} velocity follows from its joints")));
        }
        self.bodies[body.index()].set_twist(twist);
        self.refresh_owner(body)
    }

    /// Set joint positions, one per DOF.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown joint or a length mismatch.
    pub fn set_joint_position(&mut self, joint: JointId, q: &[f64]) -> Result<()> {
        let j = self.joint_mut(joint)?;
        set_dofs(&mut j.q, q, joint)?;
        let ab = j.articulated;
        self.update_kinematics(ab)
    }

    /// Set joint velocities, one per DOF.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown joint or a length mismatch.
    pub fn set_joint_velocity(&mut self, joint: JointId, qd: &[f64]) -> Result<()> {
        let j = self.joint_mut(joint)?;
        set_dofs(&mut j.qd, qd, joint)?;
        let ab = j.articulated;
        self.update_kinematics(ab)
    }

    /// Set applied joint forces, one per DOF.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown joint or a length mismatch.
    pub fn set_joint_force(&mut self, joint: JointId, force: &[f64]) -> Result<()> {
        let j = self.joint_mut(joint)?;
        set_dofs(&mut j.force, force, joint)?;
        let ab = j.articulated;
        self.articulated_body_mut(ab)?.invalidate();
        Ok(())
    }

    // ==================== Forces ====================

    /// Add a force through a body's center of mass.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown body.
    pub fn add_force(&mut self, body: BodyId, force: &Vector3<f64>) -> Result<()> {
        self.body_mut(body)?.add_force(force);
        Ok(())
    }

    /// Add a force acting at a world point.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown body.
    pub fn add_force_at_point(
        &mut self,
        body: BodyId,
        force: &Vector3<f64>,
        point: &Point3<f64>,
    ) -> Result<()> {
        self.body_mut(body)?.add_force_at_point(force, point);
        Ok(())
    }

    /// Zero every body's force accumulators.
    pub fn clear_forces(&mut self) {
        for body in &mut self.bodies {
            body.clear_accumulators();
        }
    }

    // ==================== Super bodies ====================

    /// All dynamic super bodies in handle order.
    #[must_use]
    pub fn super_bodies(&self) -> Vec<SuperBodyId> {
        let rigid = self
            .bodies
            .iter()
            .filter(|b| b.enabled && b.articulated.is_none())
            .map(|b| SuperBodyId::Rigid(b.id));
        let articulated = self
            .articulated
            .iter()
            .map(|a| SuperBodyId::Articulated(a.id));
        rigid.chain(articulated).collect()
    }

    fn free_body(&self, sb: SuperBodyId) -> Result<&RigidBody> {
        match sb {
            SuperBodyId::Rigid(id) => {
                let b = self.body(id)?;
                if b.articulated.is_some() || !b.enabled {
                    return Err(SimError::topology(format!("{id} is not a free dynamic body")));
                }
                Ok(b)
            }
            SuperBodyId::Articulated(ab) => Err(SimError::topology(format!("{ab} is not a rigid body"))),
        }
    }

    /// Number of generalized coordinates (Euler) or velocities (Spatial).
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown super body.
    pub fn num_generalized_coordinates(
        &self,
        sb: SuperBodyId,
        convention: GeneralizedConvention,
    ) -> Result<usize> {
        let base = match convention {
            GeneralizedConvention::Euler => 7,
            GeneralizedConvention::Spatial => 6,
        };
        match sb {
            SuperBodyId::Rigid(_) => self.free_body(sb).map(|_| base),
            SuperBodyId::Articulated(ab) => {
                let a = self.articulated_body(ab)?;
                let joints: usize = a.joints.iter().map(|j| self.joints[j.index()].num_dof()).sum();
                Ok(if a.floating_base { base + joints } else { joints })
            }
        }
    }

    /// Index of a joint's first DOF in its articulated body's generalized
    /// velocity.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown joint.
    pub fn joint_velocity_offset(&self, joint: JointId) -> Result<usize> {
        let ab = self.articulated_body(self.joint(joint)?.articulated)?;
        let mut offset = ab.base_dof();
        for &j in &ab.joints {
            if j == joint {
                return Ok(offset);
            }
            offset += self.joints[j.index()].num_dof();
        }
        Err(SimError::topology(format!("{joint} missing from {}", ab.id)))
    }

    /// Generalized coordinates in the Euler convention.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown super body.
    pub fn generalized_coordinates(&self, sb: SuperBodyId) -> Result<DVector<f64>> {
        let mut out = Vec::new();
        match sb {
            SuperBodyId::Rigid(_) => push_pose_coordinates(&self.free_body(sb)?.pose, &mut out),
            SuperBodyId::Articulated(ab) => {
                let a = self.articulated_body(ab)?;
                if a.floating_base {
                    push_pose_coordinates(&self.bodies[a.base_link().index()].pose, &mut out);
                }
                for j in &a.joints {
                    out.extend(self.joints[j.index()].q.iter());
                }
            }
        }
        Ok(DVector::from_vec(out))
    }

    /// Set generalized coordinates in the Euler convention.
    ///
    /// Quaternions are renormalized. Spatial velocities are kept.
    ///
    /// # Errors
    ///
    /// Returns an error for a length mismatch or a degenerate quaternion.
    pub fn set_generalized_coordinates(&mut self, sb: SuperBodyId, q: &DVector<f64>) -> Result<()> {
        self.check_len(sb, GeneralizedConvention::Euler, q.len())?;
        match sb {
            SuperBodyId::Rigid(id) => {
                let pose = pose_from_coordinates(q.as_slice())?;
                self.place_keeping_velocity(id, pose);
                Ok(())
            }
            SuperBodyId::Articulated(ab) => {
                let (base, floating, joints) = self.tree_parts(ab)?;
                let mut k = 0;
                if floating {
                    let pose = pose_from_coordinates(&q.as_slice()[..7])?;
                    self.place_keeping_velocity(base, pose);
                    k = 7;
                }
                for j in joints {
                    let joint = &mut self.joints[j.index()];
                    let n = joint.num_dof();
                    joint.q.copy_from_slice(&q.as_slice()[k..k + n]);
                    k += n;
                }
                self.update_kinematics(ab)
            }
        }
    }

    /// Generalized velocity in either convention.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown super body.
    pub fn generalized_velocity(
        &self,
        sb: SuperBodyId,
        convention: GeneralizedConvention,
    ) -> Result<DVector<f64>> {
        let mut out = Vec::new();
        match sb {
            SuperBodyId::Rigid(_) => push_free_velocity(self.free_body(sb)?, convention, &mut out),
            SuperBodyId::Articulated(ab) => {
                let a = self.articulated_body(ab)?;
                if a.floating_base {
                    push_free_velocity(&self.bodies[a.base_link().index()], convention, &mut out);
                }
                for j in &a.joints {
                    out.extend(self.joints[j.index()].qd.iter());
                }
            }
        }
        Ok(DVector::from_vec(out))
    }

    /// Set the generalized velocity in either convention.
    ///
    /// # Errors
    ///
    /// Returns an error for a length mismatch.
    pub fn set_generalized_velocity(
        &mut self,
        sb: SuperBodyId,
        convention: GeneralizedConvention,
        v: &DVector<f64>,
    ) -> Result<()> {
        self.check_len(sb, convention, v.len())?;
        let base_len = match convention {
            GeneralizedConvention::Euler => 7,
            GeneralizedConvention::Spatial => 6,
        };
        match sb {
            SuperBodyId::Rigid(id) => {
                set_free_velocity(&mut self.bodies[id.index()], convention, v.as_slice());
                Ok(())
            }
            SuperBodyId::Articulated(ab) => {
                let (base, floating, joints) = self.tree_parts(ab)?;
                let mut k = 0;
                if floating {
                    set_free_velocity(&mut self.bodies[base.index()], convention, &v.as_slice()[..base_len]);
                    k = base_len;
                }
                for j in joints {
                    let joint = &mut self.joints[j.index()];
                    let n = joint.num_dof();
                    joint.qd.copy_from_slice(&v.as_slice()[k..k + n]);
                    k += n;
                }
                self.update_kinematics(ab)
            }
        }
    }

    /// Generalized acceleration in the Spatial convention, as left by the
    /// last forward dynamics.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown super body.
    pub fn generalized_acceleration(&self, sb: SuperBodyId) -> Result<DVector<f64>> {
        let mut out = Vec::new();
        match sb {
            SuperBodyId::Rigid(_) => push_free_acceleration(self.free_body(sb)?, &mut out),
            SuperBodyId::Articulated(ab) => {
                let a = self.articulated_body(ab)?;
                if a.floating_base {
                    push_free_acceleration(&self.bodies[a.base_link().index()], &mut out);
                }
                for j in &a.joints {
                    out.extend(self.joints[j.index()].qdd.iter());
                }
            }
        }
        Ok(DVector::from_vec(out))
    }

    /// Displace a super body along a Spatial-convention direction.
    ///
    /// Free and floating bases move by `p += dq[0..3]` and
    /// `R = exp(dq[3..6])·R`; joints by `q += dq`.
    ///
    /// # Errors
    ///
    /// Returns an error for a length mismatch.
    pub fn apply_generalized_displacement(&mut self, sb: SuperBodyId, dq: &DVector<f64>) -> Result<()> {
        self.check_len(sb, GeneralizedConvention::Spatial, dq.len())?;
        match sb {
            SuperBodyId::Rigid(id) => {
                let pose = displaced(&self.bodies[id.index()].pose, &dq.as_slice()[..6]);
                self.place_keeping_velocity(id, pose);
                Ok(())
            }
            SuperBodyId::Articulated(ab) => {
                let (base, floating, joints) = self.tree_parts(ab)?;
                let mut k = 0;
                if floating {
                    let pose = displaced(&self.bodies[base.index()].pose, &dq.as_slice()[..6]);
                    self.place_keeping_velocity(base, pose);
                    k = 6;
                }
                for j in joints {
                    let joint = &mut self.joints[j.index()];
                    for d in 0..joint.num_dof() {
                        joint.q[d] += dq[k + d];
                    }
                    k += joint.num_dof();
                }
                self.update_kinematics(ab)
            }
        }
    }

    /// Generalized inertia `M` for the Spatial convention.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown super body.
    pub fn generalized_inertia(&self, sb: SuperBodyId) -> Result<DMatrix<f64>> {
        forward::generalized_inertia(self, sb)
    }

    /// `q̇ ← q̇ + h·q̈` for every super body.
    ///
    /// # Errors
    ///
    /// Returns an error if a body's state cannot be written back.
    pub fn integrate_velocities(&mut self, h: f64) -> Result<()> {
        for sb in self.super_bodies() {
            let v = self.generalized_velocity(sb, GeneralizedConvention::Spatial)?
                + self.generalized_acceleration(sb)? * h;
            self.set_generalized_velocity(sb, GeneralizedConvention::Spatial, &v)?;
        }
        Ok(())
    }

    fn check_len(&self, sb: SuperBodyId, convention: GeneralizedConvention, len: usize) -> Result<()> {
        let expected = self.num_generalized_coordinates(sb, convention)?;
        if len == expected {
            Ok(())
        } else {
            Err(SimError::invalid_config(format!(
                "{sb} expects {expected} generalized values, got {len}"
            )))
        }
    }

    fn tree_parts(&self, ab: ArticulatedId) -> Result<(BodyId, bool, Vec<JointId>)> {
        let a = self.articulated_body(ab)?;
        Ok((a.base_link(), a.floating_base, a.joints.clone()))
    }

    fn place_keeping_velocity(&mut self, body: BodyId, pose: Pose) {
        let b = &mut self.bodies[body.index()];
        let twist = b.twist();
        b.pose = pose;
        b.set_twist(&twist);
    }

    fn refresh_owner(&mut self, body: BodyId) -> Result<()> {
        match self.bodies[body.index()].articulated {
            Some(ab) => self.update_kinematics(ab),
            None => Ok(()),
        }
    }

    /// Recompute link poses and link-frame velocities from the base state
    /// and joint coordinates. Invalidates stored accelerations.
    pub(crate) fn update_kinematics(&mut self, ab: ArticulatedId) -> Result<()> {
        let (base, floating, joints) = self.tree_parts(ab)?;
        if !floating {
            self.bodies[base.index()].velocity = SpatialVector::zeros();
        }

        for j in joints {
            let joint = &self.joints[j.index()];
            let parent = &self.bodies[joint.parent.index()];
            let pose = joint.child_pose(&parent.pose);
            let x = SpatialTransform::between(&parent.pose, &pose);
            let mut v = x.apply_motion(&parent.velocity);
            for (s, qd) in joint.spatial_axes().iter().zip(joint.qd.iter()) {
                v += s * *qd;
            }
            let child = &mut self.bodies[joint.child.index()];
            child.pose = pose;
            child.velocity = v;
        }

        self.articulated_body_mut(ab)?.invalidate();
        Ok(())
    }

    /// Store a free body's acceleration given `[p̈; ω̇]` in world.
    pub(crate) fn set_free_acceleration(&mut self, body: BodyId, accel: &[f64]) {
        let b = &mut self.bodies[body.index()];
        let p_ddot = Vector3::new(accel[0], accel[1], accel[2]);
        let w_dot = Vector3::new(accel[3], accel[4], accel[5]);
        let w = angular(&b.velocity);
        let v = linear(&b.velocity);
        b.acceleration = spatial(
            &b.pose.inverse_transform_vector(&w_dot),
            &(b.pose.inverse_transform_vector(&p_ddot) - w.cross(&v)),
        );
    }

    /// Crate access for the dynamics recursion.
    pub(crate) fn body_slot(&mut self, body: BodyId) -> &mut RigidBody {
        &mut self.bodies[body.index()]
    }

    pub(crate) fn joint_slot(&mut self, joint: JointId) -> &mut Joint {
        &mut self.joints[joint.index()]
    }

    // ==================== Energy ====================

    /// Kinetic energy of all moving bodies.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.bodies
            .iter()
            .filter(|b| b.enabled)
            .map(RigidBody::kinetic_energy)
            .sum()
    }

    /// Gravitational potential energy of all moving bodies.
    #[must_use]
    pub fn potential_energy(&self, gravity: &Gravity) -> f64 {
        self.bodies
            .iter()
            .filter(|b| b.enabled)
            .map(|b| gravity.potential_energy(b.mass.mass, &b.center_of_mass()))
            .sum()
    }

    // ==================== Geometry queries ====================

    /// Whether a body never moves.
    #[must_use]
    pub fn is_static(&self, body: BodyId) -> bool {
        self.super_body(body).is_none()
    }

    /// Whether a geometry's body is penalty-based.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn is_compliant(&self, geom: GeomId) -> Result<bool> {
        let body = self.geometry(geom)?.body;
        Ok(self.body(body)?.compliance.is_compliant())
    }

    /// Whether two geometries may be tested for contact.
    ///
    /// Geometries on the same body, on two static bodies, or on links
    /// joined directly by a joint never collide.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn collision_allowed(&self, a: GeomId, b: GeomId) -> Result<bool> {
        let ba = self.geometry(a)?.body;
        let bb = self.geometry(b)?.body;
        if ba == bb || (self.is_static(ba) && self.is_static(bb)) {
            return Ok(false);
        }
        let adjacent = self.parent_link(ba)? == Some(bb) || self.parent_link(bb)? == Some(ba);
        Ok(!adjacent)
    }

    /// Broad-phase inputs, each box grown by `margin` plus the distance its
    /// geometry can travel in `dt`.
    ///
    /// The margin applies to static boxes too; resting pairs within the
    /// contact threshold must survive the broad phase.
    #[must_use]
    pub fn broad_phase_entries(&self, dt: f64, margin: f64) -> Vec<BroadPhaseEntry> {
        self.geometries
            .iter()
            .map(|g| {
                let body = &self.bodies[g.body.index()];
                let is_static = self.is_static(g.body);
                let travel = if is_static {
                    0.0
                } else {
                    let twist = body.twist();
                    let speed = twist.linear.norm() + twist.angular.norm() * g.radius_about_body_origin();
                    speed * dt.max(0.0)
                };
                let aabb = g.world_aabb(&body.pose).expanded(travel + margin.max(0.0));
                BroadPhaseEntry::new(g.id, g.body, aabb, is_static)
            })
            .collect()
    }

    /// Signed distances for the given geometry pairs.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn pairwise_distances(&self, pairs: &[(GeomId, GeomId)]) -> Result<Vec<PairwiseDistInfo>> {
        pairs
            .iter()
            .map(|&(a, b)| {
                let ga = self.geometry(a)?;
                let gb = self.geometry(b)?;
                let d = signed_distance(
                    ga,
                    &self.body(ga.body)?.pose,
                    gb,
                    &self.body(gb.body)?.pose,
                );
                Ok(PairwiseDistInfo::new(a, b, d))
            })
            .collect()
    }

    /// Motion bound of a geometry for time-to-contact estimates.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn geom_motion(&self, geom: GeomId) -> Result<GeomMotion> {
        let g = self.geometry(geom)?;
        if self.is_static(g.body) {
            return Ok(GeomMotion::stationary());
        }
        let body = self.body(g.body)?;
        Ok(GeomMotion::new(
            body.twist(),
            body.pose.position,
            g.radius_about_body_origin(),
        ))
    }

    /// Whether neither geometry's body is compliant. Only such pairs are
    /// subject to conservative advancement and hard constraints.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn is_rigid_pair(&self, a: GeomId, b: GeomId) -> Result<bool> {
        Ok(!self.is_compliant(a)? && !self.is_compliant(b)?)
    }

    /// Smallest distance over rigid pairs, `+∞` if there are none.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn min_rigid_distance(&self, distances: &[PairwiseDistInfo]) -> Result<f64> {
        let mut min = f64::INFINITY;
        for d in distances {
            if self.is_rigid_pair(d.geom_a, d.geom_b)? {
                min = min.min(d.distance);
            }
        }
        Ok(min)
    }

    /// Contacts of rigid pairs closer than `threshold`, then joint limits
    /// with slack below `threshold`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn unilateral_constraints(
        &self,
        distances: &[PairwiseDistInfo],
        threshold: f64,
    ) -> Result<Vec<UnilateralConstraint>> {
        let mut out = Vec::new();
        for d in distances {
            if d.distance > threshold || !self.is_rigid_pair(d.geom_a, d.geom_b)? {
                continue;
            }
            let ga = self.geometry(d.geom_a)?;
            let gb = self.geometry(d.geom_b)?;
            let friction = ContactParams::combine(&ga.material, &gb.material).friction_coefficient;
            let contacts = generate_contacts(
                ga,
                &self.body(ga.body)?.pose,
                gb,
                &self.body(gb.body)?.pose,
                threshold,
            );
            out.extend(contacts.into_iter().map(|contact| {
                UnilateralConstraint::Contact(ContactConstraint {
                    geom_a: ga.id,
                    geom_b: gb.id,
                    body_a: ga.body,
                    body_b: gb.body,
                    contact,
                    friction,
                })
            }));
        }
        for joint in &self.joints {
            out.extend(
                active_limits(joint.id, &joint.limits, joint.q.as_slice(), threshold)
                    .into_iter()
                    .map(UnilateralConstraint::Limit),
            );
        }
        Ok(out)
    }

    /// Largest joint-limit overshoot in the world.
    #[must_use]
    pub fn max_limit_overshoot(&self) -> f64 {
        self.joints
            .iter()
            .map(Joint::limit_overshoot)
            .fold(0.0, f64::max)
    }

    fn free_gv_columns(jacobian: &mut DMatrix<f64>, origin: &Point3<f64>, point: &Point3<f64>) {
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&Matrix3::identity());
        jacobian
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-skew(&(point - origin))));
    }
}

impl ConstraintDynamics for World {
    fn super_body(&self, body: BodyId) -> Option<SuperBodyId> {
        let b = self.bodies.get(body.index())?;
        if !b.enabled {
            return None;
        }
        match b.articulated {
            None => Some(SuperBodyId::Rigid(body)),
            Some(ab) => {
                let a = self.articulated.get(ab.index())?;
                (a.floating_base || a.base_link() != body).then_some(SuperBodyId::Articulated(ab))
            }
        }
    }

    fn joint_dof(&self, joint: JointId, dof: usize) -> Option<(SuperBodyId, usize)> {
        let j = self.joints.get(joint.index())?;
        if dof >= j.num_dof() {
            return None;
        }
        let offset = self.joint_velocity_offset(joint).ok()?;
        Some((SuperBodyId::Articulated(j.articulated), offset + dof))
    }

    fn num_generalized_velocities(&self, super_body: SuperBodyId) -> usize {
        self.num_generalized_coordinates(super_body, GeneralizedConvention::Spatial)
            .unwrap_or(0)
    }

    fn generalized_velocity(&self, super_body: SuperBodyId) -> DVector<f64> {
        Self::generalized_velocity(self, super_body, GeneralizedConvention::Spatial)
            .unwrap_or_else(|_| DVector::zeros(0))
    }

    fn point_jacobian(&self, body: BodyId, point: &Point3<f64>) -> Result<DMatrix<f64>> {
        let b = self.body(body)?;
        let Some(ab) = b.articulated else {
            let mut jac = DMatrix::zeros(3, 6);
            Self::free_gv_columns(&mut jac, &b.pose.position, point);
            return Ok(jac);
        };

        let a = self.articulated_body(ab)?;
        let n = self.num_generalized_velocities(SuperBodyId::Articulated(ab));
        let mut jac = DMatrix::zeros(3, n);
        if a.floating_base {
            Self::free_gv_columns(&mut jac, &self.bodies[a.base_link().index()].pose.position, point);
        }

        let mut link = body;
        while let Some(jid) = self.bodies[link.index()].inner_joint {
            let offset = self.joint_velocity_offset(jid)?;
            for (d, s) in self.spatial_axes(jid, ReferenceFrame::Global)?.iter().enumerate() {
                let column = linear(s) + angular(s).cross(&point.coords);
                jac.fixed_view_mut::<3, 1>(0, offset + d).copy_from(&column);
            }
            link = self.joints[jid.index()].parent;
        }
        Ok(jac)
    }

    fn solve_generalized_inertia(
        &self,
        super_body: SuperBodyId,
        rhs: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>> {
        let m = self.generalized_inertia(super_body)?;
        if m.nrows() == 0 {
            return Ok(rhs.clone());
        }
        let chol = m
            .cholesky()
            .ok_or_else(|| SimError::singular_inertia(format!("{super_body} inertia is not positive definite")))?;
        Ok(chol.solve(rhs))
    }

    fn apply_velocity_change(&mut self, super_body: SuperBodyId, dv: &DVector<f64>) -> Result<()> {
        let v = Self::generalized_velocity(self, super_body, GeneralizedConvention::Spatial)? + dv;
        self.set_generalized_velocity(super_body, GeneralizedConvention::Spatial, &v)
    }
}

fn check_pose(pose: &Pose) -> Result<()> {
    if pose.is_finite() {
        Ok(())
    } else {
        Err(SimError::invalid_config("pose must be finite"))
    }
}

fn set_dofs(target: &mut DVector<f64>, values: &[f64], joint: JointId) -> Result<()> {
    if values.len() != target.len() {
        return Err(SimError::invalid_config(format!(
            "{joint} has {} DOF, got {} values",
            target.len(),
            values.len()
        )));
    }
    target.copy_from_slice(values);
    Ok(())
}

fn push_pose_coordinates(pose: &Pose, out: &mut Vec<f64>) {
    let q = pose.rotation.quaternion();
    out.extend(pose.position.coords.iter());
    out.extend([q.w, q.i, q.j, q.k]);
}

fn pose_from_coordinates(q: &[f64]) -> Result<Pose> {
    let quat = Quaternion::new(q[3], q[4], q[5], q[6]);
    if !(quat.norm() > NEAR_ZERO) || q.iter().any(|x| !x.is_finite()) {
        return Err(SimError::diverged("generalized coordinates are not finite"));
    }
    Ok(Pose::from_position_rotation(
        Point3::new(q[0], q[1], q[2]),
        UnitQuaternion::from_quaternion(quat),
    ))
}

/// `½·[0, ω]⊗quat`, the quaternion rate for a world angular velocity.
fn quaternion_rate(rotation: &UnitQuaternion<f64>, omega: &Vector3<f64>) -> Quaternion<f64> {
    Quaternion::from_imag(*omega) * rotation.quaternion() * 0.5
}

fn push_free_velocity(body: &RigidBody, convention: GeneralizedConvention, out: &mut Vec<f64>) {
    let twist = body.twist();
    out.extend(twist.linear.iter());
    match convention {
        GeneralizedConvention::Spatial => out.extend(twist.angular.iter()),
        GeneralizedConvention::Euler => {
            let rate = quaternion_rate(&body.pose.rotation, &twist.angular);
            out.extend([rate.w, rate.i, rate.j, rate.k]);
        }
    }
}

fn set_free_velocity(body: &mut RigidBody, convention: GeneralizedConvention, v: &[f64]) {
    let linear = Vector3::new(v[0], v[1], v[2]);
    let angular = match convention {
        GeneralizedConvention::Spatial => Vector3::new(v[3], v[4], v[5]),
        GeneralizedConvention::Euler => {
            let rate = Quaternion::new(v[3], v[4], v[5], v[6]);
            (rate * body.pose.rotation.quaternion().conjugate()).imag() * 2.0
        }
    };
    body.set_twist(&Twist::new(linear, angular));
}

fn push_free_acceleration(body: &RigidBody, out: &mut Vec<f64>) {
    let w = angular(&body.velocity);
    let v = linear(&body.velocity);
    let a = &body.acceleration;
    let p_ddot = body.pose.transform_vector(&(linear(a) + w.cross(&v)));
    let w_dot = body.pose.transform_vector(&angular(a));
    out.extend(p_ddot.iter());
    out.extend(w_dot.iter());
}

fn displaced(pose: &Pose, dq: &[f64]) -> Pose {
    let dp = Vector3::new(dq[0], dq[1], dq[2]);
    let dr = UnitQuaternion::from_scaled_axis(Vector3::new(dq[3], dq[4], dq[5]));
    Pose::from_position_rotation(pose.position + dp, dr * pose.rotation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn pendulum(frame: ReferenceFrame) -> (World, ArticulatedId, JointId, BodyId) {
        let mut world = World::new();
        let ab = world
            .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, frame)
            .unwrap();
        let base = world.base_link(ab).unwrap();
        let (joint, link) = world
            .add_link(
                ab,
                base,
                &JointDef::revolute(Vector3::y()),
                MassProperties::rod(2.0, 1.0, Vector3::new(0.0, 0.0, -0.5)),
            )
            .unwrap();
        (world, ab, joint, link)
    }

    #[test]
    fn test_free_body_coordinates_round_trip() {
        let mut world = World::new();
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let id = world.add_rigid_body(pose, MassProperties::sphere(1.0, 0.5)).unwrap();
        let sb = SuperBodyId::Rigid(id);

        let q = world.generalized_coordinates(sb).unwrap();
        assert_eq!(q.len(), 7);
        world.set_generalized_coordinates(sb, &q).unwrap();
        assert_relative_eq!(world.body(id).unwrap().pose().position, pose.position, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_and_spatial_velocities_agree() {
        let mut world = World::new();
        let id = world
            .add_rigid_body(
                Pose::from_position_rotation(Point3::origin(), UnitQuaternion::from_euler_angles(0.4, 0.0, 0.2)),
                MassProperties::sphere(1.0, 0.5),
            )
            .unwrap();
        let twist = Twist::new(Vector3::new(1.0, 0.0, -1.0), Vector3::new(0.0, 0.3, 0.7));
        world.set_twist(id, &twist).unwrap();
        let sb = SuperBodyId::Rigid(id);

        let euler = world.generalized_velocity(sb, GeneralizedConvention::Euler).unwrap();
        assert_eq!(euler.len(), 7);
        world.set_generalized_velocity(sb, GeneralizedConvention::Euler, &euler).unwrap();
        let spatial_v = world.generalized_velocity(sb, GeneralizedConvention::Spatial).unwrap();
        assert_relative_eq!(spatial_v.fixed_rows::<3>(3).into_owned(), twist.angular, epsilon = 1e-12);
    }

    #[test]
    fn test_displacement_keeps_world_velocity() {
        let mut world = World::new();
        let id = world.add_rigid_body(Pose::identity(), MassProperties::sphere(1.0, 0.5)).unwrap();
        world.set_twist(id, &Twist::linear(Vector3::x())).unwrap();
        let dq = DVector::from_vec(vec![0.0, 0.0, 1.0, 0.0, 0.0, FRAC_PI_2]);
        world.apply_generalized_displacement(SuperBodyId::Rigid(id), &dq).unwrap();

        let body = world.body(id).unwrap();
        assert_relative_eq!(body.pose().position, Point3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(body.twist().linear, Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_forward_kinematics_places_links() {
        let (mut world, _, joint, link) = pendulum(ReferenceFrame::Link);
        world.set_joint_position(joint, &[FRAC_PI_2]).unwrap();
        // Rotating +90° about Y takes the rod's -Z end to -X.
        let tip = world
            .body(link)
            .unwrap()
            .pose()
            .transform_point(&Point3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(tip, Point3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_fixed_base_link_is_static() {
        let (world, ab, joint, link) = pendulum(ReferenceFrame::Link);
        let base = world.base_link(ab).unwrap();
        assert!(world.is_static(base));
        assert_eq!(world.super_body(link), Some(SuperBodyId::Articulated(ab)));
        assert_eq!(world.joint_dof(joint, 0), Some((SuperBodyId::Articulated(ab), 0)));
        assert_eq!(world.joint_dof(joint, 1), None);
    }

    #[test]
    fn test_point_jacobian_matches_link_velocity() {
        for frame in [ReferenceFrame::Link, ReferenceFrame::Global] {
            let (mut world, ab, joint, link) = pendulum(frame);
            world.set_joint_position(joint, &[0.3]).unwrap();
            world.set_joint_velocity(joint, &[1.7]).unwrap();

            let point = world
                .body(link)
                .unwrap()
                .pose()
                .transform_point(&Point3::new(0.0, 0.0, -1.0));
            let jac = world.point_jacobian(link, &point).unwrap();
            let qd = ConstraintDynamics::generalized_velocity(&world, SuperBodyId::Articulated(ab));
            let v = &jac * qd;
            let expected = world.body(link).unwrap().velocity_at(&point);
            assert_relative_eq!(Vector3::new(v[0], v[1], v[2]), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_global_axis_derivative_vanishes_for_fixed_base_revolute() {
        let (mut world, _, joint, _) = pendulum(ReferenceFrame::Global);
        world.set_joint_velocity(joint, &[2.0]).unwrap();
        // Revolute axes are fixed in the child link.
        let dot = world.spatial_axes_dot(joint, ReferenceFrame::Global).unwrap();
        assert_relative_eq!(dot[0].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_adjacent_links_do_not_collide() {
        let (mut world, ab, _, link) = pendulum(ReferenceFrame::Link);
        let base = world.base_link(ab).unwrap();
        let g0 = world.attach_geometry(base, Primitive::sphere(0.1)).unwrap();
        let g1 = world.attach_geometry(link, Primitive::sphere(0.1)).unwrap();
        let ground = world.add_static_body(Pose::identity());
        let g2 = world.attach_geometry(ground, Primitive::Plane).unwrap();

        assert!(!world.collision_allowed(g0, g1).unwrap());
        assert!(!world.collision_allowed(g0, g2).unwrap());
        assert!(world.collision_allowed(g1, g2).unwrap());
    }

    #[test]
    fn test_link_of_other_body_is_rejected() {
        let (mut world, _, _, _) = pendulum(ReferenceFrame::Link);
        let stray = world.add_rigid_body(Pose::identity(), MassProperties::sphere(1.0, 0.1)).unwrap();
        let err = world
            .add_link(
                ArticulatedId::new(0),
                stray,
                &JointDef::fixed(),
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap_err();
        assert!(matches!(err, SimError::Topology { .. }));
    }

    #[test]
    fn test_resting_neighbours_survive_broad_phase() {
        use crate::broad_phase::{BroadPhase, SweepAndPrune};

        let mut world = World::new();
        let ground = world.add_static_body(Pose::identity());
        let g0 = world.attach_geometry(ground, Primitive::Plane).unwrap();
        let gap = 1e-5;
        let geoms: Vec<_> = (0..2)
            .map(|k| {
                let z = 0.5 + f64::from(k) * (1.0 + gap) + gap;
                let id = world
                    .add_rigid_body(Pose::from_position(Point3::new(0.0, 0.0, z)), MassProperties::sphere(1.0, 0.5))
                    .unwrap();
                world.attach_geometry(id, Primitive::sphere(0.5)).unwrap()
            })
            .collect();

        // At rest the ball boxes are 1e-5 apart and do not overlap.
        let bare = SweepAndPrune::new().find_potential_pairs(&world.broad_phase_entries(0.01, 0.0));
        assert!(!bare.contains(&(geoms[0], geoms[1])));

        let pairs = SweepAndPrune::new().find_potential_pairs(&world.broad_phase_entries(0.01, 1e-4));
        assert!(pairs.contains(&(g0, geoms[0])));
        assert!(pairs.contains(&(geoms[0], geoms[1])));
    }

    #[test]
    fn test_energy_of_moving_sphere() {
        let mut world = World::new();
        let id = world
            .add_rigid_body(Pose::from_position(Point3::new(0.0, 0.0, 2.0)), MassProperties::sphere(2.0, 0.5))
            .unwrap();
        world.set_twist(id, &Twist::linear(Vector3::new(3.0, 0.0, 0.0))).unwrap();
        assert_relative_eq!(world.kinetic_energy(), 9.0, epsilon = 1e-12);
        assert_relative_eq!(world.potential_energy(&Gravity::earth()), 2.0 * 9.81 * 2.0, epsilon = 1e-12);
    }
}
