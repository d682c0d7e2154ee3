//! Joints of articulated bodies.
//!
//! A joint places its child link relative to its parent:
//!
//! ```text
//! child_pose = parent_pose ∘ parent_offset ∘ motion(q)
//! ```
//!
//! where `motion(q)` rotates about (revolute) or translates along
//! (prismatic) the joint axis. The axis is the same in the offset frame
//! and the child frame, so the spatial axis is constant in link
//! coordinates.

use nalgebra::{DVector, Point3, Unit, UnitQuaternion, Vector3};
use sim_types::{ArticulatedId, BodyId, JointId, JointKind, JointLimits, Pose, Result, SimError};

use crate::dynamics::spatial::{spatial, SpatialVector};

/// Description of a joint to add to an articulated body.
///
/// # Example
///
/// ```
/// use sim_core::JointDef;
/// use sim_types::{JointLimits, Point3, Pose, Vector3};
///
/// let def = JointDef::revolute(Vector3::y())
///     .with_offset(Pose::from_position(Point3::new(0.0, 0.0, -1.0)))
///     .with_limits(JointLimits::symmetric(1.5))
///     .with_position(0.3);
/// assert_eq!(def.kind.dof(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDef {
    /// Joint kind.
    pub kind: JointKind,
    /// Axis in the offset frame (normalized on insertion).
    pub axis: Vector3<f64>,
    /// Pose of the joint frame in the parent link frame.
    pub parent_offset: Pose,
    /// Position limits.
    pub limits: JointLimits,
    /// Initial position.
    pub position: f64,
    /// Initial velocity.
    pub velocity: f64,
}

impl JointDef {
    fn with_kind(kind: JointKind, axis: Vector3<f64>) -> Self {
        Self {
            kind,
            axis,
            parent_offset: Pose::identity(),
            limits: JointLimits::unlimited(),
            position: 0.0,
            velocity: 0.0,
        }
    }

    /// Rotation about `axis`.
    #[must_use]
    pub fn revolute(axis: Vector3<f64>) -> Self {
        Self::with_kind(JointKind::Revolute, axis)
    }

    /// Translation along `axis`.
    #[must_use]
    pub fn prismatic(axis: Vector3<f64>) -> Self {
        Self::with_kind(JointKind::Prismatic, axis)
    }

    /// Rigid attachment.
    #[must_use]
    pub fn fixed() -> Self {
        Self::with_kind(JointKind::Fixed, Vector3::z())
    }

    /// Set the joint frame in the parent.
    #[must_use]
    pub fn with_offset(mut self, offset: Pose) -> Self {
        self.parent_offset = offset;
        self
    }

    /// Set position limits.
    #[must_use]
    pub fn with_limits(mut self, limits: JointLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the initial position.
    #[must_use]
    pub fn with_position(mut self, q: f64) -> Self {
        self.position = q;
        self
    }

    /// Set the initial velocity.
    #[must_use]
    pub fn with_velocity(mut self, qd: f64) -> Self {
        self.velocity = qd;
        self
    }
}

/// A joint between two links of one articulated body.
///
/// Per-DOF vectors (`q`, `qd`, `qdd`, applied force, limits) have
/// `kind.dof()` entries.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) id: JointId,
    pub(crate) kind: JointKind,
    pub(crate) articulated: ArticulatedId,
    pub(crate) parent: BodyId,
    pub(crate) child: BodyId,
    pub(crate) parent_offset: Pose,
    pub(crate) axis: Unit<Vector3<f64>>,
    pub(crate) q: DVector<f64>,
    pub(crate) qd: DVector<f64>,
    pub(crate) qdd: DVector<f64>,
    pub(crate) force: DVector<f64>,
    pub(crate) limits: Vec<JointLimits>,
    pub(crate) lambda: SpatialVector,
}

impl Joint {
    pub(crate) fn from_def(
        id: JointId,
        articulated: ArticulatedId,
        parent: BodyId,
        child: BodyId,
        def: &JointDef,
    ) -> Result<Self> {
        let axis = Unit::try_new(def.axis, sim_types::NEAR_ZERO)
            .ok_or_else(|| SimError::invalid_config("joint axis must be non-zero"))?;
        def.limits.validate()?;
        if !def.position.is_finite() || !def.velocity.is_finite() {
            return Err(SimError::invalid_config("joint state must be finite"));
        }

        let dof = def.kind.dof();
        Ok(Self {
            id,
            kind: def.kind,
            articulated,
            parent,
            child,
            parent_offset: def.parent_offset,
            axis,
            q: DVector::from_element(dof, def.position),
            qd: DVector::from_element(dof, def.velocity),
            qdd: DVector::zeros(dof),
            force: DVector::zeros(dof),
            limits: vec![def.limits; dof],
            lambda: SpatialVector::zeros(),
        })
    }

    /// Joint handle.
    #[must_use]
    pub fn id(&self) -> JointId {
        self.id
    }

    /// Joint kind.
    #[must_use]
    pub fn kind(&self) -> JointKind {
        self.kind
    }

    /// Number of degrees of freedom.
    #[must_use]
    pub fn num_dof(&self) -> usize {
        self.kind.dof()
    }

    /// Articulated body the joint belongs to.
    #[must_use]
    pub fn articulated(&self) -> ArticulatedId {
        self.articulated
    }

    /// Parent (inboard) link.
    #[must_use]
    pub fn parent_link(&self) -> BodyId {
        self.parent
    }

    /// Child (outboard) link.
    #[must_use]
    pub fn child_link(&self) -> BodyId {
        self.child
    }

    /// Joint frame in the parent link frame.
    #[must_use]
    pub fn parent_offset(&self) -> &Pose {
        &self.parent_offset
    }

    /// Unit joint axis.
    #[must_use]
    pub fn axis(&self) -> Vector3<f64> {
        self.axis.into_inner()
    }

    /// Position per DOF.
    #[must_use]
    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    /// Velocity per DOF.
    #[must_use]
    pub fn qd(&self) -> &DVector<f64> {
        &self.qd
    }

    /// Acceleration per DOF from the last forward dynamics.
    #[must_use]
    pub fn qdd(&self) -> &DVector<f64> {
        &self.qdd
    }

    /// Applied actuator force per DOF.
    #[must_use]
    pub fn applied_force(&self) -> &DVector<f64> {
        &self.force
    }

    /// Position limits per DOF.
    #[must_use]
    pub fn limits(&self) -> &[JointLimits] {
        &self.limits
    }

    /// Constraint wrench from the last `calc_constraint_forces`, in the
    /// articulated body's computation frame.
    #[must_use]
    pub fn lambda(&self) -> SpatialVector {
        self.lambda
    }

    /// Spatial axes in the child link frame, one per DOF.
    #[must_use]
    pub fn spatial_axes(&self) -> Vec<SpatialVector> {
        let a = self.axis.into_inner();
        match self.kind {
            JointKind::Revolute => vec![spatial(&a, &Vector3::zeros())],
            JointKind::Prismatic => vec![spatial(&Vector3::zeros(), &a)],
            JointKind::Fixed => Vec::new(),
        }
    }

    /// Rate of change of [`Self::spatial_axes`] in the child link frame.
    ///
    /// Zero for revolute, prismatic and fixed joints.
    #[must_use]
    pub fn spatial_axes_dot(&self) -> Vec<SpatialVector> {
        vec![SpatialVector::zeros(); self.num_dof()]
    }

    /// Displacement of the child frame from the joint frame at the current
    /// position.
    #[must_use]
    pub fn motion(&self) -> Pose {
        let q = self.q.get(0).copied().unwrap_or(0.0);
        match self.kind {
            JointKind::Revolute => Pose::from_position_rotation(
                Point3::origin(),
                UnitQuaternion::from_axis_angle(&self.axis, q),
            ),
            JointKind::Prismatic => Pose::from_position(Point3::from(self.axis.into_inner() * q)),
            JointKind::Fixed => Pose::identity(),
        }
    }

    /// Child link pose for a given parent link pose.
    #[must_use]
    pub fn child_pose(&self, parent_pose: &Pose) -> Pose {
        parent_pose
            .compose(&self.parent_offset)
            .compose(&self.motion())
    }

    /// Largest limit overshoot over the DOFs.
    #[must_use]
    pub fn limit_overshoot(&self) -> f64 {
        self.limits
            .iter()
            .zip(self.q.iter())
            .map(|(lim, &q)| lim.overshoot(q))
            .fold(0.0, f64::max)
    }

    /// Earliest time any DOF reaches the limit it moves towards.
    #[must_use]
    pub fn time_to_limit(&self) -> f64 {
        self.limits
            .iter()
            .zip(self.q.iter().zip(self.qd.iter()))
            .map(|(lim, (&q, &qd))| lim.time_to_limit(q, qd))
            .fold(f64::INFINITY, f64::min)
    }
}
