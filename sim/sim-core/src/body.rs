//! Rigid bodies, the links of the world arena.

use nalgebra::{Matrix3, Matrix6, Point3, Vector3};
use sim_contact::ContactParams;
use sim_types::{
    ArticulatedId, BodyId, Compliance, GeomId, JointId, MassProperties, Pose, Twist, Wrench,
};

use crate::dynamics::spatial::{angular, linear, skew, spatial, spatial_inertia, SpatialVector};

/// A rigid body: either a free body or one link of an articulated body.
///
/// Velocity and acceleration are spatial vectors `[ω; v]` expressed in the
/// body frame, with `v` the velocity of the frame origin. External force
/// accumulators are in world coordinates, the force acting through the
/// center of mass.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) id: BodyId,
    pub(crate) pose: Pose,
    pub(crate) velocity: SpatialVector,
    pub(crate) acceleration: SpatialVector,
    pub(crate) mass: MassProperties,
    pub(crate) compliance: Compliance,
    pub(crate) penalty: ContactParams,
    pub(crate) enabled: bool,
    pub(crate) articulated: Option<ArticulatedId>,
    pub(crate) inner_joint: Option<JointId>,
    pub(crate) outer_joints: Vec<JointId>,
    pub(crate) geometries: Vec<GeomId>,
    pub(crate) force: Vector3<f64>,
    pub(crate) torque: Vector3<f64>,
}

impl RigidBody {
    pub(crate) fn new(id: BodyId, pose: Pose, mass: MassProperties) -> Self {
        Self {
            id,
            pose,
            velocity: SpatialVector::zeros(),
            acceleration: SpatialVector::zeros(),
            mass,
            compliance: Compliance::Rigid,
            penalty: ContactParams::default(),
            enabled: true,
            articulated: None,
            inner_joint: None,
            outer_joints: Vec::new(),
            geometries: Vec::new(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// Body handle.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Pose of the body frame in world.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Mass properties in the body frame.
    #[must_use]
    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass
    }

    /// How the body reacts to interpenetration.
    #[must_use]
    pub fn compliance(&self) -> Compliance {
        self.compliance
    }

    /// Penalty parameters used when the body is compliant.
    #[must_use]
    pub fn penalty_params(&self) -> &ContactParams {
        &self.penalty
    }

    /// Whether the body moves. Disabled bodies are static with infinite mass.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Articulated body this link belongs to.
    #[must_use]
    pub fn articulated(&self) -> Option<ArticulatedId> {
        self.articulated
    }

    /// Joint connecting this link to its parent.
    #[must_use]
    pub fn inner_joint(&self) -> Option<JointId> {
        self.inner_joint
    }

    /// Joints connecting this link to its children.
    #[must_use]
    pub fn outer_joints(&self) -> &[JointId] {
        &self.outer_joints
    }

    /// Collision geometries carried by the body.
    #[must_use]
    pub fn geometries(&self) -> &[GeomId] {
        &self.geometries
    }

    /// Spatial velocity in the body frame.
    #[must_use]
    pub fn spatial_velocity(&self) -> SpatialVector {
        self.velocity
    }

    /// Spatial acceleration in the body frame.
    #[must_use]
    pub fn spatial_acceleration(&self) -> SpatialVector {
        self.acceleration
    }

    /// World-frame twist; `linear` is the velocity of the body origin.
    #[must_use]
    pub fn twist(&self) -> Twist {
        Twist::new(
            self.pose.transform_vector(&linear(&self.velocity)),
            self.pose.transform_vector(&angular(&self.velocity)),
        )
    }

    pub(crate) fn set_twist(&mut self, twist: &Twist) {
        self.velocity = spatial(
            &self.pose.inverse_transform_vector(&twist.angular),
            &self.pose.inverse_transform_vector(&twist.linear),
        );
    }

    /// World-frame velocity of a world point moving with the body.
    #[must_use]
    pub fn velocity_at(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.twist()
            .velocity_at_point(&(point - self.pose.position))
    }

    /// Center of mass in world.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3<f64> {
        self.pose
            .transform_point(&Point3::from(self.mass.center_of_mass))
    }

    /// Accumulated external force (world, through the center of mass).
    #[must_use]
    pub fn force(&self) -> Vector3<f64> {
        self.force
    }

    /// Accumulated external torque (world).
    #[must_use]
    pub fn torque(&self) -> Vector3<f64> {
        self.torque
    }

    /// Add a force through the center of mass.
    pub fn add_force(&mut self, force: &Vector3<f64>) {
        self.force += force;
    }

    /// Add a pure torque.
    pub fn add_torque(&mut self, torque: &Vector3<f64>) {
        self.torque += torque;
    }

    /// Add a force acting at a world point.
    pub fn add_force_at_point(&mut self, force: &Vector3<f64>, point: &Point3<f64>) {
        self.force += force;
        self.torque += (point - self.center_of_mass()).cross(force);
    }

    /// Add a wrench whose force acts through the center of mass.
    pub fn add_wrench(&mut self, wrench: &Wrench) {
        self.force += wrench.force;
        self.torque += wrench.torque;
    }

    /// Zero the force and torque accumulators.
    pub fn clear_accumulators(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    /// Accumulated wrench as a body-frame spatial force about the origin.
    #[must_use]
    pub fn external_spatial_force(&self) -> SpatialVector {
        self.spatial_force_of(&Wrench::new(self.force, self.torque))
    }

    /// A world wrench (force through the center of mass) as a body-frame
    /// spatial force about the body origin.
    #[must_use]
    pub fn spatial_force_of(&self, wrench: &Wrench) -> SpatialVector {
        let lever = self.pose.rotation * self.mass.center_of_mass;
        let n = wrench.torque + lever.cross(&wrench.force);
        spatial(
            &self.pose.inverse_transform_vector(&n),
            &self.pose.inverse_transform_vector(&wrench.force),
        )
    }

    /// Spatial inertia about the body origin, in the body frame.
    #[must_use]
    pub fn spatial_inertia(&self) -> Matrix6<f64> {
        spatial_inertia(&self.mass)
    }

    /// Kinetic energy `½·vᵀ·I·v`.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.velocity.dot(&(self.spatial_inertia() * self.velocity))
    }

    /// Inertia with respect to the free-body generalized velocity
    /// `[ṗ; ω]` (world origin velocity, world angular velocity).
    #[must_use]
    pub(crate) fn free_generalized_inertia(&self) -> Matrix6<f64> {
        let m = self.mass.mass;
        let rot = self.pose.rotation_matrix();
        let r_x = skew(&(rot * self.mass.center_of_mass));
        let i_world = rot * self.mass.inertia * rot.transpose();

        let mut out = Matrix6::zeros();
        out.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Matrix3::identity() * m));
        out.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-r_x * m));
        out.fixed_view_mut::<3, 3>(3, 0).copy_from(&(r_x * m));
        out.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(i_world - r_x * r_x * m));
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector6};

    fn tilted_box() -> RigidBody {
        let mass = MassProperties::box_shape(3.0, Vector3::new(0.2, 0.1, 0.4))
            .with_center_of_mass(Vector3::new(0.1, 0.0, -0.2));
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 0.5),
            UnitQuaternion::from_euler_angles(0.3, 0.6, -0.4),
        );
        RigidBody::new(BodyId::new(0), pose, mass)
    }

    #[test]
    fn test_twist_round_trip() {
        let mut body = tilted_box();
        let twist = Twist::new(Vector3::new(1.0, -2.0, 0.5), Vector3::new(0.1, 0.2, 0.3));
        body.set_twist(&twist);
        let back = body.twist();
        assert_relative_eq!(back.linear, twist.linear, epsilon = 1e-12);
        assert_relative_eq!(back.angular, twist.angular, epsilon = 1e-12);
    }

    #[test]
    fn test_force_at_point_adds_moment_about_com() {
        let mut body = RigidBody::new(
            BodyId::new(0),
            Pose::identity(),
            MassProperties::sphere(1.0, 0.5),
        );
        body.add_force_at_point(&Vector3::new(0.0, 0.0, 1.0), &Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(body.torque(), Vector3::new(0.0, -1.0, 0.0));
        body.clear_accumulators();
        assert_eq!(body.force(), Vector3::zeros());
    }

    #[test]
    fn test_generalized_inertia_gives_same_energy() {
        let mut body = tilted_box();
        let twist = Twist::new(Vector3::new(0.3, -0.2, 1.0), Vector3::new(-0.5, 0.4, 0.2));
        body.set_twist(&twist);

        let gv = Vector6::new(
            twist.linear.x,
            twist.linear.y,
            twist.linear.z,
            twist.angular.x,
            twist.angular.y,
            twist.angular.z,
        );
        let m = body.free_generalized_inertia();
        assert_relative_eq!(0.5 * gv.dot(&(m * gv)), body.kinetic_energy(), epsilon = 1e-10);
        assert_relative_eq!(m, m.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_external_force_through_com_has_lever_about_origin() {
        let mut body = RigidBody::new(
            BodyId::new(0),
            Pose::identity(),
            MassProperties::sphere(1.0, 0.1).with_center_of_mass(Vector3::new(1.0, 0.0, 0.0)),
        );
        body.add_force(&Vector3::new(0.0, 0.0, -10.0));
        let f = body.external_spatial_force();
        assert_relative_eq!(angular(&f), Vector3::new(0.0, 10.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(linear(&f), Vector3::new(0.0, 0.0, -10.0), epsilon = 1e-12);
    }
}
