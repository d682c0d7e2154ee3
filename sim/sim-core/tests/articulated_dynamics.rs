//! Recursive dynamics of articulated bodies through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use nalgebra::DVector;
use sim_core::{
    calc_fwd_dyn, GravityForce, InvDynData, JointDef, RecurrentForce, RneAlgorithm,
    TimeSteppingSimulator, World,
};
use sim_types::{
    ArticulatedId, JointId, JointLimits, MassProperties, Point3, Pose, ReferenceFrame,
    SimulationConfig, UnitQuaternion, Vector3,
};

fn two_link(frame: ReferenceFrame, floating: bool) -> (World, ArticulatedId, [JointId; 2]) {
    let mut world = World::new();
    let ab = world
        .add_articulated_body(
            Pose::from_position_rotation(
                Point3::new(0.0, 0.0, 2.0),
                UnitQuaternion::from_euler_angles(0.0, 0.2, -0.1),
            ),
            MassProperties::sphere(2.0, 0.2),
            floating,
            frame,
        )
        .unwrap();
    let base = world.base_link(ab).unwrap();
    let (j0, l0) = world
        .add_link(
            ab,
            base,
            &JointDef::revolute(Vector3::y()).with_position(0.3).with_velocity(-0.8),
            MassProperties::rod(1.0, 1.0, Vector3::new(0.0, 0.0, -0.5)),
        )
        .unwrap();
    let (j1, _) = world
        .add_link(
            ab,
            l0,
            &JointDef::revolute(Vector3::x())
                .with_offset(Pose::from_position(Point3::new(0.0, 0.0, -1.0)))
                .with_position(-0.5)
                .with_velocity(0.6),
            MassProperties::rod(0.5, 0.8, Vector3::new(0.0, 0.0, -0.4)),
        )
        .unwrap();
    (world, ab, [j0, j1])
}

#[test]
fn test_passive_pendulum_needs_no_joint_force() {
    for frame in [ReferenceFrame::Link, ReferenceFrame::Global] {
        let (mut world, ab, joints) = two_link(frame, false);
        GravityForce::default().apply(&mut world);
        calc_fwd_dyn(&mut world).unwrap();

        let mut data = InvDynData::new();
        for j in joints {
            data = data.with_qdd(j, world.joint(j).unwrap().qdd().clone());
        }
        let tau = RneAlgorithm.calc_inv_dyn(&world, ab, &data).unwrap();
        for j in joints {
            assert_relative_eq!(tau[&j][0], 0.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_global_and_link_frames_agree() {
    let (mut link_world, link_ab, link_joints) = two_link(ReferenceFrame::Link, true);
    let (mut global_world, global_ab, global_joints) = two_link(ReferenceFrame::Global, true);
    GravityForce::default().apply(&mut link_world);
    GravityForce::default().apply(&mut global_world);

    let qdd = [1.3, -0.7];
    let request = |joints: [JointId; 2]| {
        InvDynData::new()
            .with_qdd(joints[0], DVector::from_element(1, qdd[0]))
            .with_qdd(joints[1], DVector::from_element(1, qdd[1]))
    };
    let link_tau = RneAlgorithm
        .calc_inv_dyn(&link_world, link_ab, &request(link_joints))
        .unwrap();
    let global_tau = RneAlgorithm
        .calc_inv_dyn(&global_world, global_ab, &request(global_joints))
        .unwrap();

    for (a, b) in link_joints.iter().zip(&global_joints) {
        assert_relative_eq!(link_tau[a][0], global_tau[b][0], epsilon = 1e-9);
    }

    calc_fwd_dyn(&mut link_world).unwrap();
    calc_fwd_dyn(&mut global_world).unwrap();
    for (a, b) in link_joints.iter().zip(&global_joints) {
        assert_relative_eq!(
            link_world.joint(*a).unwrap().qdd()[0],
            global_world.joint(*b).unwrap().qdd()[0],
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_free_falling_chain_has_no_joint_force() {
    for frame in [ReferenceFrame::Link, ReferenceFrame::Global] {
        let (mut world, ab, joints) = two_link(frame, true);
        for j in joints {
            world.set_joint_velocity(j, &[0.0]).unwrap();
        }
        GravityForce::default().apply(&mut world);

        let tau = RneAlgorithm.calc_inv_dyn(&world, ab, &InvDynData::new()).unwrap();
        for j in joints {
            assert_relative_eq!(tau[&j][0], 0.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_constraint_forces_do_no_work_along_joint_axes() {
    for frame in [ReferenceFrame::Link, ReferenceFrame::Global] {
        for floating in [false, true] {
            let (mut world, ab, joints) = two_link(frame, floating);
            GravityForce::default().apply(&mut world);
            world.set_joint_force(joints[0], &[0.4]).unwrap();
            calc_fwd_dyn(&mut world).unwrap();
            RneAlgorithm.calc_constraint_forces(&mut world, ab).unwrap();

            for j in joints {
                let lambda = world.joint(j).unwrap().lambda();
                for s in world.spatial_axes(j, frame).unwrap() {
                    assert_relative_eq!(s.dot(&lambda), 0.0, epsilon = 1e-9);
                }
            }
        }
    }
}

#[test]
fn test_pendulum_swings_and_respects_limits() {
    let mut world = World::new();
    let ab = world
        .add_articulated_body(Pose::identity(), MassProperties::sphere(1.0, 0.1), false, ReferenceFrame::Link)
        .unwrap();
    let base = world.base_link(ab).unwrap();
    let (joint, _) = world
        .add_link(
            ab,
            base,
            &JointDef::revolute(Vector3::y())
                .with_limits(JointLimits::new(-0.3, 0.5))
                .with_position(0.45),
            MassProperties::rod(1.0, 1.0, Vector3::new(0.0, 0.0, -0.5)),
        )
        .unwrap();

    let mut sim = TimeSteppingSimulator::new(world, SimulationConfig::default()).unwrap();
    let start = sim.world().potential_energy(&sim_types::Gravity::earth());
    let mut lowest = f64::INFINITY;
    for _ in 0..200 {
        sim.step(0.005).unwrap();
        let q = sim.world().joint(joint).unwrap().q()[0];
        assert!((-0.3 - 1e-3..=0.5 + 1e-3).contains(&q), "q = {q}");
        lowest = lowest.min(q);
    }
    // Swung through the bottom into the lower stop.
    assert!(lowest < -0.29);
    // The inelastic stop removes energy.
    let end = sim.world().potential_energy(&sim_types::Gravity::earth()) + sim.world().kinetic_energy();
    assert!(end < start);
}
