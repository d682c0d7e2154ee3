//! End-to-end stepping scenarios with rigid contact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use sim_contact::Primitive;
use sim_core::{TimeSteppingSimulator, World};
use sim_types::{
    BodyId, Diagnostic, GeomId, MassProperties, Point3, Pose, RecordingSink, SimulationConfig, Twist,
    Vector3, NEAR_ZERO,
};

/// Route the default `TracingSink` output to the test harness; filter with
/// `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ground(world: &mut World) -> GeomId {
    let ground = world.add_static_body(Pose::identity());
    world.attach_geometry(ground, Primitive::Plane).unwrap()
}

fn ball(world: &mut World, center: Point3<f64>, radius: f64) -> BodyId {
    let id = world
        .add_rigid_body(Pose::from_position(center), MassProperties::sphere(1.0, radius))
        .unwrap();
    world.attach_geometry(id, Primitive::sphere(radius)).unwrap();
    id
}

#[test]
fn test_falling_sphere_lands_on_plane() {
    let mut world = World::new();
    ground(&mut world);
    let id = ball(&mut world, Point3::new(0.0, 0.0, 3.0), 1.0);
    let mut sim = TimeSteppingSimulator::new(world, SimulationConfig::default())
        .unwrap()
        .with_sink(RecordingSink::new());

    let mut last_z = 3.0;
    let mut landed = false;
    for step in 0..150 {
        let report = sim.step(0.01).unwrap();
        let z = sim.world().body(id).unwrap().pose().position.z;
        assert!(report.min_distance >= -NEAR_ZERO, "penetration {}", report.min_distance);
        if !landed {
            // Positions move with the velocity at the start of the step, so
            // the first step only builds up speed.
            if step == 0 {
                assert!(z <= last_z);
            } else {
                assert!(z < last_z, "step {step}: z = {z}, was {last_z}");
            }
            landed = report.min_distance < 1e-4;
        }
        last_z = z;
    }

    assert!(landed);
    assert_relative_eq!(last_z, 1.0, epsilon = 1e-3);
    assert!(sim.world().body(id).unwrap().twist().linear.z.abs() < 1e-6);
    assert!(sim
        .sink()
        .events
        .iter()
        .any(|e| matches!(e, Diagnostic::ImpactResolved { .. })));
}

#[test]
fn test_stacked_spheres_stay_at_rest() {
    init_tracing();
    let mut world = World::new();
    let floor = ground(&mut world);
    let gap = 1e-5;
    let balls: Vec<_> = (0..3)
        .map(|k| {
            let z = 0.5 + f64::from(k) * (1.0 + gap) + gap;
            ball(&mut world, Point3::new(0.0, 0.0, z), 0.5)
        })
        .collect();
    let geoms: Vec<GeomId> = balls
        .iter()
        .map(|&id| world.body(id).unwrap().geometries()[0])
        .collect();
    // Only neighbours touch; the upper balls sit well clear of the floor.
    let touching = [(floor, geoms[0]), (geoms[0], geoms[1]), (geoms[1], geoms[2])];
    let mut sim = TimeSteppingSimulator::new(world, SimulationConfig::default()).unwrap();

    for _ in 0..100 {
        sim.step(0.01).unwrap();
        let distances = sim.pairwise_distances();
        for d in distances {
            assert!(d.distance >= -NEAR_ZERO, "penetration {}", d.distance);
        }
        for pair in touching {
            let d = distances
                .iter()
                .find(|d| (d.geom_a, d.geom_b) == pair)
                .unwrap_or_else(|| panic!("pair {pair:?} missing"));
            assert!(d.distance < 1e-3, "pair {pair:?} at {}", d.distance);
        }
    }
    for id in balls {
        assert!(sim.world().body(id).unwrap().twist().linear.z.abs() < 1e-6);
    }
    assert_eq!(sim.current_contact_geoms().len(), 3);
}

#[test]
fn test_conservative_advancement_stops_at_first_touch() {
    let mut world = World::new();
    let a = ball(&mut world, Point3::origin(), 0.5);
    let b = ball(&mut world, Point3::new(2.0, 0.0, 0.0), 0.5);
    world.set_twist(a, &Twist::linear(Vector3::new(2.0, 0.0, 0.0))).unwrap();

    let config = SimulationConfig::default().zero_gravity();
    let mut sim = TimeSteppingSimulator::new(world, config)
        .unwrap()
        .with_sink(RecordingSink::new());
    let report = sim.step(1.0).unwrap();

    // Gap 1 closing at 2.
    let first = sim
        .sink()
        .events
        .iter()
        .find_map(|e| match e {
            Diagnostic::ConservativeAdvancement { step, .. } => Some(*step),
            _ => None,
        })
        .unwrap();
    assert_relative_eq!(first, 0.5, epsilon = 1e-9);

    assert!(report.mini_steps >= 2);
    assert!(report.min_distance >= -NEAR_ZERO);
    // Equal masses, inelastic: both leave at the common speed.
    let va = sim.world().body(a).unwrap().twist().linear.x;
    let vb = sim.world().body(b).unwrap().twist().linear.x;
    assert_relative_eq!(va, 1.0, epsilon = 1e-8);
    assert_relative_eq!(vb, 1.0, epsilon = 1e-8);
}

#[test]
fn test_separated_bodies_need_no_stabilization() {
    let mut world = World::new();
    ground(&mut world);
    ball(&mut world, Point3::new(0.0, 0.0, 5.0), 1.0);
    let mut sim = TimeSteppingSimulator::new(world, SimulationConfig::default())
        .unwrap()
        .with_sink(RecordingSink::new());

    for _ in 0..5 {
        let report = sim.step(0.01).unwrap();
        assert_eq!(report.stabilization_iterations, 0);
    }
    assert_eq!(sim.sink().lcp_solves(), 0);
    assert_eq!(sim.sink().stabilization_iterations(), 0);
}
