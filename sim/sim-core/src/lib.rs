//! World arena, recursive dynamics and the time-stepping simulator.
//!
//! This crate ties the lower layers together: [`sim_contact`] supplies
//! distances and contact points, [`sim_constraint`] assembles and solves
//! the complementarity problems, [`sim_lcp`] does the pivoting.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TimeSteppingSimulator                       │
//! │  mini-steps: conservative advancement → forward dynamics →  │
//! │  velocity integration → impacts; then stabilization         │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Arenas: rigid bodies, joints, articulated bodies, geoms    │
//! │  Provides: generalized coordinates, Jacobians, distances    │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       dynamics                               │
//! │  Spatial algebra, recursive Newton-Euler, mass matrices     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use sim_contact::Primitive;
//! use sim_core::{TimeSteppingSimulator, World};
//! use sim_types::{MassProperties, Point3, Pose, SimulationConfig};
//!
//! let mut world = World::new();
//! let ground = world.add_static_body(Pose::identity());
//! world.attach_geometry(ground, Primitive::Plane).unwrap();
//!
//! let ball = world
//!     .add_rigid_body(Pose::from_position(Point3::new(0.0, 0.0, 3.0)), MassProperties::sphere(1.0, 1.0))
//!     .unwrap();
//! world.attach_geometry(ball, Primitive::sphere(1.0)).unwrap();
//!
//! let mut sim = TimeSteppingSimulator::new(world, SimulationConfig::default()).unwrap();
//! let reports = sim.run_for(0.5, 0.01).unwrap();
//! assert_eq!(reports.len(), 50);
//! assert!(sim.world().body(ball).unwrap().pose().position.z < 3.0);
//! ```
//!
//! # Reference frames
//!
//! Articulated bodies compute their dynamics either link by link
//! ([`ReferenceFrame::Link`]) or in world coordinates about the world
//! origin ([`ReferenceFrame::Global`]). The choice changes round-off, not
//! results.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // nalgebra constructors are not const
    clippy::suboptimal_flops,          // mul_add rewrites obscure the formulas
)]

mod articulated;
mod body;
pub mod broad_phase;
pub mod dynamics;
mod forces;
mod joint;
mod simulator;
mod stabilization;
mod world;

pub use articulated::ArticulatedBody;
pub use body::RigidBody;
pub use broad_phase::{Axis, BroadPhase, BroadPhaseEntry, SweepAndPrune};
pub use dynamics::{calc_fwd_dyn, generalized_inertia, InvDynData, RneAlgorithm};
pub use forces::{Dissipation, GravityForce, RecurrentForce, ViscousDissipation};
pub use joint::{Joint, JointDef};
pub use simulator::{Callback, StepReport, TimeSteppingSimulator};
pub use stabilization::{ConstraintStabilization, StabilizationReport};
pub use world::World;

// Re-export key types from sim-types for convenience
pub use sim_types::{
    ArticulatedId, BodyId, Compliance, GeneralizedConvention, GeomId, Gravity, JointId,
    JointKind, JointLimits, MassProperties, Pose, ReferenceFrame, SimError, SimulationConfig,
    SuperBodyId, Twist, Wrench,
};
