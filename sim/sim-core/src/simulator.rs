//! The time-stepping simulator.
//!
//! A step of length `dt` is split into mini-steps. Each mini-step advances
//! positions by conservative advancement until the next possible contact or
//! joint-limit event, then integrates velocities over the elapsed time and
//! resolves impacts with an inelastic LCP. After the last mini-step the
//! positions are stabilized.
//!
//! ```text
//! step(dt)
//!  ├─ broad phase + distances
//!  ├─ do_mini_step(dt - h)   (repeat until h = dt)
//!  │   ├─ position loop: CA bound → q = q₀ + (h + tc)·q̇
//!  │   ├─ recurrent forces, penalty contacts, forward dynamics
//!  │   ├─ q̇ += h·q̈, dissipation
//!  │   └─ distances → constraints → impact LCP
//!  ├─ post-step callback
//!  └─ stabilization
//! ```
//!
//! # Example
//!
//! ```
//! use nalgebra::Point3;
//! use sim_contact::Primitive;
//! use sim_core::{TimeSteppingSimulator, World};
//! use sim_types::{MassProperties, Pose, SimulationConfig};
//!
//! let mut world = World::new();
//! let ground = world.add_static_body(Pose::identity());
//! world.attach_geometry(ground, Primitive::Plane).unwrap();
//! let ball = world
//!     .add_rigid_body(Pose::from_position(Point3::new(0.0, 0.0, 3.0)), MassProperties::sphere(1.0, 1.0))
//!     .unwrap();
//! world.attach_geometry(ball, Primitive::sphere(1.0)).unwrap();
//!
//! let mut sim = TimeSteppingSimulator::new(world, SimulationConfig::default()).unwrap();
//! for _ in 0..10 {
//!     sim.step(0.01).unwrap();
//! }
//! assert!(sim.world().body(ball).unwrap().pose().position.z < 3.0);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use nalgebra::DVector;
use sim_constraint::{ImpactSolver, UnilateralConstraint};
use sim_contact::{generate_contacts, time_to_contact, ContactModel, ContactParams, PairwiseDistInfo};
use sim_lcp::{LcpConfig, LcpSolver};
use sim_types::{
    Diagnostic, DiagnosticSink, GeneralizedConvention, GeomId, Result, SimError,
    SimulationConfig, SuperBodyId, TracingSink, NEAR_ZERO,
};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::RigidBody;
use crate::broad_phase::{BroadPhase, SweepAndPrune};
use crate::dynamics::calc_fwd_dyn;
use crate::forces::{Dissipation, GravityForce, RecurrentForce};
use crate::joint::Joint;
use crate::stabilization::ConstraintStabilization;
use crate::world::World;

/// Observer invoked with the world and the simulation clock.
pub type Callback = Box<dyn Fn(&World, f64)>;

/// Summary of one call to [`TimeSteppingSimulator::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepReport {
    /// Simulation clock after the step.
    pub time: f64,
    /// Mini-steps taken.
    pub mini_steps: usize,
    /// Minimum pairwise distance after stabilization (`+∞` without pairs).
    pub min_distance: f64,
    /// Stabilization iterations run.
    pub stabilization_iterations: usize,
}

/// Event-driven time stepper with conservative advancement, inelastic
/// impacts and position stabilization.
pub struct TimeSteppingSimulator<S: DiagnosticSink = TracingSink> {
    world: World,
    config: SimulationConfig,
    broad_phase: SweepAndPrune,
    solver: LcpSolver,
    stabilization: ConstraintStabilization,
    impact: ImpactSolver,
    recurrent_forces: Vec<Box<dyn RecurrentForce>>,
    dissipation: Option<Box<dyn Dissipation>>,
    sink: S,
    current_time: f64,
    pairs: Vec<(GeomId, GeomId)>,
    distances: Vec<PairwiseDistInfo>,
    constraints: Vec<UnilateralConstraint>,
    stalled: usize,
    /// Called after the mini-steps of a step, before stabilization.
    pub post_step_callback: Option<Callback>,
    /// Called after every mini-step.
    pub post_mini_step_callback: Option<Callback>,
}

impl<S: DiagnosticSink + fmt::Debug> fmt::Debug for TimeSteppingSimulator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSteppingSimulator")
            .field("config", &self.config)
            .field("current_time", &self.current_time)
            .field("pairs", &self.pairs.len())
            .field("constraints", &self.constraints.len())
            .field("recurrent_forces", &self.recurrent_forces.len())
            .field("dissipation", &self.dissipation.is_some())
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl TimeSteppingSimulator {
    /// Simulator over `world`, reporting through `tracing`.
    ///
    /// Gravity from `config` is installed as a recurrent force.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(world: World, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            world,
            broad_phase: SweepAndPrune::new(),
            solver: LcpSolver::default(),
            stabilization: ConstraintStabilization::new(config.stabilization.clone()),
            impact: ImpactSolver::new(-1.0),
            recurrent_forces: vec![Box::new(GravityForce::new(config.gravity))],
            dissipation: None,
            sink: TracingSink,
            current_time: 0.0,
            pairs: Vec::new(),
            distances: Vec::new(),
            constraints: Vec::new(),
            stalled: 0,
            post_step_callback: None,
            post_mini_step_callback: None,
            config,
        })
    }
}

impl<S: DiagnosticSink> TimeSteppingSimulator<S> {
    /// Replace the diagnostic sink.
    #[must_use]
    pub fn with_sink<T: DiagnosticSink>(self, sink: T) -> TimeSteppingSimulator<T> {
        TimeSteppingSimulator {
            world: self.world,
            config: self.config,
            broad_phase: self.broad_phase,
            solver: self.solver,
            stabilization: self.stabilization,
            impact: self.impact,
            recurrent_forces: self.recurrent_forces,
            dissipation: self.dissipation,
            sink,
            current_time: self.current_time,
            pairs: self.pairs,
            distances: self.distances,
            constraints: self.constraints,
            stalled: self.stalled,
            post_step_callback: self.post_step_callback,
            post_mini_step_callback: self.post_mini_step_callback,
        }
    }

    /// Add a force applied before every forward-dynamics evaluation.
    pub fn add_recurrent_force(&mut self, force: Box<dyn RecurrentForce>) {
        self.recurrent_forces.push(force);
    }

    /// Remove every recurrent force, gravity included.
    pub fn clear_recurrent_forces(&mut self) {
        self.recurrent_forces.clear();
    }

    /// Install or remove velocity dissipation.
    pub fn set_dissipation(&mut self, dissipation: Option<Box<dyn Dissipation>>) {
        self.dissipation = dissipation;
    }

    /// Tolerances of the LCP solver used for impacts.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn set_lcp_config(&mut self, config: LcpConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| SimError::invalid_config(e.to_string()))?;
        self.solver.set_config(config);
        Ok(())
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the simulated world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Simulator settings.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The diagnostic sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the diagnostic sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Simulation clock.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Distances of the active geometry pairs, as last computed.
    #[must_use]
    pub fn pairwise_distances(&self) -> &[PairwiseDistInfo] {
        &self.distances
    }

    /// Constraints of the last impact problem.
    #[must_use]
    pub fn unilateral_constraints(&self) -> &[UnilateralConstraint] {
        &self.constraints
    }

    /// Geometry pairs in the current constraint set.
    #[must_use]
    pub fn current_contact_geoms(&self) -> BTreeSet<(GeomId, GeomId)> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                UnilateralConstraint::Contact(contact) => Some((contact.geom_a, contact.geom_b)),
                UnilateralConstraint::Limit(_) => None,
            })
            .collect()
    }

    /// Whether no rigid pair penetrates more deeply than in `previous`.
    ///
    /// A pair fails when it is interpenetrating now and its distance fell by
    /// more than `NEAR_ZERO`. Pairs with a compliant body never fail.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn constraints_met(&self, previous: &[PairwiseDistInfo]) -> Result<bool> {
        for current in &self.distances {
            if current.distance >= 0.0 {
                continue;
            }
            let Some(before) = previous
                .iter()
                .find(|p| p.geom_a == current.geom_a && p.geom_b == current.geom_b)
            else {
                continue;
            };
            if current.distance < before.distance - NEAR_ZERO
                && self.world.is_rigid_pair(current.geom_a, current.geom_b)?
            {
                debug!(
                    a = %current.geom_a,
                    b = %current.geom_b,
                    distance = current.distance,
                    "penetration deepened"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Advance the simulation by `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] for a non-positive or non-finite
    /// `dt`, [`SimError::ConstraintViolation`] if stabilization cannot bring
    /// the violation within tolerance, and dynamics errors.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }

        self.constraints.clear();
        self.refresh_distances(dt)?;

        let mut elapsed = 0.0;
        let mut mini_steps = 0;
        while elapsed < dt {
            elapsed += self.do_mini_step(dt - elapsed)?;
            mini_steps += 1;
        }

        if let Some(callback) = &self.post_step_callback {
            callback(&self.world, self.current_time);
        }

        self.refresh_distances(0.0)?;
        let stabilized =
            self.stabilization
                .stabilize(&mut self.world, &mut self.distances, &mut self.sink);
        let report = match stabilized {
            Ok(report) => report,
            Err(SimError::ConstraintViolation {
                min_distance,
                limit_violation,
                tolerance,
            }) => {
                self.sink.emit(Diagnostic::ViolationRemaining {
                    min_distance,
                    limit_violation,
                });
                return Err(SimError::ConstraintViolation {
                    min_distance,
                    limit_violation,
                    tolerance,
                });
            }
            Err(err) => return Err(err),
        };

        let min_distance = self
            .distances
            .iter()
            .map(|d| d.distance)
            .fold(f64::INFINITY, f64::min);
        self.sink.emit(Diagnostic::StepCompleted {
            time: self.current_time,
            min_distance,
        });

        Ok(StepReport {
            time: self.current_time,
            mini_steps,
            min_distance,
            stabilization_iterations: report.iterations,
        })
    }

    /// Run fixed steps of `dt` until `duration` has elapsed.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step and returns its error.
    pub fn run_for(&mut self, duration: f64, dt: f64) -> Result<Vec<StepReport>> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }
        let end = self.current_time + duration;
        let mut reports = Vec::new();
        while self.current_time < end - NEAR_ZERO {
            reports.push(self.step(dt.min(end - self.current_time))?);
        }
        Ok(reports)
    }

    /// One mini-step of at most `dt`; returns the time covered.
    ///
    /// # Errors
    ///
    /// Propagates dynamics and geometry errors. Impact solver failures are
    /// reported through the sink and do not fail the step.
    pub fn do_mini_step(&mut self, dt: f64) -> Result<f64> {
        let super_bodies = self.world.super_bodies();
        let saved = super_bodies
            .iter()
            .map(|&sb| Ok((sb, self.world.generalized_coordinates(sb)?)))
            .collect::<Result<Vec<_>>>()?;
        let rates = super_bodies
            .iter()
            .map(|&sb| self.world.generalized_velocity(sb, GeneralizedConvention::Euler))
            .collect::<Result<Vec<_>>>()?;

        let mut h = 0.0;
        // Forced advancement ignores the CA bound; stabilization cleans up.
        if self.stalled >= self.config.max_stalled_mini_steps {
            self.sink.emit(Diagnostic::StallBroken {
                stalled: self.stalled,
                advanced: dt,
            });
            self.advance_positions(&saved, &rates, dt)?;
            h = dt;
        }
        while h < dt {
            self.refresh_distances(dt - h)?;
            let ca = self.calc_next_ca_euler_step(dt - h)?;
            if ca <= 0.0 {
                break;
            }
            let tc = self.config.min_step_size.max(ca).min(dt - h);
            self.advance_positions(&saved, &rates, h + tc)?;
            h += tc;
        }
        self.stalled = if h > 0.0 { 0 } else { self.stalled + 1 };

        self.world.clear_forces();
        for force in &self.recurrent_forces {
            force.apply(&mut self.world);
        }
        self.apply_compliant_contact_forces()?;
        calc_fwd_dyn(&mut self.world)?;
        self.world.integrate_velocities(h)?;
        if let Some(dissipation) = &self.dissipation {
            dissipation.apply(&mut self.world, h)?;
        }

        self.distances = self.world.pairwise_distances(&self.pairs)?;
        self.constraints = self
            .world
            .unilateral_constraints(&self.distances, self.config.contact_dist_thresh)?;
        self.resolve_impacts();

        self.current_time += h;
        self.sink.emit(Diagnostic::MiniStep {
            h,
            time: self.current_time,
        });
        if let Some(callback) = &self.post_mini_step_callback {
            callback(&self.world, self.current_time);
        }
        Ok(h)
    }

    /// Largest step that cannot skip a contact or joint-limit event, capped
    /// at `dt` (`+∞` if nothing can happen within `dt`).
    ///
    /// Pairs with a compliant body are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown geometry.
    pub fn calc_next_ca_euler_step(&mut self, dt: f64) -> Result<f64> {
        let mut step = self
            .world
            .joints()
            .map(Joint::time_to_limit)
            .fold(f64::INFINITY, f64::min);
        let mut limiting_pair = None;

        for info in &self.distances {
            if !self.world.is_rigid_pair(info.geom_a, info.geom_b)? {
                continue;
            }
            let t = time_to_contact(
                info,
                &self.world.geom_motion(info.geom_a)?,
                &self.world.geom_motion(info.geom_b)?,
                dt,
                self.config.contact_dist_thresh,
            );
            if t < step {
                step = t;
                limiting_pair = Some((info.geom_a, info.geom_b));
            }
        }

        self.sink.emit(Diagnostic::ConservativeAdvancement {
            step,
            limiting_pair,
        });
        Ok(step)
    }

    /// Broad phase with a margin for `dt` of motion, then distances of the
    /// surviving pairs.
    fn refresh_distances(&mut self, dt: f64) -> Result<()> {
        let entries = self
            .world
            .broad_phase_entries(dt, self.config.contact_dist_thresh);
        let candidates = self.broad_phase.find_potential_pairs(&entries);
        self.pairs.clear();
        for (a, b) in candidates {
            if self.world.collision_allowed(a, b)? {
                self.pairs.push((a, b));
            }
        }
        self.distances = self.world.pairwise_distances(&self.pairs)?;
        Ok(())
    }

    /// `q = q₀ + t·q̇` in the Euler convention.
    fn advance_positions(
        &mut self,
        saved: &[(SuperBodyId, DVector<f64>)],
        rates: &[DVector<f64>],
        t: f64,
    ) -> Result<()> {
        for ((sb, q0), qd) in saved.iter().zip(rates) {
            self.world.set_generalized_coordinates(*sb, &(q0 + qd * t))?;
        }
        Ok(())
    }

    /// Penalty forces for pairs with a compliant body.
    fn apply_compliant_contact_forces(&mut self) -> Result<()> {
        for info in &self.distances {
            if self.world.is_rigid_pair(info.geom_a, info.geom_b)? {
                continue;
            }
            let ga = self.world.geometry(info.geom_a)?;
            let gb = self.world.geometry(info.geom_b)?;
            let body_a = self.world.body(ga.body)?;
            let body_b = self.world.body(gb.body)?;
            let params = ContactParams::combine(
                penalty_params(body_a, &ga.material),
                penalty_params(body_b, &gb.material),
            );
            let model = ContactModel::new(params);

            let contacts = generate_contacts(
                ga,
                body_a.pose(),
                gb,
                body_b.pose(),
                params.contact_margin.max(self.config.contact_dist_thresh),
            );
            let loads: Vec<_> = contacts
                .iter()
                .map(|contact| {
                    let rel = body_a.velocity_at(&contact.point) - body_b.velocity_at(&contact.point);
                    let force = model.compute_force(contact, &rel);
                    (force.total(), force.position)
                })
                .collect();

            let (a, b) = (ga.body, gb.body);
            for (force, point) in loads {
                self.world.add_force_at_point(a, &force, &point)?;
                self.world.add_force_at_point(b, &(-force), &point)?;
            }
        }
        Ok(())
    }

    fn resolve_impacts(&mut self) {
        if self.constraints.is_empty() {
            return;
        }
        match self.impact.resolve(
            &self.constraints,
            &mut self.world,
            &mut self.solver,
            &mut self.sink,
        ) {
            Ok(outcome) => {
                if outcome.constraints > 0 {
                    self.sink.emit(Diagnostic::ImpactResolved {
                        constraints: outcome.constraints,
                        frictionless_fallback: outcome.frictionless_fallback,
                    });
                }
            }
            Err(err) => {
                warn!(%err, "impact resolution failed");
                self.sink.emit(Diagnostic::ImpactFailed {
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn penalty_params<'a>(body: &'a RigidBody, material: &'a ContactParams) -> &'a ContactParams {
    if body.compliance().is_compliant() {
        body.penalty_params()
    } else {
        material
    }
}
