//! Post-step constraint stabilization.
//!
//! Positions that drifted into interpenetration or past joint limits are
//! projected back with a position-level LCP per constraint island. Each
//! iteration:
//!
//! 1. collects contacts and limits within `eps`;
//! 2. solves for the generalized displacement `dq` pushing contacts out to
//!    `2·eps` and limits back to zero slack;
//! 3. backtracks along `dq` on the merit
//!    `s = max(0, −min distance, max limit overshoot)`.
//!
//! Nothing is solved when the configuration is already valid.

use nalgebra::DVector;
use sim_constraint::{
    backtracking_line_search, determine_dq, ConstraintIslands, LineSearchOutcome, RhsKind,
    UnilateralConstraintProblemData,
};
use sim_contact::PairwiseDistInfo;
use sim_lcp::LcpSolver;
use sim_types::{
    Diagnostic, DiagnosticSink, GeomId, Result, SimError, StabilizationConfig, SuperBodyId,
};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::world::World;

/// What a stabilization pass achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StabilizationReport {
    /// Iterations run (each one solved at least one LCP).
    pub iterations: usize,
    /// Minimum rigid-pair distance afterwards.
    pub min_distance: f64,
    /// Largest joint-limit overshoot afterwards.
    pub limit_violation: f64,
}

/// Position-level constraint projection.
#[derive(Debug, Clone, Default)]
pub struct ConstraintStabilization {
    config: StabilizationConfig,
    solver: LcpSolver,
}

impl ConstraintStabilization {
    /// Stabilizer with the given settings.
    #[must_use]
    pub fn new(config: StabilizationConfig) -> Self {
        Self {
            config,
            solver: LcpSolver::default(),
        }
    }

    /// Current settings.
    #[must_use]
    pub fn config(&self) -> &StabilizationConfig {
        &self.config
    }

    /// Remove interpenetration and limit overshoot from `world`.
    ///
    /// `distances` names the pairs to watch and is kept up to date with the
    /// final configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ConstraintViolation`] if the remaining violation
    /// exceeds `max_violation`, and propagates assembly and solver errors.
    pub fn stabilize(
        &mut self,
        world: &mut World,
        distances: &mut Vec<PairwiseDistInfo>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<StabilizationReport> {
        let eps = self.config.eps;
        let pairs: Vec<(GeomId, GeomId)> =
            distances.iter().map(|d| (d.geom_a, d.geom_b)).collect();

        let mut iterations = 0;
        while iterations < self.config.max_iterations && is_violated(world, distances, eps)? {
            let merit = violation(world, distances)?;
            let Some(dq) = self.displacement(world, distances, sink)? else {
                break;
            };

            let saved = dq
                .iter()
                .map(|(sb, _)| Ok((*sb, world.generalized_coordinates(*sb)?)))
                .collect::<Result<Vec<_>>>()?;

            let outcome = backtracking_line_search(&self.config.line_search, merit, |t| {
                restore(world, &saved)?;
                for (sb, d) in &dq {
                    world.apply_generalized_displacement(*sb, &(d * t))?;
                }
                *distances = world.pairwise_distances(&pairs)?;
                violation(world, distances)
            })?;

            sink.emit(Diagnostic::StabilizationIteration {
                iteration: iterations,
                violation: merit,
                step: outcome.step(),
            });
            iterations += 1;

            if outcome == LineSearchOutcome::Rejected {
                restore(world, &saved)?;
                *distances = world.pairwise_distances(&pairs)?;
                debug!(iterations, merit, "stabilization line search rejected");
                break;
            }
        }

        let min_distance = world.min_rigid_distance(distances)?;
        let limit_violation = world.max_limit_overshoot();
        let residual = (-min_distance).max(limit_violation);
        if residual > self.config.max_violation {
            return Err(SimError::ConstraintViolation {
                min_distance,
                limit_violation,
                tolerance: self.config.max_violation,
            });
        }
        if residual > eps {
            warn!(min_distance, limit_violation, "stabilization left a violation");
            sink.emit(Diagnostic::ViolationRemaining {
                min_distance,
                limit_violation,
            });
        }

        Ok(StabilizationReport {
            iterations,
            min_distance,
            limit_violation,
        })
    }

    /// Per-super-body displacement removing the current violation, `None`
    /// when no constraint touches a dynamic body.
    fn displacement(
        &mut self,
        world: &World,
        distances: &[PairwiseDistInfo],
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Option<Vec<(SuperBodyId, DVector<f64>)>>> {
        let eps = self.config.eps;
        let constraints = world.unilateral_constraints(distances, eps)?;
        let islands = ConstraintIslands::build(&constraints, world);

        let mut dq = Vec::new();
        for island in islands.islands() {
            let pd = UnilateralConstraintProblemData::compute(
                island,
                &constraints,
                world,
                RhsKind::Violation { target: 2.0 * eps },
            )?;
            if pd.num_contacts() + pd.num_limits() == 0 {
                continue;
            }
            let stacked = determine_dq(&pd, &mut self.solver, sink)?;
            dq.extend(pd.split(&stacked));
        }
        Ok((!dq.is_empty()).then_some(dq))
    }
}

fn is_violated(world: &World, distances: &[PairwiseDistInfo], eps: f64) -> Result<bool> {
    Ok(world.min_rigid_distance(distances)? < eps || world.max_limit_overshoot() > eps)
}

/// `max(0, −min distance, max limit overshoot)`.
fn violation(world: &World, distances: &[PairwiseDistInfo]) -> Result<f64> {
    Ok((-world.min_rigid_distance(distances)?)
        .max(world.max_limit_overshoot())
        .max(0.0))
}

fn restore(world: &mut World, saved: &[(SuperBodyId, DVector<f64>)]) -> Result<()> {
    for (sb, q) in saved {
        world.set_generalized_coordinates(*sb, q)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::joint::JointDef;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use sim_contact::Primitive;
    use sim_types::{JointLimits, MassProperties, Pose, RecordingSink, ReferenceFrame};

    fn sphere_on_ground(height: f64) -> (World, Vec<PairwiseDistInfo>, sim_types::BodyId) {
        let mut world = World::new();
        let ground = world.add_static_body(Pose::identity());
        let g0 = world.attach_geometry(ground, Primitive::Plane).unwrap();
        let ball = world
            .add_rigid_body(Pose::from_position(Point3::new(0.0, 0.0, height)), MassProperties::sphere(1.0, 1.0))
            .unwrap();
        let g1 = world.attach_geometry(ball, Primitive::sphere(1.0)).unwrap();
        let distances = world.pairwise_distances(&[(g0, g1)]).unwrap();
        (world, distances, ball)
    }

    #[test]
    fn test_separated_configuration_solves_nothing() {
        let (mut world, mut distances, _) = sphere_on_ground(1.5);
        let mut sink = RecordingSink::new();
        let report = ConstraintStabilization::default()
            .stabilize(&mut world, &mut distances, &mut sink)
            .unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(sink.lcp_solves(), 0);
    }

    #[test]
    fn test_pushes_sphere_out_of_ground() {
        let (mut world, mut distances, ball) = sphere_on_ground(1.0 - 5e-4);
        let mut sink = RecordingSink::new();
        let report = ConstraintStabilization::default()
            .stabilize(&mut world, &mut distances, &mut sink)
            .unwrap();

        assert!(report.iterations >= 1);
        assert!(sink.lcp_solves() >= 1);
        assert!(report.min_distance >= -1e-12);
        let z = world.body(ball).unwrap().pose().position.z;
        assert!(z >= 1.0 - 1e-12);
        assert!(z < 1.0 + 1e-6);
    }

    #[test]
    fn test_unresolved_overlap_is_an_error() {
        let (mut world, mut distances, _) = sphere_on_ground(0.5);
        let config = StabilizationConfig::default().max_iterations(0);
        let err = ConstraintStabilization::new(config)
            .stabilize(&mut world, &mut distances, &mut RecordingSink::new())
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_joint_limit_overshoot_is_removed() {
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
                    .with_limits(JointLimits::new(-0.5, 0.5))
                    .with_position(0.5004),
                MassProperties::rod(1.0, 1.0, Vector3::new(0.0, 0.0, -0.5)),
            )
            .unwrap();

        let mut distances = Vec::new();
        let report = ConstraintStabilization::default()
            .stabilize(&mut world, &mut distances, &mut RecordingSink::new())
            .unwrap();
        assert!(report.iterations >= 1);
        assert_relative_eq!(world.joint(joint).unwrap().q()[0], 0.5, epsilon = 1e-8);
    }
}
