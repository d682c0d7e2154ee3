//! Unilateral constraints and the complementarity problems built from them.
//!
//! This crate turns a set of active contacts and joint limits into the
//! linear complementarity problems the simulator solves:
//!
//! - **Islands** ([`ConstraintIslands`]) - super bodies coupled through
//!   constraints, found by union-find; static bodies never join
//! - **Problem data** ([`UnilateralConstraintProblemData`]) - Jacobians
//!   `Cn`, `Cs`, `Ct`, `L` and the Delassus blocks `X·M⁻¹·Yᵀ` of one island
//! - **Stabilization** ([`determine_dq`]) - the position-level LCP whose
//!   solution is a generalized displacement removing interpenetration
//! - **Impacts** ([`ImpactSolver`]) - the velocity-level LCP with a
//!   linearized friction pyramid and a frictionless fallback
//!
//! The multibody system is accessed through [`ConstraintDynamics`], which
//! the world implements. Every problem is rebuilt from scratch when needed
//! and never persisted.
//!
//! # Example
//!
//! ```
//! use sim_constraint::{ConstraintKind, LimitState};
//! use sim_types::{JointId, JointLimits};
//!
//! let limits = JointLimits::new(-1.0, 1.0);
//! let state = LimitState::classify(&limits, 1.0005, 1e-3);
//! let constraint = state.to_constraint(JointId::new(0), 0).unwrap();
//! assert!(constraint.slack < 0.0);
//!
//! let generic: sim_constraint::UnilateralConstraint = constraint.into();
//! assert_eq!(generic.kind(), ConstraintKind::Limit);
//! ```
//!
//! # Layer 0 Crate
//!
//! No engine state lives here; the world and the simulator are in
//! `sim-core`.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod constraint;
mod dynamics;
mod impact;
mod islands;
mod limits;
mod problem;
mod stabilization;
#[cfg(test)]
mod testing;

pub use constraint::{
    ConstraintKind, ContactConstraint, LimitConstraint, LimitSide, UnilateralConstraint,
};
pub use dynamics::ConstraintDynamics;
pub use impact::{ImpactImpulses, ImpactOutcome, ImpactSolver};
pub use islands::{ConstraintIslands, Island, IslandStatistics};
pub use limits::{active_limits, LimitState};
pub use problem::{RhsKind, UnilateralConstraintProblemData};
pub use stabilization::{backtracking_line_search, determine_dq, solve_lcp, LineSearchOutcome};
