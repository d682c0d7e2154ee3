//! Rigid and articulated body dynamics.
//!
//! - [`spatial`] - 6D motion/force algebra and Plücker transforms
//! - [`rne`] - recursive Newton-Euler inverse dynamics and joint constraint
//!   forces
//! - [`forward`] - accelerations from forces, and generalized inertias
//!
//! Articulated bodies are computed either in world coordinates about the
//! world origin ([`ReferenceFrame::Global`](sim_types::ReferenceFrame)) or
//! link by link ([`ReferenceFrame::Link`](sim_types::ReferenceFrame)). Both
//! give the same joint forces.

pub mod forward;
pub mod rne;
pub mod spatial;

pub use forward::{calc_fwd_dyn, generalized_inertia};
pub use rne::{InvDynData, RneAlgorithm};
