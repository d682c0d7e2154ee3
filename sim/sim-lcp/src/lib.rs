//! Linear complementarity problem (LCP) solvers.
//!
//! Finds `z` such that
//!
//! ```text
//! z ≥ 0,   w = M·z + q ≥ 0,   zᵀw = 0
//! ```
//!
//! Contact impulses, position corrections and joint-limit forces of the
//! dynamics engine are all posed as LCPs of this form.
//!
//! # Solvers
//!
//! | Method | Use |
//! |--------|-----|
//! | [`LcpSolver::lcp_lemke`] | dense Lemke pivoting, optional warm start |
//! | [`LcpSolver::lcp_lemke_sparse`] | same pivoting on a sparse `M` with a sparse basis factorization |
//! | [`LcpSolver::lcp_lemke_regularized`] | validated Lemke with a `M + λI` sweep |
//! | [`LcpSolver::lcp_fast`] | principal pivoting for positive definite `M` |
//!
//! Singular bases are absorbed by the least-squares fallbacks in [`basis`].
//! Pivoting failures (ray termination, ratio-test exhaustion, iteration
//! budget) are returned as [`LcpError`]; nothing retries automatically
//! beyond the regularization sweep.
//!
//! # Layer 0
//!
//! This crate has no dependency on the rest of the engine. It only sees
//! matrices and vectors.
//!
//! # Example
//!
//! ```
//! use sim_lcp::LcpSolver;
//! use nalgebra::{DMatrix, DVector};
//!
//! let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
//! let q = DVector::from_vec(vec![-2.0, 3.0]);
//!
//! let mut solver = LcpSolver::default();
//! let sol = solver.lcp_lemke_regularized(&m, &q, None).unwrap();
//! assert!((sol.z[0] - 2.0).abs() < 1e-12);
//! assert!(sol.satisfies(1e-9));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::many_single_char_names,
)]

pub mod basis;
mod config;
mod error;
mod lemke;
mod linalg;
mod solver;

pub use config::{LcpConfig, RegularizationSchedule};
pub use error::LcpError;
pub use lemke::{LcpMatrix, LcpWorkspace};
pub use solver::{LcpSolution, LcpSolver};

/// Result type for LCP solves.
pub type Result<T> = std::result::Result<T, LcpError>;
