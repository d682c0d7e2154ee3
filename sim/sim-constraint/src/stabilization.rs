//! Position-level stabilization: the displacement LCP and its line search.
//!
//! For an island with violation vectors `Cn_v` (distance minus push-out
//! target) and `L_v` (limit slack) the generalized displacement
//!
//! ```text
//! dq = M⁻¹·(Cnᵀ·z_n + Lᵀ·z_l)
//! ```
//!
//! is chosen so the linearized constraints are met:
//!
//! ```text
//! w = [Cn·M⁻¹·Cnᵀ  Cn·M⁻¹·Lᵀ] [z_n]   [Cn_v]
//!     [L·M⁻¹·Cnᵀ   L·M⁻¹·Lᵀ ] [z_l] + [L_v ]   ≥ 0,  z ≥ 0,  zᵀw = 0
//! ```

use nalgebra::{DMatrix, DVector};
use sim_lcp::{LcpSolution, LcpSolver};
use sim_types::{Diagnostic, DiagnosticSink, LineSearchConfig, Result, SimError};
use tracing::debug;

use crate::UnilateralConstraintProblemData;

/// Solve an LCP with the fast path first, then regularized Lemke.
///
/// # Errors
///
/// Returns [`SimError::Solver`] if both fail.
pub fn solve_lcp(
    solver: &mut LcpSolver,
    mm: &DMatrix<f64>,
    qq: &DVector<f64>,
    sink: &mut dyn DiagnosticSink,
) -> Result<LcpSolution> {
    let solution = match solver.lcp_fast(mm, qq) {
        Ok(sol) => sol,
        Err(fast) => {
            debug!(size = qq.len(), error = %fast, "fast path failed, using Lemke");
            solver
                .lcp_lemke_regularized(mm, qq, None)
                .map_err(|e| SimError::solver(e.to_string()))?
        }
    };
    sink.emit(Diagnostic::LcpSolved {
        size: qq.len(),
        iterations: solution.iterations,
        regularization: solution.regularization,
    });
    Ok(solution)
}

/// The island-stacked generalized displacement that removes the violation.
///
/// # Errors
///
/// Returns [`SimError::Solver`] if the LCP cannot be solved.
pub fn determine_dq(
    pd: &UnilateralConstraintProblemData,
    solver: &mut LcpSolver,
    sink: &mut dyn DiagnosticSink,
) -> Result<DVector<f64>> {
    let nc = pd.num_contacts();
    let nl = pd.num_limits();
    let n = nc + nl;
    if n == 0 {
        return Ok(DVector::zeros(pd.num_gv));
    }

    let mut mm = DMatrix::zeros(n, n);
    mm.view_mut((0, 0), (nc, nc)).copy_from(&pd.cn_im_cn_t);
    mm.view_mut((0, nc), (nc, nl)).copy_from(&pd.cn_im_l_t);
    mm.view_mut((nc, 0), (nl, nc)).copy_from(&pd.cn_im_l_t.transpose());
    mm.view_mut((nc, nc), (nl, nl)).copy_from(&pd.l_im_l_t);

    let mut qq = DVector::zeros(n);
    qq.rows_mut(0, nc).copy_from(&pd.cn_v);
    qq.rows_mut(nc, nl).copy_from(&pd.l_v);

    let sol = solve_lcp(solver, &mm, &qq, sink)?;

    let z_n = sol.z.rows(0, nc);
    let z_l = sol.z.rows(nc, nl);
    Ok(&pd.im_cn_t * z_n + &pd.im_l_t * z_l)
}

/// Result of a backtracking line search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSearchOutcome {
    /// The step scale `t` met the sufficient-decrease test.
    Accepted {
        /// Accepted step scale.
        step: f64,
        /// Merit at the accepted point.
        merit: f64,
    },
    /// The step scale fell below `min_step`.
    Rejected,
}

impl LineSearchOutcome {
    /// Accepted step scale, zero when rejected.
    #[must_use]
    pub fn step(&self) -> f64 {
        match self {
            Self::Accepted { step, .. } => *step,
            Self::Rejected => 0.0,
        }
    }
}

/// Armijo backtracking on a scalar merit.
///
/// Starting at `t = 1`, shrinks `t ← β·t` while
/// `merit(t) > s0 − α·t·s0`. `merit(t)` evaluates the violation at
/// `q + t·dq`; the caller owns restoring `q` when the search is rejected.
///
/// # Errors
///
/// Propagates errors from `merit`.
pub fn backtracking_line_search(
    config: &LineSearchConfig,
    s0: f64,
    mut merit: impl FnMut(f64) -> Result<f64>,
) -> Result<LineSearchOutcome> {
    let mut t = 1.0;
    while t >= config.min_step {
        let s = merit(t)?;
        if s <= config.alpha.mul_add(-t * s0, s0) {
            return Ok(LineSearchOutcome::Accepted { step: t, merit: s });
        }
        t *= config.beta;
    }
    Ok(LineSearchOutcome::Rejected)
}
