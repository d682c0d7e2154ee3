//! Velocity-level impact resolution.
//!
//! Each island solves for impulses that leave no constraint approaching:
//!
//! - contacts: `Cn·v⁺ ≥ -e·min(Cn·v⁻, 0)` for restitution `e ≥ 0`, or
//!   `Cn·v⁺ ≥ 0` when `e < 0` (fully inelastic)
//! - limits: the same bound on `L·v`
//!
//! With friction, each contact gets a four-direction friction pyramid
//! `(t1, t2, -t1, -t2)` and a slack `λ` bounding the sliding speed. The
//! LCP unknowns are `[z_n, z_l, β, λ]`:
//!
//! ```text
//! w_n = Cn·Δv + ṽ_n
//! w_l = L·Δv + ṽ_l
//! w_β = D·Δv + D·v⁻ + E·λ
//! w_λ = μ·z_n − Eᵀ·β
//! Δv  = M⁻¹·(Cnᵀ·z_n + Lᵀ·z_l + Dᵀ·β)
//! ```
//!
//! If the friction LCP fails, the frictionless one is solved instead.

use nalgebra::{DMatrix, DVector};
use sim_lcp::LcpSolver;
use sim_types::{Diagnostic, DiagnosticSink, Result, SimError};
use tracing::{debug, warn};

use crate::stabilization::solve_lcp;
use crate::{
    ConstraintDynamics, ConstraintIslands, RhsKind, UnilateralConstraint,
    UnilateralConstraintProblemData,
};

/// Summary of an impact resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpactOutcome {
    /// Islands solved.
    pub islands: usize,
    /// Constraints in the solved islands.
    pub constraints: usize,
    /// Whether any island fell back to the frictionless problem.
    pub frictionless_fallback: bool,
}

/// Impulses of one island, in problem-data row order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactImpulses {
    /// Normal impulse per contact.
    pub normal: DVector<f64>,
    /// Impulse along the first tangent per contact.
    pub tangent_s: DVector<f64>,
    /// Impulse along the second tangent per contact.
    pub tangent_t: DVector<f64>,
    /// Impulse per limit.
    pub limit: DVector<f64>,
}

impl ImpactImpulses {
    /// Island-stacked generalized velocity change.
    #[must_use]
    pub fn velocity_change(&self, pd: &UnilateralConstraintProblemData) -> DVector<f64> {
        &pd.im_cn_t * &self.normal
            + &pd.im_cs_t * &self.tangent_s
            + &pd.im_ct_t * &self.tangent_t
            + &pd.im_l_t * &self.limit
    }
}

/// Resolves impacts island by island.
#[derive(Debug, Clone, Copy)]
pub struct ImpactSolver {
    /// Newton restitution; negative means fully inelastic.
    pub restitution: f64,
}

impl Default for ImpactSolver {
    fn default() -> Self {
        Self { restitution: -1.0 }
    }
}

impl ImpactSolver {
    /// Solver with the given restitution.
    #[must_use]
    pub fn new(restitution: f64) -> Self {
        Self { restitution }
    }

    /// Apply impact impulses for `constraints` to `dynamics`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Solver`] if an island's frictionless problem
    /// cannot be solved; islands solved before it keep their impulses.
    pub fn resolve<D: ConstraintDynamics + ?Sized>(
        &self,
        constraints: &[UnilateralConstraint],
        dynamics: &mut D,
        solver: &mut LcpSolver,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ImpactOutcome> {
        let islands = ConstraintIslands::build(constraints, &*dynamics);
        let mut outcome = ImpactOutcome::default();

        for island in islands.islands() {
            let pd = UnilateralConstraintProblemData::compute(
                island,
                constraints,
                &*dynamics,
                RhsKind::Velocity,
            )?;
            if pd.num_contacts() + pd.num_limits() == 0 {
                continue;
            }

            let (impulses, fallback) = self.solve_island(&pd, solver, sink)?;
            let dv = impulses.velocity_change(&pd);
            for (sb, piece) in pd.split(&dv) {
                dynamics.apply_velocity_change(sb, &piece)?;
            }

            outcome.islands += 1;
            outcome.constraints += island.num_constraints();
            outcome.frictionless_fallback |= fallback;
        }

        Ok(outcome)
    }

    /// Impulses for one island, and whether the frictionless fallback ran.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Solver`] if no formulation can be solved.
    pub fn solve_island(
        &self,
        pd: &UnilateralConstraintProblemData,
        solver: &mut LcpSolver,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(ImpactImpulses, bool)> {
        if pd.mu.iter().any(|&mu| mu > 0.0) {
            match self.solve_with_friction(pd, solver, sink) {
                Ok(impulses) => return Ok((impulses, false)),
                Err(e) => {
                    warn!(error = %e, "friction impact failed, retrying frictionless");
                    let impulses = self.solve_frictionless(pd, solver, sink)?;
                    return Ok((impulses, true));
                }
            }
        }
        Ok((self.solve_frictionless(pd, solver, sink)?, false))
    }

    fn target(&self, v: f64) -> f64 {
        if self.restitution >= 0.0 {
            self.restitution.mul_add(v.min(0.0), v)
        } else {
            v
        }
    }

    fn solve_frictionless(
        &self,
        pd: &UnilateralConstraintProblemData,
        solver: &mut LcpSolver,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ImpactImpulses> {
        let nc = pd.num_contacts();
        let nl = pd.num_limits();
        let n = nc + nl;

        let mut mm = DMatrix::zeros(n, n);
        mm.view_mut((0, 0), (nc, nc)).copy_from(&pd.cn_im_cn_t);
        mm.view_mut((0, nc), (nc, nl)).copy_from(&pd.cn_im_l_t);
        mm.view_mut((nc, 0), (nl, nc)).copy_from(&pd.cn_im_l_t.transpose());
        mm.view_mut((nc, nc), (nl, nl)).copy_from(&pd.l_im_l_t);

        let qq = DVector::from_iterator(
            n,
            pd.cn_v.iter().chain(pd.l_v.iter()).map(|&v| self.target(v)),
        );

        let sol = solve_lcp(solver, &mm, &qq, sink)?;
        Ok(ImpactImpulses {
            normal: sol.z.rows(0, nc).into_owned(),
            tangent_s: DVector::zeros(nc),
            tangent_t: DVector::zeros(nc),
            limit: sol.z.rows(nc, nl).into_owned(),
        })
    }

    fn solve_with_friction(
        &self,
        pd: &UnilateralConstraintProblemData,
        solver: &mut LcpSolver,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ImpactImpulses> {
        let nc = pd.num_contacts();
        let nl = pd.num_limits();
        let g = pd.delassus();

        // Impulse unknowns as (Delassus row, sign): normals, limits, then
        // the pyramid directions t1, t2, -t1, -t2 of each contact.
        let mut rows: Vec<(usize, f64)> = Vec::with_capacity(5 * nc + nl);
        rows.extend((0..nc).map(|i| (i, 1.0)));
        rows.extend((0..nl).map(|j| (3 * nc + j, 1.0)));
        for i in 0..nc {
            rows.extend([
                (nc + i, 1.0),
                (2 * nc + i, 1.0),
                (nc + i, -1.0),
                (2 * nc + i, -1.0),
            ]);
        }

        let nb = rows.len();
        let n = nb + nc;
        let beta0 = nc + nl;
        let lambda0 = nb;

        let mut mm = DMatrix::zeros(n, n);
        for (a, &(ra, sa)) in rows.iter().enumerate() {
            for (b, &(rb, sb)) in rows.iter().enumerate() {
                mm[(a, b)] = sa * sb * g[(ra, rb)];
            }
        }
        for i in 0..nc {
            for k in 0..4 {
                mm[(beta0 + 4 * i + k, lambda0 + i)] = 1.0;
                mm[(lambda0 + i, beta0 + 4 * i + k)] = -1.0;
            }
            mm[(lambda0 + i, i)] = pd.mu[i];
        }

        let mut qq = DVector::zeros(n);
        for i in 0..nc {
            qq[i] = self.target(pd.cn_v[i]);
            let (vs, vt) = (pd.cs_v[i], pd.ct_v[i]);
            qq[beta0 + 4 * i] = vs;
            qq[beta0 + 4 * i + 1] = vt;
            qq[beta0 + 4 * i + 2] = -vs;
            qq[beta0 + 4 * i + 3] = -vt;
        }
        for j in 0..nl {
            qq[nc + j] = self.target(pd.l_v[j]);
        }

        let sol = solver
            .lcp_lemke_regularized(&mm, &qq, None)
            .map_err(|e| SimError::solver(e.to_string()))?;
        sink.emit(Diagnostic::LcpSolved {
            size: n,
            iterations: sol.iterations,
            regularization: sol.regularization,
        });
        debug!(contacts = nc, limits = nl, pivots = sol.iterations, "friction impact solved");

        let z = &sol.z;
        Ok(ImpactImpulses {
            normal: z.rows(0, nc).into_owned(),
            tangent_s: DVector::from_fn(nc, |i, _| z[beta0 + 4 * i] - z[beta0 + 4 * i + 2]),
            tangent_t: DVector::from_fn(nc, |i, _| z[beta0 + 4 * i + 1] - z[beta0 + 4 * i + 3]),
            limit: z.rows(nc, nl).into_owned(),
        })
    }
}
