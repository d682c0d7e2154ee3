//! The solver front end: dense, sparse, regularized and fast-path solves.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;

use crate::basis::{DenseBasis, SparseBasis};
use crate::lemke::{self, LcpMatrix, LcpWorkspace};
use crate::linalg::{cholesky_in_place, cholesky_solve_in_place};
use crate::{LcpConfig, LcpError, Result};

/// A complementarity solution.
#[derive(Debug, Clone, PartialEq)]
pub struct LcpSolution {
    /// The unknowns, `z ≥ 0`.
    pub z: DVector<f64>,
    /// Slack `w = M·z + q` of the matrix the solution was validated against.
    pub w: DVector<f64>,
    /// Pivots (Lemke) or active-set changes (fast path). Zero for the
    /// trivial case and for an accepted warm start.
    pub iterations: usize,
    /// Diagonal shift that was added to `M`, if any.
    pub regularization: Option<f64>,
}

impl LcpSolution {
    pub(crate) fn new(z: DVector<f64>, w: DVector<f64>, iterations: usize) -> Self {
        Self {
            z,
            w,
            iterations,
            regularization: None,
        }
    }

    /// `z = 0`, so `w = q`.
    pub(crate) fn trivial(q: &DVector<f64>) -> Self {
        Self::new(DVector::zeros(q.len()), q.clone(), 0)
    }

    /// Largest complementarity violation `max |z_i·w_i|`.
    #[must_use]
    pub fn complementarity(&self) -> f64 {
        self.z.component_mul(&self.w).amax()
    }

    /// Largest violation of `z ≥ 0`, `w ≥ 0` or `z∘w = 0`.
    #[must_use]
    pub fn violation(&self) -> f64 {
        if self.z.is_empty() {
            return 0.0;
        }
        (-self.z.min())
            .max(-self.w.min())
            .max(self.complementarity())
            .max(0.0)
    }

    /// Check the solution against `tol`: `z ≥ -tol`, `w ≥ -tol` and
    /// `-tol ≤ z_i·w_i < tol`.
    #[must_use]
    pub fn satisfies(&self, tol: f64) -> bool {
        if self.z.is_empty() {
            return true;
        }
        if self.z.min() < -tol || self.w.min() < -tol {
            return false;
        }
        let zw = self.z.component_mul(&self.w);
        zw.min() >= -tol && zw.max() < tol
    }
}

/// Linear complementarity solver.
///
/// Finds `z ≥ 0` with `w = M·z + q ≥ 0` and `zᵀw = 0`. The solver owns its
/// pivoting workspace and reuses it across calls; each solve starts from a
/// reset workspace.
///
/// # Example
///
/// ```
/// use sim_lcp::{LcpConfig, LcpSolver};
/// use nalgebra::{DMatrix, DVector};
///
/// let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
/// let q = DVector::from_vec(vec![-1.0, 1.0]);
///
/// let mut solver = LcpSolver::new(LcpConfig::default());
/// let sol = solver.lcp_lemke(&m, &q, None).unwrap();
/// assert!((sol.z[0] - 0.5).abs() < 1e-12);
/// assert!(sol.z[1].abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LcpSolver {
    config: LcpConfig,
    workspace: LcpWorkspace,
    dense: DenseBasis,
    sparse: SparseBasis,
}

impl LcpSolver {
    /// Solver with the given configuration.
    #[must_use]
    pub fn new(config: LcpConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &LcpConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: LcpConfig) {
        self.config = config;
    }

    /// Pivoting workspace of the last solve.
    #[must_use]
    pub fn workspace(&self) -> &LcpWorkspace {
        &self.workspace
    }

    /// Dense Lemke solve, optionally warm started from `z0`.
    pub fn lcp_lemke(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        z0: Option<&DVector<f64>>,
    ) -> Result<LcpSolution> {
        self.config.validate()?;
        lemke::solve(m, q, z0, &self.config, &mut self.workspace, &mut self.dense)
    }

    /// Lemke solve with a sparse `M` and a sparse basis factorization.
    pub fn lcp_lemke_sparse(
        &mut self,
        m: &CscMatrix<f64>,
        q: &DVector<f64>,
        z0: Option<&DVector<f64>>,
    ) -> Result<LcpSolution> {
        self.config.validate()?;
        lemke::solve(m, q, z0, &self.config, &mut self.workspace, &mut self.sparse)
    }

    /// Lemke solve with validation and a diagonal regularization sweep.
    ///
    /// The unregularized problem is tried first. If it fails or its solution
    /// does not validate, `M + 10^rf·I` is solved for each exponent of the
    /// configured schedule and the first validated solution is returned.
    pub fn lcp_lemke_regularized(
        &mut self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        z0: Option<&DVector<f64>>,
    ) -> Result<LcpSolution> {
        self.config.validate()?;
        lemke::check_dimensions(m, q)?;
        let n = q.len();
        if n == 0 {
            return Ok(LcpSolution::trivial(q));
        }

        let tol = self.validation_tolerance(m, q);

        match self.lcp_lemke(m, q, z0) {
            Ok(sol) if sol.satisfies(tol) => return Ok(sol),
            Ok(_) => tracing::debug!(n, tol, "unregularized solution failed validation"),
            Err(e) => tracing::debug!(n, error = %e, "unregularized solve failed"),
        }

        let schedule = self.config.regularization;
        let mut regularized = m.clone();
        for rf in schedule.exponents() {
            let lambda = 10f64.powi(rf);
            regularized.copy_from(m);
            for i in 0..n {
                regularized[(i, i)] += lambda;
            }

            if let Ok(mut sol) = lemke::solve(
                &regularized,
                q,
                z0,
                &self.config,
                &mut self.workspace,
                &mut self.dense,
            ) {
                if sol.satisfies(tol) {
                    tracing::debug!(n, lambda, "solved with regularization");
                    sol.regularization = Some(lambda);
                    return Ok(sol);
                }
            }
        }

        Err(LcpError::RegularizationExhausted {
            min_exp: schedule.min_exp,
            max_exp: schedule.max_exp,
        })
    }

    /// Principal-pivoting fast path for symmetric positive definite problems.
    ///
    /// Keeps an active set `A` (where `z > 0`), solves `M_AA·z_A = -q_A` by
    /// Cholesky, then drops the most negative `z` or adds the most negative
    /// `w`. Fails with:
    ///
    /// - [`LcpError::NotSymmetric`] for a non-symmetric `M`;
    /// - [`LcpError::NotPositiveDefinite`] when a principal block cannot be
    ///   factored;
    /// - [`LcpError::IterationLimit`] after `n·(n+1)` active-set changes;
    /// - [`LcpError::InvalidSolution`] if the final pair does not validate.
    ///
    /// Callers fall back to [`Self::lcp_lemke_regularized`].
    pub fn lcp_fast(&mut self, m: &DMatrix<f64>, q: &DVector<f64>) -> Result<LcpSolution> {
        self.config.validate()?;
        lemke::check_dimensions(m, q)?;
        let n = q.len();
        self.workspace.reset(n);
        if n == 0 {
            return Ok(LcpSolution::trivial(q));
        }

        let tol = lemke::zero_tolerance(m, &self.config).max(f64::EPSILON * n as f64);
        if q.min() > -tol {
            return Ok(LcpSolution::trivial(q));
        }

        // Cholesky reads the lower triangle only.
        let accept = self.validation_tolerance(m, q);
        let asymmetry = (m - m.transpose()).amax();
        if asymmetry > accept {
            return Err(LcpError::NotSymmetric { asymmetry });
        }

        let max_iter = n * (n + 1);
        let mut active = vec![false; n];
        let mut z = DVector::zeros(n);

        for iter in 0..max_iter {
            let idx: Vec<usize> = (0..n).filter(|&i| active[i]).collect();
            z.fill(0.0);
            if !idx.is_empty() {
                let k = idx.len();
                let mut block = DMatrix::from_fn(k, k, |r, c| m[(idx[r], idx[c])]);
                if cholesky_in_place(&mut block).is_err() {
                    return Err(LcpError::NotPositiveDefinite { size: k });
                }
                let mut rhs = DVector::from_fn(k, |r, _| -q[idx[r]]);
                cholesky_solve_in_place(&block, &mut rhs);
                for (r, &i) in idx.iter().enumerate() {
                    z[i] = rhs[r];
                }
            }

            // Drop the most negative active unknown.
            let worst_z = idx
                .iter()
                .copied()
                .filter(|&i| z[i] < -tol)
                .min_by(|&a, &b| z[a].total_cmp(&z[b]));
            if let Some(i) = worst_z {
                active[i] = false;
                continue;
            }

            // Add the most negative inactive slack.
            let w = m * &z + q;
            let worst_w = (0..n)
                .filter(|&i| !active[i] && w[i] < -tol)
                .min_by(|&a, &b| w[a].total_cmp(&w[b]));
            match worst_w {
                Some(i) => active[i] = true,
                None => {
                    for i in 0..n {
                        if !active[i] {
                            z[i] = 0.0;
                        } else {
                            z[i] = z[i].max(0.0);
                        }
                    }
                    let w = m * &z + q;
                    let solution = LcpSolution::new(z, w, iter);
                    if !solution.satisfies(accept) {
                        return Err(LcpError::InvalidSolution {
                            violation: solution.violation(),
                        });
                    }
                    tracing::trace!(n, iterations = iter, "fast path converged");
                    return Ok(solution);
                }
            }
        }

        Err(LcpError::IterationLimit {
            iterations: max_iter,
        })
    }

    /// Tolerance used to accept a solution in the regularized solve.
    fn validation_tolerance(&self, m: &DMatrix<f64>, q: &DVector<f64>) -> f64 {
        let n = q.len() as f64;
        self.config.zero_tol.unwrap_or_else(|| {
            n * f64::EPSILON.sqrt() * m.norm_inf().max(q.amax()).max(1.0)
        })
    }
}
