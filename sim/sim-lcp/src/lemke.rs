//! Lemke's complementary pivoting, shared by the dense and sparse solvers.
//!
//! # Algorithm
//!
//! Variables are indexed `0..n` for `z`, `n..2n` for `w` and `2n` for the
//! artificial variable `t`. The basis starts from the warm-start guess:
//!
//! ```text
//! B = [ M(:, bas)  -I(:, nonbas) ]      x = -B⁻¹ q
//! ```
//!
//! If `x ≥ 0` the guess already solves the problem. Otherwise `t` enters at
//! the most negative entry and pivoting proceeds: the entering variable is
//! the complement of the one that just left, the leaving variable comes out
//! of the minimum-ratio test. Success is reached when `t` leaves the basis.
//!
//! Ties in the ratio test prefer `t`, then the largest direction entry. No
//! lexicographic rule is applied, so cycling is possible in principle; the
//! iteration budget `min(1000, 50n)` bounds it.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;

use crate::basis::BasisMatrix;
use crate::{LcpConfig, LcpError, LcpSolution, Result};

/// Hard cap on pivots regardless of size.
const MAX_PIVOTS: usize = 1000;

/// Pivots allowed per variable.
const PIVOTS_PER_VARIABLE: usize = 50;

/// Matrix operand of a complementarity problem.
pub trait LcpMatrix {
    /// Number of rows.
    fn nrows(&self) -> usize;

    /// Number of columns.
    fn ncols(&self) -> usize;

    /// Copy column `j` into `out`.
    fn column_into(&self, j: usize, out: &mut DVector<f64>);

    /// Infinity norm (largest absolute row sum).
    fn norm_inf(&self) -> f64;

    /// `M·z + q`.
    fn affine(&self, z: &DVector<f64>, q: &DVector<f64>) -> DVector<f64>;
}

impl LcpMatrix for DMatrix<f64> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn column_into(&self, j: usize, out: &mut DVector<f64>) {
        out.copy_from(&self.column(j));
    }

    fn norm_inf(&self) -> f64 {
        self.row_iter()
            .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    fn affine(&self, z: &DVector<f64>, q: &DVector<f64>) -> DVector<f64> {
        self * z + q
    }
}

impl LcpMatrix for CscMatrix<f64> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn ncols(&self) -> usize {
        self.ncols()
    }

    fn column_into(&self, j: usize, out: &mut DVector<f64>) {
        out.fill(0.0);
        let col = self.col(j);
        for (&i, &v) in col.row_indices().iter().zip(col.values()) {
            out[i] += v;
        }
    }

    fn norm_inf(&self) -> f64 {
        let mut sums = vec![0.0; self.nrows()];
        for (i, _, v) in self.triplet_iter() {
            sums[i] += v.abs();
        }
        sums.into_iter().fold(0.0, f64::max)
    }

    fn affine(&self, z: &DVector<f64>, q: &DVector<f64>) -> DVector<f64> {
        let mut w = q.clone();
        for (i, j, v) in self.triplet_iter() {
            w[i] += v * z[j];
        }
        w
    }
}

/// Scratch state for Lemke pivoting.
///
/// Reused across solves to avoid reallocating; [`LcpWorkspace::reset`] runs
/// at the start of every solve so nothing carries over between problems.
#[derive(Debug, Clone, Default)]
pub struct LcpWorkspace {
    bas: Vec<usize>,
    nonbas: Vec<usize>,
    candidates: Vec<usize>,
    x: DVector<f64>,
    d: DVector<f64>,
    be: DVector<f64>,
    u: DVector<f64>,
}

impl LcpWorkspace {
    /// Empty workspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear index partitions and size scratch vectors for `n` variables.
    pub fn reset(&mut self, n: usize) {
        self.bas.clear();
        self.nonbas.clear();
        self.candidates.clear();
        for v in [&mut self.x, &mut self.d, &mut self.be, &mut self.u] {
            *v = DVector::zeros(n);
        }
    }

    /// Basic variable indices from the last solve.
    #[must_use]
    pub fn basis_indices(&self) -> &[usize] {
        &self.bas
    }

    /// Gather `z` from the basic variables.
    fn extract_z(&self, n: usize) -> DVector<f64> {
        let mut z = DVector::zeros(n);
        for (idx, &var) in self.bas.iter().enumerate() {
            if var < n {
                z[var] = self.x[idx];
            }
        }
        z
    }
}

/// Tolerance below which `q` counts as non-negative, and the ratio-test slack.
pub(crate) fn zero_tolerance<M: LcpMatrix>(m: &M, config: &LcpConfig) -> f64 {
    config
        .zero_tol
        .unwrap_or_else(|| f64::EPSILON * m.norm_inf() * m.nrows() as f64)
}

pub(crate) fn check_dimensions<M: LcpMatrix>(m: &M, q: &DVector<f64>) -> Result<()> {
    if m.nrows() != q.len() || m.ncols() != q.len() {
        return Err(LcpError::DimensionMismatch {
            rows: m.nrows(),
            cols: m.ncols(),
            len: q.len(),
        });
    }
    Ok(())
}

/// Solve `w = M·z + q`, `z, w ≥ 0`, `zᵀw = 0` by complementary pivoting.
pub(crate) fn solve<M: LcpMatrix, B: BasisMatrix>(
    m: &M,
    q: &DVector<f64>,
    z0: Option<&DVector<f64>>,
    config: &LcpConfig,
    ws: &mut LcpWorkspace,
    basis: &mut B,
) -> Result<LcpSolution> {
    check_dimensions(m, q)?;
    let n = q.len();
    ws.reset(n);

    if n == 0 {
        return Ok(LcpSolution::trivial(q));
    }

    let zero_tol = zero_tolerance(m, config);
    if q.min() > -zero_tol {
        tracing::trace!(n, "trivial solution");
        return Ok(LcpSolution::trivial(q));
    }

    let t = 2 * n;
    let max_iter = MAX_PIVOTS.min(PIVOTS_PER_VARIABLE * n);

    match z0 {
        Some(z0) if z0.len() == n => {
            for (i, &zi) in z0.iter().enumerate() {
                if zi > 0.0 {
                    ws.bas.push(i);
                } else {
                    ws.nonbas.push(i);
                }
            }
        }
        _ => ws.nonbas.extend(0..n),
    }

    basis.reset_negative_identity(n);
    for (col, &var) in ws.bas.iter().enumerate() {
        m.column_into(var, &mut ws.be);
        basis.set_column(col, &ws.be);
    }
    let offset = ws.bas.len();
    for (k, &var) in ws.nonbas.iter().enumerate() {
        ws.be.fill(0.0);
        ws.be[var] = -1.0;
        basis.set_column(offset + k, &ws.be);
    }

    basis.solve_into(q, &mut ws.x);
    ws.x.neg_mut();

    if ws.x.iter().all(|&v| v >= 0.0) {
        tracing::trace!(n, "warm start basis solves the problem");
        let z = ws.extract_z(n);
        let w = m.affine(&z, q);
        return Ok(LcpSolution::new(z, w, 0));
    }

    // Bring in the artificial variable at the most negative entry.
    let mut lvindex = ws.x.imin();
    let tval = -ws.x[lvindex];
    let nonbas_w: Vec<usize> = ws.nonbas.iter().map(|&i| i + n).collect();
    ws.bas.extend(nonbas_w);
    let mut leaving = ws.bas[lvindex];
    ws.bas[lvindex] = t;

    for i in 0..n {
        ws.u[i] = if ws.x[i] < 0.0 { 1.0 } else { 0.0 };
    }
    basis.mul_into(&ws.u, &mut ws.be);
    ws.be.neg_mut();
    ws.x.axpy(tval, &ws.u, 1.0);
    ws.x[lvindex] = tval;
    basis.set_column(lvindex, &ws.be);

    for iter in 0..max_iter {
        if leaving == t {
            let z = ws.extract_z(n);
            let w = m.affine(&z, q);
            tracing::trace!(n, iterations = iter, "lemke converged");
            return Ok(LcpSolution::new(z, w, iter));
        }

        let entering = if leaving < n {
            ws.be.fill(0.0);
            ws.be[leaving] = -1.0;
            n + leaving
        } else {
            let var = leaving - n;
            m.column_into(var, &mut ws.be);
            var
        };

        basis.solve_into(&ws.be, &mut ws.d);

        let piv_tol = config
            .piv_tol
            .unwrap_or_else(|| f64::EPSILON * n as f64 * ws.be.amax().max(1.0));

        ws.candidates.clear();
        ws.candidates
            .extend((0..n).filter(|&i| ws.d[i] > piv_tol));
        if ws.candidates.is_empty() {
            tracing::debug!(n, iterations = iter, "ray termination");
            return Err(LcpError::RayTermination);
        }

        let theta = ws
            .candidates
            .iter()
            .map(|&j| (ws.x[j] + zero_tol) / ws.d[j])
            .fold(f64::INFINITY, f64::min);
        let (x, d) = (&ws.x, &ws.d);
        ws.candidates.retain(|&j| x[j] / d[j] <= theta);
        if ws.candidates.is_empty() {
            tracing::debug!(n, iterations = iter, zero_tol, "ratio test left no candidate");
            return Err(LcpError::ZeroToleranceTooLow);
        }

        lvindex = match ws.candidates.iter().find(|&&j| ws.bas[j] == t) {
            Some(&j) => j,
            None => {
                let mut best = ws.candidates[0];
                for &j in &ws.candidates[1..] {
                    if ws.d[j] > ws.d[best] {
                        best = j;
                    }
                }
                best
            }
        };
        leaving = ws.bas[lvindex];

        let ratio = ws.x[lvindex] / ws.d[lvindex];
        ws.x.axpy(-ratio, &ws.d, 1.0);
        ws.x[lvindex] = ratio;
        basis.set_column(lvindex, &ws.be);
        ws.bas[lvindex] = entering;
    }

    tracing::debug!(n, max_iter, "lemke iteration limit reached");
    Err(LcpError::IterationLimit {
        iterations: max_iter,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::basis::{DenseBasis, SparseBasis};
    use approx::assert_relative_eq;

    fn dense_problem() -> (DMatrix<f64>, DVector<f64>) {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0]);
        let q = DVector::from_vec(vec![-1.0, -2.0, 1.0]);
        (m, q)
    }

    #[test]
    fn test_solves_small_symmetric_problem() {
        let (m, q) = dense_problem();
        let mut ws = LcpWorkspace::new();
        let mut basis = DenseBasis::new();
        let sol = solve(&m, &q, None, &LcpConfig::default(), &mut ws, &mut basis).unwrap();

        // Unconstrained solution of the first two rows is (0, 1), w_3 = 2.
        assert_relative_eq!(sol.z, DVector::from_vec(vec![0.0, 1.0, 0.0]), epsilon = 1e-12);
        assert_relative_eq!(sol.w[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(sol.w[2], 2.0, epsilon = 1e-12);
        assert!(sol.iterations > 0);
    }

    #[test]
    fn test_sparse_matrix_gives_same_answer() {
        let (m, q) = dense_problem();
        let csc = CscMatrix::from(&m);
        let mut ws = LcpWorkspace::new();
        let mut basis = SparseBasis::new();
        let sol = solve(&csc, &q, None, &LcpConfig::default(), &mut ws, &mut basis).unwrap();
        assert_relative_eq!(sol.z, DVector::from_vec(vec![0.0, 1.0, 0.0]), epsilon = 1e-10);
    }

    #[test]
    fn test_warm_start_with_correct_support_needs_no_pivots() {
        let (m, q) = dense_problem();
        let z0 = DVector::from_vec(vec![0.0, 0.5, 0.0]);
        let mut ws = LcpWorkspace::new();
        let mut basis = DenseBasis::new();
        let sol = solve(&m, &q, Some(&z0), &LcpConfig::default(), &mut ws, &mut basis).unwrap();
        assert_eq!(sol.iterations, 0);
        assert_relative_eq!(sol.z[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_infeasible_problem_reports_ray_termination() {
        // w = -z - 1 can never be non-negative.
        let m = DMatrix::from_element(1, 1, -1.0);
        let q = DVector::from_element(1, -1.0);
        let mut ws = LcpWorkspace::new();
        let mut basis = DenseBasis::new();
        let err = solve(&m, &q, None, &LcpConfig::default(), &mut ws, &mut basis).unwrap_err();
        assert_eq!(err, LcpError::RayTermination);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let m = DMatrix::<f64>::identity(2, 2);
        let q = DVector::from_element(3, -1.0);
        let mut ws = LcpWorkspace::new();
        let mut basis = DenseBasis::new();
        let err = solve(&m, &q, None, &LcpConfig::default(), &mut ws, &mut basis).unwrap_err();
        assert!(matches!(err, LcpError::DimensionMismatch { len: 3, .. }));
    }

    #[test]
    fn test_csc_norm_and_affine_match_dense() {
        let (m, _) = dense_problem();
        let csc = CscMatrix::from(&m);
        assert_relative_eq!(csc.norm_inf(), m.norm_inf());

        let z = DVector::from_vec(vec![1.0, -1.0, 2.0]);
        let q = DVector::from_vec(vec![0.5, 0.5, 0.5]);
        assert_relative_eq!(csc.affine(&z, &q), m.affine(&z, &q), epsilon = 1e-12);
    }
}
