//! Basis matrices for Lemke pivoting.
//!
//! Lemke's method only ever needs three things from its basis `B`: replace a
//! column, multiply by a vector, and solve `B·x = b`. [`BasisMatrix`] captures
//! exactly that so the pivoting code in [`crate::lemke`] is shared between the
//! dense and the sparse solver.
//!
//! # Solve fallback chain
//!
//! A basis can become singular or badly conditioned while pivoting. Solves
//! never fail; they degrade through three tiers:
//!
//! ```text
//! 1. LU with partial pivoting                 (exact, fast)
//! 2. damped normal equations (BᵀB + δI) x = Bᵀb  (least squares, Cholesky)
//! 3. SVD pseudo-inverse                       (least squares, robust)
//! ```
//!
//! The sparse basis replaces tier 1 with a sparse Cholesky factorization of
//! `BᵀB` and falls back to the dense tiers when that fails.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::linalg::{
    cholesky_in_place, cholesky_solve_in_place, lu_factor_in_place, lu_solve_factored,
};

/// Largest residual accepted from the sparse normal-equation solve.
const SPARSE_RESIDUAL_TOL: f64 = 1e-9;

/// Square basis matrix driven by Lemke pivoting.
pub trait BasisMatrix {
    /// Dimension of the basis.
    fn dim(&self) -> usize;

    /// Reset to `-I` of dimension `n`.
    fn reset_negative_identity(&mut self, n: usize);

    /// Replace column `j`.
    fn set_column(&mut self, j: usize, column: &DVector<f64>);

    /// `out = B·v`.
    fn mul_into(&self, v: &DVector<f64>, out: &mut DVector<f64>);

    /// `out = B⁻¹·rhs`, degrading to least squares when `B` is singular.
    fn solve_into(&mut self, rhs: &DVector<f64>, out: &mut DVector<f64>);
}

/// Dense column-major basis.
#[derive(Debug, Clone, Default)]
pub struct DenseBasis {
    b: DMatrix<f64>,
    factor: DMatrix<f64>,
    piv: Vec<usize>,
}

impl DenseBasis {
    /// Empty basis.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current matrix.
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.b
    }

    fn solve_lu(&mut self, rhs: &DVector<f64>, out: &mut DVector<f64>) -> bool {
        let n = self.b.nrows();
        self.factor.copy_from(&self.b);
        self.piv.resize(n, 0);
        if lu_factor_in_place(&mut self.factor, &mut self.piv).is_err() {
            return false;
        }
        out.copy_from(rhs);
        lu_solve_factored(&self.factor, &self.piv, out);
        out.iter().all(|v| v.is_finite())
    }

    fn solve_damped_normal(&mut self, rhs: &DVector<f64>, out: &mut DVector<f64>) -> bool {
        let n = self.b.nrows();
        self.factor = self.b.tr_mul(&self.b);
        let scale = self.factor.diagonal().amax().max(1.0);
        let damping = f64::EPSILON * scale * n as f64;
        for i in 0..n {
            self.factor[(i, i)] += damping;
        }
        if cholesky_in_place(&mut self.factor).is_err() {
            return false;
        }
        out.copy_from(&self.b.tr_mul(rhs));
        cholesky_solve_in_place(&self.factor, out);
        out.iter().all(|v| v.is_finite())
    }

    fn solve_pseudo_inverse(&self, rhs: &DVector<f64>, out: &mut DVector<f64>) {
        let n = self.b.nrows();
        let svd = self.b.clone().svd(true, true);
        let tol = f64::EPSILON * n as f64 * svd.singular_values.amax().max(1.0);
        match svd.solve(rhs, tol) {
            Ok(x) if x.iter().all(|v| v.is_finite()) => out.copy_from(&x),
            _ => {
                tracing::warn!(n, "basis pseudo-inverse failed; returning zero direction");
                out.fill(0.0);
            }
        }
    }
}

impl BasisMatrix for DenseBasis {
    fn dim(&self) -> usize {
        self.b.nrows()
    }

    fn reset_negative_identity(&mut self, n: usize) {
        self.b = -DMatrix::identity(n, n);
        self.factor = DMatrix::zeros(n, n);
        self.piv.clear();
        self.piv.resize(n, 0);
    }

    fn set_column(&mut self, j: usize, column: &DVector<f64>) {
        self.b.set_column(j, column);
    }

    fn mul_into(&self, v: &DVector<f64>, out: &mut DVector<f64>) {
        self.b.mul_to(v, out);
    }

    fn solve_into(&mut self, rhs: &DVector<f64>, out: &mut DVector<f64>) {
        if self.solve_lu(rhs, out) {
            return;
        }
        tracing::trace!(n = self.dim(), "singular basis; trying damped least squares");
        if self.solve_damped_normal(rhs, out) {
            return;
        }
        tracing::debug!(n = self.dim(), "damped least squares failed; using pseudo-inverse");
        self.solve_pseudo_inverse(rhs, out);
    }
}

/// Basis stored as sparse columns.
///
/// Lemke bases built from contact problems are mostly columns of `-I`, so
/// they stay sparse even when `M` is not.
#[derive(Debug, Clone, Default)]
pub struct SparseBasis {
    n: usize,
    columns: Vec<Vec<(usize, f64)>>,
    dense: DenseBasis,
}

impl SparseBasis {
    /// Empty basis.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nonzeros.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    fn to_csc(&self) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(self.n, self.n);
        for (j, column) in self.columns.iter().enumerate() {
            for &(i, v) in column {
                coo.push(i, j, v);
            }
        }
        CscMatrix::from(&coo)
    }

    fn to_dense(&self) -> DMatrix<f64> {
        let mut b = DMatrix::zeros(self.n, self.n);
        for (j, column) in self.columns.iter().enumerate() {
            for &(i, v) in column {
                b[(i, j)] = v;
            }
        }
        b
    }

    fn solve_sparse_cholesky(&self, rhs: &DVector<f64>, out: &mut DVector<f64>) -> bool {
        let b = self.to_csc();
        let bt = b.transpose();
        let normal = &bt * &b;
        let Ok(chol) = CscCholesky::factor(&normal) else {
            return false;
        };
        let bt_rhs: DMatrix<f64> = &bt * &DMatrix::from_column_slice(self.n, 1, rhs.as_slice());
        let x = chol.solve(&bt_rhs);
        if x.iter().any(|v| !v.is_finite()) {
            return false;
        }
        out.copy_from_slice(x.as_slice());

        // Normal equations square the condition number; reject inaccurate solves.
        let mut residual = DVector::zeros(self.n);
        self.mul_into(out, &mut residual);
        residual -= rhs;
        residual.amax() <= SPARSE_RESIDUAL_TOL * rhs.amax().max(1.0)
    }
}

impl BasisMatrix for SparseBasis {
    fn dim(&self) -> usize {
        self.n
    }

    fn reset_negative_identity(&mut self, n: usize) {
        self.n = n;
        self.columns.clear();
        self.columns.extend((0..n).map(|i| vec![(i, -1.0)]));
    }

    fn set_column(&mut self, j: usize, column: &DVector<f64>) {
        let entries = &mut self.columns[j];
        entries.clear();
        entries.extend(
            column
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(i, v)| (i, *v)),
        );
    }

    fn mul_into(&self, v: &DVector<f64>, out: &mut DVector<f64>) {
        out.fill(0.0);
        for (j, column) in self.columns.iter().enumerate() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for &(i, bij) in column {
                out[i] += bij * vj;
            }
        }
    }

    fn solve_into(&mut self, rhs: &DVector<f64>, out: &mut DVector<f64>) {
        if self.solve_sparse_cholesky(rhs, out) {
            return;
        }
        tracing::trace!(n = self.n, "sparse basis factorization failed; using dense tiers");
        let dense = self.to_dense();
        self.dense.reset_negative_identity(self.n);
        self.dense.b = dense;
        self.dense.solve_into(rhs, out);
    }
}
