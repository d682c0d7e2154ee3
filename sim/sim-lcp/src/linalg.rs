//! Dense factorizations used by the basis solve and the fast path.
//!
//! In-place LU with partial pivoting and in-place Cholesky. Both work on
//! borrowed storage so the workspace can reuse its buffers between pivots.

use nalgebra::{DMatrix, DVector};

/// Pivot magnitude below which LU reports singularity.
const LU_MIN_PIVOT: f64 = 1e-30;

/// A factorization met a zero (or negative, for Cholesky) pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Singular;

/// Factor A = P·L·U in place. Stores L (unit lower) and U (upper) in `a`,
/// the row swaps in `piv`.
pub(crate) fn lu_factor_in_place(a: &mut DMatrix<f64>, piv: &mut [usize]) -> Result<(), Singular> {
    let n = a.nrows();
    for k in 0..n {
        let mut max_val = a[(k, k)].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let v = a[(i, k)].abs();
            if v > max_val {
                max_val = v;
                max_row = i;
            }
        }
        if !(max_val >= LU_MIN_PIVOT) {
            return Err(Singular);
        }
        piv[k] = max_row;

        if max_row != k {
            a.swap_rows(k, max_row);
        }

        for i in (k + 1)..n {
            a[(i, k)] /= a[(k, k)];
            for j in (k + 1)..n {
                a[(i, j)] -= a[(i, k)] * a[(k, j)];
            }
        }
    }
    Ok(())
}

/// Solve P·L·U·x = b with factors from [`lu_factor_in_place`].
/// On entry `x` holds b.
#[allow(clippy::needless_range_loop)]
pub(crate) fn lu_solve_factored(a: &DMatrix<f64>, piv: &[usize], x: &mut DVector<f64>) {
    let n = a.nrows();

    for k in 0..n {
        if piv[k] != k {
            x.swap_rows(k, piv[k]);
        }
    }

    // L·y = Pb
    for i in 1..n {
        for k in 0..i {
            x[i] -= a[(i, k)] * x[k];
        }
    }

    // U·x = y
    for i in (0..n).rev() {
        for k in (i + 1)..n {
            x[i] -= a[(i, k)] * x[k];
        }
        x[i] /= a[(i, i)];
    }
}

/// In-place Cholesky (L·Lᵀ). Overwrites the lower triangle of `m` with L.
pub(crate) fn cholesky_in_place(m: &mut DMatrix<f64>) -> Result<(), Singular> {
    let n = m.nrows();
    for j in 0..n {
        let mut diag = m[(j, j)];
        for k in 0..j {
            diag -= m[(j, k)] * m[(j, k)];
        }
        if !(diag > 0.0) {
            return Err(Singular);
        }
        let ljj = diag.sqrt();
        m[(j, j)] = ljj;

        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= m[(i, k)] * m[(j, k)];
            }
            m[(i, j)] = sum / ljj;
        }
    }
    Ok(())
}

/// Solve L·Lᵀ·x = b with L from [`cholesky_in_place`]. On entry `x` holds b.
pub(crate) fn cholesky_solve_in_place(l: &DMatrix<f64>, x: &mut DVector<f64>) {
    let n = l.nrows();

    for j in 0..n {
        for k in 0..j {
            x[j] -= l[(j, k)] * x[k];
        }
        x[j] /= l[(j, j)];
    }

    for j in (0..n).rev() {
        for k in (j + 1)..n {
            x[j] -= l[(k, j)] * x[k];
        }
        x[j] /= l[(j, j)];
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn random_spd(n: usize, seed: u64) -> DMatrix<f64> {
        let mut state = seed;
        let mut next = || -> f64 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1);
            ((state >> 33) as f64) / f64::from(u32::MAX) - 0.5
        };
        let a = DMatrix::from_fn(n, n, |_, _| next());
        a.transpose() * &a + DMatrix::identity(n, n) * (n as f64)
    }

    #[test]
    fn test_cholesky_matches_nalgebra() {
        for &n in &[1, 2, 5, 12] {
            let m = random_spd(n, 7 + n as u64);
            let rhs = DVector::from_fn(n, |i, _| (i as f64 + 1.0) * 0.3);
            let x_ref = m.clone().cholesky().unwrap().solve(&rhs);

            let mut l = m.clone();
            cholesky_in_place(&mut l).unwrap();
            let mut x = rhs.clone();
            cholesky_solve_in_place(&l, &mut x);

            assert_relative_eq!(x, x_ref, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let mut m = DMatrix::identity(3, 3);
        m[(2, 2)] = -1.0;
        assert_eq!(cholesky_in_place(&mut m), Err(Singular));
    }

    #[test]
    fn test_lu_solves_nonsymmetric() {
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 0.0, 0.0, 3.0, 1.0, 4.0]);
        let b = DVector::from_vec(vec![5.0, 1.0, 11.0]);

        let mut lu = a.clone();
        let mut piv = vec![0; 3];
        lu_factor_in_place(&mut lu, &mut piv).unwrap();
        let mut x = b.clone();
        lu_solve_factored(&lu, &piv, &mut x);

        assert_relative_eq!(&a * x, b, epsilon = 1e-12);
    }

    #[test]
    fn test_lu_reports_singular() {
        let mut a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let mut piv = vec![0; 2];
        assert_eq!(lu_factor_in_place(&mut a, &mut piv), Err(Singular));
    }
}
