//! Properties every solve must satisfy, checked on randomized contact-like
//! problems.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sim_lcp::{LcpConfig, LcpSolver};

/// `J·Jᵀ + δI` for a random Jacobian, the shape of a contact Delassus
/// operator with unit masses.
fn contact_problem(rng: &mut StdRng, n: usize, dofs: usize) -> (DMatrix<f64>, DVector<f64>) {
    let j = DMatrix::from_fn(n, dofs, |_, _| rng.gen_range(-1.0..1.0));
    let m = &j * j.transpose() + DMatrix::identity(n, n) * 0.1;
    let q = DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0));
    (m, q)
}

fn assert_valid(m: &DMatrix<f64>, q: &DVector<f64>, z: &DVector<f64>, tol: f64) {
    let w = m * z + q;
    assert!(z.min() >= -tol, "z = {z}");
    assert!(w.min() >= -tol, "w = {w}");
    assert!(z.dot(&w).abs() < tol * (1.0 + z.amax()), "z·w = {}", z.dot(&w));
}

#[test]
fn test_lemke_returns_valid_pair_or_error() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut solver = LcpSolver::default();
    for n in 1..=12 {
        let (m, q) = contact_problem(&mut rng, n, 6);
        match solver.lcp_lemke(&m, &q, None) {
            Ok(sol) => assert_valid(&m, &q, &sol.z, 1e-8),
            Err(e) => assert!(e.is_pivoting_failure(), "unexpected error {e}"),
        }
    }
}

#[test]
fn test_regularized_solve_handles_rank_deficient_operators() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut solver = LcpSolver::default();
    for n in [4, 8, 12] {
        // More constraints than DOFs: J·Jᵀ is singular. Build q from a known
        // complementary pair so the problem is ill-conditioned, not infeasible.
        let j = DMatrix::from_fn(n, 3, |_, _| rng.gen_range(-1.0..1.0));
        let m = &j * j.transpose();
        let mut z_star = DVector::zeros(n);
        let mut w_star = DVector::zeros(n);
        for i in 0..n {
            if i % 3 == 0 {
                z_star[i] = rng.gen_range(0.1..1.0);
            } else {
                w_star[i] = rng.gen_range(0.1..1.0);
            }
        }
        let q = &w_star - &m * &z_star;

        let sol = solver.lcp_lemke_regularized(&m, &q, None).unwrap();
        let effective = match sol.regularization {
            Some(lambda) => &m + DMatrix::identity(n, n) * lambda,
            None => m.clone(),
        };
        assert_valid(&effective, &q, &sol.z, 1e-6);
    }
}

#[test]
fn test_nonnegative_q_gives_zero_without_iterating() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut solver = LcpSolver::default();
    let (m, q) = contact_problem(&mut rng, 5, 4);
    let q = q.abs();

    let sol = solver.lcp_lemke(&m, &q, None).unwrap();
    assert_eq!(sol.iterations, 0);
    assert_eq!(sol.z, DVector::zeros(5));
    assert_eq!(sol.w, q);
}

#[test]
fn test_reused_workspace_matches_fresh_solver() {
    let mut rng = StdRng::seed_from_u64(42);
    let (m1, q1) = contact_problem(&mut rng, 9, 6);
    let (m2, q2) = contact_problem(&mut rng, 4, 6);

    let mut reused = LcpSolver::default();
    let _ = reused.lcp_lemke(&m1, &q1, None);
    let second = reused.lcp_lemke(&m2, &q2, None);

    let mut fresh = LcpSolver::default();
    let expected = fresh.lcp_lemke(&m2, &q2, None);

    assert_eq!(second, expected);
}

#[test]
fn test_sparse_and_dense_solutions_agree() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut solver = LcpSolver::default();
    for n in [2, 5, 10] {
        let (m, q) = contact_problem(&mut rng, n, n + 2);
        let dense = solver.lcp_lemke(&m, &q, None).unwrap();
        let sparse = solver
            .lcp_lemke_sparse(&CscMatrix::from(&m), &q, None)
            .unwrap();
        assert_relative_eq!(dense.z, sparse.z, epsilon = 1e-7);
    }
}

#[test]
fn test_fast_path_agrees_with_lemke_on_positive_definite_problems() {
    let mut rng = StdRng::seed_from_u64(19);
    let mut solver = LcpSolver::default();
    for n in [3, 6, 9] {
        // Fewer constraints than DOFs plus a diagonal shift keeps M PD.
        let (m, q) = contact_problem(&mut rng, n, n + 3);
        let fast = solver.lcp_fast(&m, &q).unwrap();
        let lemke = solver.lcp_lemke(&m, &q, None).unwrap();
        assert_relative_eq!(fast.z, lemke.z, epsilon = 1e-8);
    }
}

#[test]
fn test_fast_path_never_accepts_invalid_pair_for_non_symmetric_matrix() {
    let mut rng = StdRng::seed_from_u64(29);
    let mut solver = LcpSolver::default();
    for _ in 0..200 {
        let n = rng.gen_range(2..7);
        let (sym, q) = contact_problem(&mut rng, n, n + 2);
        // A skew part keeps M positive definite but not symmetric, like the
        // friction rows of an impact problem.
        let k = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-0.5..0.5));
        let m = sym + &k - k.transpose();

        if let Ok(fast) = solver.lcp_fast(&m, &q) {
            assert_valid(&m, &q, &fast.z, 1e-8);
        }
        match solver.lcp_lemke(&m, &q, None) {
            Ok(sol) => assert_valid(&m, &q, &sol.z, 1e-8),
            Err(e) => assert!(e.is_pivoting_failure(), "unexpected error {e}"),
        }
    }
}

#[test]
fn test_warm_start_from_solution_takes_no_pivots() {
    let mut rng = StdRng::seed_from_u64(23);
    let mut solver = LcpSolver::new(LcpConfig::default());
    let (m, q) = contact_problem(&mut rng, 6, 8);

    let cold = solver.lcp_lemke(&m, &q, None).unwrap();
    let warm = solver.lcp_lemke(&m, &q, Some(&cold.z)).unwrap();

    assert_eq!(warm.iterations, 0);
    assert_relative_eq!(warm.z, cold.z, epsilon = 1e-9);
}
