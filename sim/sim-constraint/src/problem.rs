//! Per-island assembly of constraint Jacobians and Delassus blocks.
//!
//! Rows are stacked in the order `[Cn; Cs; Ct; L]`:
//!
//! - `Cn` - contact normal rows, `Cn·v` is the separating speed
//! - `Cs`, `Ct` - the two contact tangent directions
//! - `L` - joint-limit rows, `L·v` is the DOF rate away from the bound
//!
//! Columns are the island's generalized velocities, super body by super
//! body in island order. The generalized inertia is block diagonal over
//! super bodies, so `M⁻¹` is applied one block at a time.

use std::ops::Range;

use nalgebra::{DMatrix, DVector, RowDVector, Vector3};
use sim_types::{Result, SimError, SuperBodyId};

use crate::{
    ConstraintDynamics, ContactConstraint, Island, LimitConstraint, UnilateralConstraint,
};

/// What the right-hand-side vectors measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RhsKind {
    /// Position-level violation: `Cn_v` = distance minus `target`,
    /// `L_v` = limit slack, tangential vectors zero.
    Violation {
        /// Push-out distance contacts should reach.
        target: f64,
    },
    /// Velocity level: each vector is its Jacobian times the current
    /// generalized velocity.
    Velocity,
}

/// Assembled data of one island's constraint problem.
#[derive(Debug, Clone)]
pub struct UnilateralConstraintProblemData {
    /// Super bodies, in column order.
    pub super_bodies: Vec<SuperBodyId>,
    /// First generalized-velocity column of each super body.
    pub gv_offsets: Vec<usize>,
    /// Total generalized velocities.
    pub num_gv: usize,

    /// Contacts, in row order.
    pub contacts: Vec<ContactConstraint>,
    /// Limits, in row order.
    pub limits: Vec<LimitConstraint>,
    /// Friction coefficient per contact.
    pub mu: DVector<f64>,

    /// Contact normal Jacobian.
    pub cn: DMatrix<f64>,
    /// First tangent Jacobian.
    pub cs: DMatrix<f64>,
    /// Second tangent Jacobian.
    pub ct: DMatrix<f64>,
    /// Joint-limit Jacobian.
    pub l: DMatrix<f64>,

    /// `M⁻¹·Cnᵀ`.
    pub im_cn_t: DMatrix<f64>,
    /// `M⁻¹·Csᵀ`.
    pub im_cs_t: DMatrix<f64>,
    /// `M⁻¹·Ctᵀ`.
    pub im_ct_t: DMatrix<f64>,
    /// `M⁻¹·Lᵀ`.
    pub im_l_t: DMatrix<f64>,

    /// `Cn·M⁻¹·Cnᵀ`.
    pub cn_im_cn_t: DMatrix<f64>,
    /// `Cn·M⁻¹·Csᵀ`.
    pub cn_im_cs_t: DMatrix<f64>,
    /// `Cn·M⁻¹·Ctᵀ`.
    pub cn_im_ct_t: DMatrix<f64>,
    /// `Cn·M⁻¹·Lᵀ`.
    pub cn_im_l_t: DMatrix<f64>,
    /// `Cs·M⁻¹·Csᵀ`.
    pub cs_im_cs_t: DMatrix<f64>,
    /// `Cs·M⁻¹·Ctᵀ`.
    pub cs_im_ct_t: DMatrix<f64>,
    /// `Cs·M⁻¹·Lᵀ`.
    pub cs_im_l_t: DMatrix<f64>,
    /// `Ct·M⁻¹·Ctᵀ`.
    pub ct_im_ct_t: DMatrix<f64>,
    /// `Ct·M⁻¹·Lᵀ`.
    pub ct_im_l_t: DMatrix<f64>,
    /// `L·M⁻¹·Lᵀ`.
    pub l_im_l_t: DMatrix<f64>,

    /// Normal right-hand side.
    pub cn_v: DVector<f64>,
    /// First tangent right-hand side.
    pub cs_v: DVector<f64>,
    /// Second tangent right-hand side.
    pub ct_v: DVector<f64>,
    /// Limit right-hand side.
    pub l_v: DVector<f64>,

    /// Full `A·M⁻¹·Aᵀ` with `A = [Cn; Cs; Ct; L]`.
    delassus: DMatrix<f64>,
}

impl UnilateralConstraintProblemData {
    /// Assemble the problem of one island.
    ///
    /// # Errors
    ///
    /// Propagates Jacobian and inertia-solve failures from `dynamics`, and
    /// returns a topology error if a limit names a DOF outside the island.
    pub fn compute<D: ConstraintDynamics + ?Sized>(
        island: &Island,
        constraints: &[UnilateralConstraint],
        dynamics: &D,
        rhs: RhsKind,
    ) -> Result<Self> {
        let super_bodies = island.super_bodies.clone();
        let mut gv_offsets = Vec::with_capacity(super_bodies.len());
        let mut num_gv = 0;
        for sb in &super_bodies {
            gv_offsets.push(num_gv);
            num_gv += dynamics.num_generalized_velocities(*sb);
        }

        let mut contacts = Vec::new();
        let mut limits = Vec::new();
        for &i in &island.constraints {
            match constraints.get(i) {
                Some(UnilateralConstraint::Contact(c)) => contacts.push(*c),
                Some(UnilateralConstraint::Limit(l)) => limits.push(*l),
                None => {
                    return Err(SimError::topology(format!(
                        "island references constraint {i} of {}",
                        constraints.len()
                    )))
                }
            }
        }
        let nc = contacts.len();
        let nl = limits.len();

        let column = |sb: SuperBodyId| -> Option<usize> {
            super_bodies
                .binary_search(&sb)
                .ok()
                .map(|k| gv_offsets[k])
        };

        let mut cn = DMatrix::zeros(nc, num_gv);
        let mut cs = DMatrix::zeros(nc, num_gv);
        let mut ct = DMatrix::zeros(nc, num_gv);
        for (row, c) in contacts.iter().enumerate() {
            let n = c.contact.normal;
            let (t1, t2) = c.contact.tangent_frame();
            for (body, sign) in [(c.body_a, 1.0), (c.body_b, -1.0)] {
                let Some(sb) = dynamics.super_body(body) else {
                    continue;
                };
                let Some(col) = column(sb) else {
                    return Err(SimError::topology(format!(
                        "contact body {body} is outside its island"
                    )));
                };
                let jac = dynamics.point_jacobian(body, &c.contact.point)?;
                add_direction_row(&mut cn, row, col, &jac, &(n * sign));
                add_direction_row(&mut cs, row, col, &jac, &(t1 * sign));
                add_direction_row(&mut ct, row, col, &jac, &(t2 * sign));
            }
        }

        let mut l = DMatrix::zeros(nl, num_gv);
        for (row, lim) in limits.iter().enumerate() {
            let col = dynamics
                .joint_dof(lim.joint, lim.dof)
                .and_then(|(sb, idx)| column(sb).map(|c| c + idx))
                .ok_or_else(|| {
                    SimError::topology(format!(
                        "limit on {} DOF {} is outside its island",
                        lim.joint, lim.dof
                    ))
                })?;
            l[(row, col)] = lim.side.separating_sign();
        }

        // A = [Cn; Cs; Ct; L] and M⁻¹·Aᵀ, one super body block at a time.
        let m = 3 * nc + nl;
        let mut a = DMatrix::zeros(m, num_gv);
        a.rows_mut(0, nc).copy_from(&cn);
        a.rows_mut(nc, nc).copy_from(&cs);
        a.rows_mut(2 * nc, nc).copy_from(&ct);
        a.rows_mut(3 * nc, nl).copy_from(&l);
        let a_t = a.transpose();

        let mut im_a_t = DMatrix::zeros(num_gv, m);
        for (k, sb) in super_bodies.iter().enumerate() {
            let range = block_range(&gv_offsets, num_gv, k);
            if range.is_empty() || m == 0 {
                continue;
            }
            let rhs_block = a_t.rows(range.start, range.len()).into_owned();
            let solved = dynamics.solve_generalized_inertia(*sb, &rhs_block)?;
            if solved.shape() != rhs_block.shape() {
                return Err(SimError::singular_inertia(format!(
                    "inertia solve for {sb} returned {:?}, expected {:?}",
                    solved.shape(),
                    rhs_block.shape()
                )));
            }
            im_a_t.rows_mut(range.start, range.len()).copy_from(&solved);
        }
        let delassus = &a * &im_a_t;

        let block = |r0: usize, nr: usize, c0: usize, ncol: usize| -> DMatrix<f64> {
            delassus.view((r0, c0), (nr, ncol)).into_owned()
        };
        let (n0, s0, t0, l0) = (0, nc, 2 * nc, 3 * nc);

        let (cn_v, cs_v, ct_v, l_v) = match rhs {
            RhsKind::Violation { target } => (
                DVector::from_iterator(nc, contacts.iter().map(|c| c.contact.distance - target)),
                DVector::zeros(nc),
                DVector::zeros(nc),
                DVector::from_iterator(nl, limits.iter().map(|l| l.slack)),
            ),
            RhsKind::Velocity => {
                let mut v = DVector::zeros(num_gv);
                for (k, sb) in super_bodies.iter().enumerate() {
                    let range = block_range(&gv_offsets, num_gv, k);
                    let vk = dynamics.generalized_velocity(*sb);
                    if vk.len() != range.len() {
                        return Err(SimError::topology(format!(
                            "{sb} reports {} velocities, expected {}",
                            vk.len(),
                            range.len()
                        )));
                    }
                    v.rows_mut(range.start, range.len()).copy_from(&vk);
                }
                (&cn * &v, &cs * &v, &ct * &v, &l * &v)
            }
        };

        Ok(Self {
            mu: DVector::from_iterator(nc, contacts.iter().map(|c| c.friction.max(0.0))),
            im_cn_t: im_a_t.columns(n0, nc).into_owned(),
            im_cs_t: im_a_t.columns(s0, nc).into_owned(),
            im_ct_t: im_a_t.columns(t0, nc).into_owned(),
            im_l_t: im_a_t.columns(l0, nl).into_owned(),
            cn_im_cn_t: block(n0, nc, n0, nc),
            cn_im_cs_t: block(n0, nc, s0, nc),
            cn_im_ct_t: block(n0, nc, t0, nc),
            cn_im_l_t: block(n0, nc, l0, nl),
            cs_im_cs_t: block(s0, nc, s0, nc),
            cs_im_ct_t: block(s0, nc, t0, nc),
            cs_im_l_t: block(s0, nc, l0, nl),
            ct_im_ct_t: block(t0, nc, t0, nc),
            ct_im_l_t: block(t0, nc, l0, nl),
            l_im_l_t: block(l0, nl, l0, nl),
            super_bodies,
            gv_offsets,
            num_gv,
            contacts,
            limits,
            cn,
            cs,
            ct,
            l,
            cn_v,
            cs_v,
            ct_v,
            l_v,
            delassus,
        })
    }

    /// Number of contacts.
    #[must_use]
    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Number of limits.
    #[must_use]
    pub fn num_limits(&self) -> usize {
        self.limits.len()
    }

    /// The full Delassus matrix over `[Cn; Cs; Ct; L]`.
    #[must_use]
    pub fn delassus(&self) -> &DMatrix<f64> {
        &self.delassus
    }

    /// Columns of each super body.
    pub fn super_body_ranges(&self) -> impl Iterator<Item = (SuperBodyId, Range<usize>)> + '_ {
        self.super_bodies
            .iter()
            .enumerate()
            .map(|(k, sb)| (*sb, block_range(&self.gv_offsets, self.num_gv, k)))
    }

    /// Split an island-stacked vector into per-super-body pieces.
    #[must_use]
    pub fn split(&self, stacked: &DVector<f64>) -> Vec<(SuperBodyId, DVector<f64>)> {
        self.super_body_ranges()
            .map(|(sb, r)| (sb, stacked.rows(r.start, r.len()).into_owned()))
            .collect()
    }
}

fn block_range(offsets: &[usize], total: usize, k: usize) -> Range<usize> {
    let start = offsets[k];
    let end = offsets.get(k + 1).copied().unwrap_or(total);
    start..end
}

/// `row[col..] += dirᵀ·J`.
fn add_direction_row(
    target: &mut DMatrix<f64>,
    row: usize,
    col: usize,
    jac: &DMatrix<f64>,
    dir: &Vector3<f64>,
) {
    let projected: RowDVector<f64> = dir.transpose() * jac;
    for (j, value) in projected.iter().enumerate() {
        target[(row, col + j)] += value;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::testing::PointMasses;
    use crate::{ConstraintIslands, LimitSide};
    use approx::assert_relative_eq;
    use sim_types::{BodyId, JointId};

    #[test]
    fn test_ball_on_ground_blocks() {
        let world = PointMasses::new(&[2.0]).with_static(BodyId::new(1));
        let constraints = vec![PointMasses::contact(0, 1, -0.01)];
        let islands = ConstraintIslands::build(&constraints, &world);
        let pd = UnilateralConstraintProblemData::compute(
            &islands.islands()[0],
            &constraints,
            &world,
            RhsKind::Violation { target: 0.002 },
        )
        .unwrap();

        assert_eq!(pd.num_gv, 3);
        assert_eq!(pd.cn, DMatrix::from_row_slice(1, 3, &[0.0, 0.0, 1.0]));
        assert_relative_eq!(pd.cn_im_cn_t[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(pd.cn_v[0], -0.012, epsilon = 1e-12);
        // Tangents are orthogonal to the normal.
        assert_relative_eq!(pd.cn_im_cs_t[(0, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(pd.cs_im_cs_t[(0, 0)], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_two_body_contact_couples_both() {
        let world = PointMasses::new(&[1.0, 3.0])
            .with_velocity(0, Vector3::new(0.0, 0.0, -1.0))
            .with_velocity(1, Vector3::new(0.0, 0.0, 0.5));
        let constraints = vec![PointMasses::contact(0, 1, 0.0)];
        let islands = ConstraintIslands::build(&constraints, &world);
        let pd = UnilateralConstraintProblemData::compute(
            &islands.islands()[0],
            &constraints,
            &world,
            RhsKind::Velocity,
        )
        .unwrap();

        assert_eq!(pd.num_gv, 6);
        assert_eq!(pd.gv_offsets, vec![0, 3]);
        // Effective inverse mass 1/1 + 1/3.
        assert_relative_eq!(pd.cn_im_cn_t[(0, 0)], 1.0 + 1.0 / 3.0, epsilon = 1e-12);
        // Approaching at 1.5.
        assert_relative_eq!(pd.cn_v[0], -1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_limit_rows_point_away_from_bound() {
        let world = PointMasses::new(&[1.0]).with_velocity(0, Vector3::new(0.0, 0.0, 0.3));
        let constraints = vec![UnilateralConstraint::Limit(LimitConstraint {
            joint: JointId::new(0),
            dof: 0,
            side: LimitSide::Upper,
            slack: -0.004,
        })];
        let islands = ConstraintIslands::build(&constraints, &world);
        let island = &islands.islands()[0];

        let vel =
            UnilateralConstraintProblemData::compute(island, &constraints, &world, RhsKind::Velocity)
                .unwrap();
        assert_eq!(vel.l[(0, 2)], -1.0);
        assert_relative_eq!(vel.l_v[0], -0.3, epsilon = 1e-12);
        assert_relative_eq!(vel.l_im_l_t[(0, 0)], 1.0, epsilon = 1e-12);

        let pos = UnilateralConstraintProblemData::compute(
            island,
            &constraints,
            &world,
            RhsKind::Violation { target: 0.0 },
        )
        .unwrap();
        assert_relative_eq!(pos.l_v[0], -0.004, epsilon = 1e-12);
    }

    #[test]
    fn test_split_follows_offsets() {
        let world = PointMasses::new(&[1.0, 1.0]);
        let constraints = vec![PointMasses::contact(0, 1, 0.0)];
        let islands = ConstraintIslands::build(&constraints, &world);
        let pd = UnilateralConstraintProblemData::compute(
            &islands.islands()[0],
            &constraints,
            &world,
            RhsKind::Velocity,
        )
        .unwrap();

        let parts = pd.split(&DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].1.as_slice(), &[4.0, 5.0, 6.0]);
    }
}
