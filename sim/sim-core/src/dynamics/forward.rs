//! Forward dynamics: accelerations from the current state and forces.
//!
//! Free rigid bodies use the Newton-Euler equations in the body frame.
//! Articulated bodies build the generalized mass matrix `H` column by
//! column from the inverse-dynamics recursion (composite-rigid-body style)
//! and solve `H·q̈ = τ − C` by Cholesky.

use hashbrown::HashMap;
use nalgebra::{DMatrix, DVector};
use sim_types::{ArticulatedId, BodyId, Result, SimError, SuperBodyId};
use tracing::trace;

use crate::dynamics::rne::{Terms, TreeTerms};
use crate::dynamics::spatial::spatial_cross_force;
use crate::world::World;

/// Compute and store accelerations of every super body.
///
/// Link accelerations, joint `q̈` and free-body accelerations are written
/// back to the world; articulated bodies are marked as having valid
/// accelerations until their state next changes.
///
/// # Errors
///
/// Returns [`SimError::SingularInertia`] if a mass matrix cannot be
/// factored.
pub fn calc_fwd_dyn(world: &mut World) -> Result<()> {
    for sb in world.super_bodies() {
        match sb {
            SuperBodyId::Rigid(body) => rigid_forward(world, body)?,
            SuperBodyId::Articulated(ab) => articulated_forward(world, ab)?,
        }
    }
    Ok(())
}

/// Generalized inertia `M` of a super body in the Spatial convention.
///
/// # Errors
///
/// Returns an error for an unknown or static super body.
pub fn generalized_inertia(world: &World, sb: SuperBodyId) -> Result<DMatrix<f64>> {
    match sb {
        SuperBodyId::Rigid(id) => {
            let body = world.body(id)?;
            if body.articulated().is_some() {
                return Err(SimError::topology(format!("{id} is a link, not a free body")));
            }
            let m = body.free_generalized_inertia();
            Ok(DMatrix::from_column_slice(6, 6, m.as_slice()))
        }
        SuperBodyId::Articulated(ab) => {
            let tree = TreeTerms::gather(world, ab, &HashMap::new())?;
            Ok(mass_matrix(&tree))
        }
    }
}

fn mass_matrix(tree: &TreeTerms) -> DMatrix<f64> {
    let n = tree.num_gv;
    let mut h = DMatrix::zeros(n, n);
    let mut unit = DVector::zeros(n);
    for j in 0..n {
        unit[j] = 1.0;
        h.set_column(j, &tree.generalized_forces(&unit, Terms::InertialOnly));
        unit[j] = 0.0;
    }
    // Exact in theory; roundoff leaves a tiny asymmetry.
    (&h + h.transpose()) * 0.5
}

fn rigid_forward(world: &mut World, id: BodyId) -> Result<()> {
    let body = world.body(id)?;
    let inertia = body.spatial_inertia();
    let v = body.spatial_velocity();
    let rhs = body.external_spatial_force() - spatial_cross_force(&v, &(inertia * v));
    let acceleration = inertia
        .cholesky()
        .ok_or_else(|| SimError::singular_inertia(format!("{id} spatial inertia")))?
        .solve(&rhs);
    world.body_slot(id).acceleration = acceleration;
    Ok(())
}

fn articulated_forward(world: &mut World, ab: ArticulatedId) -> Result<()> {
    let tree = TreeTerms::gather(world, ab, &HashMap::new())?;
    let articulated = world.articulated_body(ab)?;
    let links = articulated.links().to_vec();
    let joints = articulated.joints().to_vec();

    let n = tree.num_gv;
    let qdd = if n == 0 {
        DVector::zeros(0)
    } else {
        let mut tau = DVector::zeros(n);
        for (k, &joint) in joints.iter().enumerate() {
            let force = world.joint(joint)?.applied_force();
            tau.rows_mut(tree.offsets[k + 1], force.len()).copy_from(force);
        }
        let bias = tree.generalized_forces(&DVector::zeros(n), Terms::Full);
        mass_matrix(&tree)
            .cholesky()
            .ok_or_else(|| SimError::singular_inertia(format!("{ab} mass matrix")))?
            .solve(&(tau - bias))
    };

    let acc = tree.accelerations(&qdd, Terms::Full);
    for (k, &link) in links.iter().enumerate() {
        world.body_slot(link).acceleration = tree.to_frame[k].inverse().apply_motion(&acc[k]);
    }
    for (k, &joint) in joints.iter().enumerate() {
        let dof = tree.axes[k + 1].len();
        world.joint_slot(joint).qdd = qdd.rows(tree.offsets[k + 1], dof).into_owned();
    }
    world.articulated_body_mut(ab)?.accelerations_valid = true;
    trace!(articulated = %ab, dof = n, "forward dynamics");
    Ok(())
}
