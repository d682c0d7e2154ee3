//! Spatial algebra for 6D motion and force vectors.
//!
//! Featherstone's convention: motion vectors are `[ω; v]` and force vectors
//! are `[n; f]`, both referred to the origin of the frame they are expressed
//! in. Everything here is pure math with no world state.

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};
use sim_types::{MassProperties, Pose};

/// 6D spatial vector: `[angular (3), linear (3)]`.
pub type SpatialVector = Vector6<f64>;

/// Angular part of a spatial vector.
#[inline]
#[must_use]
pub fn angular(s: &SpatialVector) -> Vector3<f64> {
    Vector3::new(s[0], s[1], s[2])
}

/// Linear part of a spatial vector.
#[inline]
#[must_use]
pub fn linear(s: &SpatialVector) -> Vector3<f64> {
    Vector3::new(s[3], s[4], s[5])
}

/// Spatial vector from its angular and linear parts.
#[inline]
#[must_use]
pub fn spatial(angular: &Vector3<f64>, linear: &Vector3<f64>) -> SpatialVector {
    SpatialVector::new(
        angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
    )
}

/// Skew-symmetric matrix with `skew(a)·b = a × b`.
#[inline]
#[must_use]
pub fn skew(a: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -a.z, a.y, a.z, 0.0, -a.x, -a.y, a.x, 0.0)
}

/// Spatial cross product for motion vectors: `v × m`.
#[inline]
#[must_use]
pub fn spatial_cross_motion(v: &SpatialVector, m: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let v_lin = linear(v);
    let m_ang = angular(m);
    let m_lin = linear(m);

    spatial(&w.cross(&m_ang), &(w.cross(&m_lin) + v_lin.cross(&m_ang)))
}

/// Spatial cross product for force vectors: `v ×* f`.
#[inline]
#[must_use]
pub fn spatial_cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let v_lin = linear(v);
    let f_ang = angular(f);
    let f_lin = linear(f);

    spatial(&(w.cross(&f_ang) + v_lin.cross(&f_lin)), &w.cross(&f_lin))
}

/// Spatial inertia of a link about its own origin, in link coordinates.
///
/// ```text
/// I = [I_c + m·(|c|²·1 − c⊗c),  m·[c]×]
///     [m·[c]×ᵀ,                 m·1   ]
/// ```
#[must_use]
pub fn spatial_inertia(props: &MassProperties) -> Matrix6<f64> {
    let m = props.mass;
    let c = props.center_of_mass;
    let c_x = skew(&c);

    let mut inertia = Matrix6::zeros();
    inertia
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(props.inertia + (c_x * c_x.transpose()) * m));
    inertia
        .fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(c_x * m));
    inertia
        .fixed_view_mut::<3, 3>(3, 0)
        .copy_from(&(c_x.transpose() * m));
    inertia
        .fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(Matrix3::identity() * m));
    inertia
}

/// Plücker transform between two frames.
///
/// Maps motion vectors expressed in a source frame A to a target frame B.
/// `rotation` takes A coordinates to B coordinates and `translation` is the
/// position of B's origin in A coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialTransform {
    /// Rotation from source to target coordinates.
    pub rotation: Matrix3<f64>,
    /// Target origin in source coordinates.
    pub translation: Vector3<f64>,
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpatialTransform {
    /// Transform between coincident frames.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Transform from world coordinates to the frame placed at `pose`.
    #[must_use]
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            rotation: pose.rotation_matrix().transpose(),
            translation: pose.position.coords,
        }
    }

    /// Transform from the frame at `from` to the frame at `to`.
    #[must_use]
    pub fn between(from: &Pose, to: &Pose) -> Self {
        let r_from = from.rotation_matrix();
        let r_to = to.rotation_matrix();
        Self {
            rotation: r_to.transpose() * r_from,
            translation: r_from.transpose() * (to.position - from.position),
        }
    }

    /// `X·m` for a motion vector.
    #[must_use]
    pub fn apply_motion(&self, m: &SpatialVector) -> SpatialVector {
        let w = angular(m);
        let v = linear(m);
        spatial(
            &(self.rotation * w),
            &(self.rotation * (v - self.translation.cross(&w))),
        )
    }

    /// `X*·f` for a force vector.
    #[must_use]
    pub fn apply_force(&self, f: &SpatialVector) -> SpatialVector {
        let n = angular(f);
        let force = linear(f);
        spatial(
            &(self.rotation * (n - self.translation.cross(&force))),
            &(self.rotation * force),
        )
    }

    /// `Xᵀ·f`: carries a force from the target frame back to the source.
    #[must_use]
    pub fn apply_transpose_force(&self, f: &SpatialVector) -> SpatialVector {
        self.inverse().apply_force(f)
    }

    /// Transform from the target frame back to the source frame.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            rotation: self.rotation.transpose(),
            translation: -(self.rotation * self.translation),
        }
    }

    /// `next ∘ self`: source of `self` to target of `next`.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        Self {
            rotation: next.rotation * self.rotation,
            translation: self.translation + self.rotation.transpose() * next.translation,
        }
    }

    /// 6×6 motion-transform matrix `[[E, 0], [−E·[r]×, E]]`.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix6<f64> {
        let mut x = Matrix6::zeros();
        x.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        x.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.rotation);
        x.fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&(-self.rotation * skew(&self.translation)));
        x
    }

    /// Spatial inertia re-expressed in the target frame: `X*·I·X⁻¹`.
    #[must_use]
    pub fn transform_inertia(&self, inertia: &Matrix6<f64>) -> Matrix6<f64> {
        let back = self.inverse().to_matrix();
        back.transpose() * inertia * back
    }
}
