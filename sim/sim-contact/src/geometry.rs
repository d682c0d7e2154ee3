//! Collision geometries attached to bodies, and their bounds.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, GeomId, Pose};

use crate::params::ContactParams;
use crate::primitive::Primitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
///
/// Bounds may be infinite (planes); overlap tests still behave.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// The box covering all of space.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            min: Point3::from(Vector3::repeat(f64::NEG_INFINITY)),
            max: Point3::from(Vector3::repeat(f64::INFINITY)),
        }
    }

    /// Smallest box containing every point. `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: Point3::from(acc.min.coords.inf(&p.coords)),
            max: Point3::from(acc.max.coords.sup(&p.coords)),
        }))
    }

    /// Check if this AABB overlaps with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Whether every bound is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.coords.iter().chain(self.max.coords.iter()).all(|v| v.is_finite())
    }

    /// Bounds of this box after mapping its corners through `pose`.
    ///
    /// Unbounded boxes become [`Aabb::everything`].
    #[must_use]
    pub fn transformed(&self, pose: &Pose) -> Self {
        if !self.is_finite() {
            return Self::everything();
        }
        let corners: Vec<Point3<f64>> = (0..8)
            .map(|k| {
                Point3::new(
                    if k & 1 == 0 { self.min.x } else { self.max.x },
                    if k & 2 == 0 { self.min.y } else { self.max.y },
                    if k & 4 == 0 { self.min.z } else { self.max.z },
                )
            })
            .map(|c| pose.transform_point(&c))
            .collect();
        Self::from_points(&corners).unwrap_or(*self)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// A primitive owned by one body, placed relative to the body frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionGeometry {
    /// Handle of this geometry.
    pub id: GeomId,
    /// Owning body.
    pub body: BodyId,
    /// Shape.
    pub primitive: Primitive,
    /// Pose of the primitive frame in the body frame.
    pub relative_pose: Pose,
    /// Surface parameters used for friction and penalty contact.
    pub material: ContactParams,
}

impl CollisionGeometry {
    /// Geometry at the body origin with default surface parameters.
    #[must_use]
    pub fn new(id: GeomId, body: BodyId, primitive: Primitive) -> Self {
        Self {
            id,
            body,
            primitive,
            relative_pose: Pose::identity(),
            material: ContactParams::default(),
        }
    }

    /// Offset the primitive within the body frame.
    #[must_use]
    pub fn with_relative_pose(mut self, pose: Pose) -> Self {
        self.relative_pose = pose;
        self
    }

    /// Set the surface parameters.
    #[must_use]
    pub fn with_material(mut self, material: ContactParams) -> Self {
        self.material = material;
        self
    }

    /// World pose of the primitive frame given the owning body's pose.
    #[must_use]
    pub fn world_pose(&self, body_pose: &Pose) -> Pose {
        body_pose.compose(&self.relative_pose)
    }

    /// World bounds given the owning body's pose.
    #[must_use]
    pub fn world_aabb(&self, body_pose: &Pose) -> Aabb {
        self.primitive
            .local_aabb()
            .transformed(&self.world_pose(body_pose))
    }

    /// Surface samples in world coordinates.
    #[must_use]
    pub fn world_vertices(&self, body_pose: &Pose) -> Vec<Point3<f64>> {
        let pose = self.world_pose(body_pose);
        self.primitive
            .vertices()
            .iter()
            .map(|v| pose.transform_point(v))
            .collect()
    }

    /// Signed distance and outward world normal at a world point.
    #[must_use]
    pub fn distance_and_normal(&self, body_pose: &Pose, p: &Point3<f64>) -> (f64, Vector3<f64>) {
        let pose = self.world_pose(body_pose);
        let local = pose.inverse_transform_point(p);
        let (d, n) = self.primitive.distance_and_normal(&local);
        (d, pose.transform_vector(&n))
    }

    /// Radius about the body origin enclosing the geometry.
    #[must_use]
    pub fn radius_about_body_origin(&self) -> f64 {
        self.relative_pose.position.coords.norm() + self.primitive.bounding_radius()
    }
}
