//! Primitive shapes and their local-frame queries.
//!
//! Every primitive answers the same questions in its own frame: signed
//! distance, outward normal, surface samples, bounding radius and bounds. The
//! contact generator and the distance queries are written against these.

use nalgebra::{Point3, Vector3};
use sim_types::NEAR_ZERO;

use crate::geometry::Aabb;
use crate::heightmap::HeightmapData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Collision primitive, expressed in its own frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Primitive {
    /// Sphere centered at the origin.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Box centered at the origin, axis-aligned in its frame.
    Box {
        /// Half side lengths.
        half_extents: Vector3<f64>,
    },
    /// Half-space `z ≤ 0`; the surface is the XY plane, normal `+Z`.
    Plane,
    /// Terrain, solid below the height surface.
    Heightmap(HeightmapData),
}

impl Primitive {
    /// Sphere primitive.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Box primitive from half extents.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sphere { .. } => "sphere",
            Self::Box { .. } => "box",
            Self::Plane => "plane",
            Self::Heightmap(_) => "heightmap",
        }
    }

    /// Whether the shape is a bounded convex solid.
    #[must_use]
    pub fn is_convex(&self) -> bool {
        matches!(self, Self::Sphere { .. } | Self::Box { .. })
    }

    /// Signed distance from a local point to the surface, negative inside.
    ///
    /// The heightmap distance is measured vertically.
    #[must_use]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        match self {
            Self::Sphere { radius } => p.coords.norm() - radius,
            Self::Box { half_extents } => {
                let q = p.coords.abs() - half_extents;
                let outside = q.sup(&Vector3::zeros()).norm();
                let inside = q.max().min(0.0);
                outside + inside
            }
            Self::Plane => p.z,
            Self::Heightmap(hm) => hm.height_above(p),
        }
    }

    /// Outward unit normal of the surface nearest a local point.
    ///
    /// Returns the zero vector where the direction is undefined (the center
    /// of a sphere); callers discard such normals.
    #[must_use]
    pub fn normal(&self, p: &Point3<f64>) -> Vector3<f64> {
        match self {
            Self::Sphere { .. } => {
                let n = p.coords.norm();
                if n < NEAR_ZERO {
                    Vector3::zeros()
                } else {
                    p.coords / n
                }
            }
            Self::Box { half_extents } => box_normal(p, half_extents),
            Self::Plane => Vector3::z(),
            Self::Heightmap(hm) => hm.normal(p.x, p.y),
        }
    }

    /// Signed distance and outward normal together.
    #[must_use]
    pub fn distance_and_normal(&self, p: &Point3<f64>) -> (f64, Vector3<f64>) {
        (self.signed_distance(p), self.normal(p))
    }

    /// Point on the surface closest to `p` (local frame).
    ///
    /// Exact for spheres, planes and points outside a box; the heightmap
    /// projects vertically.
    #[must_use]
    pub fn closest_surface_point(&self, p: &Point3<f64>) -> Point3<f64> {
        match self {
            Self::Box { half_extents } => {
                let clamped = p.coords.sup(&-half_extents).inf(half_extents);
                if clamped != p.coords {
                    return Point3::from(clamped);
                }
                // Inside: push out through the nearest face.
                let n = box_normal(p, half_extents);
                p - n * self.signed_distance(p)
            }
            Self::Heightmap(hm) => Point3::new(p.x, p.y, hm.height_at(p.x, p.y)),
            _ => p - self.normal(p) * self.signed_distance(p),
        }
    }

    /// Furthest point of a convex primitive along `dir` (local frame).
    #[must_use]
    pub fn support(&self, dir: &Vector3<f64>) -> Option<Point3<f64>> {
        match self {
            Self::Sphere { radius } => {
                let n = dir.norm();
                (n >= NEAR_ZERO).then(|| Point3::from(dir * (radius / n)))
            }
            Self::Box { half_extents } => Some(Point3::new(
                half_extents.x.copysign(dir.x),
                half_extents.y.copysign(dir.y),
                half_extents.z.copysign(dir.z),
            )),
            Self::Plane | Self::Heightmap(_) => None,
        }
    }

    /// Surface samples used by the vertex-versus-distance contact tests.
    ///
    /// Boxes give their eight corners, spheres the six axis points and eight
    /// octant diagonals, heightmaps every grid vertex. Planes have none.
    #[must_use]
    pub fn vertices(&self) -> Vec<Point3<f64>> {
        match self {
            Self::Sphere { radius } => {
                let mut out = Vec::with_capacity(14);
                for axis in 0..3 {
                    for sign in [-1.0, 1.0] {
                        let mut v = Vector3::zeros();
                        v[axis] = sign * radius;
                        out.push(Point3::from(v));
                    }
                }
                let d = radius / 3.0_f64.sqrt();
                for &sx in &[-d, d] {
                    for &sy in &[-d, d] {
                        for &sz in &[-d, d] {
                            out.push(Point3::new(sx, sy, sz));
                        }
                    }
                }
                out
            }
            Self::Box { half_extents: h } => {
                let mut out = Vec::with_capacity(8);
                for &sx in &[-h.x, h.x] {
                    for &sy in &[-h.y, h.y] {
                        for &sz in &[-h.z, h.z] {
                            out.push(Point3::new(sx, sy, sz));
                        }
                    }
                }
                out
            }
            Self::Plane => Vec::new(),
            Self::Heightmap(hm) => hm.vertices().collect(),
        }
    }

    /// Radius of a sphere about the local origin enclosing the shape.
    ///
    /// Infinite for planes.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.norm(),
            Self::Plane => f64::INFINITY,
            Self::Heightmap(hm) => {
                let h = hm.min_height().abs().max(hm.max_height().abs());
                Vector3::new(0.5 * hm.width(), 0.5 * hm.depth(), h).norm()
            }
        }
    }

    /// Bounds in the local frame.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Self::Sphere { radius } => {
                Aabb::from_center(Point3::origin(), Vector3::repeat(*radius))
            }
            Self::Box { half_extents } => Aabb::from_center(Point3::origin(), *half_extents),
            Self::Plane => Aabb::new(
                Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                Point3::new(f64::INFINITY, f64::INFINITY, 0.0),
            ),
            Self::Heightmap(hm) => Aabb::new(
                Point3::new(-0.5 * hm.width(), -0.5 * hm.depth(), hm.min_height()),
                Point3::new(0.5 * hm.width(), 0.5 * hm.depth(), hm.max_height()),
            ),
        }
    }
}

/// Outward normal of the box face, edge or corner region containing `p`.
fn box_normal(p: &Point3<f64>, half_extents: &Vector3<f64>) -> Vector3<f64> {
    let q = p.coords.abs() - half_extents;
    if q.max() > 0.0 {
        let outside = Vector3::new(
            q.x.max(0.0).copysign(p.x),
            q.y.max(0.0).copysign(p.y),
            q.z.max(0.0).copysign(p.z),
        );
        let n = outside.norm();
        if n >= NEAR_ZERO {
            return outside / n;
        }
    }
    // Inside (or on the surface): the face with the least penetration.
    let axis = q.imax();
    let mut n = Vector3::zeros();
    n[axis] = if p[axis] < 0.0 { -1.0 } else { 1.0 };
    n
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_queries() {
        let s = Primitive::sphere(2.0);
        let p = Point3::new(0.0, 3.0, 0.0);
        assert_relative_eq!(s.signed_distance(&p), 1.0);
        assert_relative_eq!(s.normal(&p), Vector3::y());
        assert_relative_eq!(s.closest_surface_point(&p), Point3::new(0.0, 2.0, 0.0));
        assert_eq!(s.normal(&Point3::origin()), Vector3::zeros());
        assert_eq!(s.vertices().len(), 14);
        assert!(s
            .vertices()
            .iter()
            .all(|v| (v.coords.norm() - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_box_distance_outside_edge_and_inside() {
        let b = Primitive::cuboid(Vector3::new(1.0, 1.0, 1.0));

        // Face region.
        assert_relative_eq!(b.signed_distance(&Point3::new(3.0, 0.0, 0.0)), 2.0);
        assert_relative_eq!(b.normal(&Point3::new(3.0, 0.0, 0.0)), Vector3::x());

        // Edge region.
        let p = Point3::new(2.0, 2.0, 0.0);
        assert_relative_eq!(b.signed_distance(&p), 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(
            b.normal(&p),
            Vector3::new(1.0, 1.0, 0.0).normalize(),
            epsilon = 1e-12
        );
        assert_relative_eq!(b.closest_surface_point(&p), Point3::new(1.0, 1.0, 0.0));

        // Inside, nearest face is -Z.
        let p = Point3::new(0.1, 0.0, -0.8);
        assert_relative_eq!(b.signed_distance(&p), -0.2, epsilon = 1e-12);
        assert_relative_eq!(b.normal(&p), -Vector3::z());
        assert_relative_eq!(
            b.closest_surface_point(&p),
            Point3::new(0.1, 0.0, -1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_support_points() {
        let b = Primitive::cuboid(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(
            b.support(&Vector3::new(-1.0, 0.5, -0.1)).unwrap(),
            Point3::new(-1.0, 2.0, -3.0)
        );
        let s = Primitive::sphere(0.5);
        assert_relative_eq!(
            s.support(&Vector3::new(0.0, 0.0, -4.0)).unwrap(),
            Point3::new(0.0, 0.0, -0.5)
        );
        assert!(Primitive::Plane.support(&Vector3::z()).is_none());
    }

    #[test]
    fn test_plane_is_unbounded_below() {
        let aabb = Primitive::Plane.local_aabb();
        assert_eq!(aabb.max.z, 0.0);
        assert!(aabb.min.z.is_infinite());
        assert!(Primitive::Plane.bounding_radius().is_infinite());
        assert!(Primitive::Plane.vertices().is_empty());
        assert_relative_eq!(
            Primitive::Plane.signed_distance(&Point3::new(4.0, -2.0, 0.25)),
            0.25
        );
    }

    #[test]
    fn test_heightmap_delegates_to_grid() {
        let hm = HeightmapData::flat(3, 3, 2.0, 2.0, 0.5).unwrap();
        let p = Primitive::Heightmap(hm);
        assert!(!p.is_convex());
        assert_relative_eq!(p.signed_distance(&Point3::new(0.2, 0.1, 1.0)), 0.5);
        assert_eq!(p.vertices().len(), 9);
        let aabb = p.local_aabb();
        assert_relative_eq!(aabb.min, Point3::new(-1.0, -1.0, 0.5));
        assert_relative_eq!(aabb.max, Point3::new(1.0, 1.0, 0.5));
    }
}
