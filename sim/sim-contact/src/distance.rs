//! Signed distance between geometries and conservative time to contact.

use nalgebra::{Point3, Vector3};
use sim_types::{GeomId, Pose, Twist, NEAR_ZERO};

use crate::geometry::CollisionGeometry;
use crate::narrow::Placed;
use crate::primitive::Primitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Closest-feature result for one pair.
///
/// `normal` points from B toward A. `point_a` and `point_b` are the witness
/// points on each surface; when separated,
/// `point_a ≈ point_b + distance * normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairwiseDistance {
    /// Signed distance, negative when interpenetrating.
    pub distance: f64,
    /// Witness point on A (world).
    pub point_a: Point3<f64>,
    /// Witness point on B (world).
    pub point_b: Point3<f64>,
    /// Unit normal from B toward A.
    pub normal: Vector3<f64>,
}

impl PairwiseDistance {
    /// A pair with no finite distance (two planes, say).
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            distance: f64::INFINITY,
            point_a: Point3::origin(),
            point_b: Point3::origin(),
            normal: Vector3::z(),
        }
    }

    /// The same result with A and B exchanged.
    #[must_use]
    pub fn flipped(self) -> Self {
        Self {
            distance: self.distance,
            point_a: self.point_b,
            point_b: self.point_a,
            normal: -self.normal,
        }
    }
}

/// Distance record for a pair of geometries, rebuilt every mini-step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairwiseDistInfo {
    /// First geometry.
    pub geom_a: GeomId,
    /// Second geometry.
    pub geom_b: GeomId,
    /// Signed distance.
    pub distance: f64,
    /// Witness point on A.
    pub point_a: Point3<f64>,
    /// Witness point on B.
    pub point_b: Point3<f64>,
    /// Unit normal from B toward A.
    pub normal: Vector3<f64>,
}

impl PairwiseDistInfo {
    /// Attach geometry handles to a distance result.
    #[must_use]
    pub fn new(geom_a: GeomId, geom_b: GeomId, d: PairwiseDistance) -> Self {
        Self {
            geom_a,
            geom_b,
            distance: d.distance,
            point_a: d.point_a,
            point_b: d.point_b,
            normal: d.normal,
        }
    }

    /// Whether the pair interpenetrates.
    #[must_use]
    pub fn is_penetrating(&self) -> bool {
        self.distance < 0.0
    }
}

/// Motion of the body carrying a geometry, for time-to-contact bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeomMotion {
    /// Body velocity; `twist.linear` is the velocity of `reference`.
    pub twist: Twist,
    /// Point whose velocity `twist.linear` is (the body frame origin).
    pub reference: Point3<f64>,
    /// Radius about `reference` enclosing the geometry.
    pub radius: f64,
}

impl GeomMotion {
    /// Motion of a body.
    #[must_use]
    pub const fn new(twist: Twist, reference: Point3<f64>, radius: f64) -> Self {
        Self {
            twist,
            reference,
            radius,
        }
    }

    /// A geometry that does not move.
    #[must_use]
    pub fn stationary() -> Self {
        Self::new(Twist::zero(), Point3::origin(), 0.0)
    }

    /// Velocity of a world point rigidly attached to the body.
    #[must_use]
    pub fn velocity_at(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.twist.velocity_at_point(&(p - self.reference))
    }
}

/// Signed distance between two geometries placed by their bodies' poses.
///
/// Pairs involving a sphere are exact up to the vertical heightmap
/// approximation. Other pairs take the closest of the surface samples of each
/// geometry measured against the other's signed distance.
#[must_use]
pub fn signed_distance(
    geom_a: &CollisionGeometry,
    pose_a: &Pose,
    geom_b: &CollisionGeometry,
    pose_b: &Pose,
) -> PairwiseDistance {
    let a = Placed::new(geom_a, pose_a);
    let b = Placed::new(geom_b, pose_b);
    match (a.primitive, b.primitive) {
        (Primitive::Sphere { radius: ra }, Primitive::Sphere { radius: rb }) => {
            sphere_sphere(&a.pose.position, *ra, &b.pose.position, *rb)
        }
        (Primitive::Sphere { radius }, _) => sphere_shape(&a.pose.position, *radius, &b),
        (_, Primitive::Sphere { radius }) => sphere_shape(&b.pose.position, *radius, &a).flipped(),
        (Primitive::Plane, Primitive::Plane) => PairwiseDistance::unbounded(),
        _ => sampled(&a, &b),
    }
}

fn sphere_sphere(ca: &Point3<f64>, ra: f64, cb: &Point3<f64>, rb: f64) -> PairwiseDistance {
    let d = ca - cb;
    let len = d.norm();
    let normal = if len < NEAR_ZERO { Vector3::z() } else { d / len };
    PairwiseDistance {
        distance: len - ra - rb,
        point_a: ca - normal * ra,
        point_b: cb + normal * rb,
        normal,
    }
}

/// Sphere is A.
fn sphere_shape(center: &Point3<f64>, radius: f64, other: &Placed<'_>) -> PairwiseDistance {
    let (d, n) = other.distance_and_normal(center);
    let len = n.norm();
    let normal = if len < NEAR_ZERO { Vector3::z() } else { n / len };
    PairwiseDistance {
        distance: d - radius,
        point_a: center - normal * radius,
        point_b: center - normal * d,
        normal,
    }
}

fn sampled(a: &Placed<'_>, b: &Placed<'_>) -> PairwiseDistance {
    let mut best = PairwiseDistance::unbounded();
    for p in a.world_vertices() {
        let (d, n) = b.distance_and_normal(&p);
        if d < best.distance && n.norm() >= NEAR_ZERO {
            let n = n.normalize();
            best = PairwiseDistance {
                distance: d,
                point_a: p,
                point_b: p - n * d,
                normal: n,
            };
        }
    }
    for p in b.world_vertices() {
        let (d, n) = a.distance_and_normal(&p);
        if d < best.distance && n.norm() >= NEAR_ZERO {
            let n = n.normalize();
            best = PairwiseDistance {
                distance: d,
                point_a: p - n * d,
                point_b: p,
                normal: -n,
            };
        }
    }
    best
}

/// Earliest time within `dt` at which the pair could touch, or `+∞`.
///
/// Pairs within `contact_dist_thresh` use the closing speed along the normal
/// at the witness points: `+∞` if separating, `0` if already touching.
/// Farther pairs use the conservative closing-speed bound
/// `n·(v_B − v_A) + |ω_A|·r_A + |ω_B|·r_B`, which accounts for any point of
/// either geometry swinging toward the other.
#[must_use]
pub fn time_to_contact(
    info: &PairwiseDistInfo,
    motion_a: &GeomMotion,
    motion_b: &GeomMotion,
    dt: f64,
    contact_dist_thresh: f64,
) -> f64 {
    let t = if info.distance <= contact_dist_thresh {
        let rel = motion_a.velocity_at(&info.point_a) - motion_b.velocity_at(&info.point_b);
        let approach = -info.normal.dot(&rel);
        if approach <= 0.0 {
            return f64::INFINITY;
        }
        if info.distance <= 0.0 {
            return 0.0;
        }
        info.distance / approach
    } else {
        let rel = motion_a.twist.linear - motion_b.twist.linear;
        let bound = -info.normal.dot(&rel)
            + motion_a.twist.angular.norm() * motion_a.radius
            + motion_b.twist.angular.norm() * motion_b.radius;
        if bound <= 0.0 {
            return f64::INFINITY;
        }
        info.distance / bound
    };

    if t > dt {
        f64::INFINITY
    } else {
        t
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::heightmap::HeightmapData;
    use approx::assert_relative_eq;
    use sim_types::BodyId;

    fn geom(id: u64, primitive: Primitive) -> CollisionGeometry {
        CollisionGeometry::new(GeomId::new(id), BodyId::new(id), primitive)
    }

    fn at(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_position(Point3::new(x, y, z))
    }

    #[test]
    fn test_sphere_pair_distance_and_witnesses() {
        let a = geom(0, Primitive::sphere(1.0));
        let b = geom(1, Primitive::sphere(0.5));
        let d = signed_distance(&a, &at(3.0, 0.0, 0.0), &b, &Pose::identity());
        assert_relative_eq!(d.distance, 1.5, epsilon = 1e-12);
        assert_relative_eq!(d.normal, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(d.point_a, Point3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(d.point_b, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_plane_sphere_in_either_order() {
        let plane = geom(0, Primitive::Plane);
        let ball = geom(1, Primitive::sphere(1.0));
        let d = signed_distance(&ball, &at(0.0, 0.0, 3.0), &plane, &Pose::identity());
        assert_relative_eq!(d.distance, 2.0, epsilon = 1e-12);
        assert_relative_eq!(d.normal, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(d.point_b, Point3::origin(), epsilon = 1e-12);

        let d = signed_distance(&plane, &Pose::identity(), &ball, &at(0.0, 0.0, 0.5));
        assert_relative_eq!(d.distance, -0.5, epsilon = 1e-12);
        assert_relative_eq!(d.normal, -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_box_above_plane_uses_lowest_corner() {
        let plane = geom(0, Primitive::Plane);
        let cube = geom(1, Primitive::cuboid(Vector3::new(0.5, 0.5, 0.5)));
        let d = signed_distance(&cube, &at(0.0, 0.0, 2.0), &plane, &Pose::identity());
        assert_relative_eq!(d.distance, 1.5, epsilon = 1e-12);
        assert_relative_eq!(d.normal, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(d.point_a.z, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_over_terrain() {
        let terrain = geom(
            0,
            Primitive::Heightmap(HeightmapData::flat(5, 5, 4.0, 4.0, 0.25).unwrap()),
        );
        let ball = geom(1, Primitive::sphere(0.5));
        let d = signed_distance(&ball, &at(0.0, 0.0, 1.0), &terrain, &Pose::identity());
        assert_relative_eq!(d.distance, 0.25, epsilon = 1e-12);
        assert_relative_eq!(d.normal, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_two_planes_are_unbounded() {
        let a = geom(0, Primitive::Plane);
        let b = geom(1, Primitive::Plane);
        assert!(signed_distance(&a, &Pose::identity(), &b, &at(0.0, 0.0, 1.0))
            .distance
            .is_infinite());
    }

    fn info(distance: f64) -> PairwiseDistInfo {
        PairwiseDistInfo::new(
            GeomId::new(0),
            GeomId::new(1),
            PairwiseDistance {
                distance,
                point_a: Point3::new(0.0, 0.0, distance),
                point_b: Point3::origin(),
                normal: Vector3::z(),
            },
        )
    }

    fn falling(speed: f64) -> GeomMotion {
        GeomMotion::new(Twist::linear(Vector3::new(0.0, 0.0, -speed)), Point3::origin(), 1.0)
    }

    #[test]
    fn test_closing_pair_reaches_contact_at_gap_over_speed() {
        let t = time_to_contact(&info(0.5), &falling(2.0), &GeomMotion::stationary(), 1.0, 1e-4);
        assert_relative_eq!(t, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_contact_beyond_horizon_is_infinite() {
        let t = time_to_contact(&info(0.5), &falling(0.1), &GeomMotion::stationary(), 1.0, 1e-4);
        assert!(t.is_infinite());
    }

    #[test]
    fn test_receding_pairs_never_touch() {
        let t = time_to_contact(&info(0.5), &falling(-1.0), &GeomMotion::stationary(), 1.0, 1e-4);
        assert!(t.is_infinite());
        let t = time_to_contact(&info(0.0), &falling(-1.0), &GeomMotion::stationary(), 1.0, 1e-4);
        assert!(t.is_infinite());
    }

    #[test]
    fn test_touching_and_approaching_gives_zero() {
        let t = time_to_contact(&info(-1e-6), &falling(1.0), &GeomMotion::stationary(), 1.0, 1e-4);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_rotation_tightens_far_bound() {
        let spinning = GeomMotion::new(
            Twist::new(Vector3::new(0.0, 0.0, -2.0), Vector3::new(0.0, 3.0, 0.0)),
            Point3::origin(),
            1.0,
        );
        let t = time_to_contact(&info(0.5), &spinning, &GeomMotion::stationary(), 1.0, 1e-4);
        assert_relative_eq!(t, 0.5 / (2.0 + 3.0), epsilon = 1e-12);
    }
}
