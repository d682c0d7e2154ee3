//! Narrow-phase contact generation.
//!
//! [`generate_contacts`] dispatches on the primitive pair to a closed-form
//! routine where one exists and otherwise tests surface samples of each
//! geometry against the other's signed distance. Every contact normal points
//! from B toward A; routines written for the swapped pair have their normals
//! flipped on the way out.
//!
//! | A \ B | sphere | box | plane | heightmap |
//! |-------|--------|-----|-------|-----------|
//! | sphere | sphere–sphere | box–sphere | plane | sphere–heightmap |
//! | box | box–sphere | vertices | plane | convex–heightmap |
//! | plane | plane | plane | plane | heightmap–generic |
//! | heightmap | sphere–heightmap | convex–heightmap | heightmap–generic | heightmap–generic |

use nalgebra::{Point3, Vector3};
use sim_types::{Pose, NEAR_ZERO};
use tracing::trace;

use crate::contact::ContactPoint;
use crate::geometry::CollisionGeometry;
use crate::heightmap::HeightmapData;
use crate::primitive::Primitive;

/// A primitive placed in the world.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placed<'a> {
    pub(crate) primitive: &'a Primitive,
    pub(crate) pose: Pose,
}

impl<'a> Placed<'a> {
    pub(crate) fn new(geom: &'a CollisionGeometry, body_pose: &Pose) -> Self {
        Self {
            primitive: &geom.primitive,
            pose: geom.world_pose(body_pose),
        }
    }

    /// Signed distance and outward world normal at a world point.
    pub(crate) fn distance_and_normal(&self, p: &Point3<f64>) -> (f64, Vector3<f64>) {
        let local = self.pose.inverse_transform_point(p);
        let (d, n) = self.primitive.distance_and_normal(&local);
        (d, self.pose.transform_vector(&n))
    }

    pub(crate) fn world_vertices(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.primitive
            .vertices()
            .into_iter()
            .map(move |v| self.pose.transform_point(&v))
    }

    fn center(&self) -> Point3<f64> {
        self.pose.position
    }
}

/// Contacts between two geometries that are touching or interpenetrating.
///
/// Poses are those of the owning bodies. Points with a signed distance above
/// `tolerance` are not reported. Output order is unspecified.
#[must_use]
pub fn generate_contacts(
    geom_a: &CollisionGeometry,
    pose_a: &Pose,
    geom_b: &CollisionGeometry,
    pose_b: &Pose,
    tolerance: f64,
) -> Vec<ContactPoint> {
    let a = Placed::new(geom_a, pose_a);
    let b = Placed::new(geom_b, pose_b);
    let mut out = Vec::new();
    dispatch(&a, &b, tolerance, &mut out);
    trace!(
        a = %geom_a.id,
        b = %geom_b.id,
        shapes = %format_args!("{}-{}", a.primitive.name(), b.primitive.name()),
        contacts = out.len(),
        "narrow phase"
    );
    out
}

fn dispatch(a: &Placed<'_>, b: &Placed<'_>, tol: f64, out: &mut Vec<ContactPoint>) {
    use Primitive as P;
    match (a.primitive, b.primitive) {
        (P::Sphere { .. }, P::Sphere { .. }) => sphere_sphere(a, b, tol, out),
        (P::Box { .. }, P::Sphere { .. }) => box_sphere(a, b, tol, out),
        (P::Sphere { .. }, P::Box { .. }) => flipped(out, |o| box_sphere(b, a, tol, o)),
        (P::Sphere { .. }, P::Heightmap(hm)) => sphere_heightmap(a, b, hm, tol, out),
        (P::Heightmap(hm), P::Sphere { .. }) => {
            flipped(out, |o| sphere_heightmap(b, a, hm, tol, o));
        }
        (_, P::Heightmap(hm)) if a.primitive.is_convex() => convex_heightmap(a, b, hm, tol, out),
        (P::Heightmap(hm), _) if b.primitive.is_convex() => {
            flipped(out, |o| convex_heightmap(b, a, hm, tol, o));
        }
        (P::Heightmap(hm), _) => heightmap_generic(a, hm, b, tol, out),
        (_, P::Heightmap(hm)) => flipped(out, |o| heightmap_generic(b, hm, a, tol, o)),
        (P::Plane, _) => plane_generic(a, b, tol, out),
        (_, P::Plane) => flipped(out, |o| plane_generic(b, a, tol, o)),
        _ => vertices_generic(a, b, tol, out),
    }
}

/// Run a routine written for (B, A) and flip the normals it produced.
fn flipped(out: &mut Vec<ContactPoint>, f: impl FnOnce(&mut Vec<ContactPoint>)) {
    let start = out.len();
    f(out);
    for c in &mut out[start..] {
        c.normal = -c.normal;
    }
}

/// Record a contact unless its normal is degenerate.
fn push(out: &mut Vec<ContactPoint>, point: Point3<f64>, normal: Vector3<f64>, distance: f64) {
    let len = normal.norm();
    if len < NEAR_ZERO {
        return;
    }
    out.push(ContactPoint::new(point, normal / len, distance));
}

fn sphere_sphere(a: &Placed<'_>, b: &Placed<'_>, tol: f64, out: &mut Vec<ContactPoint>) {
    let (Primitive::Sphere { radius: ra }, Primitive::Sphere { radius: rb }) =
        (a.primitive, b.primitive)
    else {
        return;
    };
    let d = a.center() - b.center();
    let len = d.norm();
    let dist = len - ra - rb;
    if dist > tol || len < NEAR_ZERO {
        return;
    }
    let n = d / len;
    let closest_a = a.center() - n * *ra;
    let closest_b = b.center() + n * *rb;
    let point = Point3::from((closest_a.coords + closest_b.coords) * 0.5);
    push(out, point, n, dist);
}

/// A is the box, B the sphere.
fn box_sphere(a: &Placed<'_>, b: &Placed<'_>, tol: f64, out: &mut Vec<ContactPoint>) {
    let Primitive::Sphere { radius } = b.primitive else {
        return;
    };
    let center = b.center();
    let local = a.pose.inverse_transform_point(&center);
    let inside_dist = a.primitive.signed_distance(&local);
    let dist = inside_dist - radius;
    if dist > tol {
        return;
    }

    if inside_dist > 0.0 {
        let on_box = a.pose.transform_point(&a.primitive.closest_surface_point(&local));
        let dir = on_box - center;
        let len = dir.norm();
        if len < NEAR_ZERO {
            return;
        }
        let n = dir / len;
        let on_sphere = center + n * *radius;
        let point = Point3::from((on_box.coords + on_sphere.coords) * 0.5);
        push(out, point, n, dist);
    } else {
        // Center inside the box: the sphere leaves through the nearest face.
        let face = a.pose.transform_vector(&a.primitive.normal(&local));
        push(out, center, -face, dist);
    }
}

/// A is the sphere, B the heightmap.
fn sphere_heightmap(
    a: &Placed<'_>,
    b: &Placed<'_>,
    hm: &HeightmapData,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let Primitive::Sphere { radius } = a.primitive else {
        return;
    };
    let center = b.pose.inverse_transform_point(&a.center());

    // Lowest point of the sphere against the terrain.
    let lowest = center - Vector3::z() * *radius;
    let height = hm.height_above(&lowest);
    if height <= tol {
        push(
            out,
            b.pose.transform_point(&lowest),
            b.pose.transform_vector(&hm.normal(lowest.x, lowest.y)),
            height,
        );
    }

    // Terrain vertices under the sphere's footprint.
    let r = Vector3::repeat(*radius);
    for v in hm.vertices_in(&(center - r), &(center + r)) {
        let dist = (v - center).norm() - radius;
        if dist > tol {
            continue;
        }
        push(
            out,
            b.pose.transform_point(&v),
            b.pose.transform_vector(&hm.normal(v.x, v.y)),
            dist,
        );
    }
}

/// A is convex, B the heightmap.
fn convex_heightmap(
    a: &Placed<'_>,
    b: &Placed<'_>,
    hm: &HeightmapData,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    for p in a.world_vertices() {
        let local = b.pose.inverse_transform_point(&p);
        let height = hm.height_above(&local);
        if height <= tol {
            push(out, p, b.pose.transform_vector(&hm.normal(local.x, local.y)), height);
        }
    }

    let bounds = a
        .primitive
        .local_aabb()
        .transformed(&a.pose.relative_to(&b.pose));
    for v in hm.vertices_in(&bounds.min, &bounds.max) {
        let p = b.pose.transform_point(&v);
        let (dist, _) = a.distance_and_normal(&p);
        if dist <= tol {
            push(out, p, b.pose.transform_vector(&hm.normal(v.x, v.y)), dist);
        }
    }
}

/// A is the heightmap, B anything without a closed form.
fn heightmap_generic(
    a: &Placed<'_>,
    hm: &HeightmapData,
    b: &Placed<'_>,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let bounds = b
        .primitive
        .local_aabb()
        .transformed(&b.pose.relative_to(&a.pose));
    for v in hm.vertices_in(&bounds.min, &bounds.max) {
        let p = a.pose.transform_point(&v);
        let (dist, n) = b.distance_and_normal(&p);
        if dist <= tol {
            push(out, p, n, dist);
        }
    }
    for p in b.world_vertices() {
        let (dist, n) = a.distance_and_normal(&p);
        if dist <= tol {
            push(out, p, -n, dist);
        }
    }
}

/// A is the plane.
fn plane_generic(a: &Placed<'_>, b: &Placed<'_>, tol: f64, out: &mut Vec<ContactPoint>) {
    let up = a.pose.transform_vector(&Vector3::z());
    let mut test = |p: Point3<f64>| {
        let (dist, n) = a.distance_and_normal(&p);
        if dist <= tol {
            push(out, p, -n, dist);
        }
    };

    if let Primitive::Sphere { .. } = b.primitive {
        // Sample points miss the deepest point of a sphere; use its support.
        let dir = b.pose.inverse_transform_vector(&-up);
        if let Some(s) = b.primitive.support(&dir) {
            test(b.pose.transform_point(&s));
        }
        return;
    }
    for p in b.world_vertices() {
        test(p);
    }
}

fn vertices_generic(a: &Placed<'_>, b: &Placed<'_>, tol: f64, out: &mut Vec<ContactPoint>) {
    for p in a.world_vertices() {
        let (dist, n) = b.distance_and_normal(&p);
        if dist <= tol {
            push(out, p, n, dist);
        }
    }
    for p in b.world_vertices() {
        let (dist, n) = a.distance_and_normal(&p);
        if dist <= tol {
            push(out, p, -n, dist);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use sim_types::{BodyId, GeomId};

    fn geom(id: u64, primitive: Primitive) -> CollisionGeometry {
        CollisionGeometry::new(GeomId::new(id), BodyId::new(id), primitive)
    }

    fn at(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_position(Point3::new(x, y, z))
    }

    #[test]
    fn test_touching_spheres_give_midpoint_contact() {
        let a = geom(0, Primitive::sphere(1.0));
        let b = geom(1, Primitive::sphere(0.5));
        let contacts = generate_contacts(&a, &at(0.0, 0.0, 2.0), &b, &at(0.0, 0.0, 0.6), 1e-6);
        assert_eq!(contacts.len(), 1);
        let c = contacts[0];
        assert_relative_eq!(c.normal, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(c.distance, -0.1, epsilon = 1e-12);
        assert_relative_eq!(c.point, Point3::new(0.0, 0.0, 1.05), epsilon = 1e-12);
    }

    #[test]
    fn test_separated_spheres_give_nothing() {
        let a = geom(0, Primitive::sphere(1.0));
        let b = geom(1, Primitive::sphere(1.0));
        assert!(generate_contacts(&a, &at(0.0, 0.0, 0.0), &b, &at(3.0, 0.0, 0.0), 1e-6).is_empty());
    }

    #[test]
    fn test_sphere_resting_on_plane() {
        let sphere = geom(0, Primitive::sphere(1.0));
        let plane = geom(1, Primitive::Plane);
        let pose = at(0.3, -0.2, 0.999);

        let contacts = generate_contacts(&sphere, &pose, &plane, &Pose::identity(), 1e-6);
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].normal, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(contacts[0].distance, -0.001, epsilon = 1e-12);
        assert_relative_eq!(contacts[0].point, Point3::new(0.3, -0.2, -0.001), epsilon = 1e-12);

        // Swapped order flips the normal.
        let swapped = generate_contacts(&plane, &Pose::identity(), &sphere, &pose, 1e-6);
        assert_eq!(swapped.len(), 1);
        assert_relative_eq!(swapped[0].normal, -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_box_on_plane_reports_bottom_corners() {
        let cube = geom(0, Primitive::cuboid(Vector3::new(0.5, 0.5, 0.5)));
        let plane = geom(1, Primitive::Plane);
        let contacts = generate_contacts(&cube, &at(0.0, 0.0, 0.5), &plane, &Pose::identity(), 1e-6);
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_relative_eq!(c.normal, Vector3::z(), epsilon = 1e-12);
            assert!(c.distance.abs() < 1e-12);
        }
    }

    #[test]
    fn test_box_sphere_normal_points_toward_first_geometry() {
        let cube = geom(0, Primitive::cuboid(Vector3::new(1.0, 1.0, 1.0)));
        let ball = geom(1, Primitive::sphere(0.5));
        let ball_pose = at(0.0, 0.0, 1.4);

        let contacts = generate_contacts(&cube, &Pose::identity(), &ball, &ball_pose, 1e-6);
        assert_eq!(contacts.len(), 1);
        // From the ball (B) toward the box (A): downward.
        assert_relative_eq!(contacts[0].normal, -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(contacts[0].distance, -0.1, epsilon = 1e-12);

        let contacts = generate_contacts(&ball, &ball_pose, &cube, &Pose::identity(), 1e-6);
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].normal, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_center_inside_box_exits_through_nearest_face() {
        let cube = geom(0, Primitive::cuboid(Vector3::new(1.0, 1.0, 1.0)));
        let ball = geom(1, Primitive::sphere(0.2));
        let contacts = generate_contacts(&ball, &at(0.9, 0.0, 0.0), &cube, &Pose::identity(), 0.0);
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].normal, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(contacts[0].distance, -0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_on_flat_heightmap() {
        let terrain = geom(
            1,
            Primitive::Heightmap(HeightmapData::flat(11, 11, 10.0, 10.0, 0.0).unwrap()),
        );
        let ball = geom(0, Primitive::sphere(0.5));
        let contacts =
            generate_contacts(&ball, &at(0.25, 0.25, 0.499), &terrain, &Pose::identity(), 1e-6);
        assert!(!contacts.is_empty());
        for c in &contacts {
            assert_relative_eq!(c.normal, Vector3::z(), epsilon = 1e-12);
            assert!(c.distance <= 1e-6);
        }
        assert!(contacts.iter().any(|c| (c.distance + 0.001).abs() < 1e-12));

        let high = generate_contacts(&ball, &at(0.25, 0.25, 2.0), &terrain, &Pose::identity(), 1e-6);
        assert!(high.is_empty());
    }

    #[test]
    fn test_box_on_sloped_heightmap_uses_terrain_normal() {
        let slope = HeightmapData::from_fn(9, 9, 8.0, 8.0, |x, _| 0.25 * x).unwrap();
        let terrain = geom(1, Primitive::Heightmap(slope));
        let cube = geom(0, Primitive::cuboid(Vector3::new(0.2, 0.2, 0.2)));
        let contacts = generate_contacts(&terrain, &Pose::identity(), &cube, &at(0.0, 0.0, 0.19), 1e-6);
        assert!(!contacts.is_empty());
        let expected = -Vector3::new(-0.25, 0.0, 1.0).normalize();
        for c in &contacts {
            // Heightmap is A here, so normals point from the box down into it.
            assert_relative_eq!(c.normal, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rotated_boxes_use_vertex_tests() {
        let a = geom(0, Primitive::cuboid(Vector3::new(0.5, 0.5, 0.5)));
        let b = geom(1, Primitive::cuboid(Vector3::new(0.3, 0.5, 0.5)));
        // B tilted 45° about X, its lower edge dipping into A's top face.
        let pose_b = Pose::from_position_rotation(
            Point3::new(0.0, 0.0, 0.5 + 0.5 * 2.0_f64.sqrt() - 0.01),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::FRAC_PI_4),
        );
        let contacts = generate_contacts(&a, &Pose::identity(), &b, &pose_b, 1e-6);
        assert_eq!(contacts.len(), 2);
        for c in &contacts {
            assert_relative_eq!(c.normal, -Vector3::z(), epsilon = 1e-9);
            assert_relative_eq!(c.distance, -0.01, epsilon = 1e-9);
        }
    }
}
