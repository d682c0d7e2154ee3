//! Contact generation and contact forces.
//!
//! This crate answers the geometric questions the time-stepping simulator
//! asks about pairs of collision geometries:
//!
//! - [`generate_contacts`] - contact points of a touching or interpenetrating
//!   pair, dispatched on the primitive pair
//! - [`signed_distance`] - closest-feature distance with witness points
//! - [`time_to_contact`] - conservative-advancement bound for a moving pair
//!
//! and computes penalty forces for bodies flagged compliant
//! ([`ContactModel`]).
//!
//! # Conventions
//!
//! Every normal points from geometry B toward geometry A, so pushing A along
//! the normal separates the pair. Distances are signed, negative when
//! interpenetrating. Poses passed in are those of the owning bodies; each
//! [`CollisionGeometry`] adds its own relative pose.
//!
//! # Primitives
//!
//! | Primitive | Local shape |
//! |-----------|-------------|
//! | [`Primitive::Sphere`] | centered sphere |
//! | [`Primitive::Box`] | centered, axis-aligned box |
//! | [`Primitive::Plane`] | half-space `z ≤ 0` |
//! | [`Primitive::Heightmap`] | centered grid of heights along Z |
//!
//! # Compliant Contact
//!
//! ```text
//! F_n = k * d^p + c * ḋ
//! ```
//!
//! Where:
//! - `d` = penetration depth beyond the margin
//! - `ḋ` = penetration velocity (positive when approaching)
//! - `k` = stiffness (N/m^p)
//! - `p` = stiffness power (typically 1.0-2.0)
//! - `c` = damping coefficient (N·s/m)
//!
//! # Example
//!
//! ```
//! use sim_contact::{generate_contacts, CollisionGeometry, Primitive};
//! use sim_types::{BodyId, GeomId, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let ball = CollisionGeometry::new(GeomId::new(0), BodyId::new(0), Primitive::sphere(1.0));
//! let ground = CollisionGeometry::new(GeomId::new(1), BodyId::new(1), Primitive::Plane);
//!
//! let contacts = generate_contacts(
//!     &ball,
//!     &Pose::from_position(Point3::new(0.0, 0.0, 0.99)),
//!     &ground,
//!     &Pose::identity(),
//!     1e-6,
//! );
//!
//! assert_eq!(contacts.len(), 1);
//! assert!((contacts[0].normal - Vector3::z()).norm() < 1e-12);
//! assert!(contacts[0].distance < 0.0);
//! ```
//!
//! # Layer 0 Crate
//!
//! This crate depends only on `sim-types` and `nalgebra`. It can be used
//! from headless tools and tests without the rest of the engine.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod contact;
mod distance;
mod geometry;
mod heightmap;
mod model;
mod narrow;
mod params;
mod primitive;

pub use contact::{ContactForce, ContactPoint};
pub use distance::{
    signed_distance, time_to_contact, GeomMotion, PairwiseDistInfo, PairwiseDistance,
};
pub use geometry::{Aabb, CollisionGeometry};
pub use heightmap::HeightmapData;
pub use model::ContactModel;
pub use narrow::generate_contacts;
pub use params::ContactParams;
pub use primitive::Primitive;
