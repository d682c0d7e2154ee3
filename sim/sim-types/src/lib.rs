//! Core types for the constraint-based dynamics engine.
//!
//! This crate provides the vocabulary shared by every other `sim-*` crate:
//!
//! - [`BodyId`], [`JointId`], [`GeomId`], [`ArticulatedId`] - arena handles
//! - [`SuperBodyId`] - the body that owns a set of generalized coordinates
//! - [`Pose`], [`Twist`], [`MassProperties`] - kinematic and inertial data
//! - [`JointKind`], [`JointLimits`] - joint description
//! - [`SimulationConfig`] - tolerances for stepping and stabilization
//! - [`SimError`] - the error type every layer reports
//! - [`DiagnosticSink`] - where the simulator reports what it did
//!
//! # Layer 0
//!
//! This is a Layer 0 crate: pure data, no physics. It has no rendering or
//! engine dependencies and can be used from headless tools and tests.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{MassProperties, Pose, SimulationConfig};
//! use nalgebra::Point3;
//!
//! let pose = Pose::from_position(Point3::new(0.0, 0.0, 3.0));
//! let mass = MassProperties::sphere(1.0, 1.0);
//! assert!(mass.validate().is_ok());
//! assert!(SimulationConfig::default().validate().is_ok());
//! assert_eq!(pose.position.z, 3.0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod articulated;
mod body;
mod config;
mod diagnostics;
mod dynamics;
mod error;
mod joint;

pub use articulated::{ArticulatedId, GeneralizedConvention, ReferenceFrame, SuperBodyId};
pub use body::{BodyId, Compliance, GeomId, MassProperties, Pose, Twist};
pub use config::{LineSearchConfig, SimulationConfig, StabilizationConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, NullSink, RecordingSink, TracingSink};
pub use dynamics::{Gravity, Wrench};
pub use error::SimError;
pub use joint::{JointId, JointKind, JointLimits};

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Square root of machine epsilon.
///
/// Default for the minimum step size and the stabilization tolerance, and the
/// length below which normals count as degenerate.
pub const NEAR_ZERO: f64 = 1.490_116_119_384_765_6e-8;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_near_zero_is_sqrt_epsilon() {
        assert!((NEAR_ZERO - f64::EPSILON.sqrt()).abs() < 1e-20);
    }

    #[test]
    fn test_pose_transform() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );

        // 90 degrees about Z sends local X to world Y, then translate.
        let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((world.x - 1.0).abs() < 1e-10);
        assert!((world.y - 1.0).abs() < 1e-10);
    }
}
