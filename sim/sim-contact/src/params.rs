//! Surface parameters for friction and penalty contact.

use sim_types::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical parameters of a contacting surface.
///
/// Rigid contacts only read `friction_coefficient`; compliant bodies use the
/// whole set through [`ContactModel`](crate::ContactModel):
///
/// ```text
/// F_n = stiffness * d^stiffness_power + damping * ḋ
/// ```
///
/// with `d` the penetration beyond `contact_margin`.
///
/// # Example
///
/// ```
/// use sim_contact::ContactParams;
///
/// let custom = ContactParams::default()
///     .with_stiffness(50_000.0)
///     .with_friction(0.8);
/// assert!(custom.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactParams {
    /// Penalty stiffness (N/m^p where p is `stiffness_power`).
    pub stiffness: f64,

    /// Penalty exponent.
    ///
    /// - 1.0 = linear spring
    /// - 1.5 = Hertzian contact (spheres)
    pub stiffness_power: f64,

    /// Penalty damping (N·s/m).
    pub damping: f64,

    /// Coulomb friction coefficient. Zero makes the contact frictionless.
    pub friction_coefficient: f64,

    /// Penetration depth before penalty forces engage (m).
    pub contact_margin: f64,
}

impl Default for ContactParams {
    fn default() -> Self {
        Self {
            stiffness: 100_000.0,
            stiffness_power: 1.0,
            damping: 1_000.0,
            friction_coefficient: 0.5,
            contact_margin: 0.0001,
        }
    }
}

impl ContactParams {
    /// Rubber-like surface: soft, superlinear, high friction.
    #[must_use]
    pub fn rubber() -> Self {
        Self {
            stiffness: 50_000.0,
            stiffness_power: 1.3,
            damping: 2_000.0,
            friction_coefficient: 0.9,
            contact_margin: 0.0002,
        }
    }

    /// Metal-like surface: stiff, moderate friction.
    #[must_use]
    pub fn metal() -> Self {
        Self {
            stiffness: 500_000.0,
            stiffness_power: 1.0,
            damping: 5_000.0,
            friction_coefficient: 0.4,
            contact_margin: 0.00005,
        }
    }

    /// Very soft surface.
    #[must_use]
    pub fn soft() -> Self {
        Self {
            stiffness: 10_000.0,
            stiffness_power: 1.0,
            damping: 500.0,
            friction_coefficient: 0.3,
            contact_margin: 0.001,
        }
    }

    /// Default stiffness, no friction.
    #[must_use]
    pub fn frictionless() -> Self {
        Self {
            friction_coefficient: 0.0,
            ..Default::default()
        }
    }

    /// Set the stiffness coefficient.
    #[must_use]
    pub fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    /// Set the stiffness power.
    #[must_use]
    pub fn with_stiffness_power(mut self, power: f64) -> Self {
        self.stiffness_power = power;
        self
    }

    /// Set the damping coefficient.
    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction_coefficient = friction;
        self
    }

    /// Set the contact margin.
    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.contact_margin = margin;
        self
    }

    /// Damping that makes a linear spring on `mass` critically damped.
    #[must_use]
    pub fn critical_damping(stiffness: f64, mass: f64) -> f64 {
        2.0 * (stiffness * mass).sqrt()
    }

    /// Check the parameters are physically meaningful.
    pub fn validate(&self) -> Result<()> {
        if !(self.stiffness > 0.0) {
            return Err(SimError::invalid_config("contact stiffness must be positive"));
        }
        if !(0.5..=3.0).contains(&self.stiffness_power) {
            return Err(SimError::invalid_config(
                "contact stiffness_power must be in [0.5, 3.0]",
            ));
        }
        if !(self.damping >= 0.0) {
            return Err(SimError::invalid_config("contact damping cannot be negative"));
        }
        if !(self.friction_coefficient >= 0.0) {
            return Err(SimError::invalid_config(
                "friction_coefficient cannot be negative",
            ));
        }
        if !(self.contact_margin >= 0.0) {
            return Err(SimError::invalid_config("contact_margin cannot be negative"));
        }
        Ok(())
    }

    /// Effective parameters for a contacting pair.
    ///
    /// Stiffness and damping combine as springs in series, friction as the
    /// geometric mean, the margin as the larger of the two.
    #[must_use]
    pub fn combine(a: &Self, b: &Self) -> Self {
        Self {
            stiffness: 2.0 * a.stiffness * b.stiffness / (a.stiffness + b.stiffness),
            stiffness_power: (a.stiffness_power + b.stiffness_power) * 0.5,
            damping: 2.0 * a.damping * b.damping / (a.damping + b.damping + 1e-10),
            friction_coefficient: (a.friction_coefficient * b.friction_coefficient).sqrt(),
            contact_margin: a.contact_margin.max(b.contact_margin),
        }
    }
}
