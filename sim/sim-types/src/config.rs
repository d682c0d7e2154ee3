//! Configuration types for the time-stepping simulator.
//!
//! All numeric tolerances the simulator and the stabilization loop consult
//! live here. LCP tolerances are configured separately on the solver.

use crate::dynamics::Gravity;
use crate::NEAR_ZERO;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a simulation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Gravity applied as a recurrent force.
    pub gravity: Gravity,
    /// Smallest mini-step the conservative advancement may take (seconds).
    pub min_step_size: f64,
    /// Pairs closer than this are treated as in contact.
    pub contact_dist_thresh: f64,
    /// Mini-steps without progress tolerated before forcing advancement.
    ///
    /// The forced mini-step covers the whole remaining time and ignores the
    /// conservative-advancement bound, so fast bodies can pass through thin
    /// geometry. Any penetration left behind is handed to stabilization,
    /// which fails the step if it exceeds `max_violation`.
    pub max_stalled_mini_steps: usize,
    /// Post-step constraint stabilization settings.
    pub stabilization: StabilizationConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravity: Gravity::earth(),
            min_step_size: NEAR_ZERO,
            contact_dist_thresh: 1e-4,
            max_stalled_mini_steps: 8,
            stabilization: StabilizationConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Set the gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity (zero-G environment).
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Gravity::zero();
        self
    }

    /// Set the minimum mini-step size.
    #[must_use]
    pub fn min_step_size(mut self, min_step_size: f64) -> Self {
        self.min_step_size = min_step_size;
        self
    }

    /// Set the contact distance threshold.
    #[must_use]
    pub fn contact_dist_thresh(mut self, thresh: f64) -> Self {
        self.contact_dist_thresh = thresh;
        self
    }

    /// Set the stall guard limit.
    #[must_use]
    pub fn max_stalled_mini_steps(mut self, count: usize) -> Self {
        self.max_stalled_mini_steps = count;
        self
    }

    /// Set the stabilization configuration.
    #[must_use]
    pub fn stabilization(mut self, stabilization: StabilizationConfig) -> Self {
        self.stabilization = stabilization;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.gravity.acceleration.iter().all(|x| x.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        if !self.min_step_size.is_finite() || self.min_step_size <= 0.0 {
            return Err(crate::SimError::invalid_config(
                "min_step_size must be positive",
            ));
        }

        if !self.contact_dist_thresh.is_finite() || self.contact_dist_thresh < 0.0 {
            return Err(crate::SimError::invalid_config(
                "contact_dist_thresh must be non-negative",
            ));
        }

        if self.max_stalled_mini_steps == 0 {
            return Err(crate::SimError::invalid_config(
                "max_stalled_mini_steps must be at least 1",
            ));
        }

        self.stabilization.validate()
    }
}

/// Settings for the position-level constraint stabilization loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StabilizationConfig {
    /// Stabilization runs while the minimum pairwise distance is below this.
    pub eps: f64,
    /// Upper bound on stabilization iterations per call.
    pub max_iterations: usize,
    /// Residual violation above which the step fails.
    pub max_violation: f64,
    /// Backtracking line search parameters.
    pub line_search: LineSearchConfig,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            eps: NEAR_ZERO,
            max_iterations: 32,
            max_violation: 1e-3,
            line_search: LineSearchConfig::default(),
        }
    }
}

impl StabilizationConfig {
    /// Set the activation tolerance.
    #[must_use]
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Set the iteration bound.
    #[must_use]
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the unrecoverable violation tolerance.
    #[must_use]
    pub fn max_violation(mut self, max_violation: f64) -> Self {
        self.max_violation = max_violation;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(crate::SimError::invalid_config(
                "stabilization eps must be positive",
            ));
        }

        if self.max_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "stabilization max_iterations must be at least 1",
            ));
        }

        if !self.max_violation.is_finite() || self.max_violation < self.eps {
            return Err(crate::SimError::invalid_config(
                "max_violation must be finite and at least eps",
            ));
        }

        self.line_search.validate()
    }
}

/// Armijo backtracking parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineSearchConfig {
    /// Required fraction of the linear decrease.
    pub alpha: f64,
    /// Step shrink factor.
    pub beta: f64,
    /// The search gives up when the step scale falls below this.
    pub min_step: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            beta: 0.8,
            min_step: 1e-4,
        }
    }
}

impl LineSearchConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(crate::SimError::invalid_config(
                "line search alpha must be in (0, 1)",
            ));
        }

        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(crate::SimError::invalid_config(
                "line search beta must be in (0, 1)",
            ));
        }

        if !(self.min_step > 0.0 && self.min_step <= 1.0) {
            return Err(crate::SimError::invalid_config(
                "line search min_step must be in (0, 1]",
            ));
        }

        Ok(())
    }
}
