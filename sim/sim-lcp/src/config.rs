//! Solver tolerances and the regularization schedule.

use crate::{LcpError, Result};

/// Tolerances for Lemke pivoting.
///
/// `None` selects the automatic value, computed per problem.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LcpConfig {
    /// Minimum direction entry admitted by the ratio test.
    ///
    /// Automatic: `ε·n·max(1, ‖Be‖∞)`, recomputed each pivot.
    pub piv_tol: Option<f64>,
    /// Slack added to the ratio test and used for the trivial exit.
    ///
    /// Automatic: `ε·‖M‖∞·n`.
    pub zero_tol: Option<f64>,
    /// Diagonal perturbations tried by the regularized solve.
    pub regularization: RegularizationSchedule,
}

impl LcpConfig {
    /// Fix the pivot tolerance.
    #[must_use]
    pub fn piv_tol(mut self, tol: f64) -> Self {
        self.piv_tol = Some(tol);
        self
    }

    /// Fix the zero tolerance.
    #[must_use]
    pub fn zero_tol(mut self, tol: f64) -> Self {
        self.zero_tol = Some(tol);
        self
    }

    /// Set the regularization schedule.
    #[must_use]
    pub fn regularization(mut self, schedule: RegularizationSchedule) -> Self {
        self.regularization = schedule;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for (name, tol) in [("piv_tol", self.piv_tol), ("zero_tol", self.zero_tol)] {
            if let Some(tol) = tol {
                if !tol.is_finite() || tol <= 0.0 {
                    return Err(LcpError::invalid_config(format!(
                        "{name} must be positive and finite, got {tol}"
                    )));
                }
            }
        }
        self.regularization.validate()
    }
}

/// Exponents of the diagonal shifts `10^rf` tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularizationSchedule {
    /// First exponent.
    pub min_exp: i32,
    /// Exponent increment.
    pub step_exp: i32,
    /// Exclusive upper exponent.
    pub max_exp: i32,
}

impl Default for RegularizationSchedule {
    fn default() -> Self {
        Self {
            min_exp: -20,
            step_exp: 4,
            max_exp: 20,
        }
    }
}

impl RegularizationSchedule {
    /// Exponents in the order they are tried.
    pub fn exponents(&self) -> impl Iterator<Item = i32> + '_ {
        let step = self.step_exp.max(1);
        std::iter::successors(Some(self.min_exp), move |rf| rf.checked_add(step))
            .take_while(|rf| *rf < self.max_exp)
    }

    /// Validate the schedule.
    pub fn validate(&self) -> Result<()> {
        if self.step_exp <= 0 {
            return Err(LcpError::invalid_config("step_exp must be positive"));
        }
        if self.min_exp >= self.max_exp {
            return Err(LcpError::invalid_config("min_exp must be below max_exp"));
        }
        if self.max_exp > 300 || self.min_exp < -300 {
            return Err(LcpError::invalid_config(
                "regularization exponents outside f64 range",
            ));
        }
        Ok(())
    }
}
