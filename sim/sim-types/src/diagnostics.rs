//! Diagnostic events emitted while stepping.
//!
//! The simulator, the stabilization loop and the impact handler report what
//! they did through a [`DiagnosticSink`] passed in by the owner instead of a
//! process-wide logger. [`TracingSink`] forwards to `tracing`,
//! [`RecordingSink`] keeps the events for inspection.

use crate::GeomId;

/// One reported event.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A conservative-advancement step bound was computed.
    ConservativeAdvancement {
        /// The bound in seconds (may be infinite).
        step: f64,
        /// Pair that produced the bound, if a contact did.
        limiting_pair: Option<(GeomId, GeomId)>,
    },
    /// A mini-step finished.
    MiniStep {
        /// Elapsed time covered by the mini-step.
        h: f64,
        /// Simulation clock after the mini-step.
        time: f64,
    },
    /// Impacts were resolved.
    ImpactResolved {
        /// Number of constraints in the impact problem.
        constraints: usize,
        /// Whether the frictionless fallback was needed.
        frictionless_fallback: bool,
    },
    /// The impact problem could not be solved; the residual was accepted.
    ImpactFailed {
        /// Solver failure message.
        reason: String,
    },
    /// One stabilization iteration ran.
    StabilizationIteration {
        /// Iteration index.
        iteration: usize,
        /// Violation merit before the update.
        violation: f64,
        /// Accepted line-search step scale (zero if rejected).
        step: f64,
    },
    /// A complementarity problem was solved.
    LcpSolved {
        /// Problem size.
        size: usize,
        /// Pivots used (zero for the trivial case).
        iterations: usize,
        /// Diagonal regularization that was needed, if any.
        regularization: Option<f64>,
    },
    /// The stall guard forced progress.
    StallBroken {
        /// Consecutive mini-steps without progress.
        stalled: usize,
        /// Time advanced without a conservative bound.
        advanced: f64,
    },
    /// A full step completed.
    StepCompleted {
        /// Simulation clock after the step.
        time: f64,
        /// Minimum pairwise distance after stabilization.
        min_distance: f64,
    },
    /// Stabilization left a violation within tolerance.
    ViolationRemaining {
        /// Minimum pairwise distance.
        min_distance: f64,
        /// Largest joint-limit overshoot.
        limit_violation: f64,
    },
}

/// Receiver of diagnostic events.
pub trait DiagnosticSink {
    /// Handle one event.
    fn emit(&mut self, diagnostic: Diagnostic);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::ConservativeAdvancement {
                step,
                limiting_pair,
            } => tracing::trace!(step, ?limiting_pair, "conservative advancement"),
            Diagnostic::MiniStep { h, time } => tracing::trace!(h, time, "mini-step"),
            Diagnostic::ImpactResolved {
                constraints,
                frictionless_fallback,
            } => tracing::debug!(constraints, frictionless_fallback, "impact resolved"),
            Diagnostic::ImpactFailed { reason } => {
                tracing::warn!(%reason, "impact resolution failed; accepting residual");
            }
            Diagnostic::StabilizationIteration {
                iteration,
                violation,
                step,
            } => tracing::debug!(iteration, violation, step, "stabilization iteration"),
            Diagnostic::LcpSolved {
                size,
                iterations,
                regularization,
            } => tracing::trace!(size, iterations, ?regularization, "lcp solved"),
            Diagnostic::StallBroken { stalled, advanced } => {
                tracing::warn!(stalled, advanced, "mini-step stall broken");
            }
            Diagnostic::StepCompleted { time, min_distance } => {
                tracing::debug!(time, min_distance, "step completed");
            }
            Diagnostic::ViolationRemaining {
                min_distance,
                limit_violation,
            } => tracing::warn!(min_distance, limit_violation, "constraint violation remains"),
        }
    }
}

/// Sink that stores every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Events in emission order.
    pub events: Vec<Diagnostic>,
}

impl RecordingSink {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of LCP solves recorded.
    #[must_use]
    pub fn lcp_solves(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Diagnostic::LcpSolved { .. }))
            .count()
    }

    /// Number of stabilization iterations recorded.
    #[must_use]
    pub fn stabilization_iterations(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Diagnostic::StabilizationIteration { .. }))
            .count()
    }

    /// Forget all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.events.push(diagnostic);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&mut self, _diagnostic: Diagnostic) {}
}
