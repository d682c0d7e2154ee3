//! Broad-phase pair culling using Sweep-and-Prune (SAP).
//!
//! Each collision geometry contributes one world-space AABB, already grown
//! by its predictive margin (speed bound times the remaining step). The
//! intervals are sorted on the axis with the largest spread and swept;
//! surviving pairs are checked on all three axes.
//!
//! Geometries on the same body and pairs of static geometries are never
//! reported. Output pairs are ordered `(smaller id, larger id)` and sorted,
//! so the result does not depend on input order.
//!
//! # Example
//!
//! ```
//! use sim_contact::Aabb;
//! use sim_core::broad_phase::{BroadPhase, BroadPhaseEntry, SweepAndPrune};
//! use sim_types::{BodyId, GeomId, Point3, Vector3};
//!
//! let entries = [
//!     BroadPhaseEntry::new(
//!         GeomId::new(0),
//!         BodyId::new(0),
//!         Aabb::from_center(Point3::origin(), Vector3::repeat(1.0)),
//!         false,
//!     ),
//!     BroadPhaseEntry::new(
//!         GeomId::new(1),
//!         BodyId::new(1),
//!         Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::repeat(1.0)),
//!         false,
//!     ),
//! ];
//!
//! let pairs = SweepAndPrune::new().find_potential_pairs(&entries);
//! assert_eq!(pairs, vec![(GeomId::new(0), GeomId::new(1))]);
//! ```

use sim_contact::Aabb;
use sim_types::{BodyId, GeomId};

/// One geometry as seen by the broad phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhaseEntry {
    /// The geometry.
    pub geom: GeomId,
    /// Body carrying the geometry.
    pub body: BodyId,
    /// World bounds including the predictive margin.
    pub aabb: Aabb,
    /// Whether the carrying body never moves.
    pub is_static: bool,
}

impl BroadPhaseEntry {
    /// Entry for a geometry.
    #[must_use]
    pub const fn new(geom: GeomId, body: BodyId, aabb: Aabb, is_static: bool) -> Self {
        Self {
            geom,
            body,
            aabb,
            is_static,
        }
    }

    fn can_pair_with(&self, other: &Self) -> bool {
        self.body != other.body && !(self.is_static && other.is_static)
    }
}

/// Coordinate axis for sweep direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// X-axis.
    X,
    /// Y-axis.
    Y,
    /// Z-axis.
    Z,
}

impl Axis {
    const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    fn bounds(self, aabb: &Aabb) -> (f64, f64) {
        let i = self.index();
        (aabb.min[i], aabb.max[i])
    }
}

/// Broad-phase algorithm over geometry bounds.
pub trait BroadPhase {
    /// Pairs of geometries whose bounds overlap, ordered and sorted.
    fn find_potential_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(GeomId, GeomId)>;
}

/// Sweep-and-Prune (Sort-and-Sweep) broad phase.
#[derive(Debug, Clone, Default)]
pub struct SweepAndPrune {
    /// Sorted intervals on the sweep axis, reused between calls.
    intervals: Vec<Interval>,
    sweep_axis: Option<Axis>,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    entry: usize,
    min: f64,
    max: f64,
}

impl SweepAndPrune {
    /// Create a new sweep-and-prune broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Axis used by the last sweep.
    #[must_use]
    pub fn sweep_axis(&self) -> Option<Axis> {
        self.sweep_axis
    }

    /// Axis with the largest spread of box centers.
    ///
    /// Unbounded boxes (planes, terrain) overlap everything along some axis
    /// and are left out of the choice.
    fn choose_sweep_axis(entries: &[BroadPhaseEntry]) -> Axis {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for entry in entries.iter().filter(|e| e.aabb.is_finite()) {
            for i in 0..3 {
                let c = 0.5 * (entry.aabb.min[i] + entry.aabb.max[i]);
                lo[i] = lo[i].min(c);
                hi[i] = hi[i].max(c);
            }
        }

        let extent = |i: usize| if hi[i] >= lo[i] { hi[i] - lo[i] } else { 0.0 };
        let (x, y, z) = (extent(0), extent(1), extent(2));
        if x >= y && x >= z {
            Axis::X
        } else if y >= z {
            Axis::Y
        } else {
            Axis::Z
        }
    }
}

impl BroadPhase for SweepAndPrune {
    fn find_potential_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(GeomId, GeomId)> {
        let axis = Self::choose_sweep_axis(entries);
        self.sweep_axis = Some(axis);

        self.intervals.clear();
        self.intervals
            .extend(entries.iter().enumerate().map(|(entry, e)| {
                let (min, max) = axis.bounds(&e.aabb);
                Interval { entry, min, max }
            }));
        self.intervals.sort_by(|a, b| a.min.total_cmp(&b.min));

        let mut pairs = Vec::new();
        for (i, a) in self.intervals.iter().enumerate() {
            for b in &self.intervals[i + 1..] {
                if b.min > a.max {
                    break;
                }
                let ea = &entries[a.entry];
                let eb = &entries[b.entry];
                if ea.can_pair_with(eb) && ea.aabb.overlaps(&eb.aabb) {
                    pairs.push(ordered(ea.geom, eb.geom));
                }
            }
        }

        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

/// All-pairs broad phase, the reference the sweep is checked against.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForce;

impl BroadPhase for BruteForce {
    fn find_potential_pairs(&mut self, entries: &[BroadPhaseEntry]) -> Vec<(GeomId, GeomId)> {
        let mut pairs = Vec::new();
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.can_pair_with(b) && a.aabb.overlaps(&b.aabb) {
                    pairs.push(ordered(a.geom, b.geom));
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

fn ordered(a: GeomId, b: GeomId) -> (GeomId, GeomId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
