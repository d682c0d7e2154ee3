//! Constraint island detection.
//!
//! Super bodies coupled through constraints form islands that can be solved
//! independently: an island's problem only involves its own generalized
//! velocities. Static bodies never join an island, so two bodies resting on
//! the same ground stay apart.
//!
//! # Algorithm
//!
//! Union-find with path compression and union by rank:
//!
//! 1. Collect the super bodies touched by each constraint
//! 2. Union the super bodies of every constraint
//! 3. Group constraints by the root of their super bodies
//!
//! Islands come out ordered by their smallest super body, with sorted
//! members, so assembly is independent of hash order.

use hashbrown::HashMap;
use sim_types::SuperBodyId;

use crate::{ConstraintDynamics, UnilateralConstraint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A group of super bodies connected through constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Island {
    /// Super bodies in this island, sorted.
    pub super_bodies: Vec<SuperBodyId>,
    /// Indices into the constraint list, ascending.
    pub constraints: Vec<usize>,
}

impl Island {
    /// Number of super bodies.
    #[must_use]
    pub fn num_super_bodies(&self) -> usize {
        self.super_bodies.len()
    }

    /// Number of constraints.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Check if a super body belongs to this island.
    #[must_use]
    pub fn contains(&self, super_body: SuperBodyId) -> bool {
        self.super_bodies.binary_search(&super_body).is_ok()
    }
}

/// Islands of a constraint set.
#[derive(Debug, Clone, Default)]
pub struct ConstraintIslands {
    islands: Vec<Island>,
    island_of: HashMap<SuperBodyId, usize>,
    /// Constraints between static bodies only.
    dropped: usize,
}

impl ConstraintIslands {
    /// Build islands for a constraint set.
    #[must_use]
    pub fn build<D: ConstraintDynamics + ?Sized>(
        constraints: &[UnilateralConstraint],
        dynamics: &D,
    ) -> Self {
        let members: Vec<Vec<SuperBodyId>> = constraints
            .iter()
            .map(|c| constraint_super_bodies(c, dynamics))
            .collect();
        Self::from_members(&members)
    }

    /// Build islands from the super bodies each constraint touches.
    ///
    /// A constraint with no members (both sides static) is dropped.
    #[must_use]
    pub fn from_members(members: &[Vec<SuperBodyId>]) -> Self {
        let mut all: Vec<SuperBodyId> = members.iter().flatten().copied().collect();
        all.sort_unstable();
        all.dedup();

        let index = |sb: &SuperBodyId| all.binary_search(sb).ok();

        let mut uf = UnionFind::new(all.len());
        for m in members {
            let mut ids = m.iter().filter_map(index);
            if let Some(first) = ids.next() {
                for other in ids {
                    uf.union(first, other);
                }
            }
        }

        // Visiting in sorted order makes island order deterministic.
        let mut root_to_island: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Island> = Vec::new();
        let mut island_of = HashMap::with_capacity(all.len());
        for (i, sb) in all.iter().enumerate() {
            let root = uf.find(i);
            let island = *root_to_island.entry(root).or_insert_with(|| {
                islands.push(Island {
                    super_bodies: Vec::new(),
                    constraints: Vec::new(),
                });
                islands.len() - 1
            });
            islands[island].super_bodies.push(*sb);
            island_of.insert(*sb, island);
        }

        let mut dropped = 0;
        for (c, m) in members.iter().enumerate() {
            match m.first().and_then(|sb| island_of.get(sb)) {
                Some(&island) => islands[island].constraints.push(c),
                None => dropped += 1,
            }
        }

        Self {
            islands,
            island_of,
            dropped,
        }
    }

    /// Number of islands.
    #[must_use]
    pub fn num_islands(&self) -> usize {
        self.islands.len()
    }

    /// Check if there are no islands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.islands.is_empty()
    }

    /// All islands.
    #[must_use]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Island index of a super body.
    #[must_use]
    pub fn island_for(&self, super_body: SuperBodyId) -> Option<usize> {
        self.island_of.get(&super_body).copied()
    }

    /// Check if two super bodies share an island.
    #[must_use]
    pub fn same_island(&self, a: SuperBodyId, b: SuperBodyId) -> bool {
        match (self.island_for(a), self.island_for(b)) {
            (Some(ia), Some(ib)) => ia == ib,
            _ => false,
        }
    }

    /// Number of constraints that touch no dynamic body.
    #[must_use]
    pub fn num_dropped(&self) -> usize {
        self.dropped
    }

    /// Size statistics.
    #[must_use]
    pub fn statistics(&self) -> IslandStatistics {
        let n = self.islands.len();
        let bodies: usize = self.islands.iter().map(Island::num_super_bodies).sum();
        let constraints: usize = self.islands.iter().map(Island::num_constraints).sum();
        #[allow(clippy::cast_precision_loss)]
        let avg = |total: usize| if n == 0 { 0.0 } else { total as f64 / n as f64 };

        IslandStatistics {
            num_islands: n,
            max_bodies_per_island: self
                .islands
                .iter()
                .map(Island::num_super_bodies)
                .max()
                .unwrap_or(0),
            max_constraints_per_island: self
                .islands
                .iter()
                .map(Island::num_constraints)
                .max()
                .unwrap_or(0),
            avg_bodies_per_island: avg(bodies),
            avg_constraints_per_island: avg(constraints),
        }
    }
}

/// Super bodies a constraint couples, deduplicated.
pub(crate) fn constraint_super_bodies<D: ConstraintDynamics + ?Sized>(
    constraint: &UnilateralConstraint,
    dynamics: &D,
) -> Vec<SuperBodyId> {
    let mut out = Vec::with_capacity(2);
    match constraint {
        UnilateralConstraint::Contact(c) => {
            out.extend(dynamics.super_body(c.body_a));
            out.extend(dynamics.super_body(c.body_b));
        }
        UnilateralConstraint::Limit(l) => {
            out.extend(dynamics.joint_dof(l.joint, l.dof).map(|(sb, _)| sb));
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Statistics about island sizes.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IslandStatistics {
    /// Total number of islands.
    pub num_islands: usize,
    /// Maximum super bodies in any island.
    pub max_bodies_per_island: usize,
    /// Maximum constraints in any island.
    pub max_constraints_per_island: usize,
    /// Average super bodies per island.
    pub avg_bodies_per_island: f64,
    /// Average constraints per island.
    pub avg_constraints_per_island: f64,
}

/// Union-Find (Disjoint-Set Union) data structure.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }

        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => self.parent[root_x] = root_y,
            std::cmp::Ordering::Greater => self.parent[root_y] = root_x,
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }
}
