// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The points-to graph: the abstract-heap snapshot for one
//! (context, graph-slot) pair.
//!
//! Reference edges run from index nodes to storage nodes and carry a
//! [`Certainty`]. An index node holds at most one `DEFINITE` target; as
//! soon as it has several targets, all of its edges are `POSSIBLE`.
//! The merge operation is an inflationary join: it never removes a
//! `POSSIBLE` edge present in either input, and `DEFINITE` survives only
//! where both operands agree.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use super::node::{IndexNodeId, NodeTable, StorageNodeId};
use crate::wpa::{AbstractValue, Certainty, TypeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointsToGraph {
    /// Reference edges, keyed by source index node. Inner maps are never
    /// left empty.
    pub(crate) references: HashMap<IndexNodeId, HashMap<StorageNodeId, Certainty>>,
    /// Storage nodes present in this graph, with their declared type sets.
    pub(crate) storages: HashMap<StorageNodeId, TypeSet>,
    /// Materialized value nodes: the abstract scalar of a storage node.
    pub(crate) values: HashMap<StorageNodeId, AbstractValue>,
    /// Storage nodes summarizing an unbounded set of concrete allocations.
    pub(crate) abstract_storages: HashSet<StorageNodeId>,
    /// Index nodes left undefined on some predecessor path.
    pub(crate) possibly_null: HashSet<IndexNodeId>,
}

impl PointsToGraph {
    pub fn new() -> PointsToGraph {
        PointsToGraph::default()
    }

    /// Adds a reference edge `lhs -> target`, joining with any existing
    /// certainty. `PtgAll` is a query marker and is never stored.
    pub fn add_reference(&mut self, lhs: IndexNodeId, target: StorageNodeId, cert: Certainty) {
        debug_assert!(cert != Certainty::PtgAll);
        let slot = self.references.entry(lhs).or_default();
        let cert = match slot.get(&target) {
            Some(old) => old.join(cert),
            None => cert,
        };
        slot.insert(target, cert);
        // At most one DEFINITE target per index node.
        if slot.len() > 1 {
            for c in slot.values_mut() {
                *c = Certainty::Possible;
            }
        }
        self.storages.entry(target).or_default();
    }

    /// Materializes `storage`, unioning `types` into its type set.
    pub fn set_storage(&mut self, storage: StorageNodeId, types: &TypeSet) {
        let entry = self.storages.entry(storage).or_default();
        for ty in types {
            entry.insert(ty.clone());
        }
    }

    /// Materializes the value node of `storage`, joining with any value
    /// already attached.
    pub fn set_scalar(&mut self, storage: StorageNodeId, value: AbstractValue) {
        self.storages.entry(storage).or_default();
        let value = match self.values.get(&storage) {
            Some(old) => old.join(&value),
            None => value,
        };
        self.values.insert(storage, value);
    }

    /// Marks `storage` as a summary of unboundedly many allocations.
    pub fn set_abstract(&mut self, storage: StorageNodeId) {
        self.storages.entry(storage).or_default();
        self.abstract_storages.insert(storage);
    }

    #[inline]
    pub fn is_abstract(&self, storage: StorageNodeId) -> bool {
        self.abstract_storages.contains(&storage)
    }

    /// Marks `index` as possibly unbound: some predecessor path left it
    /// undefined. Its `DEFINITE` edges no longer hold on every path and
    /// are downgraded.
    pub fn mark_possibly_null(&mut self, index: IndexNodeId) {
        self.possibly_null.insert(index);
        self.downgrade(index);
    }

    #[inline]
    pub fn is_possibly_null(&self, index: IndexNodeId) -> bool {
        self.possibly_null.contains(&index)
    }

    /// Removes `lhs`'s outgoing edges and possibly-null mark. When the
    /// owner storage is abstract the node summarizes many concrete slots,
    /// so the kill only downgrades certainty and never deletes.
    pub fn kill(&mut self, lhs: IndexNodeId, owner_abstract: bool) {
        if owner_abstract {
            self.downgrade(lhs);
        } else {
            self.references.remove(&lhs);
            self.possibly_null.remove(&lhs);
        }
    }

    fn downgrade(&mut self, index: IndexNodeId) -> bool {
        let mut changed = false;
        if let Some(targets) = self.references.get_mut(&index) {
            for c in targets.values_mut() {
                if *c == Certainty::Definite {
                    *c = Certainty::Possible;
                    changed = true;
                }
            }
        }
        changed
    }

    #[inline]
    pub fn edge_certainty(&self, index: IndexNodeId, target: StorageNodeId) -> Option<Certainty> {
        self.references.get(&index).and_then(|t| t.get(&target)).copied()
    }

    /// The storage nodes `index` points to.
    pub fn points_to(&self, index: IndexNodeId) -> Vec<StorageNodeId> {
        match self.references.get(&index) {
            Some(targets) => targets.keys().copied().sorted().collect(),
            None => Vec::new(),
        }
    }

    /// The reference edges leaving `index` whose certainty is admitted by
    /// the mask `cert` (`PtgAll` admits everything).
    pub fn references_of(&self, index: IndexNodeId, cert: Certainty) -> Vec<(StorageNodeId, Certainty)> {
        match self.references.get(&index) {
            Some(targets) => targets
                .iter()
                .filter(|(_, c)| cert.admits(**c))
                .map(|(s, c)| (*s, *c))
                .sorted()
                .collect(),
            None => Vec::new(),
        }
    }

    /// The index nodes of this graph owned by `storage`.
    pub fn fields_of(&self, storage: StorageNodeId, nodes: &NodeTable) -> Vec<IndexNodeId> {
        let owner = &nodes.storage(storage).name;
        self.references
            .keys()
            .chain(self.possibly_null.iter())
            .filter(|idx| nodes.index(**idx).storage == *owner)
            .copied()
            .sorted()
            .dedup()
            .collect()
    }

    #[inline]
    pub fn has_storage(&self, storage: StorageNodeId) -> bool {
        self.storages.contains_key(&storage)
    }

    #[inline]
    pub fn has_field(&self, index: IndexNodeId) -> bool {
        self.references.contains_key(&index) || self.possibly_null.contains(&index)
    }

    pub fn storage_nodes(&self) -> Vec<StorageNodeId> {
        self.storages.keys().copied().sorted().collect()
    }

    #[inline]
    pub fn type_set(&self, storage: StorageNodeId) -> Option<&TypeSet> {
        self.storages.get(&storage)
    }

    #[inline]
    pub fn value(&self, storage: StorageNodeId) -> Option<&AbstractValue> {
        self.values.get(&storage)
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
            && self.storages.is_empty()
            && self.values.is_empty()
            && self.abstract_storages.is_empty()
            && self.possibly_null.is_empty()
    }

    /// The inflationary join used to merge predecessor solutions. Returns
    /// whether `self` changed.
    ///
    /// Edges are unioned; an edge keeps `DEFINITE` only when both operands
    /// carry it as `DEFINITE` (an edge absent from one operand may not
    /// hold on that operand's paths). Type sets, abstractness and
    /// possibly-null marks are unioned; attached values are joined.
    pub fn join(&mut self, other: &PointsToGraph) -> bool {
        let mut changed = false;

        // Downgrade our DEFINITE edges the other side does not share.
        for (idx, targets) in self.references.iter_mut() {
            for (st, cert) in targets.iter_mut() {
                if *cert == Certainty::Definite
                    && other.edge_certainty(*idx, *st) != Some(Certainty::Definite)
                {
                    *cert = Certainty::Possible;
                    changed = true;
                }
            }
        }

        // Union in the other side's edges; new ones enter as POSSIBLE.
        for (idx, targets) in &other.references {
            for st in targets.keys() {
                let slot = self.references.entry(*idx).or_default();
                if !slot.contains_key(st) {
                    slot.insert(*st, Certainty::Possible);
                    changed = true;
                }
            }
        }

        for (st, types) in &other.storages {
            if !self.storages.contains_key(st) {
                changed = true;
            }
            let entry = self.storages.entry(*st).or_default();
            for ty in types {
                if entry.insert(ty.clone()) {
                    changed = true;
                }
            }
        }

        for (st, value) in &other.values {
            let joined = match self.values.get(st) {
                Some(old) => old.join(value),
                None => value.clone(),
            };
            if self.values.get(st) != Some(&joined) {
                self.values.insert(*st, joined);
                changed = true;
            }
        }

        for st in &other.abstract_storages {
            if self.abstract_storages.insert(*st) {
                changed = true;
            }
        }

        for idx in &other.possibly_null {
            if self.possibly_null.insert(*idx) {
                changed = true;
            }
        }
        // A possibly-unbound index cannot keep must-alias edges.
        let marked: Vec<IndexNodeId> = self.possibly_null.iter().copied().collect();
        for idx in marked {
            changed |= self.downgrade(idx);
        }

        changed
    }

    /// Deterministic readable rendering, one fact per line.
    pub fn dump(&self, nodes: &NodeTable) -> String {
        let mut out = String::new();
        for (idx, st, cert) in self
            .references
            .iter()
            .flat_map(|(idx, ts)| ts.iter().map(move |(st, c)| (*idx, *st, *c)))
            .sorted()
        {
            out.push_str(&format!(
                "ref {} -> {} [{}]\n",
                nodes.index(idx),
                nodes.storage(st),
                cert
            ));
        }
        for st in self.storages.keys().copied().sorted() {
            let types = &self.storages[&st];
            out.push_str(&format!(
                "storage {} : {{{}}}{}\n",
                nodes.storage(st),
                types.iter().join(", "),
                if self.is_abstract(st) { " abstract" } else { "" }
            ));
        }
        for st in self.values.keys().copied().sorted() {
            out.push_str(&format!("value {} = {}\n", nodes.storage(st), self.values[&st]));
        }
        for idx in self.possibly_null.iter().copied().sorted() {
            out.push_str(&format!("possibly-null {}\n", nodes.index(idx)));
        }
        out
    }
}

#[cfg(test)]
mod test {
    use rand::Rng;

    use super::*;
    use crate::pta::node::IndexNode;

    fn nodes() -> NodeTable {
        NodeTable::new()
    }

    fn random_graph(nodes: &mut NodeTable, edges: usize) -> PointsToGraph {
        let mut rng = rand::thread_rng();
        let mut g = PointsToGraph::new();
        for _ in 0..edges {
            let idx = nodes.index_id(IndexNode::new("m", format!("v{}", rng.gen_range(0..8))));
            let st = nodes.storage_id(&format!("s{}", rng.gen_range(0..8)));
            let cert = if rng.gen_bool(0.5) {
                Certainty::Definite
            } else {
                Certainty::Possible
            };
            g.add_reference(idx, st, cert);
        }
        g
    }

    #[test]
    fn single_definite_target_only() {
        let mut nodes = nodes();
        let a = nodes.index_id(IndexNode::new("m", "a"));
        let s1 = nodes.storage_id("s1");
        let s2 = nodes.storage_id("s2");

        let mut g = PointsToGraph::new();
        g.add_reference(a, s1, Certainty::Definite);
        assert_eq!(g.edge_certainty(a, s1), Some(Certainty::Definite));

        g.add_reference(a, s2, Certainty::Possible);
        assert_eq!(g.edge_certainty(a, s1), Some(Certainty::Possible));
        assert_eq!(g.edge_certainty(a, s2), Some(Certainty::Possible));
        assert_eq!(g.points_to(a), vec![s1, s2]);
    }

    #[test]
    fn join_is_monotone() {
        let mut nodes = nodes();
        let g1 = random_graph(&mut nodes, 12);
        let g2 = random_graph(&mut nodes, 12);

        let mut joined = g1.clone();
        joined.join(&g2);

        for g in [&g1, &g2] {
            for (idx, targets) in &g.references {
                for st in targets.keys() {
                    assert!(
                        joined.edge_certainty(*idx, *st).is_some(),
                        "join dropped an edge"
                    );
                }
            }
        }
    }

    #[test]
    fn join_is_idempotent() {
        let mut nodes = nodes();
        let pred = random_graph(&mut nodes, 12);
        let mut acc = pred.clone();

        let changed_once = acc.join(&pred);
        let snapshot = acc.clone();
        let changed_twice = acc.join(&pred);

        assert!(!changed_once);
        assert!(!changed_twice);
        assert_eq!(acc, snapshot);
    }

    #[test]
    fn definite_survives_only_agreement() {
        let mut nodes = nodes();
        let a = nodes.index_id(IndexNode::new("m", "a"));
        let b = nodes.index_id(IndexNode::new("m", "b"));
        let s = nodes.storage_id("s");

        let mut left = PointsToGraph::new();
        left.add_reference(a, s, Certainty::Definite);
        left.add_reference(b, s, Certainty::Definite);

        let mut right = PointsToGraph::new();
        right.add_reference(a, s, Certainty::Definite);

        left.join(&right);
        assert_eq!(left.edge_certainty(a, s), Some(Certainty::Definite));
        assert_eq!(left.edge_certainty(b, s), Some(Certainty::Possible));
    }

    #[test]
    fn kill_respects_abstract_storage() {
        let mut nodes = nodes();
        let a = nodes.index_id(IndexNode::new("m", "a"));
        let s = nodes.storage_id("s");

        let mut g = PointsToGraph::new();
        g.add_reference(a, s, Certainty::Definite);
        g.kill(a, true);
        assert_eq!(g.edge_certainty(a, s), Some(Certainty::Possible));

        g.kill(a, false);
        assert_eq!(g.points_to(a), Vec::<StorageNodeId>::new());
        assert!(!g.has_field(a));
    }

    #[test]
    fn possibly_null_downgrades_definite_edges() {
        let mut nodes = nodes();
        let a = nodes.index_id(IndexNode::new("m", "a"));
        let s = nodes.storage_id("s");

        let mut g = PointsToGraph::new();
        g.add_reference(a, s, Certainty::Definite);
        g.mark_possibly_null(a);
        assert!(g.is_possibly_null(a));
        assert_eq!(g.edge_certainty(a, s), Some(Certainty::Possible));
    }

    #[test]
    fn fields_of_groups_by_owner() {
        let mut nodes = nodes();
        let ax = nodes.index_id(IndexNode::new("arr", "x"));
        let ay = nodes.index_id(IndexNode::new("arr", "y"));
        let other = nodes.index_id(IndexNode::new("m", "z"));
        let arr = nodes.storage_id("arr");
        let s = nodes.storage_id("s");

        let mut g = PointsToGraph::new();
        g.add_reference(ax, s, Certainty::Definite);
        g.add_reference(other, s, Certainty::Definite);
        g.mark_possibly_null(ay);

        assert_eq!(g.fields_of(arr, &nodes), vec![ax, ay]);
    }
}
