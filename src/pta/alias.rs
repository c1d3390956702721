// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The concrete alias analysis: implements the whole-program hook contract
//! over per-context points-to graphs.
//!
//! Three graph slots exist per context: `ins` (block-entry facts), `outs`
//! (block-exit facts) and `binder` (the interprocedural call/return
//! staging area, kept separate so argument and return binding never
//! corrupt intraprocedural facts mid-computation). A transient working
//! graph carries the facts being mutated between `pull_finish` and
//! `aggregate_results`; each `aggregate_results` commits it wholesale as
//! the new `outs`, so structural equality is a meaningful fixed-point
//! test.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

use itertools::Itertools;
use log::{debug, info, trace};

use super::node::{IndexNode, IndexNodeId, NodeTable, StorageNodeId};
use super::points_to::PointsToGraph;
use crate::mir::context::{Context, ContextCache, ContextId};
use crate::mir::path::Path;
use crate::mir::{ActualArg, BlockId, Literal, RETURN_NAME, UNKNOWN};
use crate::wpa::{
    AbstractValue, Certainty, Conformance, HookSet, TypeSet, WpaAnalysis, WpaResult,
};

/// Call-string depth contexts are collapsed to by `merge_contexts`.
const MERGED_CALL_STRING_DEPTH: usize = 1;

#[derive(Default)]
struct Accumulator {
    graph: PointsToGraph,
    /// Whether any predecessor has been pulled into `graph`.
    pulled: bool,
}

pub struct AliasAnalysis {
    conformance: Conformance,
    nodes: NodeTable,
    contexts: ContextCache,
    /// Block-entry facts, one graph per context.
    ins: HashMap<ContextId, PointsToGraph>,
    /// Block-exit facts committed by `aggregate_results`.
    outs: HashMap<ContextId, PointsToGraph>,
    /// Interprocedural staging area written by `forward_bind`.
    binder: HashMap<ContextId, PointsToGraph>,
    /// Facts being mutated by the statement hooks of the current visit.
    working: HashMap<ContextId, PointsToGraph>,
    /// Pull-protocol accumulators, live between `pull_init` and
    /// `pull_finish`.
    accum: HashMap<ContextId, Accumulator>,
    changed_flags: HashMap<BlockId, bool>,
    /// Return-variable bindings staged by `forward_bind`, consumed by
    /// `backward_bind`. Keyed by caller context and callee method.
    pending_returns: HashMap<(ContextId, String), Rc<Path>>,
}

impl Debug for AliasAnalysis {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("AliasAnalysis")
    }
}

impl Default for AliasAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

/// Constructors and node interning.
impl AliasAnalysis {
    pub fn new() -> AliasAnalysis {
        Self::with_conformance(Conformance::Permissive)
    }

    pub fn with_conformance(conformance: Conformance) -> AliasAnalysis {
        AliasAnalysis {
            conformance,
            nodes: NodeTable::new(),
            contexts: ContextCache::new(),
            ins: HashMap::new(),
            outs: HashMap::new(),
            binder: HashMap::new(),
            working: HashMap::new(),
            accum: HashMap::new(),
            changed_flags: HashMap::new(),
            pending_returns: HashMap::new(),
        }
    }

    /// Interns the index node named by `path`, if `path` is addressable.
    pub fn index_node(&mut self, path: &Path) -> Option<IndexNodeId> {
        path.to_index_node().map(|node| self.nodes.index_id(node))
    }

    /// Interns the storage node named `name`.
    pub fn storage_node(&mut self, name: &str) -> StorageNodeId {
        self.nodes.storage_id(name)
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// The graph currently describing `cid`: the working graph while a
    /// block visit is in flight, otherwise the last committed solution.
    fn graph_at(&self, cid: ContextId) -> Option<&PointsToGraph> {
        self.working
            .get(&cid)
            .or_else(|| self.outs.get(&cid))
            .or_else(|| self.ins.get(&cid))
    }

    fn graph_mut(&mut self, cid: ContextId) -> &mut PointsToGraph {
        if !self.working.contains_key(&cid) {
            let base = self
                .outs
                .get(&cid)
                .cloned()
                .or_else(|| self.ins.get(&cid).cloned())
                .unwrap_or_default();
            self.working.insert(cid, base);
        }
        self.working.get_mut(&cid).unwrap()
    }

    fn query_graph(&self, cx: &Rc<Context>) -> Option<&PointsToGraph> {
        self.contexts.lookup(cx).and_then(|cid| self.graph_at(cid))
    }
}

/// The concrete graph-level operations the driver uses to model aliasing
/// statements.
impl AliasAnalysis {
    /// `lhs`'s pointer now targets whatever `rhs` targets, at certainty
    /// `cert` joined with each copied edge's own certainty. An `rhs`
    /// without targets leaves `lhs` possibly unbound.
    pub fn create_reference(
        &mut self,
        cx: &Rc<Context>,
        lhs: IndexNodeId,
        rhs: IndexNodeId,
        cert: Certainty,
    ) {
        let cid = self.contexts.get_context_id(cx);
        let (targets, rhs_null) = {
            let g = self.graph_mut(cid);
            (g.references_of(rhs, Certainty::PtgAll), g.is_possibly_null(rhs))
        };
        let g = self.graph_mut(cid);
        if targets.is_empty() || rhs_null {
            g.mark_possibly_null(lhs);
        }
        for (st, ecert) in targets {
            g.add_reference(lhs, st, cert.join(ecert));
        }
    }

    /// Binds `lhs` to target `storage` directly.
    pub fn assign_value(&mut self, cx: &Rc<Context>, lhs: IndexNodeId, storage: StorageNodeId) {
        let cid = self.contexts.get_context_id(cx);
        self.graph_mut(cid).add_reference(lhs, storage, Certainty::Definite);
    }

    /// Materializes or updates `storage`'s declared type set.
    pub fn set_storage(&mut self, cx: &Rc<Context>, storage: StorageNodeId, types: &TypeSet) {
        let cid = self.contexts.get_context_id(cx);
        self.graph_mut(cid).set_storage(storage, types);
    }

    /// Materializes a value node holding `value`, attached to `storage`.
    pub fn set_scalar(&mut self, cx: &Rc<Context>, storage: StorageNodeId, value: AbstractValue) {
        let cid = self.contexts.get_context_id(cx);
        self.graph_mut(cid).set_scalar(storage, value);
    }

    /// Marks `storage` as a summary of unboundedly many allocations, e.g.
    /// an allocation site inside a loop or recursion.
    pub fn set_abstract(&mut self, cx: &Rc<Context>, storage: StorageNodeId) {
        let cid = self.contexts.get_context_id(cx);
        self.graph_mut(cid).set_abstract(storage);
    }

    /// Removes `lhs`'s value binding. A kill on abstract storage only
    /// downgrades certainty; it never deletes the edge.
    pub fn kill_value(&mut self, cx: &Rc<Context>, lhs: IndexNodeId) {
        let cid = self.contexts.get_context_id(cx);
        let owner = self.nodes.try_owner_of(lhs);
        let g = self.graph_mut(cid);
        let owner_abstract = owner.map(|o| g.is_abstract(o)).unwrap_or(false);
        g.kill(lhs, owner_abstract);
    }

    /// Removes `lhs`'s outgoing reference edges, ahead of a reference
    /// assignment rebinding the name. Same kill rules as `kill_value`.
    pub fn kill_reference(&mut self, cx: &Rc<Context>, lhs: IndexNodeId) {
        self.kill_value(cx, lhs);
    }

    /// Marks `index` as possibly unbound: some predecessor path left it
    /// undefined. Applied to the pull accumulator while a pull sequence is
    /// in flight.
    pub fn pull_possible_null(&mut self, cx: &Rc<Context>, index: IndexNodeId) {
        let cid = self.contexts.get_context_id(cx);
        if let Some(acc) = self.accum.get_mut(&cid) {
            acc.graph.mark_possibly_null(index);
        } else {
            self.graph_mut(cid).mark_possibly_null(index);
        }
    }

    /// The approximation escape valve: collapses every tracked context
    /// onto its 1-limited call-string representative, joining all member
    /// graphs per slot. A storage node present in more than one member
    /// graph now summarizes several concrete allocations and becomes
    /// abstract. Invocation policy is left to the caller.
    pub fn merge_contexts(&mut self) {
        info!(
            "aliasing: merging contexts down to depth-{} call strings",
            MERGED_CALL_STRING_DEPTH
        );
        self.working.clear();
        self.accum.clear();

        let mut remap: HashMap<ContextId, ContextId> = HashMap::new();
        let all: Vec<Rc<Context>> = self.contexts.context_list().to_vec();
        for cx in &all {
            let old = self.contexts.get_context_id(cx);
            let rep = Context::suffix(cx, MERGED_CALL_STRING_DEPTH);
            let new = self.contexts.get_context_id(&rep);
            remap.insert(old, new);
        }

        self.ins = Self::merge_slot(&self.ins, &remap);
        self.outs = Self::merge_slot(&self.outs, &remap);
        self.binder = Self::merge_slot(&self.binder, &remap);

        let pending = std::mem::take(&mut self.pending_returns);
        self.pending_returns = pending
            .into_iter()
            .map(|((cid, method), path)| ((remap.get(&cid).copied().unwrap_or(cid), method), path))
            .collect();
    }

    fn merge_slot(
        slot: &HashMap<ContextId, PointsToGraph>,
        remap: &HashMap<ContextId, ContextId>,
    ) -> HashMap<ContextId, PointsToGraph> {
        let mut groups: HashMap<ContextId, Vec<&PointsToGraph>> = HashMap::new();
        for (cid, graph) in slot {
            groups.entry(remap[cid]).or_default().push(graph);
        }

        let mut result = HashMap::new();
        for (rep, members) in groups {
            let mut merged = members[0].clone();
            for member in &members[1..] {
                merged.join(member);
            }
            let mut occurrences: HashMap<StorageNodeId, usize> = HashMap::new();
            for member in &members {
                for st in member.storages.keys() {
                    *occurrences.entry(*st).or_default() += 1;
                }
            }
            for (st, n) in occurrences {
                if n > 1 {
                    merged.set_abstract(st);
                }
            }
            result.insert(rep, merged);
        }
        result
    }

    /// Renders every tracked context's solution.
    pub fn dump_everything(&self) -> String {
        self.contexts
            .context_list()
            .iter()
            .filter(|cx| {
                self.contexts
                    .lookup(cx)
                    .map(|cid| self.graph_at(cid).is_some() || self.binder.contains_key(&cid))
                    .unwrap_or(false)
            })
            .sorted_by_key(|cx| cx.to_string())
            .map(|cx| self.dump(cx))
            .join("")
    }
}

/// Read-only query API for downstream consumers. Valid only once the
/// queried context has reached its local fixed point; facts absent from
/// the graph yield empty results rather than errors.
impl AliasAnalysis {
    /// The reference edges leaving `index` whose certainty is admitted by
    /// `cert` (`PtgAll` admits everything).
    pub fn get_references(
        &self,
        cx: &Rc<Context>,
        index: IndexNodeId,
        cert: Certainty,
    ) -> Vec<(StorageNodeId, Certainty)> {
        self.query_graph(cx)
            .map(|g| g.references_of(index, cert))
            .unwrap_or_default()
    }

    /// The index nodes owned by `storage`.
    pub fn get_fields(&self, cx: &Rc<Context>, storage: StorageNodeId) -> Vec<IndexNodeId> {
        self.query_graph(cx)
            .map(|g| g.fields_of(storage, &self.nodes))
            .unwrap_or_default()
    }

    /// The storage nodes `index` may point to.
    pub fn get_points_to(&self, cx: &Rc<Context>, index: IndexNodeId) -> Vec<StorageNodeId> {
        self.query_graph(cx)
            .map(|g| g.points_to(index))
            .unwrap_or_default()
    }

    pub fn is_abstract(&self, cx: &Rc<Context>, storage: StorageNodeId) -> bool {
        self.query_graph(cx)
            .map(|g| g.is_abstract(storage))
            .unwrap_or(false)
    }

    /// Whether `index`'s owner storage is abstract.
    pub fn is_abstract_field(&self, cx: &Rc<Context>, index: IndexNodeId) -> bool {
        match self.nodes.try_owner_of(index) {
            Some(owner) => self.is_abstract(cx, owner),
            None => false,
        }
    }

    pub fn has_storage_node(&self, cx: &Rc<Context>, storage: StorageNodeId) -> bool {
        self.query_graph(cx)
            .map(|g| g.has_storage(storage))
            .unwrap_or(false)
    }

    pub fn has_field(&self, cx: &Rc<Context>, index: IndexNodeId) -> bool {
        self.query_graph(cx)
            .map(|g| g.has_field(index))
            .unwrap_or(false)
    }

    pub fn get_storage_nodes(&self, cx: &Rc<Context>) -> Vec<StorageNodeId> {
        self.query_graph(cx)
            .map(|g| g.storage_nodes())
            .unwrap_or_default()
    }

    /// The storage node owning `index`, if present in `cx`'s graph.
    pub fn get_owner(&self, cx: &Rc<Context>, index: IndexNodeId) -> Option<StorageNodeId> {
        let g = self.query_graph(cx)?;
        let owner = self.nodes.try_owner_of(index)?;
        if g.has_storage(owner) {
            Some(owner)
        } else {
            None
        }
    }
}

/// Canonical, id-independent form of a graph used for cross-instance
/// equality: two analyses fed identical hook sequences may still intern
/// nodes in different orders.
#[derive(PartialEq, Eq, Debug)]
struct CanonGraph {
    references: BTreeMap<(String, String), BTreeMap<String, Certainty>>,
    storages: BTreeMap<String, TypeSet>,
    values: BTreeMap<String, AbstractValue>,
    abstract_storages: BTreeSet<String>,
    possibly_null: BTreeSet<(String, String)>,
}

impl AliasAnalysis {
    fn canon(&self, g: &PointsToGraph) -> CanonGraph {
        let index_key = |idx: IndexNodeId| {
            let node = self.nodes.index(idx);
            (node.storage.clone(), node.name.clone())
        };
        CanonGraph {
            references: g
                .references
                .iter()
                .map(|(idx, targets)| {
                    (
                        index_key(*idx),
                        targets
                            .iter()
                            .map(|(st, c)| (self.nodes.storage(*st).name.clone(), *c))
                            .collect(),
                    )
                })
                .collect(),
            storages: g
                .storages
                .iter()
                .map(|(st, types)| (self.nodes.storage(*st).name.clone(), types.clone()))
                .collect(),
            values: g
                .values
                .iter()
                .map(|(st, v)| (self.nodes.storage(*st).name.clone(), v.clone()))
                .collect(),
            abstract_storages: g
                .abstract_storages
                .iter()
                .map(|st| self.nodes.storage(*st).name.clone())
                .collect(),
            possibly_null: g.possibly_null.iter().map(|idx| index_key(*idx)).collect(),
        }
    }

    fn slot_canon(
        &self,
        slot: &HashMap<ContextId, PointsToGraph>,
    ) -> HashMap<Rc<Context>, CanonGraph> {
        slot.iter()
            .filter_map(|(cid, g)| {
                self.contexts
                    .get_context(*cid)
                    .map(|cx| (cx, self.canon(g)))
            })
            .collect()
    }
}

impl WpaAnalysis for AliasAnalysis {
    fn name(&self) -> &str {
        "aliasing"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn implemented_hooks(&self) -> HookSet {
        HookSet::INIT
            | HookSet::FORWARD_BIND
            | HookSet::BACKWARD_BIND
            | HookSet::ASSIGN_UNKNOWN
            | HookSet::ASSIGN_UNKNOWN_TYPED
            | HookSet::ASSIGN_SCALAR
            | HookSet::ASSIGN_EMPTY_ARRAY
            | HookSet::ASSIGN_VALUE
            | HookSet::KILL_VALUE
            | HookSet::PULL_INIT
            | HookSet::PULL_FIRST_PRED
            | HookSet::PULL_PRED
            | HookSet::PULL_FINISH
            | HookSet::AGGREGATE_RESULTS
    }

    fn conformance(&self) -> Conformance {
        self.conformance
    }

    fn init(&mut self, outer: &Rc<Context>) -> WpaResult {
        debug!("aliasing: init context {}", outer);
        let cid = self.contexts.get_context_id(outer);
        let symtable = self.nodes.storage_id(outer.method());
        let mut g = PointsToGraph::new();
        g.set_storage(symtable, &TypeSet::new());
        self.working.insert(cid, g.clone());
        self.ins.insert(cid, g);
        Ok(())
    }

    fn forward_bind(
        &mut self,
        caller: &Rc<Context>,
        entry: &Rc<Context>,
        actuals: &[ActualArg],
        retval: Option<&Rc<Path>>,
    ) -> WpaResult {
        trace!("aliasing: forward_bind {} -> {}", caller, entry);
        let caller_cid = self.contexts.get_context_id(caller);
        let entry_cid = self.contexts.get_context_id(entry);

        // The callee starts from a snapshot of the caller's facts, staged
        // in the binder slot so intraprocedural state stays untouched.
        let mut binder = self.graph_at(caller_cid).cloned().unwrap_or_default();
        let callee_symtable = self.nodes.storage_id(entry.method());
        binder.set_storage(callee_symtable, &TypeSet::new());

        for actual in actuals {
            let formal_idx = self
                .nodes
                .index_id(IndexNode::new(entry.method(), actual.formal.clone()));
            let targets = match actual.arg.to_index_node() {
                Some(node) => {
                    let aidx = self.nodes.index_id(node);
                    binder.references_of(aidx, Certainty::PtgAll)
                }
                None => Vec::new(),
            };

            if targets.is_empty() {
                // Reading an undefined variable is permitted; the formal
                // starts out possibly unbound.
                binder.mark_possibly_null(formal_idx);
            } else if actual.by_ref {
                for (st, cert) in targets {
                    binder.add_reference(formal_idx, st, cert);
                }
            } else {
                // By copy: a fresh storage initialized from the actual's
                // targets, so writes through the formal stay local.
                let copy_st = self
                    .nodes
                    .storage_id(&format!("{}::{}", entry.method(), actual.formal));
                for (st, _) in &targets {
                    let types = binder.type_set(*st).cloned().unwrap_or_default();
                    binder.set_storage(copy_st, &types);
                    let value = binder.value(*st).cloned();
                    if let Some(value) = value {
                        binder.set_scalar(copy_st, value);
                    }
                }
                binder.add_reference(formal_idx, copy_st, Certainty::Definite);
            }
        }

        if let Some(rv) = retval {
            self.pending_returns
                .insert((caller_cid, entry.method().to_string()), rv.clone());
        }
        self.binder.insert(entry_cid, binder);
        Ok(())
    }

    fn backward_bind(&mut self, caller: &Rc<Context>, exit: &Rc<Context>) -> WpaResult {
        trace!("aliasing: backward_bind {} <- {}", caller, exit);
        let caller_cid = self.contexts.get_context_id(caller);
        let exit_cid = self.contexts.get_context_id(exit);
        let callee = exit.method().to_string();

        let exit_graph = self.graph_at(exit_cid).cloned().unwrap_or_default();
        let ret_idx = self
            .nodes
            .index_id(IndexNode::new(callee.clone(), RETURN_NAME));
        let ret_targets = exit_graph.references_of(ret_idx, Certainty::PtgAll);

        // The caller sees the callee's heap effects, but not its locals.
        let mut filtered = exit_graph;
        filtered
            .references
            .retain(|idx, _| self.nodes.index(*idx).storage != callee);
        filtered
            .possibly_null
            .retain(|idx| self.nodes.index(*idx).storage != callee);
        if let Some(st) = self.nodes.try_storage_id(&callee) {
            filtered.storages.remove(&st);
            filtered.values.remove(&st);
            filtered.abstract_storages.remove(&st);
        }

        let rv_idx = self
            .pending_returns
            .get(&(caller_cid, callee))
            .cloned()
            .and_then(|p| p.to_index_node())
            .map(|n| self.nodes.index_id(n));

        let g = self.graph_mut(caller_cid);
        g.join(&filtered);
        if let Some(ridx) = rv_idx {
            if ret_targets.is_empty() {
                g.mark_possibly_null(ridx);
            }
            for (st, cert) in ret_targets {
                g.add_reference(ridx, st, cert);
            }
        }
        Ok(())
    }

    fn assign_unknown(&mut self, cx: &Rc<Context>, name: &Rc<Path>, cert: Certainty) -> WpaResult {
        let idx = match self.index_node(name) {
            Some(idx) => idx,
            None => return Ok(()),
        };
        let st = self.nodes.storage_id(UNKNOWN);
        let cid = self.contexts.get_context_id(cx);
        let g = self.graph_mut(cid);
        g.set_abstract(st);
        g.set_scalar(st, AbstractValue::Unknown);
        g.add_reference(idx, st, cert);
        Ok(())
    }

    fn assign_unknown_typed(
        &mut self,
        cx: &Rc<Context>,
        name: &Rc<Path>,
        types: &TypeSet,
        cert: Certainty,
    ) -> WpaResult {
        let idx = match self.index_node(name) {
            Some(idx) => idx,
            None => return Ok(()),
        };
        let st = self
            .nodes
            .storage_id(&format!("*<{}>", types.iter().join(",")));
        let cid = self.contexts.get_context_id(cx);
        let g = self.graph_mut(cid);
        g.set_storage(st, types);
        g.set_abstract(st);
        g.set_scalar(st, AbstractValue::Unknown);
        g.add_reference(idx, st, cert);
        Ok(())
    }

    fn assign_scalar(
        &mut self,
        cx: &Rc<Context>,
        lhs: &Rc<Path>,
        rhs: &Literal,
        cert: Certainty,
    ) -> WpaResult {
        let idx = match self.index_node(lhs) {
            Some(idx) => idx,
            None => return Ok(()),
        };
        let st = self.nodes.storage_id(&format!("VAL::{}", rhs));
        let cid = self.contexts.get_context_id(cx);
        let g = self.graph_mut(cid);
        g.set_storage(st, &TypeSet::from([literal_type(rhs).to_string()]));
        g.set_scalar(st, AbstractValue::Lit(rhs.clone()));
        g.add_reference(idx, st, cert);
        Ok(())
    }

    fn assign_empty_array(
        &mut self,
        cx: &Rc<Context>,
        lhs: &Rc<Path>,
        unique_name: &str,
        cert: Certainty,
    ) -> WpaResult {
        let idx = match self.index_node(lhs) {
            Some(idx) => idx,
            None => return Ok(()),
        };
        let st = self.nodes.storage_id(unique_name);
        let cid = self.contexts.get_context_id(cx);
        let g = self.graph_mut(cid);
        g.set_storage(st, &TypeSet::from(["Array".to_string()]));
        g.add_reference(idx, st, cert);
        Ok(())
    }

    fn assign_value(
        &mut self,
        cx: &Rc<Context>,
        lhs: &Rc<Path>,
        rhs: &Rc<Path>,
        cert: Certainty,
    ) -> WpaResult {
        let (lhs, rhs) = match (self.index_node(lhs), self.index_node(rhs)) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(()),
        };
        self.create_reference(cx, lhs, rhs, cert);
        Ok(())
    }

    fn kill_value(&mut self, cx: &Rc<Context>, name: &Rc<Path>) -> WpaResult {
        if let Some(idx) = self.index_node(name) {
            self.kill_value(cx, idx);
        }
        Ok(())
    }

    fn pull_init(&mut self, cx: &Rc<Context>) -> WpaResult {
        let cid = self.contexts.get_context_id(cx);
        self.accum.insert(cid, Accumulator::default());
        Ok(())
    }

    fn pull_first_pred(&mut self, cx: &Rc<Context>, pred: &Rc<Context>) -> WpaResult {
        let cid = self.contexts.get_context_id(cx);
        let pcid = self.contexts.get_context_id(pred);
        let graph = self.outs.get(&pcid).cloned().unwrap_or_default();
        self.accum.insert(cid, Accumulator { graph, pulled: true });
        Ok(())
    }

    fn pull_pred(&mut self, cx: &Rc<Context>, pred: &Rc<Context>) -> WpaResult {
        let cid = self.contexts.get_context_id(cx);
        let pcid = self.contexts.get_context_id(pred);
        let pred_graph = self.outs.get(&pcid).cloned().unwrap_or_default();
        let acc = self.accum.entry(cid).or_default();
        acc.graph.join(&pred_graph);
        acc.pulled = true;
        Ok(())
    }

    fn pull_finish(&mut self, cx: &Rc<Context>) -> WpaResult {
        let cid = self.contexts.get_context_id(cx);
        let ins_graph = match self.accum.remove(&cid) {
            Some(acc) if acc.pulled => acc.graph,
            other => {
                // No predecessors pulled: entry blocks take their facts
                // from the binder; contexts seeded by `init` keep them.
                if let Some(binder) = self.binder.get(&cid) {
                    binder.clone()
                } else if let Some(seeded) = self.ins.get(&cid) {
                    seeded.clone()
                } else {
                    other.map(|acc| acc.graph).unwrap_or_default()
                }
            }
        };
        self.working.insert(cid, ins_graph.clone());
        self.ins.insert(cid, ins_graph);
        Ok(())
    }

    fn aggregate_results(&mut self, cx: &Rc<Context>) -> WpaResult {
        let cid = self.contexts.get_context_id(cx);
        let g = match self.working.remove(&cid) {
            Some(g) => g,
            None => self.ins.get(&cid).cloned().unwrap_or_default(),
        };
        let changed = self.outs.get(&cid) != Some(&g);
        if changed {
            debug!("aliasing: solution changed at {}", cx);
        }
        self.changed_flags.insert(cx.block(), changed);
        self.outs.insert(cid, g);
        Ok(())
    }

    fn solution_changed(&self, block: BlockId) -> bool {
        self.changed_flags.get(&block).copied().unwrap_or(false)
    }

    fn equals(&self, other: &dyn WpaAnalysis) -> bool {
        let other = match other.as_any().downcast_ref::<AliasAnalysis>() {
            Some(other) => other,
            None => return false,
        };
        self.slot_canon(&self.ins) == other.slot_canon(&other.ins)
            && self.slot_canon(&self.outs) == other.slot_canon(&other.outs)
            && self.slot_canon(&self.binder) == other.slot_canon(&other.binder)
    }

    fn dump(&self, cx: &Rc<Context>) -> String {
        let mut out = format!("=== aliasing: {} ===\n", cx);
        if let Some(cid) = self.contexts.lookup(cx) {
            for (label, slot) in [("ins", &self.ins), ("outs", &self.outs), ("binder", &self.binder)]
            {
                if let Some(g) = slot.get(&cid) {
                    out.push_str(&format!("{}:\n{}", label, g.dump(&self.nodes)));
                }
            }
        }
        out
    }
}

fn literal_type(lit: &Literal) -> &'static str {
    match lit {
        Literal::Int(_) => "Int",
        Literal::Str(_) => "Str",
        Literal::Bool(_) => "Bool",
        Literal::Null => "Null",
    }
}
