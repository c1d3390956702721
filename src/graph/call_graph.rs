// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The whole-program callgraph, built as a side effect of interprocedural
//! propagation: every `forward_bind` records a caller→callee edge.
//!
//! Calls whose bodies are never analyzed (builtins, signature-only
//! methods) enter through [`Callgraph::add_summary_call`] so the graph
//! still covers them.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use itertools::Itertools;
use log::trace;
use petgraph::graph::{DefaultIx, Graph, NodeIndex};

use crate::mir::context::Context;
use crate::mir::path::Path;
use crate::mir::{ActualArg, BlockId, MAIN_METHOD};
use crate::wpa::{HookSet, WpaAnalysis, WpaResult};

/// Unique identifiers for callgraph nodes.
pub type CGNodeId = NodeIndex<DefaultIx>;

pub struct Callgraph {
    /// The graph structure capturing call relationships. Node weights are
    /// method names; edges are unlabelled and deduplicated.
    graph: Graph<String, ()>,
    /// A map from method names to their corresponding callgraph nodes.
    method_nodes: HashMap<String, CGNodeId>,
    changed_flags: HashMap<BlockId, bool>,
}

impl Default for Callgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Callgraph {
    /// An empty callgraph containing only the outermost method.
    pub fn new() -> Callgraph {
        let mut cg = Callgraph {
            graph: Graph::new(),
            method_nodes: HashMap::new(),
            changed_flags: HashMap::new(),
        };
        cg.get_or_insert_node(MAIN_METHOD);
        cg
    }

    fn get_or_insert_node(&mut self, method: &str) -> CGNodeId {
        match self.method_nodes.entry(method.to_string()) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => *v.insert(self.graph.add_node(method.to_string())),
        }
    }

    /// Records a call from `caller` to `callee`, inserting either method
    /// on first sight. Returns whether the graph grew.
    pub fn add_call_edge(&mut self, caller: &str, callee: &str) -> bool {
        let caller_node = self.get_or_insert_node(caller);
        let callee_node = self.get_or_insert_node(callee);
        if self.graph.contains_edge(caller_node, callee_node) {
            false
        } else {
            trace!("callgraph: {} -> {}", caller, callee);
            self.graph.add_edge(caller_node, callee_node, ());
            true
        }
    }

    /// Records a call to a method whose body is unknown.
    pub fn add_summary_call(&mut self, cx: &Rc<Context>, callee: &str) {
        let grew = self.add_call_edge(cx.method(), callee);
        self.changed_flags.insert(cx.block(), grew);
    }

    /// Every method seen so far, lexicographically ordered.
    pub fn methods(&self) -> Vec<&str> {
        self.method_nodes.keys().map(String::as_str).sorted().collect()
    }

    /// Every method seen so far, as owned names.
    pub fn get_called_methods(&self) -> Vec<String> {
        self.methods().into_iter().map(str::to_string).collect()
    }

    /// The distinct callees of `caller`, lexicographically ordered.
    pub fn calls(&self, caller: &str) -> Vec<String> {
        match self.method_nodes.get(caller) {
            Some(node) => self
                .graph
                .neighbors(*node)
                .map(|n| self.graph[n].clone())
                .sorted()
                .dedup()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Methods reachable from the outermost method, ordered so that
    /// callees generally precede their callers.
    ///
    /// Breadth-first from `__MAIN__`, pushing each newly discovered
    /// method to the front of the result. Cycles terminate via the seen
    /// set; methods on a cycle have no meaningful relative order.
    pub fn bottom_up(&self) -> Vec<String> {
        let mut result: VecDeque<String> = VecDeque::new();
        let mut worklist: VecDeque<String> = VecDeque::from([MAIN_METHOD.to_string()]);
        let mut seen: HashSet<String> = HashSet::new();

        while let Some(method) = worklist.pop_front() {
            if !seen.insert(method.clone()) {
                continue;
            }
            // Front insertion is what makes the order bottom-up.
            result.push_front(method.clone());
            for callee in self.calls(&method) {
                worklist.push_back(callee);
            }
        }
        result.into()
    }

    fn edge_set(&self) -> BTreeSet<(&str, &str)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].as_str(), self.graph[b].as_str()))
            .collect()
    }

    /// Renders the callgraph for Graphviz. Deterministic: methods and
    /// their edges come out lexicographically ordered.
    pub fn dump_graphviz(&self, title: &str) -> String {
        let mut out = String::new();
        out.push_str("digraph G {\n");
        out.push_str("graph [labelloc=t];\n");
        out.push_str(&format!("graph [label=\"Callgraph: {}\"];\n", title));
        for method in self.methods() {
            out.push_str(&format!("\"{}\";\n", method));
            for callee in self.calls(method) {
                out.push_str(&format!("\"{}\" -> \"{}\";\n", method, callee));
            }
        }
        out.push_str("}\n");
        out
    }
}

impl WpaAnalysis for Callgraph {
    fn name(&self) -> &str {
        "callgraph"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn implemented_hooks(&self) -> HookSet {
        HookSet::FORWARD_BIND
    }

    fn forward_bind(
        &mut self,
        caller: &Rc<Context>,
        entry: &Rc<Context>,
        _actuals: &[ActualArg],
        _retval: Option<&Rc<Path>>,
    ) -> WpaResult {
        let grew = self.add_call_edge(caller.method(), entry.method());
        self.changed_flags.insert(caller.block(), grew);
        Ok(())
    }

    fn solution_changed(&self, block: BlockId) -> bool {
        self.changed_flags.get(&block).copied().unwrap_or(false)
    }

    fn equals(&self, other: &dyn WpaAnalysis) -> bool {
        let other = match other.as_any().downcast_ref::<Callgraph>() {
            Some(other) => other,
            None => return false,
        };
        self.methods() == other.methods() && self.edge_set() == other.edge_set()
    }

    fn dump(&self, cx: &Rc<Context>) -> String {
        self.dump_graphviz(&cx.block().to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seeded_with_the_outermost_method() {
        let cg = Callgraph::new();
        assert_eq!(cg.methods(), vec![MAIN_METHOD]);
        assert_eq!(cg.bottom_up(), vec![MAIN_METHOD.to_string()]);
    }

    #[test]
    fn call_edges_are_idempotent() {
        let mut cg = Callgraph::new();
        assert!(cg.add_call_edge(MAIN_METHOD, "f"));
        assert!(!cg.add_call_edge(MAIN_METHOD, "f"));
        assert_eq!(cg.calls(MAIN_METHOD), vec!["f".to_string()]);
        assert_eq!(cg.methods(), vec![MAIN_METHOD, "f"]);
    }

    #[test]
    fn bottom_up_puts_callees_before_callers() {
        let mut cg = Callgraph::new();
        cg.add_call_edge(MAIN_METHOD, "f");
        cg.add_call_edge(MAIN_METHOD, "h");
        cg.add_call_edge("f", "g");

        let order = cg.bottom_up();
        let pos = |m: &str| order.iter().position(|x| x == m).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("g") < pos("f"));
        assert!(pos("f") < pos(MAIN_METHOD));
        assert!(pos("h") < pos(MAIN_METHOD));
    }

    #[test]
    fn bottom_up_terminates_on_cycles() {
        // Mutual recursion, including a cycle back to the entry point.
        let mut cg = Callgraph::new();
        cg.add_call_edge(MAIN_METHOD, "f");
        cg.add_call_edge("f", "g");
        cg.add_call_edge("g", "f");
        cg.add_call_edge("g", MAIN_METHOD);

        let order = cg.bottom_up();
        assert_eq!(order.len(), 3);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec![MAIN_METHOD.to_string(), "f".to_string(), "g".to_string()]);
    }

    #[test]
    fn bottom_up_covers_every_recorded_method_once() {
        let mut cg = Callgraph::new();
        cg.add_call_edge(MAIN_METHOD, "f");
        cg.add_call_edge(MAIN_METHOD, "g");
        cg.add_call_edge("f", "h");
        cg.add_call_edge("g", "h");

        let order = cg.bottom_up();
        let mut sorted = order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), order.len());
        assert_eq!(sorted, cg.get_called_methods());
    }

    #[test]
    fn forward_bind_records_the_call_and_flags_growth() {
        let mut cg = Callgraph::new();
        let caller = Context::outer(BlockId(3));
        let entry = Context::contextual(&caller, "f", BlockId(10));

        cg.forward_bind(&caller, &entry, &[], None).unwrap();
        assert!(cg.solution_changed(BlockId(3)));
        assert_eq!(cg.calls(MAIN_METHOD), vec!["f".to_string()]);

        // Re-recording a known call is not growth.
        cg.forward_bind(&caller, &entry, &[], None).unwrap();
        assert!(!cg.solution_changed(BlockId(3)));
    }

    #[test]
    fn summary_calls_cover_unanalyzed_bodies() {
        let mut cg = Callgraph::new();
        let cx = Context::outer(BlockId(1));
        cg.add_summary_call(&cx, "strlen");
        assert!(cg.solution_changed(BlockId(1)));
        assert_eq!(cg.calls(MAIN_METHOD), vec!["strlen".to_string()]);
    }

    #[test]
    fn equality_is_structural() {
        let mut a = Callgraph::new();
        a.add_call_edge(MAIN_METHOD, "f");
        a.add_call_edge("f", "g");

        // Same relation, different insertion order.
        let mut b = Callgraph::new();
        b.add_call_edge("f", "g");
        b.add_call_edge(MAIN_METHOD, "f");
        assert!(a.equals(&b));
        assert!(b.equals(&a));

        b.add_call_edge("g", "h");
        assert!(!a.equals(&b));
    }

    #[test]
    fn graphviz_dump_shape() {
        let mut cg = Callgraph::new();
        cg.add_call_edge(MAIN_METHOD, "f");
        let expected = "digraph G {\n\
                        graph [labelloc=t];\n\
                        graph [label=\"Callgraph: test\"];\n\
                        \"__MAIN__\";\n\
                        \"__MAIN__\" -> \"f\";\n\
                        \"f\";\n\
                        }\n";
        assert_eq!(cg.dump_graphviz("test"), expected);
    }
}
