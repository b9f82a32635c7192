//! Compiler from process map expressions to process graphs.
//!
//! Compilation is a single recursive pass memoized by expression identity, so
//! a sub-expression referenced from several places is compiled once and its
//! nodes are reused wherever it appears.

use crate::algebra::{ExprKind, ProcessMap};
use crate::graph::{self, Edge, Graph, NodeKind};
use processmap_core::{ExprId, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

/// Compile a process map into a graph
#[must_use]
pub fn compile(expr: &ProcessMap) -> Graph {
    Compiler::new().compile(expr).graph
}

/// Output from compiling a process map
#[derive(Debug, Clone)]
pub struct CompilerOutput {
    /// The compiled graph
    pub graph: Graph,
    /// Compilation statistics
    pub stats: CompileStats,
}

/// Counters collected during one compilation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Distinct expressions compiled
    pub expressions: usize,
    /// Lookups answered from the memo table
    pub memo_hits: usize,
    /// Nodes allocated
    pub nodes_allocated: usize,
}

/// One-shot compiler state
///
/// Holds the node counter and the memo table for a single compilation. Both
/// are discarded when `compile` returns.
pub struct Compiler {
    /// Next node ID counter
    next_id: NodeId,
    /// Compiled subgraph per expression
    memo: HashMap<ExprId, Arc<Graph>>,
    stats: CompileStats,
}

impl Compiler {
    /// Create a new compiler
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: NodeId::from_raw(0),
            memo: HashMap::new(),
            stats: CompileStats::default(),
        }
    }

    /// Compile a process map into a graph
    #[must_use]
    pub fn compile(mut self, expr: &ProcessMap) -> CompilerOutput {
        let span = debug_span!("compile", root = %expr.id());
        let _enter = span.enter();

        let root = self.compile_cached(expr);
        self.memo.clear();
        let graph = Arc::unwrap_or_clone(root);

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            start = graph.start().len(),
            end = graph.end().len(),
            memo_hits = self.stats.memo_hits,
            "compiled process map"
        );

        CompilerOutput {
            graph,
            stats: self.stats,
        }
    }

    fn compile_cached(&mut self, expr: &ProcessMap) -> Arc<Graph> {
        if let Some(graph) = self.memo.get(&expr.id()) {
            trace!(expr = %expr.id(), "memo hit");
            self.stats.memo_hits += 1;
            return Arc::clone(graph);
        }

        let graph = Arc::new(self.compile_expr(expr));
        self.stats.expressions += 1;
        self.memo.insert(expr.id(), Arc::clone(&graph));
        graph
    }

    fn compile_expr(&mut self, expr: &ProcessMap) -> Graph {
        trace!(expr = %expr.id(), label = %expr.label(), "compiling");
        match expr.kind() {
            ExprKind::Process { name, duration } => {
                let start = self.next_node_id();
                let end = self.next_node_id();
                Graph::activity(start, end, name, *duration)
            }
            ExprKind::Seq(a, b) => {
                let a = self.compile_cached(a);
                let b = self.compile_cached(b);
                compile_seq(&a, &b)
            }
            ExprKind::Union(a, b) => {
                let a = self.compile_cached(a);
                let b = self.compile_cached(b);
                compile_union(&a, &b)
            }
            ExprKind::Request(resource) => Graph::single(
                self.next_node_id(),
                NodeKind::Request {
                    resource: resource.clone(),
                },
            ),
            ExprKind::Release(resource) => Graph::single(
                self.next_node_id(),
                NodeKind::Release {
                    resource: resource.clone(),
                },
            ),
            ExprKind::WithResources { expansion, .. } => {
                Arc::unwrap_or_clone(self.compile_cached(expansion))
            }
        }
    }

    /// Generate the next node ID
    fn next_node_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id = id.next();
        self.stats.nodes_allocated += 1;
        id
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Link every exit of `a` to every entry of `b`
fn compile_seq(a: &Graph, b: &Graph) -> Graph {
    let mut graph = Graph::overlay(a, b);
    for from in &a.end {
        for to in &b.start {
            graph.edges.insert(Edge::dependency(*from, *to));
        }
    }
    graph.start = a.start.clone();
    graph.end = b.end.clone();
    graph
}

/// Overlay both sides; frontier nodes that became edge targets (or sources)
/// in the merged edge set drop out of the start (or end) frontier
fn compile_union(a: &Graph, b: &Graph) -> Graph {
    let mut merged = Graph::overlay(a, b);
    let targets = merged.edges.iter().map(|e| e.to).collect();
    let origins = merged.edges.iter().map(|e| e.from).collect();
    merged.start = graph::frontier(graph::union(&a.start, &b.start), &targets);
    merged.end = graph::frontier(graph::union(&a.end, &b.end), &origins);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use crate::resource::Resource;
    use indexmap::IndexSet;
    use petgraph::algo::is_isomorphic_matching;
    use processmap_core::{CoreError, Ticks};

    fn p(name: &str, duration: u64) -> ProcessMap {
        ProcessMap::process(name, duration)
    }

    /// Isomorphism on node kind, frontier membership and edge kind
    fn isomorphic(a: &Graph, b: &Graph) -> bool {
        let label = |graph: &Graph| {
            graph.to_petgraph().map(
                |_, (id, kind)| (kind.clone(), graph.start().contains(id), graph.end().contains(id)),
                |_, kind| kind.clone(),
            )
        };
        let (x, y) = (label(a), label(b));
        x.node_count() == y.node_count()
            && x.edge_count() == y.edge_count()
            && is_isomorphic_matching(&x, &y, |n, m| n == m, |e, f| e == f)
    }

    /// Hand-built expected graph: process edges as (from, to, name, duration)
    /// and dependency edges as (from, to), over process nodes 0..n
    fn expected(
        n: u64,
        processes: &[(u64, u64, &str, u64)],
        dependencies: &[(u64, u64)],
        start: &[u64],
        end: &[u64],
    ) -> Graph {
        let id = NodeId::from_raw;
        Graph {
            nodes: (0..n).map(|i| (id(i), NodeKind::Process)).collect(),
            edges: processes
                .iter()
                .map(|&(f, t, name, d)| Edge::process(id(f), id(t), name, Ticks::from_raw(d)))
                .chain(dependencies.iter().map(|&(f, t)| Edge::dependency(id(f), id(t))))
                .collect(),
            start: start.iter().map(|&i| id(i)).collect(),
            end: end.iter().map(|&i| id(i)).collect(),
        }
    }

    #[test]
    fn test_compiler_new() {
        let compiler = Compiler::new();
        assert_eq!(compiler.next_id, NodeId::from_raw(0));
        assert!(compiler.memo.is_empty());
    }

    #[test]
    fn test_compile_process() {
        let graph = compile(&p("test", 1));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.start().len(), 1);
        assert_eq!(graph.end().len(), 1);
        assert_ne!(graph.start(), graph.end());

        assert!(isomorphic(&graph, &expected(2, &[(0, 1, "test", 1)], &[], &[0], &[1])));
        assert!(!isomorphic(&graph, &expected(2, &[(0, 1, "test", 2)], &[], &[0], &[1])));
    }

    #[test]
    fn test_compile_nested_seq() {
        let s = (&p("A", 1) >> &p("B", 3) >> &p("E", 5)).unwrap();
        let graph = compile(&s);

        assert_eq!(graph.process_edges().count(), 3);
        assert_eq!(graph.dependency_edges().count(), 2);
        assert!(isomorphic(
            &graph,
            &expected(
                6,
                &[(0, 1, "A", 1), (2, 3, "B", 3), (4, 5, "E", 5)],
                &[(1, 2), (3, 4)],
                &[0],
                &[5],
            )
        ));
    }

    #[test]
    fn test_seq_frontiers_and_links() {
        let a = (&p("A", 1) | &p("B", 1)).unwrap();
        let b = (&p("C", 1) | &p("D", 1)).unwrap();
        let graph = compile(&(&a >> &b).unwrap());

        let activity = |name: &str| {
            graph
                .process_edges()
                .find(|e| matches!(&e.kind, EdgeKind::Process { name: n, .. } if n == name))
                .cloned()
                .unwrap()
        };
        let (pa, pb) = (activity("A"), activity("B"));
        let (pc, pd) = (activity("C"), activity("D"));

        assert_eq!(graph.start(), &IndexSet::from([pa.from, pb.from]));
        assert_eq!(graph.end(), &IndexSet::from([pc.to, pd.to]));

        // every exit of a precedes every entry of b
        assert_eq!(graph.dependency_edges().count(), 4);
        for exit in [pa.to, pb.to] {
            for entry in [pc.from, pd.from] {
                assert!(graph.edges().contains(&Edge::dependency(exit, entry)));
            }
        }
    }

    #[test]
    fn test_union_same_process() {
        let a = p("A", 1);
        assert!(isomorphic(&compile(&(&a | &a).unwrap()), &compile(&a)));
    }

    #[test]
    fn test_union_different_process() {
        let graph = compile(&(&p("A", 4) | &p("B", 9)).unwrap());
        assert!(isomorphic(
            &graph,
            &expected(4, &[(0, 1, "A", 4), (2, 3, "B", 9)], &[], &[0, 2], &[1, 3])
        ));
    }

    #[test]
    fn test_union_similar_process_not_merged() {
        let graph = compile(&(&p("A", 1) | &p("A", 1)).unwrap());
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.start().len(), 2);
        assert_eq!(graph.end().len(), 2);
    }

    #[test]
    fn test_union_process_overlaps_seq() {
        let x = p("B", 1);
        let y = (&p("A", 1) >> &x >> &p("C", 1)).unwrap();
        let reference = compile(&y);
        assert!(isomorphic(&compile(&(&x | &y).unwrap()), &reference));
        assert!(isomorphic(&compile(&(&y | &x).unwrap()), &reference));
    }

    #[test]
    fn test_union_process_doesnt_overlap_seq() {
        let x = p("X", 1);
        let y = (&p("A", 1) >> &p("B", 1) >> &p("C", 1)).unwrap();
        let expect = expected(
            8,
            &[(0, 1, "A", 1), (2, 3, "B", 1), (4, 5, "C", 1), (6, 7, "X", 1)],
            &[(1, 2), (3, 4)],
            &[0, 6],
            &[5, 7],
        );
        assert!(isomorphic(&compile(&(&x | &y).unwrap()), &expect));
        assert!(isomorphic(&compile(&(&y | &x).unwrap()), &expect));
    }

    #[test]
    fn test_union_seqs_without_overlap() {
        let x = (&p("A", 1) >> &p("B", 1) >> &p("C", 1)).unwrap();
        let y = (&p("D", 1) >> &p("E", 1) >> &p("F", 1)).unwrap();
        let expect = expected(
            12,
            &[
                (0, 1, "A", 1),
                (2, 3, "B", 1),
                (4, 5, "C", 1),
                (6, 7, "D", 1),
                (8, 9, "E", 1),
                (10, 11, "F", 1),
            ],
            &[(1, 2), (3, 4), (7, 8), (9, 10)],
            &[0, 6],
            &[5, 11],
        );
        assert!(isomorphic(&compile(&(&x | &y).unwrap()), &expect));
        assert!(isomorphic(&compile(&(&y | &x).unwrap()), &expect));
    }

    #[test]
    fn test_union_fully_disjoint_nested() {
        let graph = compile(&(&p("A", 4) | &p("B", 9) | &p("C", 10)).unwrap());
        assert!(isomorphic(
            &graph,
            &expected(
                6,
                &[(0, 1, "A", 4), (2, 3, "B", 9), (4, 5, "C", 10)],
                &[],
                &[0, 2, 4],
                &[1, 3, 5],
            )
        ));
    }

    #[test]
    fn test_union_partially_disjoint() {
        let b = p("B", 1);
        let x = (&p("A", 1) >> &b >> &p("C", 1)).unwrap();
        let y = (&p("D", 1) >> &b >> &p("E", 1)).unwrap();
        // a: 0-1, b: 2-3, c: 4-5, d: 6-7, e: 8-9
        let expect = expected(
            10,
            &[
                (0, 1, "A", 1),
                (2, 3, "B", 1),
                (4, 5, "C", 1),
                (6, 7, "D", 1),
                (8, 9, "E", 1),
            ],
            &[(1, 2), (3, 4), (7, 2), (3, 8)],
            &[0, 6],
            &[5, 9],
        );
        assert!(isomorphic(&compile(&(&x | &y).unwrap()), &expect));
        assert!(isomorphic(&compile(&(&y | &x).unwrap()), &expect));
    }

    #[test]
    fn test_compile_request() {
        let ship = Resource::new("ship");
        let graph = compile(&ProcessMap::request(&ship));

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        let node = *graph.start().first().unwrap();
        assert_eq!(graph.start(), &IndexSet::from([node]));
        assert_eq!(graph.end(), &IndexSet::from([node]));
        assert_eq!(graph.get_node(node), Some(&NodeKind::Request { resource: ship }));
    }

    #[test]
    fn test_compile_release() {
        let ship = Resource::new("ship");
        let graph = compile(&ProcessMap::release(&ship));
        assert_eq!(graph.releases(&ship).len(), 1);
        assert_eq!(graph.start(), graph.end());
    }

    #[test]
    fn test_using_single_process() {
        let ship = Resource::new("ship");
        let crew = Resource::new("crew");
        let sail = p("Sail", 1);
        let graph = compile(&sail.using(&[ship.clone(), crew.clone()]).unwrap());

        let ship_req = graph.requests(&ship)[0];
        let crew_req = graph.requests(&crew)[0];
        let ship_rel = graph.releases(&ship)[0];
        let crew_rel = graph.releases(&crew)[0];

        assert_eq!(graph.start(), &IndexSet::from([ship_req, crew_req]));
        // last acquired, first released
        assert_eq!(graph.end(), &IndexSet::from([crew_rel, ship_rel]));

        let activity = graph.process_edges().next().unwrap();
        assert_eq!(
            activity.kind,
            EdgeKind::Process {
                name: "Sail".to_string(),
                duration: Ticks::from_raw(1)
            }
        );
        for request in [ship_req, crew_req] {
            assert!(graph.edges().contains(&Edge::dependency(request, activity.from)));
        }
        for release in [crew_rel, ship_rel] {
            assert!(graph.edges().contains(&Edge::dependency(activity.to, release)));
        }
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 5);
    }

    #[test]
    fn test_shared_expression_compiled_once() {
        let b = p("B", 1);
        let x = (&p("A", 1) >> &b).unwrap();
        let y = (&p("D", 1) >> &b).unwrap();
        let output = Compiler::new().compile(&(&x | &y).unwrap());

        // b is reached through both sides but allocated once
        assert_eq!(output.stats.memo_hits, 1);
        assert_eq!(output.stats.nodes_allocated, 6);
        assert_eq!(output.graph.node_count(), 6);
        assert_eq!(output.stats.expressions, 6);
    }

    #[test]
    fn test_simultaneous_single_entry_and_exit() {
        let graph = compile(&ProcessMap::simultaneous([p("A", 2), p("B", 3), p("C", 1)]).unwrap());
        assert_eq!(graph.start().len(), 1);
        assert_eq!(graph.end().len(), 1);
        // two idle spacers plus three branches
        assert_eq!(graph.process_edges().count(), 5);
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_compile_is_fresh_per_call() {
        let a = p("A", 1);
        let first = compile(&a);
        let second = compile(&a);
        assert_eq!(first, second);
    }

    #[test]
    fn test_compile_with_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("processmap_plan=trace")
            .with_test_writer()
            .try_init();
        let b = p("B", 1);
        let graph = compile(&((&p("A", 1) >> &b) | &b).unwrap());
        assert_eq!(graph.start().len(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Leaf(u64),
            Seq(usize, usize),
            Union(usize, usize),
            Using(usize),
            Flip(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u64..5).prop_map(Op::Leaf),
                (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Seq(a, b)),
                (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Union(a, b)),
                any::<usize>().prop_map(Op::Using),
                any::<usize>().prop_map(Op::Flip),
            ]
        }

        /// Interpret ops over a growing pool so later ops reuse earlier
        /// handles, producing shared sub-expressions
        ///
        /// `Flip` reverses a sequence and checks that merging it with the
        /// original is rejected as circular.
        fn build(ops: &[Op]) -> Result<ProcessMap, TestCaseError> {
            let resource = Resource::new("quay");
            let mut pool = vec![p("seed", 1)];
            for (i, op) in ops.iter().enumerate() {
                let pick = |k: usize| pool[k % pool.len()].clone();
                let next = match op {
                    Op::Leaf(d) => Some(p(&format!("P{}", i), *d)),
                    Op::Seq(a, b) => ProcessMap::sequence(&pick(*a), &pick(*b)).ok(),
                    Op::Union(a, b) => match &pick(*a) | &pick(*b) {
                        Ok(merged) => Some(merged),
                        Err(CoreError::CircularDependency { .. }) => None,
                        Err(other) => {
                            return Err(TestCaseError::fail(format!("unexpected merge error: {other}")))
                        }
                    },
                    Op::Using(a) => pick(*a).using(std::slice::from_ref(&resource)).ok(),
                    Op::Flip(a) => {
                        let original = pick(*a);
                        match original.kind() {
                            ExprKind::Seq(first, second) => {
                                let flipped = (second >> first)
                                    .map_err(|e| TestCaseError::fail(format!("reversed sequence rejected: {e}")))?;
                                let union_is_cycle = matches!(
                                    &original | &flipped,
                                    Err(CoreError::CircularDependency { .. })
                                );
                                prop_assert!(union_is_cycle);
                                Some(flipped)
                            }
                            _ => None,
                        }
                    }
                };
                if let Some(next) = next {
                    pool.push(next);
                }
            }
            Ok(pool.last().cloned().unwrap_or_else(|| p("seed", 1)))
        }

        proptest! {
            #[test]
            fn prop_compiled_graph_is_well_formed(ops in prop::collection::vec(op(), 0..24)) {
                let graph = compile(&build(&ops)?);
                prop_assert!(graph.check_integrity().is_ok());
                prop_assert_eq!(graph.start(), &graph.sources());
                prop_assert_eq!(graph.end(), &graph.sinks());
            }

            #[test]
            fn prop_union_with_itself_is_identity(ops in prop::collection::vec(op(), 0..16)) {
                let expr = build(&ops)?;
                let merged = (&expr | &expr).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert!(isomorphic(&compile(&merged), &compile(&expr)));
            }

            #[test]
            fn prop_union_is_commutative(
                left in prop::collection::vec(op(), 0..10),
                right in prop::collection::vec(op(), 0..10),
            ) {
                let a = build(&left)?;
                let b = build(&right)?;
                match (&a | &b, &b | &a) {
                    (Ok(ab), Ok(ba)) => prop_assert!(isomorphic(&compile(&ab), &compile(&ba))),
                    (Err(CoreError::CircularDependency { .. }), Err(CoreError::CircularDependency { .. })) => {}
                    (ab, ba) => prop_assert!(false, "merge order changed the outcome: {:?} vs {:?}", ab, ba),
                }
            }
        }
    }
}
