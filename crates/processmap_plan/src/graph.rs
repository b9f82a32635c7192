//! Compiled process graph.
//!
//! The graph is the result of compiling a process map and is what a scheduler
//! or simulator walks. Activities live on process edges; nodes are bare
//! boundary markers, except for request and release nodes which name the
//! resource they concern.

use crate::resource::Resource;
use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};
use processmap_core::{CoreError, CoreResult, NodeId, Ticks};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::hash::Hash;

/// An immutable directed acyclic graph of activities and ordering constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// All nodes
    #[serde(with = "indexmap::map::serde_seq")]
    pub(crate) nodes: IndexMap<NodeId, NodeKind>,
    /// All edges, deduplicated by value
    pub(crate) edges: IndexSet<Edge>,
    /// Entry frontier
    pub(crate) start: IndexSet<NodeId>,
    /// Exit frontier
    pub(crate) end: IndexSet<NodeId>,
}

impl Graph {
    /// Graph consisting of one node and no edges
    pub(crate) fn single(id: NodeId, kind: NodeKind) -> Self {
        Self {
            nodes: IndexMap::from([(id, kind)]),
            edges: IndexSet::new(),
            start: IndexSet::from([id]),
            end: IndexSet::from([id]),
        }
    }

    /// Graph consisting of one activity spanning two fresh process nodes
    pub(crate) fn activity(start: NodeId, end: NodeId, name: &str, duration: Ticks) -> Self {
        Self {
            nodes: IndexMap::from([(start, NodeKind::Process), (end, NodeKind::Process)]),
            edges: IndexSet::from([Edge::process(start, end, name, duration)]),
            start: IndexSet::from([start]),
            end: IndexSet::from([end]),
        }
    }

    /// Node and edge union of two graphs, with empty frontiers
    pub(crate) fn overlay(a: &Graph, b: &Graph) -> Self {
        let mut nodes = a.nodes.clone();
        for (id, kind) in &b.nodes {
            nodes.entry(*id).or_insert_with(|| kind.clone());
        }

        Self {
            nodes,
            edges: union(&a.edges, &b.edges),
            start: IndexSet::new(),
            end: IndexSet::new(),
        }
    }

    /// All nodes with their kinds
    #[must_use]
    pub fn nodes(&self) -> &IndexMap<NodeId, NodeKind> {
        &self.nodes
    }

    /// All edges
    #[must_use]
    pub fn edges(&self) -> &IndexSet<Edge> {
        &self.edges
    }

    /// Nodes where execution may begin
    #[must_use]
    pub fn start(&self) -> &IndexSet<NodeId> {
        &self.start
    }

    /// Nodes where execution finishes
    #[must_use]
    pub fn end(&self) -> &IndexSet<NodeId> {
        &self.end
    }

    /// Get node kind by ID
    #[must_use]
    pub fn get_node(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id)
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get nodes reachable from the given node over one edge
    #[must_use]
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to)
            .collect()
    }

    /// Get nodes that reach the given node over one edge
    #[must_use]
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from)
            .collect()
    }

    /// Edges that represent timed activities
    pub fn process_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.is_process())
    }

    /// Edges that only impose ordering
    pub fn dependency_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.is_dependency())
    }

    /// Nodes where the given resource is requested
    #[must_use]
    pub fn requests(&self, resource: &Resource) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, kind)| matches!(kind, NodeKind::Request { resource: r } if r == resource))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Nodes where the given resource is released
    #[must_use]
    pub fn releases(&self, resource: &Resource) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, kind)| matches!(kind, NodeKind::Release { resource: r } if r == resource))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Nodes without incoming edges, derived from edge topology alone
    #[must_use]
    pub fn sources(&self) -> IndexSet<NodeId> {
        let targets: IndexSet<NodeId> = self.edges.iter().map(|e| e.to).collect();
        self.nodes
            .keys()
            .filter(|id| !targets.contains(*id))
            .copied()
            .collect()
    }

    /// Nodes without outgoing edges, derived from edge topology alone
    #[must_use]
    pub fn sinks(&self) -> IndexSet<NodeId> {
        let origins: IndexSet<NodeId> = self.edges.iter().map(|e| e.from).collect();
        self.nodes
            .keys()
            .filter(|id| !origins.contains(*id))
            .copied()
            .collect()
    }

    /// Returns a topological order using Kahn's algorithm.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Cycle` with the nodes left unordered if the
    /// ordering constraints are cyclic, or `CoreError::NotFound` if an edge
    /// points at a node that is not part of the graph.
    pub fn topological_order(&self) -> CoreResult<Vec<NodeId>> {
        let mut in_degree: IndexMap<NodeId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut children: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();

        for edge in &self.edges {
            for endpoint in [edge.from, edge.to] {
                if !self.nodes.contains_key(&endpoint) {
                    return Err(CoreError::NotFound {
                        kind: "Node".to_string(),
                        id: endpoint.to_string(),
                    });
                }
            }
            *in_degree.entry(edge.to).or_default() += 1;
            children.entry(edge.from).or_default().push(edge.to);
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for child in children.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let nodes = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(CoreError::Cycle { nodes });
        }

        Ok(order)
    }

    /// Check whether the ordering constraints are acyclic
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_ok()
    }

    /// Check that every edge endpoint is a node and there is no cycle
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found
    pub fn check_integrity(&self) -> CoreResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Export into a petgraph graph for downstream graph algorithms.
    ///
    /// Node weights carry the original id and kind, edge weights the edge
    /// kind. Edges with a dangling endpoint are skipped.
    #[must_use]
    pub fn to_petgraph(&self) -> DiGraph<(NodeId, NodeKind), EdgeKind> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let indices: IndexMap<NodeId, NodeIndex> = self
            .nodes
            .iter()
            .map(|(id, kind)| (*id, graph.add_node((*id, kind.clone()))))
            .collect();

        for edge in &self.edges {
            if let (Some(from), Some(to)) = (indices.get(&edge.from), indices.get(&edge.to)) {
                graph.add_edge(*from, *to, edge.kind.clone());
            }
        }

        graph
    }
}

/// Node kind - what boundary a node marks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Start or end of an activity
    Process,
    /// Point at which a resource is requested
    Request {
        /// Requested resource
        resource: Resource,
    },
    /// Point at which a resource is released
    Release {
        /// Released resource
        resource: Resource,
    },
}

impl NodeKind {
    /// The resource a request or release node concerns
    #[must_use]
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Self::Process => None,
            Self::Request { resource } | Self::Release { resource } => Some(resource),
        }
    }
}

/// Edge kind - what an edge represents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// A timed activity
    Process {
        /// Activity name
        name: String,
        /// Activity duration
        duration: Ticks,
    },
    /// Target may not start before source is reached
    Dependency,
}

/// A directed edge between nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Edge payload
    pub kind: EdgeKind,
}

impl Edge {
    /// Create a new activity edge
    #[must_use]
    pub fn process(from: NodeId, to: NodeId, name: impl Into<String>, duration: Ticks) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Process {
                name: name.into(),
                duration,
            },
        }
    }

    /// Create a new ordering edge
    #[must_use]
    pub fn dependency(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Dependency,
        }
    }

    /// Check if this edge is an activity
    #[must_use]
    pub fn is_process(&self) -> bool {
        matches!(self.kind, EdgeKind::Process { .. })
    }

    /// Check if this edge is an ordering constraint
    #[must_use]
    pub fn is_dependency(&self) -> bool {
        matches!(self.kind, EdgeKind::Dependency)
    }
}

/// Set union preserving the order of `a` then the new elements of `b`
pub(crate) fn union<T: Hash + Eq + Clone>(a: &IndexSet<T>, b: &IndexSet<T>) -> IndexSet<T> {
    let mut out = a.clone();
    out.extend(b.iter().cloned());
    out
}

/// Candidates that are not in `consumed`
pub(crate) fn frontier(candidates: IndexSet<NodeId>, consumed: &IndexSet<NodeId>) -> IndexSet<NodeId> {
    candidates
        .into_iter()
        .filter(|id| !consumed.contains(id))
        .collect()
}
