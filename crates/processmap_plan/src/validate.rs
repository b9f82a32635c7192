//! Graph validator for scheduler-side acceptance policy.
//!
//! Compiled graphs are always acyclic with consistent frontiers, but a graph
//! may also arrive deserialized from elsewhere. Disconnected, multi-entry and
//! multi-exit graphs are valid by default; a scheduler that cannot run them
//! opts into the stricter checks through `ValidatorConfig`.

use crate::graph::Graph;
use indexmap::IndexSet;
use processmap_core::{CoreError, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Edge endpoint that is not a node of the graph
    #[error("Edge endpoint {node} is not a node of the graph")]
    DanglingEndpoint { node: NodeId },
    /// Cycle detected in graph
    #[error("Cycle detected involving nodes: {nodes:?}")]
    Cycle { nodes: Vec<NodeId> },
    /// Declared frontier differs from the one implied by the edges
    #[error("Declared {frontier} frontier {declared:?} does not match derived {derived:?}")]
    FrontierMismatch {
        frontier: &'static str,
        declared: Vec<NodeId>,
        derived: Vec<NodeId>,
    },
    /// More than one entry node
    #[error("Expected a single entry node, found {count}")]
    MultipleEntries { count: usize },
    /// More than one exit node
    #[error("Expected a single exit node, found {count}")]
    MultipleExits { count: usize },
    /// Nodes not reachable from the first entry, ignoring edge direction
    #[error("Disconnected nodes: {nodes:?}")]
    Disconnected { nodes: Vec<NodeId> },
    /// Node count over the configured limit
    #[error("Node count {count} exceeds max {max}")]
    TooManyNodes { count: usize, max: usize },
}

/// Acceptance policy for compiled graphs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Require exactly one entry node
    pub require_single_entry: bool,
    /// Require exactly one exit node
    pub require_single_exit: bool,
    /// Require a weakly connected graph
    pub require_connected: bool,
    /// Maximum allowed nodes (0 = no limit)
    pub max_nodes: usize,
}

/// Validator for graph properties
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    /// Create a new validator
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Get the active policy
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a graph
    ///
    /// # Errors
    ///
    /// Returns every violation found
    pub fn validate(&self, graph: &Graph) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let dangling: IndexSet<NodeId> = graph
            .edges()
            .iter()
            .flat_map(|e| [e.from, e.to])
            .filter(|id| graph.get_node(*id).is_none())
            .collect();
        errors.extend(dangling.iter().map(|&node| ValidationError::DanglingEndpoint { node }));

        if dangling.is_empty() {
            if let Err(CoreError::Cycle { nodes }) = graph.topological_order() {
                errors.push(ValidationError::Cycle { nodes });
            }
        }

        check_frontier("start", graph.start(), &graph.sources(), &mut errors);
        check_frontier("end", graph.end(), &graph.sinks(), &mut errors);

        if self.config.require_single_entry && graph.start().len() > 1 {
            errors.push(ValidationError::MultipleEntries {
                count: graph.start().len(),
            });
        }

        if self.config.require_single_exit && graph.end().len() > 1 {
            errors.push(ValidationError::MultipleExits {
                count: graph.end().len(),
            });
        }

        if self.config.require_connected {
            if let Err(e) = self.check_connected(graph) {
                errors.push(e);
            }
        }

        if self.config.max_nodes > 0 && graph.node_count() > self.config.max_nodes {
            errors.push(ValidationError::TooManyNodes {
                count: graph.node_count(),
                max: self.config.max_nodes,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            debug!(errors = errors.len(), "graph rejected");
            Err(errors)
        }
    }

    /// Check that every node is reachable from the first one, ignoring direction
    fn check_connected(&self, graph: &Graph) -> Result<(), ValidationError> {
        let Some(&first) = graph.nodes().keys().next() else {
            return Ok(());
        };

        let mut reachable = IndexSet::new();
        let mut stack = vec![first];

        while let Some(current) = stack.pop() {
            if !reachable.insert(current) {
                continue;
            }
            stack.extend(graph.successors(current));
            stack.extend(graph.predecessors(current));
        }

        let disconnected: Vec<_> = graph
            .nodes()
            .keys()
            .filter(|id| !reachable.contains(*id))
            .copied()
            .collect();

        if !disconnected.is_empty() {
            return Err(ValidationError::Disconnected { nodes: disconnected });
        }

        Ok(())
    }

    /// Set whether a single entry is required
    #[must_use]
    pub fn with_require_single_entry(mut self, require: bool) -> Self {
        self.config.require_single_entry = require;
        self
    }

    /// Set whether a single exit is required
    #[must_use]
    pub fn with_require_single_exit(mut self, require: bool) -> Self {
        self.config.require_single_exit = require;
        self
    }

    /// Set whether the graph must be connected
    #[must_use]
    pub fn with_require_connected(mut self, require: bool) -> Self {
        self.config.require_connected = require;
        self
    }

    /// Set maximum node count
    #[must_use]
    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.config.max_nodes = max;
        self
    }
}

fn check_frontier(
    frontier: &'static str,
    declared: &IndexSet<NodeId>,
    derived: &IndexSet<NodeId>,
    errors: &mut Vec<ValidationError>,
) {
    if declared != derived {
        errors.push(ValidationError::FrontierMismatch {
            frontier,
            declared: declared.iter().copied().collect(),
            derived: derived.iter().copied().collect(),
        });
    }
}
