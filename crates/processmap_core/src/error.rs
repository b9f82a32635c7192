//! Core error types for processmap.
//!
//! Every error is raised while an expression is being built, never while it
//! is being compiled. They signal programmer mistakes, so there is no retry
//! path.

use crate::id::{ExprId, NodeId};

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A process would have to finish before it starts, either through a
    /// sequence over a shared leaf or a merge of contradicting orders
    #[error("Circular dependency on {process} ({id})")]
    CircularDependency { process: String, id: ExprId },

    /// `using` was called without any resource
    #[error("At least one resource is required")]
    EmptyResources,

    /// The same resource is listed twice for one activity
    #[error("Resource {resource} is requested more than once")]
    DuplicateResource { resource: String },

    /// A variadic combinator was given nothing to combine
    #[error("{operator} needs at least one operand")]
    EmptyComposition { operator: &'static str },

    /// Not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// The graph's ordering constraints contain a cycle
    #[error("Cycle detected involving nodes: {nodes:?}")]
    Cycle { nodes: Vec<NodeId> },
}
