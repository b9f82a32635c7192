//! Resource identifiers for mutual-exclusion usage.
//!
//! The compiler never interprets a resource. It only places request and
//! release markers in the graph; an external allocator decides who gets a
//! contested resource and when.

use processmap_core::ResourceId;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A named, contended resource
///
/// Equality and hashing use the identity only. Two resources created with the
/// same label are different resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identity
    id: ResourceId,
    /// Human-readable label
    label: String,
}

impl Resource {
    /// Create a new resource with a fresh identity
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            label: label.into(),
        }
    }

    /// Get the identity
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.label, self.id.as_u64())
    }
}
