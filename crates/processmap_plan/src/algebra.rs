//! Process-map algebra.
//!
//! A process map is an immutable expression tree built from timed activities,
//! sequencing (`>>`), overlap-merging (`|`) and resource usage (`using`).
//! Handles are cheap to clone and a clone denotes the *same* sub-process:
//! reusing one handle in two places makes the compiler merge the two
//! occurrences instead of duplicating them.

use crate::compiler::compile;
use crate::graph::EdgeKind;
use crate::resource::Resource;
use indexmap::{IndexMap, IndexSet};
use processmap_core::{CoreError, CoreResult, ExprId, Ticks};
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::ops::{BitOr, Shr};
use std::sync::Arc;

/// Name of the zero-duration spacer process
pub const IDLE: &str = "idle";

/// Handle to an immutable process map expression
///
/// Equality and hashing use the expression identity. Two separately built
/// processes with the same name and duration are different processes.
#[derive(Debug, Clone)]
pub struct ProcessMap {
    inner: Arc<Expr>,
}

#[derive(Debug)]
struct Expr {
    id: ExprId,
    kind: ExprKind,
}

/// Expression variants
#[derive(Debug)]
pub enum ExprKind {
    /// A single timed activity
    Process {
        /// Activity name
        name: String,
        /// Activity duration
        duration: Ticks,
    },
    /// Every exit of the first runs before every entry of the second
    Seq(ProcessMap, ProcessMap),
    /// Structural merge of both sides
    Union(ProcessMap, ProcessMap),
    /// Request of a resource
    Request(Resource),
    /// Release of a resource
    Release(Resource),
    /// A process wrapped in resource requests and releases
    WithResources {
        /// Wrapped process
        process: ProcessMap,
        /// Resources in acquisition order
        resources: Vec<Resource>,
        /// Equivalent `Seq`/`Union` expression
        expansion: ProcessMap,
    },
}

impl ProcessMap {
    fn from_kind(kind: ExprKind) -> Self {
        Self {
            inner: Arc::new(Expr {
                id: ExprId::new(),
                kind,
            }),
        }
    }

    /// Create a timed activity
    #[must_use]
    pub fn process(name: impl Into<String>, duration: impl Into<Ticks>) -> Self {
        Self::from_kind(ExprKind::Process {
            name: name.into(),
            duration: duration.into(),
        })
    }

    /// Create a zero-duration spacer activity
    #[must_use]
    pub fn idle() -> Self {
        Self::process(IDLE, Ticks::zero())
    }

    /// Create a resource request marker
    #[must_use]
    pub fn request(resource: &Resource) -> Self {
        Self::from_kind(ExprKind::Request(resource.clone()))
    }

    /// Create a resource release marker
    #[must_use]
    pub fn release(resource: &Resource) -> Self {
        Self::from_kind(ExprKind::Release(resource.clone()))
    }

    /// Sequence two process maps
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CircularDependency` if both sides contain the same
    /// leaf, since it cannot be both finished and not yet started.
    pub fn sequence(first: &Self, second: &Self) -> CoreResult<Self> {
        let before = first.leaves();
        if let Some(shared) = second.leaves().into_values().find(|leaf| before.contains_key(&leaf.id())) {
            return Err(CoreError::CircularDependency {
                process: shared.label(),
                id: shared.id(),
            });
        }

        Ok(Self::from_kind(ExprKind::Seq(first.clone(), second.clone())))
    }

    /// Merge two process maps, sharing whatever sub-processes they have in common
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CircularDependency` naming an activity on the
    /// cycle if the two sides order shared activities in contradicting ways,
    /// e.g. `(a >> b) | (b >> a)`.
    pub fn merge(a: &Self, b: &Self) -> CoreResult<Self> {
        let merged = Self::from_kind(ExprKind::Union(a.clone(), b.clone()));
        let graph = compile(&merged);

        match graph.topological_order() {
            Ok(_) => Ok(merged),
            Err(CoreError::Cycle { nodes }) => {
                let process = graph
                    .process_edges()
                    .find(|edge| nodes.contains(&edge.from))
                    .and_then(|edge| match &edge.kind {
                        EdgeKind::Process { name, .. } => Some(name.clone()),
                        EdgeKind::Dependency => None,
                    })
                    .unwrap_or_else(|| merged.label());
                Err(CoreError::CircularDependency {
                    process,
                    id: merged.id(),
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Sequence one or more process maps left to right
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyComposition` for no operands, or the first
    /// sequencing error.
    pub fn chain<I>(maps: I) -> CoreResult<Self>
    where
        I: IntoIterator,
        I::Item: Borrow<Self>,
    {
        let mut maps = maps.into_iter();
        let first = maps
            .next()
            .ok_or(CoreError::EmptyComposition { operator: "chain" })?;
        maps.try_fold(first.borrow().clone(), |acc, next| {
            Self::sequence(&acc, next.borrow())
        })
    }

    /// Merge one or more process maps left to right
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyComposition` for no operands, or the first
    /// merge error.
    pub fn merge_all<I>(maps: I) -> CoreResult<Self>
    where
        I: IntoIterator,
        I::Item: Borrow<Self>,
    {
        let mut maps = maps.into_iter();
        let first = maps
            .next()
            .ok_or(CoreError::EmptyComposition { operator: "merge_all" })?;
        maps.try_fold(first.borrow().clone(), |acc, next| {
            Self::merge(&acc, next.borrow())
        })
    }

    /// Run branches side by side between one shared entry and one shared exit
    ///
    /// Every branch is sequenced between the same two idle spacers, so the
    /// merged result has a single entry and a single exit.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyComposition` for no branches, or the first
    /// sequencing or merge error.
    pub fn simultaneous<I>(branches: I) -> CoreResult<Self>
    where
        I: IntoIterator,
        I::Item: Borrow<Self>,
    {
        let entry = Self::idle();
        let exit = Self::idle();
        let framed = branches
            .into_iter()
            .map(|branch| Self::chain([&entry, branch.borrow(), &exit]))
            .collect::<CoreResult<Vec<_>>>()?;

        if framed.is_empty() {
            return Err(CoreError::EmptyComposition {
                operator: "simultaneous",
            });
        }
        Self::merge_all(framed)
    }

    /// Hold the given resources for the whole duration of this process
    ///
    /// Resources are requested together before the process starts and
    /// released together after it ends, in reverse order.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyResources` if no resource is given and
    /// `CoreError::DuplicateResource` if one is listed twice.
    pub fn using(&self, resources: &[Resource]) -> CoreResult<Self> {
        if resources.is_empty() {
            return Err(CoreError::EmptyResources);
        }
        let mut seen = IndexSet::with_capacity(resources.len());
        for resource in resources {
            if !seen.insert(resource.id()) {
                return Err(CoreError::DuplicateResource {
                    resource: resource.to_string(),
                });
            }
        }

        let requests = Self::merge_all(resources.iter().map(Self::request))?;
        let releases = Self::merge_all(resources.iter().rev().map(Self::release))?;
        let expansion = Self::chain([&requests, self, &releases])?;

        Ok(Self::from_kind(ExprKind::WithResources {
            process: self.clone(),
            resources: resources.to_vec(),
            expansion,
        }))
    }

    /// Get the expression identity
    #[must_use]
    pub fn id(&self) -> ExprId {
        self.inner.id
    }

    /// Get the expression variant
    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.inner.kind
    }

    /// Check if this is an indivisible expression
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(
            self.kind(),
            ExprKind::Process { .. } | ExprKind::Request(_) | ExprKind::Release(_)
        )
    }

    /// Short human-readable description
    #[must_use]
    pub fn label(&self) -> String {
        match self.kind() {
            ExprKind::Process { name, .. } => name.clone(),
            ExprKind::Request(resource) => format!("request({})", resource),
            ExprKind::Release(resource) => format!("release({})", resource),
            ExprKind::Seq(..) => format!("seq({})", self.id()),
            ExprKind::Union(..) => format!("union({})", self.id()),
            ExprKind::WithResources { process, .. } => format!("{} using resources", process.label()),
        }
    }

    /// All leaves reachable from this expression, in first-visit order
    #[must_use]
    pub fn leaves(&self) -> IndexMap<ExprId, ProcessMap> {
        let mut visited = IndexSet::new();
        let mut leaves = IndexMap::new();
        let mut stack = vec![self.clone()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.id()) {
                continue;
            }
            match current.kind() {
                ExprKind::Process { .. } | ExprKind::Request(_) | ExprKind::Release(_) => {
                    leaves.insert(current.id(), current.clone());
                }
                ExprKind::Seq(a, b) | ExprKind::Union(a, b) => {
                    stack.push(b.clone());
                    stack.push(a.clone());
                }
                ExprKind::WithResources { expansion, .. } => stack.push(expansion.clone()),
            }
        }

        leaves
    }

    /// Names of all distinct activities in this expression
    #[must_use]
    pub fn process_names(&self) -> Vec<String> {
        self.leaves()
            .values()
            .filter_map(|leaf| match leaf.kind() {
                ExprKind::Process { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PartialEq for ProcessMap {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ProcessMap {}

impl Hash for ProcessMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Shr<&ProcessMap> for &ProcessMap {
    type Output = CoreResult<ProcessMap>;

    fn shr(self, rhs: &ProcessMap) -> Self::Output {
        ProcessMap::sequence(self, rhs)
    }
}

impl Shr<ProcessMap> for ProcessMap {
    type Output = CoreResult<ProcessMap>;

    fn shr(self, rhs: ProcessMap) -> Self::Output {
        ProcessMap::sequence(&self, &rhs)
    }
}

impl Shr<&ProcessMap> for ProcessMap {
    type Output = CoreResult<ProcessMap>;

    fn shr(self, rhs: &ProcessMap) -> Self::Output {
        ProcessMap::sequence(&self, rhs)
    }
}

impl Shr<&ProcessMap> for CoreResult<ProcessMap> {
    type Output = CoreResult<ProcessMap>;

    fn shr(self, rhs: &ProcessMap) -> Self::Output {
        self.and_then(|lhs| ProcessMap::sequence(&lhs, rhs))
    }
}

impl Shr<ProcessMap> for CoreResult<ProcessMap> {
    type Output = CoreResult<ProcessMap>;

    fn shr(self, rhs: ProcessMap) -> Self::Output {
        self.and_then(|lhs| ProcessMap::sequence(&lhs, &rhs))
    }
}

impl BitOr<&ProcessMap> for &ProcessMap {
    type Output = CoreResult<ProcessMap>;

    fn bitor(self, rhs: &ProcessMap) -> Self::Output {
        ProcessMap::merge(self, rhs)
    }
}

impl BitOr<ProcessMap> for ProcessMap {
    type Output = CoreResult<ProcessMap>;

    fn bitor(self, rhs: ProcessMap) -> Self::Output {
        ProcessMap::merge(&self, &rhs)
    }
}

impl BitOr<&ProcessMap> for ProcessMap {
    type Output = CoreResult<ProcessMap>;

    fn bitor(self, rhs: &ProcessMap) -> Self::Output {
        ProcessMap::merge(&self, rhs)
    }
}

impl BitOr<&ProcessMap> for CoreResult<ProcessMap> {
    type Output = CoreResult<ProcessMap>;

    fn bitor(self, rhs: &ProcessMap) -> Self::Output {
        self.and_then(|lhs| ProcessMap::merge(&lhs, rhs))
    }
}

impl BitOr<ProcessMap> for CoreResult<ProcessMap> {
    type Output = CoreResult<ProcessMap>;

    fn bitor(self, rhs: ProcessMap) -> Self::Output {
        self.and_then(|lhs| ProcessMap::merge(&lhs, &rhs))
    }
}
