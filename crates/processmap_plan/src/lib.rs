//! processmap planner
//!
//! Algebra for describing process maps (named, timed activities composed by
//! sequencing, overlap-merging and resource usage) and the compiler that
//! turns them into a DAG for a scheduler or simulator to walk.
//!
//! ```
//! use processmap_plan::{compile, ProcessMap, Resource};
//!
//! let ship = Resource::new("ship");
//! let load = ProcessMap::process("Load", 2u64);
//! let sail = ProcessMap::process("Sail", 5u64).using(&[ship]).unwrap();
//! let graph = compile(&(&load >> &sail).unwrap());
//!
//! assert_eq!(graph.start().len(), 1);
//! assert!(graph.is_acyclic());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algebra;
pub mod compiler;
pub mod graph;
pub mod resource;
pub mod validate;

pub use algebra::{ExprKind, ProcessMap};
pub use compiler::{compile, CompileStats, Compiler, CompilerOutput};
pub use graph::{Edge, EdgeKind, Graph, NodeKind};
pub use processmap_core::{CoreError, CoreResult, ExprId, NodeId, ResourceId, Ticks};
pub use resource::Resource;
pub use validate::{ValidationError, Validator, ValidatorConfig};
