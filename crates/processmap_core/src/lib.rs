//! processmap core types
//!
//! This crate contains pure identity and value types with no compilation
//! logic. Everything here is cheap to copy and serializable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{ExprId, NodeId, ResourceId};
pub use time::Ticks;
