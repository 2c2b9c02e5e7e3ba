//! Directed-acyclic-graph execution engine.
//!
//! A [`Dag`] is a registry of named nodes with declared dependencies. Once
//! frozen (completeness and acyclicity verified), it can be instantiated
//! with an input value and run: the engine submits the entry node to an
//! executor and fires every other node the moment its last dependency
//! settles, collecting all results into a map keyed by node id.
//!
//! Nodes come in three kinds: the entry node receives the instance input,
//! simple nodes run a user function over their dependency results, and
//! sub-graph nodes embed a nested frozen [`Dag`] behind input/output
//! mappings. A node may opt out by returning [`Error::Skipped`]
//! (re-exported at the crate root), which silently disables its entire
//! downstream cone.
//!
//! [`Error::Skipped`]: crate::Error::Skipped

mod graph;
mod instance;

pub use graph::{BoundFn, Dag, Interceptor, MapFn, NodeFn};
pub use instance::{DagInstance, Options};
