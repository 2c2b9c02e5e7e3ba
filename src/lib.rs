//! Deferred-value composition and data-flow orchestration.
//!
//! This crate provides two tightly coupled building blocks:
//! - A single-assignment cell behind [`Promise`]/[`Future`] handles. The
//!   cell stores a result produced exactly once and broadcasts it to any
//!   number of consumers: blocking waiters, non-blocking pollers and
//!   chained continuations. Settling is lock-free (an atomic status word
//!   plus a CAS-maintained continuation stack), and a subscribe-then-recheck
//!   protocol guarantees no wake-up is ever lost.
//! - A DAG execution engine built on top of it. A [`Dag`] registers named
//!   nodes with declared dependencies; freezing verifies completeness and
//!   acyclicity; an instance dispatches work through a pluggable
//!   [`Executor`] and fires each node the instant its last dependency
//!   settles, collecting results into a map keyed by node id.
//!
//! Key modules:
//! - `future` / `combinators`: the handle pair and the composition
//!   surface (`then`, `all_of`, `timeout`, `with_cancel`, `spawn`).
//! - `dag`: graph definition, freeze-time validation, Mermaid rendering
//!   and the instance runtime with interceptors, sub-graph embedding and
//!   skip propagation.
//! - `executor`: the `submit`-only execution abstraction with thread,
//!   pool and rayon-backed implementations.
//! - `token` / `timer`: cooperative cancellation and fire-once scheduling.
//! - `catch`: the safe-run wrapper converting panics into typed errors.
//!
//! Quick start:
//! ```
//! use dagflow::{dep, value, value_as, CancelToken, Dag};
//!
//! let mut dag = Dag::new("entry");
//! dag.add_node("double", ["entry"], |_, deps| {
//!     Ok(value(dep::<i32>(deps, "entry")? * 2))
//! })?;
//! dag.add_node("add10", ["double"], |_, deps| {
//!     Ok(value(dep::<i32>(deps, "double")? + 10))
//! })?;
//! dag.freeze()?;
//!
//! let instance = dag.instantiate(value(5i32))?;
//! let results = instance.run(&CancelToken::new())?;
//! assert_eq!(value_as::<i32>(&results["add10"]), Some(&20));
//! # Ok::<(), dagflow::Error>(())
//! ```
//!
//! A node may return [`Error::Skipped`] to disable itself and its entire
//! downstream cone; skipped nodes are omitted from the result map without
//! failing the run.

/// Safe-run wrapper converting abnormal termination into typed errors.
pub mod catch;
mod cell;
/// Future composition: `done`, `spawn`, `then`, `all_of`, `timeout`,
/// `with_cancel`.
pub mod combinators;
/// Graph definition and the instance runtime.
pub mod dag;
/// The crate-wide error taxonomy and the `Outcome` alias.
pub mod error;
/// The `submit`-only execution abstraction and bundled implementations.
pub mod executor;
/// Producer/consumer handles over the single-assignment cell.
pub mod future;
mod sync;
/// Fire-once callback scheduling.
pub mod timer;
/// Cooperative one-shot cancellation.
pub mod token;
/// Value wrappers, node identifiers and map aliases.
pub mod types;

pub use catch::catch;
pub use combinators::{all_of, done, done_with, spawn, submit_to, then, timeout, with_cancel};
pub use dag::{Dag, DagInstance, Options};
pub use error::{Error, Outcome};
pub use executor::{Executor, PoolExecutor, RayonExecutor, ThreadExecutor};
pub use future::{Future, Promise};
pub use timer::{ThreadTimer, Timer, TimerGuard};
pub use token::CancelToken;
pub use types::{dep, value, value_as, NodeId, ResultMap, Value};
