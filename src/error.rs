use crate::types::NodeId;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Result of a computation observed through a [`Future`](crate::Future).
///
/// A cell settles with exactly one `Outcome`: either a produced value or an
/// [`Error`]. The [`Error::Skipped`] variant travels through the error
/// channel but is a control signal, not a failure (see the DAG engine).
pub type Outcome<T> = Result<T, Error>;

/// Unified error type of the crate.
///
/// Graph-definition errors (`NodeExists`, `Incomplete`, `Cyclic`, `Frozen`,
/// `NotFrozen`) are returned by the corresponding definition operations.
/// Runtime errors flow through node Futures and are wrapped with context
/// (`Dep`, `Node`, `SubGraph`) on their way to the aggregate Future.
///
/// All variants are cheaply clonable so that a settled cell can broadcast
/// its outcome to any number of consumers.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Strict `set` was called on an already-settled promise.
    #[error("promise already settled")]
    NotSet,

    /// A `timeout`-wrapped future did not settle within its duration.
    #[error("future timed out")]
    Timeout,

    /// A cancellation token fired before the observed future settled.
    #[error("operation cancelled")]
    Cancelled,

    /// A unit of work terminated abnormally under the safe-run wrapper.
    #[error("task panicked: {message}")]
    Panic {
        /// Stringified panic payload.
        message: Arc<str>,
        /// Backtrace captured at the recovery site.
        backtrace: Arc<str>,
    },

    /// Sentinel outcome that disables a node and its downstream cone.
    ///
    /// Propagated untouched through dependency reads; never wrapped and
    /// never treated as a failure by result aggregation.
    #[error("node skipped")]
    Skipped,

    /// The graph must be frozen before this operation.
    #[error("graph is not frozen")]
    NotFrozen,

    /// The graph is frozen and can no longer be mutated.
    #[error("graph is frozen")]
    Frozen,

    /// A node with this identifier is already registered.
    #[error("node {0} already exists")]
    NodeExists(NodeId),

    /// A declared dependency is missing from the graph.
    #[error("dependency {dep} of node {node} is not present")]
    Incomplete {
        /// Node declaring the dependency.
        node: NodeId,
        /// The missing dependency.
        dep: NodeId,
    },

    /// The dependency relation contains at least one cycle.
    #[error("graph contains cycle(s)")]
    Cyclic,

    /// A dependency of the executing node settled with an error.
    #[error("dep {id} failed: {source}")]
    Dep {
        /// The failed dependency.
        id: NodeId,
        /// Its outcome.
        #[source]
        source: Box<Error>,
    },

    /// A node settled with an error; reported by result aggregation.
    #[error("node {id} failed: {source}")]
    Node {
        /// The failed node.
        id: NodeId,
        /// Its outcome.
        #[source]
        source: Box<Error>,
    },

    /// Instantiating or running a nested graph failed.
    #[error("sub-graph {id} failed: {source}")]
    SubGraph {
        /// The sub-graph node.
        id: NodeId,
        /// The inner failure.
        #[source]
        source: Box<Error>,
    },

    /// An error produced by user code.
    #[error("{0}")]
    Failure(Arc<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error produced by user code.
    pub fn other(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failure(Arc::new(err))
    }

    /// Creates a user error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failure(Arc::new(Message(message.into())))
    }

    /// Whether this error is the skip sentinel.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Walks the `source` chain (including `self`) looking for an entry
    /// whose display representation contains `needle`.
    #[must_use]
    pub fn chain_contains(&self, needle: &str) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if err.to_string().contains(needle) {
                return true;
            }
            current = err.source();
        }
        false
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);
