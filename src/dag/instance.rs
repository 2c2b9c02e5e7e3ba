use super::graph::{BoundFn, Dag, Interceptor, NodeKind, NodeSpec};
use crate::catch::catch;
use crate::combinators::{all_of, then, with_cancel};
use crate::error::{Error, Outcome};
use crate::executor::{self, Executor};
use crate::future::{Future, Promise};
use crate::sync::{AtomicBool, AtomicUsize, Ordering};
use crate::token::CancelToken;
use crate::types::{HashMap, IndexMap, NodeId, ResultMap, Value};
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::sync::Arc;

/// Instantiation options.
///
/// Cloneable because sub-graph nodes instantiate their nested graph with
/// the *same* option set as the parent: interceptors and precomputed
/// results reach nodes inside sub-graphs too.
#[derive(Clone, Default)]
pub struct Options {
    executor: Option<Arc<dyn Executor>>,
    interceptors: Vec<Interceptor>,
    node_results: ResultMap,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backs the instance with `executor` instead of the process-wide
    /// default.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Wraps every node's function in middleware style.
    ///
    /// May be called multiple times; interceptors apply in reverse
    /// registration order, so the first one registered sits outermost.
    /// Short-circuited nodes still pass through interceptors.
    #[must_use]
    pub fn interceptor(
        mut self,
        interceptor: impl Fn(BoundFn) -> BoundFn + Send + Sync + 'static,
    ) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Short-circuits a node with a precomputed result.
    ///
    /// The node's function is skipped and the value returned as-is; its
    /// dependencies are still awaited.
    #[must_use]
    pub fn node_result(mut self, id: impl Into<NodeId>, val: Value) -> Self {
        self.node_results.insert(id.into(), val);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("executor", &self.executor.is_some())
            .field("interceptors", &self.interceptors.len())
            .field("node_results", &self.node_results.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct NodeInstance {
    id: NodeId,
    deps: Vec<NodeId>,
    /// Inverse of the dependency relation, computed at instantiation.
    children: Vec<NodeId>,
    /// Unfinished dependencies; the decrement that reaches zero submits
    /// this node.
    pending: AtomicUsize,
    run: BoundFn,
    promise: Promise<Value>,
    future: Future<Value>,
}

struct InstanceCore {
    nodes: IndexMap<NodeId, Arc<NodeInstance>>,
    executor: Arc<dyn Executor>,
}

/// A single-use executable instance of a frozen [`Dag`].
///
/// Created by [`Dag::instantiate`]. Running it dispatches nodes through the
/// configured executor in dependency order, with independent nodes running
/// concurrently. Each instance may be run at most once.
pub struct DagInstance {
    entry: NodeId,
    core: Arc<InstanceCore>,
    started: AtomicBool,
}

impl Dag {
    /// Instantiates the graph with default options.
    ///
    /// # Errors
    /// [`Error::NotFrozen`] if [`freeze`](Dag::freeze) has not completed.
    pub fn instantiate(&self, input: Value) -> Result<DagInstance, Error> {
        self.instantiate_with(input, Options::new())
    }

    /// Instantiates the graph: allocates a promise/future pair, a pending
    /// counter and a bound run function per node.
    ///
    /// # Errors
    /// [`Error::NotFrozen`] if [`freeze`](Dag::freeze) has not completed.
    pub fn instantiate_with(&self, input: Value, options: Options) -> Result<DagInstance, Error> {
        if !self.frozen {
            return Err(Error::NotFrozen);
        }
        let executor = options
            .executor
            .clone()
            .unwrap_or_else(executor::global);

        // The entry result is the instance input; explicit node results
        // override it and short-circuit their nodes.
        let mut precomputed =
            ResultMap::with_capacity_and_hasher(1 + options.node_results.len(), FxBuildHasher);
        precomputed.insert(self.entry.clone(), input);
        for (id, val) in &options.node_results {
            precomputed.insert(id.clone(), val.clone());
        }

        let mut children: HashMap<NodeId, Vec<NodeId>> =
            HashMap::with_capacity_and_hasher(self.nodes.len(), FxBuildHasher);
        for (id, spec) in &self.nodes {
            for dep in &spec.deps {
                children.entry(dep.clone()).or_default().push(id.clone());
            }
        }

        let nodes = self
            .nodes
            .iter()
            .map(|(id, spec)| {
                let mut run = bind_run(spec, &precomputed, &options);
                for interceptor in options.interceptors.iter().rev() {
                    run = interceptor(run);
                }
                let promise = Promise::new();
                let future = promise.future();
                let instance = NodeInstance {
                    id: id.clone(),
                    deps: spec.deps.clone(),
                    children: children.remove(id).unwrap_or_default(),
                    pending: AtomicUsize::new(spec.deps.len()),
                    run,
                    promise,
                    future,
                };
                (id.clone(), Arc::new(instance))
            })
            .collect();

        Ok(DagInstance {
            entry: self.entry.clone(),
            core: Arc::new(InstanceCore { nodes, executor }),
            started: AtomicBool::new(false),
        })
    }
}

/// Chooses the run function for a node before interceptors wrap it.
fn bind_run(spec: &NodeSpec, precomputed: &ResultMap, options: &Options) -> BoundFn {
    if let Some(val) = precomputed.get(&spec.id) {
        let val = val.clone();
        return Arc::new(move |_, _| Ok(val.clone()));
    }
    match &spec.kind {
        // The entry result is always precomputed from the instance input.
        NodeKind::Entry => unreachable!("Dag::instantiate: [1]"),
        NodeKind::Simple { run } => Arc::clone(run),
        NodeKind::Sub { dag, input, output } => {
            let id = spec.id.clone();
            let dag = Arc::clone(dag);
            let input = input.clone();
            let output = output.clone();
            let options = options.clone();
            Arc::new(move |token, deps| {
                let inner_input: Value = match &input {
                    Some(map) => map(deps),
                    None => Arc::new(deps.clone()),
                };
                let instance = dag
                    .instantiate_with(inner_input, options.clone())
                    .map_err(|err| Error::SubGraph {
                        id: id.clone(),
                        source: Box::new(err),
                    })?;
                let results = instance.run(token).map_err(|err| Error::SubGraph {
                    id: id.clone(),
                    source: Box::new(err),
                })?;
                let mapped: Value = match &output {
                    Some(map) => map(&results),
                    None => Arc::new(results),
                };
                Ok(mapped)
            })
        }
    }
}

impl DagInstance {
    /// Runs the instance to completion, blocking the caller.
    ///
    /// Node outcomes of [`Error::Skipped`] are omitted from the result map;
    /// any other node error aborts aggregation with the first error seen.
    /// Cancelling `token` settles the return value with
    /// [`Error::Cancelled`] while in-flight nodes drain in the background.
    ///
    /// # Panics
    /// If the instance was already run; instances are single-use.
    pub fn run(&self, token: &CancelToken) -> Outcome<ResultMap> {
        self.run_async(token).get()
    }

    /// Starts the instance and returns a future over the collected results.
    ///
    /// # Panics
    /// If the instance was already run; instances are single-use.
    pub fn run_async(&self, token: &CancelToken) -> Future<ResultMap> {
        assert!(
            !self.started.swap(true, Ordering::AcqRel),
            "DAG instance is single-use and was already run"
        );
        tracing::debug!(entry = %self.entry, nodes = self.core.nodes.len(), "running DAG instance");
        submit_node(&self.core, token, &self.entry);

        let futures: Vec<Future<Value>> = self
            .core
            .nodes
            .values()
            .map(|node| node.future.clone())
            .collect();
        let core = Arc::clone(&self.core);
        let aggregate = then(&all_of(&futures), move |_| collect_results(&core));
        with_cancel(&aggregate, token)
    }
}

impl fmt::Debug for DagInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagInstance")
            .field("entry", &self.entry)
            .field("nodes", &self.core.nodes.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builds the final result map once the aggregate settles.
///
/// Ignores the `all_of` outcome on purpose: a short-circuit error may be
/// the skip sentinel, so every node future is re-read. Reads may block on
/// stragglers that settle after the short-circuit; every node eventually
/// settles because children are submitted regardless of their parent's
/// outcome.
fn collect_results(core: &InstanceCore) -> Outcome<ResultMap> {
    let mut results = ResultMap::with_capacity_and_hasher(core.nodes.len(), FxBuildHasher);
    for (id, node) in &core.nodes {
        match node.future.get() {
            Ok(val) => {
                results.insert(id.clone(), val);
            }
            Err(Error::Skipped) => {}
            Err(err) => {
                return Err(Error::Node {
                    id: id.clone(),
                    source: Box::new(err),
                })
            }
        }
    }
    Ok(results)
}

/// Dispatches one node to the executor.
///
/// The submitted task reads dependency results (their futures are settled
/// or about to be), runs the bound function under the panic guard, hands
/// newly ready children to the executor and finally settles the node's
/// promise.
fn submit_node(core: &Arc<InstanceCore>, token: &CancelToken, id: &NodeId) {
    let core = Arc::clone(core);
    let token = token.clone();
    let id = id.clone();
    let executor = Arc::clone(&core.executor);
    executor.submit(Box::new(move || {
        let node = &core.nodes[&id];
        let outcome = catch(|| {
            let mut deps = ResultMap::with_capacity_and_hasher(node.deps.len(), FxBuildHasher);
            for dep_id in &node.deps {
                match core.nodes[dep_id].future.get() {
                    Ok(val) => {
                        deps.insert(dep_id.clone(), val);
                    }
                    Err(Error::Skipped) => return Err(Error::Skipped),
                    Err(err) => {
                        return Err(Error::Dep {
                            id: dep_id.clone(),
                            source: Box::new(err),
                        })
                    }
                }
            }
            (node.run)(&token, &deps)
        });
        tracing::trace!(node = %node.id, ok = outcome.is_ok(), "node finished");

        // Children are notified even when this node failed or was skipped:
        // they settle with the propagated outcome, which keeps every future
        // in the instance live and lets deep skip cones drain.
        for child_id in &node.children {
            let child = &core.nodes[child_id];
            if child.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                submit_node(&core, &token, child_id);
            }
        }
        node.promise.set(outcome);
    }));
}
