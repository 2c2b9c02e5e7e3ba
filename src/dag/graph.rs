use crate::error::{Error, Outcome};
use crate::token::CancelToken;
use crate::types::{HashMap, IndexMap, IndexSet, NodeId, ResultMap, Value};
use derive_more::Debug;
use rustc_hash::FxBuildHasher;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

/// A node's computation: cancellation context and dependency results in,
/// value or error out.
pub type NodeFn = dyn Fn(&CancelToken, &ResultMap) -> Outcome<Value> + Send + Sync;

/// Mapping over a result map, used at sub-graph boundaries.
pub type MapFn = dyn Fn(&ResultMap) -> Value + Send + Sync;

/// A node function bound to its node, as passed through interceptors.
pub type BoundFn = Arc<NodeFn>;

/// Middleware wrapping a node's bound function.
///
/// Receives the next function in the chain and returns the wrapped one.
/// Interceptors are applied in reverse registration order, so the first
/// one registered observes the call outermost.
pub type Interceptor = Arc<dyn Fn(BoundFn) -> BoundFn + Send + Sync>;

#[derive(Debug)]
pub(super) struct NodeSpec {
    pub(super) id: NodeId,
    pub(super) deps: Vec<NodeId>,
    pub(super) kind: NodeKind,
}

#[derive(Debug)]
pub(super) enum NodeKind {
    Entry,
    Simple {
        #[debug(skip)]
        run: Arc<NodeFn>,
    },
    Sub {
        dag: Arc<Dag>,
        #[debug(skip)]
        input: Option<Arc<MapFn>>,
        #[debug(skip)]
        output: Option<Arc<MapFn>>,
    },
}

/// A directed acyclic graph of named computations.
///
/// Build one with [`Dag::new`], register nodes, then [`freeze`](Dag::freeze)
/// it. Freezing verifies that every referenced dependency exists and that
/// the dependency relation is acyclic, and transitively freezes embedded
/// sub-graphs. A frozen graph is sealed: it can be rendered, instantiated
/// and embedded, but no longer mutated.
#[derive(Debug)]
pub struct Dag {
    pub(super) entry: NodeId,
    pub(super) nodes: IndexMap<NodeId, NodeSpec>,
    pub(super) frozen: bool,
}

impl Dag {
    /// Creates a graph whose entry node is `entry`.
    ///
    /// The entry node has no dependencies and receives the instance input.
    pub fn new(entry: impl Into<NodeId>) -> Self {
        let entry = entry.into();
        let mut nodes = IndexMap::with_capacity_and_hasher(1, FxBuildHasher);
        nodes.insert(
            entry.clone(),
            NodeSpec {
                id: entry.clone(),
                deps: Vec::new(),
                kind: NodeKind::Entry,
            },
        );
        Self {
            entry,
            nodes,
            frozen: false,
        }
    }

    /// The entry node's identifier.
    #[must_use]
    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    /// Whether [`freeze`](Dag::freeze) has completed.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of registered nodes, entry included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a node with this identifier is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Registers a simple node.
    ///
    /// # Errors
    /// [`Error::Frozen`] after freeze, [`Error::NodeExists`] on a duplicate
    /// identifier. Missing dependencies are only detected at freeze time.
    pub fn add_node<I, D>(
        &mut self,
        id: I,
        deps: D,
        run: impl Fn(&CancelToken, &ResultMap) -> Outcome<Value> + Send + Sync + 'static,
    ) -> Result<(), Error>
    where
        I: Into<NodeId>,
        D: IntoIterator,
        D::Item: Into<NodeId>,
    {
        self.insert(
            id.into(),
            collect_deps(deps),
            NodeKind::Simple { run: Arc::new(run) },
        )
    }

    /// Registers a node embedding a nested graph.
    ///
    /// The sub-graph is taken by value; if it is not frozen yet, freezing
    /// the parent freezes it. `input_mapping` computes the inner input from
    /// the dependency results (identity when absent: the inner entry
    /// receives the whole dependency map); `output_mapping` computes the
    /// outer result from the inner result map (identity when absent: the
    /// outer result is the whole inner map).
    ///
    /// # Errors
    /// Same as [`add_node`](Dag::add_node).
    pub fn add_sub_graph<I, D>(
        &mut self,
        id: I,
        deps: D,
        sub: Dag,
        input_mapping: Option<Box<MapFn>>,
        output_mapping: Option<Box<MapFn>>,
    ) -> Result<(), Error>
    where
        I: Into<NodeId>,
        D: IntoIterator,
        D::Item: Into<NodeId>,
    {
        self.insert(
            id.into(),
            collect_deps(deps),
            NodeKind::Sub {
                dag: Arc::new(sub),
                input: input_mapping.map(Arc::from),
                output: output_mapping.map(Arc::from),
            },
        )
    }

    fn insert(&mut self, id: NodeId, deps: Vec<NodeId>, kind: NodeKind) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        if self.nodes.contains_key(&id) {
            return Err(Error::NodeExists(id));
        }
        self.nodes.insert(
            id.clone(),
            NodeSpec { id, deps, kind },
        );
        Ok(())
    }

    /// Seals the graph.
    ///
    /// Verifies that every declared dependency is registered and that the
    /// dependency relation has no cycle, then freezes every embedded
    /// sub-graph that the caller did not freeze already.
    ///
    /// # Errors
    /// [`Error::Frozen`] when called twice, [`Error::Incomplete`] on a
    /// missing dependency, [`Error::Cyclic`] on a cycle, and
    /// [`Error::SubGraph`] when a nested freeze fails.
    pub fn freeze(&mut self) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        self.check_complete()?;
        self.check_cycle()?;
        for spec in self.nodes.values_mut() {
            if let NodeKind::Sub { dag, .. } = &mut spec.kind {
                if !dag.frozen {
                    // The sub-graph was moved into this spec and no handle
                    // escapes before the parent freeze.
                    let inner = Arc::get_mut(dag).expect("Dag::freeze: [1]");
                    inner.freeze().map_err(|err| Error::SubGraph {
                        id: spec.id.clone(),
                        source: Box::new(err),
                    })?;
                }
            }
        }
        self.frozen = true;
        Ok(())
    }

    fn check_complete(&self) -> Result<(), Error> {
        for spec in self.nodes.values() {
            for dep in &spec.deps {
                if !self.nodes.contains_key(dep) {
                    return Err(Error::Incomplete {
                        node: spec.id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm: seed with zero-in-degree nodes, pop and decrement
    /// children, count visits. A visit count short of the node count means
    /// the remainder participates in a cycle.
    fn check_cycle(&self) -> Result<(), Error> {
        let mut in_degree: HashMap<&NodeId, usize> =
            HashMap::with_capacity_and_hasher(self.nodes.len(), FxBuildHasher);
        let mut children: HashMap<&NodeId, Vec<&NodeId>> =
            HashMap::with_capacity_and_hasher(self.nodes.len(), FxBuildHasher);
        for (id, spec) in &self.nodes {
            in_degree.insert(id, spec.deps.len());
            for dep in &spec.deps {
                children.entry(dep).or_default().push(id);
            }
        }

        let mut queue: VecDeque<&NodeId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            let Some(kids) = children.get(id) else {
                continue;
            };
            for &child in kids {
                let degree = in_degree.get_mut(child).expect("Dag::check_cycle: [1]");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }

        if visited != self.nodes.len() {
            return Err(Error::Cyclic);
        }
        Ok(())
    }

    /// Renders the graph as a Mermaid `graph LR` diagram.
    ///
    /// Entry nodes render as rectangles, simple nodes as circles and
    /// sub-graphs as nested `subgraph`/`end` blocks whose inner ids are
    /// prefixed with the embedding node's id. Node lines come first in
    /// lexicographic id order, then one line per dependency edge.
    ///
    /// # Errors
    /// [`Error::NotFrozen`] before freeze: rendering walks definitions and
    /// is only deterministic once the graph is sealed.
    pub fn to_mermaid(&self) -> Result<String, Error> {
        if !self.frozen {
            return Err(Error::NotFrozen);
        }
        let mut out = String::from("graph LR\n");
        self.render(&mut out, "", "\t");
        Ok(out)
    }

    fn render(&self, out: &mut String, prefix: &str, indent: &str) {
        let mut ids: Vec<&str> = self.nodes.keys().map(AsRef::as_ref).collect();
        ids.sort_unstable();

        for &id in &ids {
            let spec = &self.nodes[id];
            let label = format!("{prefix}{id}");
            match &spec.kind {
                NodeKind::Entry => {
                    let _ = writeln!(out, "{indent}{label}[\"{label}\"]");
                }
                NodeKind::Simple { .. } => {
                    let _ = writeln!(out, "{indent}{label}((\"{label}\"))");
                }
                NodeKind::Sub { dag, .. } => {
                    let _ = writeln!(out, "{indent}subgraph {label} [Subgraph {label}]");
                    dag.render(out, &format!("{label}."), &format!("{indent}\t"));
                    let _ = writeln!(out, "{indent}end");
                }
            }
        }

        for &id in &ids {
            let spec = &self.nodes[id];
            for dep in &spec.deps {
                let _ = writeln!(out, "{indent}{prefix}{dep} --> {prefix}{id}");
            }
        }
    }
}

fn collect_deps<D>(deps: D) -> Vec<NodeId>
where
    D: IntoIterator,
    D::Item: Into<NodeId>,
{
    let unique: IndexSet<NodeId> = deps.into_iter().map(Into::into).collect();
    unique.into_iter().collect()
}
