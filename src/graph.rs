//! Graph registry: an arena of node slots plus the dependency edges.
//!
//! A node's identity is its index into the arena, allocated the first time it
//! joins the graph and stable thereafter, so equality is an integer compare.
//! Edges are stored on both endpoints symmetrically.

use crate::operators::Operator;
use crate::scope::ScopeGuard;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Stable identity of a node within its graph: an arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "n{}", self.0)
  }
}

/// One arena entry: the operator and its declared edges.
pub(crate) struct NodeSlot {
  pub(crate) name: String,
  pub(crate) operator: Arc<dyn Operator>,
  pub(crate) upstream: Vec<NodeId>,
  pub(crate) downstream: Vec<NodeId>,
}

struct GraphInner {
  name: String,
  nodes: Vec<NodeSlot>,
}

/// Registry and builder scope for one dependency graph.
///
/// Cheap to clone; all clones share the same arena. Two `Graph` values denote
/// the same graph iff they share it (see [Graph::same_graph]).
#[derive(Clone)]
pub struct Graph {
  inner: Arc<Mutex<GraphInner>>,
}

impl Graph {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(GraphInner {
        name: name.into(),
        nodes: Vec::new(),
      })),
    }
  }

  pub fn name(&self) -> String {
    self.inner.lock().unwrap().name.clone()
  }

  /// Enters this graph as the ambient "current graph" for the calling
  /// execution context. The returned guard pops the scope stack on drop,
  /// on every exit path.
  pub fn enter(&self) -> ScopeGuard {
    ScopeGuard::push(self.clone())
  }

  /// True if `other` is the same graph (shared arena), not merely equal.
  pub fn same_graph(&self, other: &Graph) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  pub fn node_count(&self) -> usize {
    self.inner.lock().unwrap().nodes.len()
  }

  /// Allocates an identity for a new node. Called on first graph membership.
  pub(crate) fn register(&self, name: String, operator: Arc<dyn Operator>) -> NodeId {
    let mut inner = self.inner.lock().unwrap();
    let id = NodeId(inner.nodes.len());
    debug!(graph = %inner.name, node = %name, id = %id, "registering node");
    inner.nodes.push(NodeSlot {
      name,
      operator,
      upstream: Vec::new(),
      downstream: Vec::new(),
    });
    id
  }

  /// Adds a dependency edge `from → to`, updating both endpoints.
  /// Re-adding an existing edge is a no-op.
  pub(crate) fn add_edge(&self, from: NodeId, to: NodeId) {
    let mut inner = self.inner.lock().unwrap();
    if inner.nodes[from.0].downstream.contains(&to) {
      return;
    }
    debug!(graph = %inner.name, from = %from, to = %to, "adding edge");
    inner.nodes[from.0].downstream.push(to);
    inner.nodes[to.0].upstream.push(from);
  }

  pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
    self.inner.lock().unwrap().nodes[from.0]
      .downstream
      .contains(&to)
  }

  pub fn node_name(&self, id: NodeId) -> String {
    self.inner.lock().unwrap().nodes[id.0].name.clone()
  }

  /// Display label used in errors and logs: `name#id`.
  pub fn node_label(&self, id: NodeId) -> String {
    format!("{}#{}", self.node_name(id), id)
  }

  pub(crate) fn upstream(&self, id: NodeId) -> Vec<NodeId> {
    self.inner.lock().unwrap().nodes[id.0].upstream.clone()
  }

  pub(crate) fn downstream(&self, id: NodeId) -> Vec<NodeId> {
    self.inner.lock().unwrap().nodes[id.0].downstream.clone()
  }

  pub(crate) fn operator(&self, id: NodeId) -> Arc<dyn Operator> {
    Arc::clone(&self.inner.lock().unwrap().nodes[id.0].operator)
  }
}

impl fmt::Debug for Graph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock().unwrap();
    f.debug_struct("Graph")
      .field("name", &inner.name)
      .field("nodes", &inner.nodes.len())
      .finish()
  }
}
