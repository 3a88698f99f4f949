//! Node handle: one unit of computation and its edge-declaration API.
//!
//! A `Node` is cheap to clone; all clones share the same underlying state.
//! Identity is allocated the first time the node joins a graph and never
//! changes; equality derives from it, while hashing uses the shared state's
//! address so a handle stays findable in hashed collections across
//! registration.

use crate::error::EngineError;
use crate::graph::{Graph, NodeId};
use crate::operators::Operator;
use crate::scope::current_graph;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

struct NodeInner {
  name: String,
  operator: Arc<dyn Operator>,
  membership: Option<(Graph, NodeId)>,
}

/// Handle to one node. Edge declarations resolve the owning graph from the
/// participants, or from the ambient current graph when none of them has one.
#[derive(Clone)]
pub struct Node {
  inner: Arc<Mutex<NodeInner>>,
}

impl Node {
  /// Creates a detached node; it joins a graph on its first edge declaration
  /// (or at plan compilation for isolated terminals).
  pub fn new(name: impl Into<String>, operator: impl Operator + 'static) -> Self {
    Self::from_operator(name, Arc::new(operator))
  }

  pub fn from_operator(name: impl Into<String>, operator: Arc<dyn Operator>) -> Self {
    Self {
      inner: Arc::new(Mutex::new(NodeInner {
        name: name.into(),
        operator,
        membership: None,
      })),
    }
  }

  pub fn name(&self) -> String {
    self.inner.lock().unwrap().name.clone()
  }

  /// Identity within the owning graph, once assigned.
  pub fn id(&self) -> Option<NodeId> {
    self.inner.lock().unwrap().membership.as_ref().map(|m| m.1)
  }

  pub fn graph(&self) -> Option<Graph> {
    self
      .inner
      .lock()
      .unwrap()
      .membership
      .as_ref()
      .map(|m| m.0.clone())
  }

  /// Identity, or [EngineError::Detached] when membership is required.
  pub fn require_id(&self) -> Result<NodeId, EngineError> {
    self.id().ok_or_else(|| EngineError::Detached {
      node: self.name(),
    })
  }

  /// Declares every node in `parents` as an upstream dependency of `self`.
  ///
  /// All participants must resolve to at most one distinct graph; a node
  /// without one adopts the resolved graph (assigning its identity). Edges
  /// update both endpoints; duplicates are no-ops.
  pub fn set_upstream(&self, parents: &[&Node]) -> Result<(), EngineError> {
    let graph = self.resolve_graph(parents)?;
    let self_id = self.ensure_registered(&graph);
    for parent in parents {
      let parent_id = parent.ensure_registered(&graph);
      graph.add_edge(parent_id, self_id);
    }
    Ok(())
  }

  /// Declares every node in `children` as a downstream dependent of `self`.
  pub fn set_downstream(&self, children: &[&Node]) -> Result<(), EngineError> {
    let graph = self.resolve_graph(children)?;
    let self_id = self.ensure_registered(&graph);
    for child in children {
      let child_id = child.ensure_registered(&graph);
      graph.add_edge(self_id, child_id);
    }
    Ok(())
  }

  /// Chaining sugar: `a.then(&b)` wires `a → b` and returns `b`.
  pub fn then(&self, next: &Node) -> Result<Node, EngineError> {
    next.set_upstream(&[self])?;
    Ok(next.clone())
  }

  /// Chaining sugar: `b.depends_on(&a)` wires `a → b` and returns `b`.
  pub fn depends_on(&self, parent: &Node) -> Result<Node, EngineError> {
    self.set_upstream(&[parent])?;
    Ok(self.clone())
  }

  /// At most one distinct graph among `self` and `peers`; falls back to the
  /// ambient current graph when none of them belongs to one.
  fn resolve_graph(&self, peers: &[&Node]) -> Result<Graph, EngineError> {
    let mut resolved: Option<Graph> = None;
    for node in std::iter::once(self).chain(peers.iter().copied()) {
      if let Some(g) = node.graph() {
        match &resolved {
          None => resolved = Some(g),
          Some(found) if found.same_graph(&g) => {}
          Some(_) => return Err(EngineError::CrossGraph),
        }
      }
    }
    match resolved {
      Some(g) => Ok(g),
      None => current_graph().ok_or(EngineError::NoCurrentGraph),
    }
  }

  /// Registers the node into `graph` on first membership; identity is
  /// assigned once and stable thereafter.
  pub(crate) fn ensure_registered(&self, graph: &Graph) -> NodeId {
    let mut inner = self.inner.lock().unwrap();
    if let Some((_, id)) = &inner.membership {
      return *id;
    }
    let id = graph.register(inner.name.clone(), Arc::clone(&inner.operator));
    inner.membership = Some((graph.clone(), id));
    id
  }
}

impl PartialEq for Node {
  fn eq(&self, other: &Self) -> bool {
    match (self.id(), other.id()) {
      (Some(a), Some(b)) => {
        a == b
          && match (self.graph(), other.graph()) {
            (Some(ga), Some(gb)) => ga.same_graph(&gb),
            _ => false,
          }
      }
      // Detached nodes are only equal to themselves.
      _ => Arc::ptr_eq(&self.inner, &other.inner),
    }
  }
}

impl Eq for Node {}

// Equal nodes always share the same inner state (identity is assigned to one
// shared inner, never duplicated), so the pointer is a stable hash input that
// does not change when a detached node later joins a graph. Hashing by id
// would silently strand pre-registration entries in hashed collections.
impl Hash for Node {
  fn hash<H: Hasher>(&self, state: &mut H) {
    (Arc::as_ptr(&self.inner) as usize).hash(state);
  }
}

impl fmt::Debug for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.inner.lock().unwrap();
    f.debug_struct("Node")
      .field("name", &inner.name)
      .field("id", &inner.membership.as_ref().map(|m| m.1))
      .finish()
  }
}
