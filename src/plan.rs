//! Plan compiler: derives an immutable execution plan from a terminal node.
//!
//! Walks `upstream` pointers transitively to find the reachable subgraph,
//! topologically sorts it (rejecting cycles with a structured error), picks
//! the roots, and binds initial call data to them.

use crate::error::EngineError;
use crate::graph::{Graph, NodeId};
use crate::node::Node;
use crate::scope::current_graph;
use crate::types::TaskValue;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Caller-supplied payload delivered to root nodes at run start.
#[derive(Clone, Default)]
pub enum InitialData {
  /// No data; roots read "no data".
  #[default]
  None,
  /// One payload, delivered verbatim; requires exactly one root.
  Single(TaskValue),
  /// Payloads keyed by root node id; missing entries resolve to "no data".
  PerRoot(HashMap<NodeId, TaskValue>),
}

impl InitialData {
  pub fn single<T: Any + Send + Sync>(value: T) -> Self {
    InitialData::Single(Arc::new(value))
  }

  pub fn per_root(entries: impl IntoIterator<Item = (NodeId, TaskValue)>) -> Self {
    InitialData::PerRoot(entries.into_iter().collect())
  }
}

/// Compiled, read-only plan for one run: execution order (upstream-first),
/// roots, terminal, and per-root initial data.
pub struct ExecutionPlan {
  graph: Graph,
  terminal: NodeId,
  order: Vec<NodeId>,
  roots: Vec<NodeId>,
  root_data: HashMap<NodeId, TaskValue>,
}

impl std::fmt::Debug for ExecutionPlan {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionPlan")
      .field("terminal", &self.terminal)
      .field("order", &self.order)
      .field("roots", &self.roots)
      .finish_non_exhaustive()
  }
}

impl ExecutionPlan {
  /// Compiles a plan from `terminal` and binds `initial` to the roots.
  ///
  /// A terminal that never joined a graph is registered into the ambient
  /// current graph, or a fresh private graph, so single-node runs work.
  #[instrument(level = "trace", skip_all, fields(terminal = %terminal.name()))]
  pub fn from_terminal(terminal: &Node, initial: InitialData) -> Result<Self, EngineError> {
    let graph = match terminal.graph() {
      Some(g) => g,
      None => {
        let g =
          current_graph().unwrap_or_else(|| Graph::new(format!("{}-graph", terminal.name())));
        terminal.ensure_registered(&g);
        g
      }
    };
    let terminal_id = terminal.require_id()?;

    let reachable = reachable_from(&graph, terminal_id);
    let order = topological_order(&graph, &reachable)?;
    let roots: Vec<NodeId> = order
      .iter()
      .copied()
      .filter(|id| graph.upstream(*id).is_empty())
      .collect();

    let root_data = bind_initial_data(&roots, initial)?;

    debug!(
      nodes = order.len(),
      roots = roots.len(),
      terminal = %terminal_id,
      "compiled execution plan"
    );
    Ok(Self {
      graph,
      terminal: terminal_id,
      order,
      roots,
      root_data,
    })
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn terminal(&self) -> NodeId {
    self.terminal
  }

  /// Reachable nodes in execution order: every node appears after all of its
  /// upstream nodes.
  pub fn order(&self) -> &[NodeId] {
    &self.order
  }

  /// Nodes with no upstream dependency; the entry points for initial data.
  pub fn roots(&self) -> &[NodeId] {
    &self.roots
  }

  /// Initial data bound to a root, if any.
  pub fn root_data(&self, id: NodeId) -> Option<TaskValue> {
    self.root_data.get(&id).cloned()
  }
}

/// Transitive upstream closure of `terminal`, terminal included.
fn reachable_from(graph: &Graph, terminal: NodeId) -> HashSet<NodeId> {
  let mut seen = HashSet::new();
  let mut pending = vec![terminal];
  while let Some(id) = pending.pop() {
    if seen.insert(id) {
      pending.extend(graph.upstream(id));
    }
  }
  seen
}

/// Kahn's algorithm restricted to the reachable subgraph. A leftover node
/// means a cycle; the error names the nodes on it.
fn topological_order(
  graph: &Graph,
  reachable: &HashSet<NodeId>,
) -> Result<Vec<NodeId>, EngineError> {
  let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
  for &id in reachable {
    let degree = graph
      .upstream(id)
      .iter()
      .filter(|p| reachable.contains(p))
      .count();
    in_degree.insert(id, degree);
  }

  let mut queue: VecDeque<NodeId> = {
    let mut ready: Vec<NodeId> = in_degree
      .iter()
      .filter(|(_, d)| **d == 0)
      .map(|(id, _)| *id)
      .collect();
    ready.sort();
    ready.into()
  };

  let mut order = Vec::with_capacity(reachable.len());
  while let Some(id) = queue.pop_front() {
    order.push(id);
    for next in graph.downstream(id) {
      if !reachable.contains(&next) {
        continue;
      }
      let degree = in_degree.get_mut(&next).expect("reachable node missing");
      *degree -= 1;
      if *degree == 0 {
        queue.push_back(next);
      }
    }
  }

  if order.len() != reachable.len() {
    let leftover: HashSet<NodeId> = in_degree
      .into_iter()
      .filter(|(_, d)| *d > 0)
      .map(|(id, _)| id)
      .collect();
    let mut members: Vec<NodeId> = cycle_members(graph, leftover).into_iter().collect();
    members.sort();
    let nodes = members.iter().map(|id| graph.node_label(*id)).collect();
    return Err(EngineError::Cycle { nodes });
  }
  Ok(order)
}

/// Narrows the unsortable leftover down to the nodes actually on a cycle.
///
/// The leftover is everything reachable from a cycle; repeatedly peeling
/// nodes with no remaining downstream inside the set strips the acyclic
/// tails hanging off it, leaving only cycle members.
fn cycle_members(graph: &Graph, mut leftover: HashSet<NodeId>) -> HashSet<NodeId> {
  loop {
    let peeled: Vec<NodeId> = leftover
      .iter()
      .copied()
      .filter(|id| {
        graph
          .downstream(*id)
          .iter()
          .all(|next| !leftover.contains(next))
      })
      .collect();
    if peeled.is_empty() {
      return leftover;
    }
    for id in peeled {
      leftover.remove(&id);
    }
  }
}

fn bind_initial_data(
  roots: &[NodeId],
  initial: InitialData,
) -> Result<HashMap<NodeId, TaskValue>, EngineError> {
  match initial {
    InitialData::None => Ok(HashMap::new()),
    InitialData::Single(value) => match roots {
      [only] => Ok(HashMap::from([(*only, value)])),
      _ => Err(EngineError::UnroutableInitialData),
    },
    InitialData::PerRoot(mut entries) => {
      let root_set: HashSet<NodeId> = roots.iter().copied().collect();
      entries.retain(|id, _| root_set.contains(id));
      Ok(entries)
    }
  }
}
