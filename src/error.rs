//! Engine error taxonomy: configuration errors surface at build/plan time,
//! execution errors carry the original node-body error as their source.

use thiserror::Error;

/// Error type for node bodies and user-supplied functions.
///
/// Whatever a node body raises travels out of `execute` unmodified as the
/// `source` of [EngineError::NodeFailed], so root cause is preserved.
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// All errors the engine itself produces.
#[derive(Debug, Error)]
pub enum EngineError {
  /// An edge declaration resolved nodes to more than one distinct graph.
  #[error("dependency declared across more than one graph")]
  CrossGraph,

  /// No graph argument, no peer with a graph, and no ambient graph in scope.
  #[error("no current graph in scope")]
  NoCurrentGraph,

  /// A node was used in a context that requires graph membership.
  #[error("node '{node}' is not registered in any graph")]
  Detached { node: String },

  /// Wrong number of upstream nodes for an operator or input operation.
  #[error("node '{node}' expects exactly {expected} upstream node(s), found {found}")]
  UpstreamArity {
    node: String,
    expected: usize,
    found: usize,
  },

  /// An N-ary operation ran on a node with no upstream nodes at all.
  #[error("node '{node}' requires at least one upstream node")]
  NoUpstream { node: String },

  /// A stream operation was requested on a scalar upstream output.
  #[error("node '{node}': upstream output is not a stream")]
  NotAStream { node: String },

  /// A scalar operation was requested on a stream upstream output.
  #[error("node '{node}': upstream output is a stream where a scalar is required")]
  UnexpectedStream { node: String },

  /// A single-pass stream output was taken a second time.
  #[error("node '{node}': stream output was already consumed")]
  StreamConsumed { node: String },

  /// The reachable subgraph is not acyclic.
  #[error("dependency cycle through nodes {nodes:?}")]
  Cycle { nodes: Vec<String> },

  /// A plan has multiple roots but initial data was not keyed by node id.
  #[error("initial data for a multi-root plan must be keyed by node id")]
  UnroutableInitialData,

  /// A node body raised an error during `run`; the run is aborted.
  #[error("node '{node}' failed")]
  NodeFailed {
    node: String,
    #[source]
    source: NodeError,
  },

  /// The run was cancelled while this node was executing.
  #[error("run cancelled while executing node '{node}'")]
  Cancelled { node: String },

  /// The run deadline elapsed while this node was executing.
  #[error("run deadline exceeded while executing node '{node}'")]
  Timeout { node: String },
}

impl EngineError {
  /// Wraps a node-body error, recording which node raised it.
  pub fn node_failed(node: impl Into<String>, source: impl Into<NodeError>) -> Self {
    EngineError::NodeFailed {
      node: node.into(),
      source: source.into(),
    }
  }
}
