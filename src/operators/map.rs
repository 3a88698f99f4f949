//! Map: apply a 1-to-1 function to the single upstream output.

use crate::error::{EngineError, NodeError};
use crate::node::Node;
use crate::operators::Operator;
use crate::types::{RunContext, TaskContext, TaskOutput, TaskValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

type MapFn = Arc<dyn Fn(TaskValue) -> Result<TaskValue, NodeError> + Send + Sync>;

/// Applies a function to the single parent's value. Any other parent count
/// fails at invocation, naming the node and the actual count.
pub struct MapOperator {
  f: MapFn,
}

impl MapOperator {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(TaskValue) -> Result<TaskValue, NodeError> + Send + Sync + 'static,
  {
    Self { f: Arc::new(f) }
  }
}

#[async_trait]
impl Operator for MapOperator {
  async fn run(
    &self,
    _run: &RunContext,
    task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    trace!(node = %task.label(), "map");
    task.inputs().map(|v| (self.f)(v))
  }
}

/// Builds a Map node.
pub fn map<F>(name: impl Into<String>, f: F) -> Node
where
  F: Fn(TaskValue) -> Result<TaskValue, NodeError> + Send + Sync + 'static,
{
  Node::new(name, MapOperator::new(f))
}
