//! Join: apply an N-ary combining function across all parent outputs at once.

use crate::error::{EngineError, NodeError};
use crate::node::Node;
use crate::operators::Operator;
use crate::types::{RunContext, TaskContext, TaskOutput, TaskValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

type JoinFn = Arc<dyn Fn(&[TaskValue]) -> Result<TaskValue, NodeError> + Send + Sync>;

/// Combines all parents' values (declaration order) with one function call.
/// Requires at least one parent; the closure bound guarantees a callable at
/// construction.
pub struct JoinOperator {
  f: JoinFn,
}

impl JoinOperator {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(&[TaskValue]) -> Result<TaskValue, NodeError> + Send + Sync + 'static,
  {
    Self { f: Arc::new(f) }
  }
}

#[async_trait]
impl Operator for JoinOperator {
  async fn run(
    &self,
    _run: &RunContext,
    task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    trace!(node = %task.label(), parents = task.inputs().parent_count(), "join");
    task.inputs().map_all(|values| (self.f)(values))
  }
}

/// Builds a Join node.
pub fn join<F>(name: impl Into<String>, f: F) -> Node
where
  F: Fn(&[TaskValue]) -> Result<TaskValue, NodeError> + Send + Sync + 'static,
{
  Node::new(name, JoinOperator::new(f))
}
