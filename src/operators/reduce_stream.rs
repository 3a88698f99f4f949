//! ReduceStream: fold the single stream-typed upstream output to a scalar.

use crate::error::{EngineError, NodeError};
use crate::node::Node;
use crate::operators::Operator;
use crate::types::{RunContext, TaskContext, TaskOutput, TaskValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

type AccFn = Arc<dyn Fn(TaskValue, TaskValue) -> Result<TaskValue, NodeError> + Send + Sync>;

/// Folds the upstream stream element-by-element into an accumulator seeded
/// with `init`. Fails if the upstream output is not a stream or if there is
/// more than one parent.
pub struct ReduceStreamOperator {
  init: TaskValue,
  f: AccFn,
}

impl ReduceStreamOperator {
  pub fn new<F>(init: TaskValue, f: F) -> Self
  where
    F: Fn(TaskValue, TaskValue) -> Result<TaskValue, NodeError> + Send + Sync + 'static,
  {
    Self {
      init,
      f: Arc::new(f),
    }
  }
}

#[async_trait]
impl Operator for ReduceStreamOperator {
  async fn run(
    &self,
    _run: &RunContext,
    task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    trace!(node = %task.label(), "reduce stream");
    let f = Arc::clone(&self.f);
    task
      .inputs()
      .reduce(Arc::clone(&self.init), move |acc, item| f(acc, item))
      .await
  }
}

/// Builds a ReduceStream node. `init` seeds the accumulator each run.
pub fn reduce_stream<I, F>(name: impl Into<String>, init: I, f: F) -> Node
where
  I: std::any::Any + Send + Sync,
  F: Fn(TaskValue, TaskValue) -> Result<TaskValue, NodeError> + Send + Sync + 'static,
{
  Node::new(name, ReduceStreamOperator::new(Arc::new(init), f))
}
