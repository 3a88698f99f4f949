//! Input: a graph entry point with zero upstream nodes.
//!
//! The only way external data enters the graph: either the initial call data
//! the runner bound to this root, or an injected source queried per run.

use crate::error::{EngineError, NodeError};
use crate::node::Node;
use crate::operators::Operator;
use crate::types::{RunContext, TaskContext, TaskOutput, TaskValue};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

/// External data source for an Input node. Implementations may suspend
/// (read a file, call a service) and may produce a stream output.
#[async_trait]
pub trait InputSource: Send + Sync {
  async fn read(&self, call_data: Option<TaskValue>) -> Result<TaskOutput, NodeError>;
}

/// Reads from the injected source, or passes the bound call data through.
/// A root with no bound data and no source produces a unit value ("no data").
pub struct InputOperator {
  source: Option<Arc<dyn InputSource>>,
}

impl InputOperator {
  pub fn passthrough() -> Self {
    Self { source: None }
  }

  pub fn with_source(source: impl InputSource + 'static) -> Self {
    Self {
      source: Some(Arc::new(source)),
    }
  }
}

#[async_trait]
impl Operator for InputOperator {
  async fn run(
    &self,
    _run: &RunContext,
    task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    let call_data = task.call_data();
    match &self.source {
      Some(source) => {
        trace!(node = %task.label(), "input via source");
        source
          .read(call_data)
          .await
          .map_err(|e| EngineError::node_failed(task.label(), e))
      }
      None => {
        trace!(node = %task.label(), has_data = call_data.is_some(), "input passthrough");
        Ok(TaskOutput::Value(
          call_data.unwrap_or_else(|| Arc::new(()) as TaskValue),
        ))
      }
    }
  }
}

/// Builds an Input node that forwards its bound call data.
pub fn input(name: impl Into<String>) -> Node {
  Node::new(name, InputOperator::passthrough())
}

/// Builds an Input node backed by an injected source.
pub fn input_source(name: impl Into<String>, source: impl InputSource + 'static) -> Node {
  Node::new(name, InputOperator::with_source(source))
}

/// Source that emits a stream fed from a tokio channel, for data produced
/// outside the graph while the run is in flight. Single-pass like any other
/// stream output; a second read fails.
pub struct ChannelSource {
  rx: Mutex<Option<mpsc::Receiver<TaskValue>>>,
}

#[async_trait]
impl InputSource for ChannelSource {
  async fn read(&self, _call_data: Option<TaskValue>) -> Result<TaskOutput, NodeError> {
    let rx = self
      .rx
      .lock()
      .unwrap()
      .take()
      .ok_or("channel source already consumed")?;
    Ok(TaskOutput::stream(Box::pin(ReceiverStream::new(rx))))
  }
}

/// Builds a stream-producing Input node plus the sender that feeds it.
pub fn channel_input(name: impl Into<String>, buffer: usize) -> (Node, mpsc::Sender<TaskValue>) {
  let (tx, rx) = mpsc::channel(buffer);
  let node = input_source(
    name,
    ChannelSource {
      rx: Mutex::new(Some(rx)),
    },
  );
  (node, tx)
}
