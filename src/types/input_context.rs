//! Aggregated upstream outputs for one node, in declaration order.
//!
//! All aggregation operations validate their preconditions and surface a
//! structured error instead of silently ignoring a misconfiguration.

use crate::error::{EngineError, NodeError};
use crate::graph::NodeId;
use crate::types::{TaskOutput, TaskValue};
use futures::StreamExt;

/// The ordered view of a node's parent outputs for one run.
///
/// Skipped parents are dropped by the runner before construction, so the
/// parent list only ever holds outputs that actually exist.
#[derive(Debug, Clone)]
pub struct InputContext {
  node: NodeId,
  label: String,
  parents: Vec<TaskOutput>,
}

impl InputContext {
  pub(crate) fn new(node: NodeId, label: String, parents: Vec<TaskOutput>) -> Self {
    Self {
      node,
      label,
      parents,
    }
  }

  pub fn node(&self) -> NodeId {
    self.node
  }

  pub fn parent_count(&self) -> usize {
    self.parents.len()
  }

  /// Guard: exactly one parent. The error names this node and the actual
  /// parent count.
  pub fn check_single_parent(&self) -> Result<&TaskOutput, EngineError> {
    match self.parents.as_slice() {
      [only] => Ok(only),
      _ => Err(EngineError::UpstreamArity {
        node: self.label.clone(),
        expected: 1,
        found: self.parents.len(),
      }),
    }
  }

  /// Guard: exactly one parent whose output is a stream; takes the stream.
  pub fn check_stream(&self) -> Result<crate::types::ValueStream, EngineError> {
    self.check_single_parent()?.take_stream(&self.label)
  }

  /// The single parent's scalar value.
  pub fn single_value(&self) -> Result<TaskValue, EngineError> {
    self.check_single_parent()?.scalar(&self.label)
  }

  /// All parents' scalar values, in declaration order.
  pub fn values(&self) -> Result<Vec<TaskValue>, EngineError> {
    self
      .parents
      .iter()
      .map(|p| p.scalar(&self.label))
      .collect()
  }

  /// Applies a 1-to-1 function to the single parent's value.
  pub fn map<F>(&self, f: F) -> Result<TaskOutput, EngineError>
  where
    F: FnOnce(TaskValue) -> Result<TaskValue, NodeError>,
  {
    let value = self.single_value()?;
    let mapped = f(value).map_err(|e| EngineError::node_failed(&self.label, e))?;
    Ok(TaskOutput::Value(mapped))
  }

  /// Applies an N-ary function across all parents' values at once.
  /// Requires at least one parent.
  pub fn map_all<F>(&self, f: F) -> Result<TaskOutput, EngineError>
  where
    F: FnOnce(&[TaskValue]) -> Result<TaskValue, NodeError>,
  {
    if self.parents.is_empty() {
      return Err(EngineError::NoUpstream {
        node: self.label.clone(),
      });
    }
    let values = self.values()?;
    let combined = f(&values).map_err(|e| EngineError::node_failed(&self.label, e))?;
    Ok(TaskOutput::Value(combined))
  }

  /// Folds the single stream parent to one value with an accumulator.
  pub async fn reduce<F>(&self, init: TaskValue, f: F) -> Result<TaskOutput, EngineError>
  where
    F: Fn(TaskValue, TaskValue) -> Result<TaskValue, NodeError>,
  {
    let mut stream = self.check_stream()?;
    let mut acc = init;
    while let Some(item) = stream.next().await {
      acc = f(acc, item).map_err(|e| EngineError::node_failed(&self.label, e))?;
    }
    Ok(TaskOutput::Value(acc))
  }

  /// Applies a boolean predicate to the single parent's value. A predicate
  /// evaluation failure substitutes `failed_value` instead of propagating;
  /// used by Branch to decide routing.
  pub fn predicate_map<F>(&self, f: F, failed_value: bool) -> Result<bool, EngineError>
  where
    F: FnOnce(&TaskValue) -> Result<bool, NodeError>,
  {
    let value = self.single_value()?;
    Ok(f(&value).unwrap_or(failed_value))
  }
}
