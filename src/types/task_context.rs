//! Per-node, per-run execution record.

use crate::graph::NodeId;
use crate::types::{InputContext, TaskOutput, TaskState, TaskValue};
use std::fmt;
use tracing::trace;

/// One node's record within one run: state, aggregated input, optional
/// initial call data (roots only), and the produced output.
///
/// Created fresh on each `execute` call and discarded after it returns; the
/// runner is the only writer of state and output.
#[derive(Clone)]
pub struct TaskContext {
  node: NodeId,
  label: String,
  state: TaskState,
  inputs: InputContext,
  call_data: Option<TaskValue>,
  output: Option<TaskOutput>,
}

impl TaskContext {
  pub(crate) fn new(
    node: NodeId,
    label: String,
    inputs: InputContext,
    call_data: Option<TaskValue>,
  ) -> Self {
    Self {
      node,
      label,
      state: TaskState::Init,
      inputs,
      call_data,
      output: None,
    }
  }

  /// Record for a branch-pruned node: terminal `Skip`, no input, no output.
  pub(crate) fn skipped(node: NodeId, label: String) -> Self {
    Self {
      node,
      label: label.clone(),
      state: TaskState::Skip,
      inputs: InputContext::new(node, label, Vec::new()),
      call_data: None,
      output: None,
    }
  }

  pub fn node(&self) -> NodeId {
    self.node
  }

  /// Display label `name#id`, used in errors and logs.
  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn state(&self) -> TaskState {
    self.state
  }

  pub fn inputs(&self) -> &InputContext {
    &self.inputs
  }

  /// Initial data bound to this node, if it is a root of the plan.
  pub fn call_data(&self) -> Option<TaskValue> {
    self.call_data.clone()
  }

  pub fn output(&self) -> Option<&TaskOutput> {
    self.output.as_ref()
  }

  pub(crate) fn set_output(&mut self, output: TaskOutput) {
    self.output = Some(output);
  }

  /// Advances the state machine. Transitions are monotonic; the runner never
  /// requests an illegal one.
  pub(crate) fn transition(&mut self, next: TaskState) {
    debug_assert!(
      self.state.can_transition_to(next),
      "illegal transition {:?} -> {:?} on {}",
      self.state,
      next,
      self.label
    );
    trace!(node = %self.label, from = ?self.state, to = ?next, "state transition");
    self.state = next;
  }
}

impl fmt::Debug for TaskContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskContext")
      .field("node", &self.node)
      .field("label", &self.label)
      .field("state", &self.state)
      .field("parents", &self.inputs.parent_count())
      .field("has_call_data", &self.call_data.is_some())
      .field("output", &self.output)
      .finish()
  }
}
