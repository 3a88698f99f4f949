//! Per-node execution state machine.

/// State of one node within one run.
///
/// Transitions are monotonic: `Init → Running → {Success | Failed}`.
/// `Skip` is terminal and reserved for branch-pruned nodes; a skipped node
/// never enters `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Init,
  Running,
  Success,
  Failed,
  Skip,
}

impl TaskState {
  /// Returns true if `next` is a legal transition from this state.
  pub fn can_transition_to(self, next: TaskState) -> bool {
    matches!(
      (self, next),
      (TaskState::Init, TaskState::Running)
        | (TaskState::Init, TaskState::Skip)
        | (TaskState::Running, TaskState::Success)
        | (TaskState::Running, TaskState::Failed)
    )
  }

  /// Returns true if no further transitions are possible.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskState::Success | TaskState::Failed | TaskState::Skip
    )
  }
}
