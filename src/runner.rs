//! Workflow runner: executes a compiled plan node by node.
//!
//! Nodes run in plan order, so every upstream output exists before its
//! dependents read it and every node runs at most once per call. Failures
//! abort the run immediately; skipped nodes leave a `Skip` record and no
//! output.

use crate::error::EngineError;
use crate::node::Node;
use crate::operators::Operator;
use crate::plan::{ExecutionPlan, InitialData};
use crate::types::{
  CancelSignal, InputContext, RunContext, SharedBoard, TaskContext, TaskOutput, TaskState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

/// Per-run knobs: a wall-clock deadline over the whole run and an external
/// cancellation handle.
#[derive(Clone, Default)]
pub struct RunOptions {
  pub timeout: Option<Duration>,
  pub cancel: Option<CancelSignal>,
}

impl RunOptions {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
    self.cancel = Some(cancel);
    self
  }
}

/// Executes plans compiled from a terminal node.
pub struct WorkflowRunner;

impl WorkflowRunner {
  /// Compiles a plan from `terminal` and runs it to completion.
  pub async fn execute(terminal: &Node, initial: InitialData) -> Result<RunContext, EngineError> {
    Self::execute_with(terminal, initial, RunOptions::default()).await
  }

  /// Like [WorkflowRunner::execute], with a deadline and/or cancel handle.
  pub async fn execute_with(
    terminal: &Node,
    initial: InitialData,
    options: RunOptions,
  ) -> Result<RunContext, EngineError> {
    let plan = ExecutionPlan::from_terminal(terminal, initial)?;
    Self::run_plan(&plan, options).await
  }

  /// Runs an already-compiled plan. The returned [RunContext] holds every
  /// finished task record and exposes the terminal output.
  #[instrument(level = "trace", skip_all, fields(terminal = %plan.terminal()))]
  pub async fn run_plan(
    plan: &ExecutionPlan,
    options: RunOptions,
  ) -> Result<RunContext, EngineError> {
    let cancel = options.cancel.unwrap_or_default();
    let run = RunContext::new(SharedBoard::new(), cancel.clone());
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let graph = plan.graph();

    for &id in plan.order() {
      let label = graph.node_label(id);
      let parents = graph.upstream(id);

      let pruned = run.is_skipped(id);
      let inherited = !parents.is_empty()
        && parents
          .iter()
          .all(|p| matches!(run.task(*p).map(|t| t.state()), Some(TaskState::Skip)));
      if pruned || inherited {
        if inherited && !pruned {
          run.mark_skipped(id);
        }
        debug!(node = %label, "node skipped");
        run.finish(TaskContext::skipped(id, label));
        continue;
      }

      // Skipped parents contribute nothing; their outputs are absent.
      let outputs: Vec<TaskOutput> = parents.iter().filter_map(|p| run.task_output(*p)).collect();
      let inputs = InputContext::new(id, label.clone(), outputs);
      let mut task = TaskContext::new(id, label.clone(), inputs, plan.root_data(id));
      task.transition(TaskState::Running);
      trace!(node = %label, "node running");

      let operator = graph.operator(id);
      let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled { node: label.clone() }),
        result = run_operator(&operator, deadline, &run, &mut task, &label) => result,
      };

      match result {
        Ok(output) => {
          task.set_output(output);
          task.transition(TaskState::Success);
          run.finish(task);
        }
        Err(err) => {
          task.transition(TaskState::Failed);
          warn!(node = %label, error = %err, "node failed");
          run.finish(task);
          return Err(err);
        }
      }
    }

    run.set_current(plan.terminal());
    Ok(run)
  }
}

async fn run_operator(
  operator: &Arc<dyn Operator>,
  deadline: Option<Instant>,
  run: &RunContext,
  task: &mut TaskContext,
  label: &str,
) -> Result<TaskOutput, EngineError> {
  match deadline {
    Some(deadline) => tokio::time::timeout_at(deadline, operator.run(run, task))
      .await
      .map_err(|_| EngineError::Timeout {
        node: label.to_string(),
      })?,
    None => operator.run(run, task).await,
  }
}
