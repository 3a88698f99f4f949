//! Branch: route the single upstream value to downstream nodes by predicate.
//!
//! Every arm's predicate is evaluated against the same upstream value; arms
//! whose predicate holds keep their target live, the rest are marked SKIP for
//! this run. The branch forwards the upstream value unchanged, so live
//! targets consume it as their input. Skip propagation is handled by the
//! runner: a node whose parents are all skipped is skipped in turn.

use crate::error::{EngineError, NodeError};
use crate::node::Node;
use crate::operators::Operator;
use crate::types::{RunContext, TaskContext, TaskOutput, TaskValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

type PredicateFn = Arc<dyn Fn(&TaskValue) -> Result<bool, NodeError> + Send + Sync>;

struct BranchArm {
  predicate: PredicateFn,
  target: Node,
}

/// Routes by (predicate → downstream node) pairs over a single non-stream
/// upstream value. A predicate evaluation failure counts as `false` for its
/// arm (the target is skipped) rather than aborting the run.
pub struct BranchOperator {
  arms: Vec<BranchArm>,
}

#[async_trait]
impl Operator for BranchOperator {
  async fn run(&self, run: &RunContext, task: &mut TaskContext) -> Result<TaskOutput, EngineError> {
    // Single non-stream parent; the same value feeds every predicate.
    let value = task.inputs().single_value()?;
    for arm in &self.arms {
      let keep = task
        .inputs()
        .predicate_map(|v| (arm.predicate)(v), false)?;
      let target_id = arm.target.require_id()?;
      if keep {
        debug!(node = %task.label(), target = %target_id, "branch keeps target");
      } else {
        debug!(node = %task.label(), target = %target_id, "branch skips target");
        run.mark_skipped(target_id);
      }
    }
    Ok(TaskOutput::Value(value))
  }
}

/// Builder for a Branch node: add arms with [BranchBuilder::when], then
/// [BranchBuilder::build]. Wiring the branch to its targets is still an
/// ordinary edge declaration.
pub struct BranchBuilder {
  name: String,
  arms: Vec<BranchArm>,
}

impl BranchBuilder {
  pub fn when<F>(mut self, predicate: F, target: &Node) -> Self
  where
    F: Fn(&TaskValue) -> Result<bool, NodeError> + Send + Sync + 'static,
  {
    self.arms.push(BranchArm {
      predicate: Arc::new(predicate),
      target: target.clone(),
    });
    self
  }

  /// Builds the branch node and wires each arm target downstream of it.
  pub fn build(self) -> Result<Node, EngineError> {
    let targets: Vec<Node> = self.arms.iter().map(|arm| arm.target.clone()).collect();
    let node = Node::new(self.name, BranchOperator { arms: self.arms });
    if !targets.is_empty() {
      let refs: Vec<&Node> = targets.iter().collect();
      node.set_downstream(&refs)?;
    }
    Ok(node)
  }
}

/// Starts a Branch node definition.
pub fn branch(name: impl Into<String>) -> BranchBuilder {
  BranchBuilder {
    name: name.into(),
    arms: Vec::new(),
  }
}
