//! Runner tests: ordering, exactly-once execution, fail-fast, skip
//! propagation, cancellation, and timeouts.

use crate::error::EngineError;
use crate::graph::Graph;
use crate::node::Node;
use crate::operators::{Operator, branch, input, join, map};
use crate::plan::InitialData;
use crate::runner::{RunOptions, WorkflowRunner};
use crate::types::{CancelSignal, RunContext, TaskContext, TaskOutput, TaskState, TaskValue};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_test::assert_ok;

fn scalar_i64(run: &RunContext) -> i64 {
  *run
    .output()
    .unwrap()
    .scalar("terminal")
    .unwrap()
    .downcast_ref::<i64>()
    .unwrap()
}

fn add(n: i64) -> impl Fn(TaskValue) -> Result<TaskValue, crate::error::NodeError> {
  move |v| {
    let x = *v.downcast_ref::<i64>().unwrap();
    Ok(Arc::new(x + n) as TaskValue)
  }
}

fn sum_join(values: &[TaskValue]) -> Result<TaskValue, crate::error::NodeError> {
  let sum: i64 = values.iter().map(|v| *v.downcast_ref::<i64>().unwrap()).sum();
  Ok(Arc::new(sum) as TaskValue)
}

#[tokio::test]
async fn chain_runs_upstream_first() {
  let g = Graph::new("chain");
  let _guard = g.enter();
  let start = input("start");
  let doubled = map("double", |v: TaskValue| {
    let x = *v.downcast_ref::<i64>().unwrap();
    Ok(Arc::new(x * 2) as TaskValue)
  });
  let bumped = map("bump", add(1));
  doubled.set_upstream(&[&start]).unwrap();
  bumped.set_upstream(&[&doubled]).unwrap();

  let run = assert_ok!(WorkflowRunner::execute(&bumped, InitialData::single(5i64)).await);
  assert_eq!(scalar_i64(&run), 11);
}

#[tokio::test]
async fn join_merges_two_roots() {
  let g = Graph::new("join");
  let _guard = g.enter();
  let left = input("left");
  let right = input("right");
  let sum = join("sum", sum_join);
  sum.set_upstream(&[&left, &right]).unwrap();

  let initial = InitialData::per_root([
    (left.id().unwrap(), Arc::new(3i64) as TaskValue),
    (right.id().unwrap(), Arc::new(4i64) as TaskValue),
  ]);
  let run = assert_ok!(WorkflowRunner::execute(&sum, initial).await);
  assert_eq!(scalar_i64(&run), 7);
}

#[tokio::test]
async fn shared_upstream_runs_exactly_once() {
  let g = Graph::new("diamond");
  let _guard = g.enter();
  let calls = Arc::new(AtomicUsize::new(0));
  let counted_calls = Arc::clone(&calls);

  let start = input("start");
  let counted = map("counted", move |v: TaskValue| {
    counted_calls.fetch_add(1, Ordering::SeqCst);
    Ok(v)
  });
  let left = map("left", add(10));
  let right = map("right", add(100));
  let sum = join("sum", sum_join);
  counted.set_upstream(&[&start]).unwrap();
  left.set_upstream(&[&counted]).unwrap();
  right.set_upstream(&[&counted]).unwrap();
  sum.set_upstream(&[&left, &right]).unwrap();

  let run = WorkflowRunner::execute(&sum, InitialData::single(1i64))
    .await
    .unwrap();
  assert_eq!(scalar_i64(&run), (1 + 10) + (1 + 100));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_aborts_before_downstream_runs() {
  let g = Graph::new("failing");
  let _guard = g.enter();
  let downstream_ran = Arc::new(AtomicUsize::new(0));
  let witness = Arc::clone(&downstream_ran);

  let start = input("start");
  let broken = map("broken", |_v: TaskValue| {
    Err::<TaskValue, _>("backend unavailable".into())
  });
  let after = map("after", move |v: TaskValue| {
    witness.fetch_add(1, Ordering::SeqCst);
    Ok(v)
  });
  broken.set_upstream(&[&start]).unwrap();
  after.set_upstream(&[&broken]).unwrap();

  let err = WorkflowRunner::execute(&after, InitialData::single(1i64))
    .await
    .unwrap_err();
  match err {
    EngineError::NodeFailed { node, source } => {
      assert!(node.starts_with("broken#"));
      assert_eq!(source.to_string(), "backend unavailable");
    }
    other => panic!("expected NodeFailed, got {other:?}"),
  }
  assert_eq!(downstream_ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn branch_skips_rejected_arm_and_its_descendants() {
  let g = Graph::new("branching");
  let _guard = g.enter();
  let small_ran = Arc::new(AtomicUsize::new(0));
  let big_ran = Arc::new(AtomicUsize::new(0));
  let small_witness = Arc::clone(&small_ran);
  let big_witness = Arc::clone(&big_ran);

  let start = input("start");
  let small = map("small", move |v: TaskValue| {
    small_witness.fetch_add(1, Ordering::SeqCst);
    Ok(v)
  });
  let big = map("big", move |v: TaskValue| {
    big_witness.fetch_add(1, Ordering::SeqCst);
    Ok(v)
  });
  let big_tail = map("big_tail", add(1000));
  let route = branch("route")
    .when(|v| Ok(*v.downcast_ref::<i64>().unwrap() < 10), &small)
    .when(|v| Ok(*v.downcast_ref::<i64>().unwrap() >= 10), &big)
    .build()
    .unwrap();
  route.set_upstream(&[&start]).unwrap();
  big_tail.set_upstream(&[&big]).unwrap();
  let merged = join("merged", sum_join);
  merged.set_upstream(&[&small, &big_tail]).unwrap();

  let run = WorkflowRunner::execute(&merged, InitialData::single(5i64))
    .await
    .unwrap();
  // Only the small arm contributes; big and big_tail leave Skip records.
  assert_eq!(scalar_i64(&run), 5);
  assert_eq!(small_ran.load(Ordering::SeqCst), 1);
  assert_eq!(big_ran.load(Ordering::SeqCst), 0);
  assert_eq!(
    run.task(big.id().unwrap()).unwrap().state(),
    TaskState::Skip
  );
  assert_eq!(
    run.task(big_tail.id().unwrap()).unwrap().state(),
    TaskState::Skip
  );
}

#[tokio::test]
async fn skipped_terminal_yields_no_output() {
  let g = Graph::new("skip-terminal");
  let _guard = g.enter();
  let start = input("start");
  let target = map("target", add(1));
  let route = branch("route")
    .when(|_v| Ok(false), &target)
    .build()
    .unwrap();
  route.set_upstream(&[&start]).unwrap();

  let run = WorkflowRunner::execute(&target, InitialData::single(1i64))
    .await
    .unwrap();
  assert!(run.output().is_none());
  assert_eq!(
    run.task(target.id().unwrap()).unwrap().state(),
    TaskState::Skip
  );
}

struct SleepOperator(Duration);

#[async_trait]
impl Operator for SleepOperator {
  async fn run(
    &self,
    _run: &RunContext,
    _task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    tokio::time::sleep(self.0).await;
    Ok(TaskOutput::value(0i64))
  }
}

#[tokio::test]
async fn cancellation_interrupts_a_running_node() {
  let g = Graph::new("cancel");
  let _guard = g.enter();
  let start = input("start");
  let slow = Node::new("slow", SleepOperator(Duration::from_secs(30)));
  slow.set_upstream(&[&start]).unwrap();

  let cancel = CancelSignal::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    trigger.cancel();
  });

  let err = WorkflowRunner::execute_with(
    &slow,
    InitialData::None,
    RunOptions::default().with_cancel(cancel),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, EngineError::Cancelled { node } if node.starts_with("slow#")));
}

#[tokio::test]
async fn deadline_covers_the_whole_run() {
  let g = Graph::new("deadline");
  let _guard = g.enter();
  let start = input("start");
  let slow = Node::new("slow", SleepOperator(Duration::from_secs(30)));
  slow.set_upstream(&[&start]).unwrap();

  let err = WorkflowRunner::execute_with(
    &slow,
    InitialData::None,
    RunOptions::default().with_timeout(Duration::from_millis(20)),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, EngineError::Timeout { node } if node.starts_with("slow#")));
}
