//! End-to-end pipelines through the public API: graph construction under a
//! scope, plan compilation, branching, caching, streaming, and run control.

use flowloom::cache::{CacheKey, MemoryCache, cache_lookup, cache_write, cached};
use flowloom::operators::{Operator, branch, input, join, map, reduce_stream};
use flowloom::{
  CancelSignal, EngineError, InitialData, RunContext, RunOptions, TaskContext, TaskOutput,
  TaskValue, WorkflowRunner,
};
use async_trait::async_trait;
use futures::stream;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn init_tracing() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn as_i64(run: &RunContext) -> i64 {
  *run
    .output()
    .unwrap()
    .scalar("terminal")
    .unwrap()
    .downcast_ref::<i64>()
    .unwrap()
}

fn as_string(run: &RunContext) -> String {
  run
    .output()
    .unwrap()
    .scalar("terminal")
    .unwrap()
    .downcast_ref::<String>()
    .unwrap()
    .clone()
}

#[tokio::test]
async fn fan_out_fan_in_pipeline() {
  init_tracing();
  let g = flowloom::Graph::new("pipeline");
  let _guard = g.enter();

  let start = input("start");
  let double = map("double", |v: TaskValue| {
    Ok(Arc::new(v.downcast_ref::<i64>().unwrap() * 2) as TaskValue)
  });
  let negate = map("negate", |v: TaskValue| {
    Ok(Arc::new(-v.downcast_ref::<i64>().unwrap()) as TaskValue)
  });
  let sum = join("sum", |values| {
    let total: i64 = values.iter().map(|v| *v.downcast_ref::<i64>().unwrap()).sum();
    Ok(Arc::new(total) as TaskValue)
  });
  double.set_upstream(&[&start]).unwrap();
  negate.set_upstream(&[&start]).unwrap();
  sum.set_upstream(&[&double, &negate]).unwrap();

  let run = WorkflowRunner::execute(&sum, InitialData::single(21i64))
    .await
    .unwrap();
  assert_eq!(as_i64(&run), 42 - 21);
}

#[tokio::test]
async fn branch_routes_one_of_two_pipelines() {
  init_tracing();
  let g = flowloom::Graph::new("routing");
  let _guard = g.enter();

  let start = input("start");
  let shout = map("shout", |v: TaskValue| {
    Ok(Arc::new(v.downcast_ref::<String>().unwrap().to_uppercase()) as TaskValue)
  });
  let hush = map("hush", |v: TaskValue| {
    Ok(Arc::new(v.downcast_ref::<String>().unwrap().to_lowercase()) as TaskValue)
  });
  let route = branch("route")
    .when(|v| Ok(v.downcast_ref::<String>().unwrap().len() <= 5), &shout)
    .when(|v| Ok(v.downcast_ref::<String>().unwrap().len() > 5), &hush)
    .build()
    .unwrap();
  route.set_upstream(&[&start]).unwrap();
  let merged = join("merged", |values| {
    let parts: Vec<&str> = values
      .iter()
      .map(|v| v.downcast_ref::<String>().unwrap().as_str())
      .collect();
    Ok(Arc::new(parts.join("")) as TaskValue)
  });
  merged.set_upstream(&[&shout, &hush]).unwrap();

  let run = WorkflowRunner::execute(&merged, InitialData::single("Hey".to_string()))
    .await
    .unwrap();
  assert_eq!(as_string(&run), "HEY");

  let run = WorkflowRunner::execute(&merged, InitialData::single("Hello There".to_string()))
    .await
    .unwrap();
  assert_eq!(as_string(&run), "hello there");
}

struct TokenStream(Vec<&'static str>);

#[async_trait]
impl Operator for TokenStream {
  async fn run(
    &self,
    _run: &RunContext,
    _task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    let items: Vec<TaskValue> = self
      .0
      .iter()
      .map(|t| Arc::new(t.to_string()) as TaskValue)
      .collect();
    Ok(TaskOutput::stream(Box::pin(stream::iter(items))))
  }
}

#[derive(Serialize)]
struct Params<'a> {
  prompt: &'a str,
  model: &'a str,
}

#[tokio::test]
async fn cached_streaming_generation_runs_once() {
  init_tracing();
  let store = Arc::new(MemoryCache::new());
  let generations = Arc::new(AtomicUsize::new(0));
  let g = flowloom::Graph::new("generation");
  let _guard = g.enter();

  let witness = Arc::clone(&generations);
  let prompt = input("prompt");
  let lookup = cache_lookup("lookup", store.clone(), "generation", |v| {
    let prompt = v.downcast_ref::<String>().ok_or("prompt must be a string")?;
    CacheKey::derive(&Params {
      prompt,
      model: "tiny-8b",
    })
  });
  let generate = cached(
    "generate",
    "generation",
    CountingTokens {
      tokens: vec!["fl", "ow", "lo", "om"],
      calls: witness,
    },
  );
  let write = cache_write("write", store.clone(), "generation");
  let fold = reduce_stream("fold", String::new(), |acc, item| {
    let mut s = acc.downcast_ref::<String>().unwrap().clone();
    s.push_str(item.downcast_ref::<String>().unwrap());
    Ok(Arc::new(s) as TaskValue)
  });
  lookup.set_upstream(&[&prompt]).unwrap();
  generate.set_upstream(&[&lookup]).unwrap();
  write.set_upstream(&[&generate]).unwrap();
  fold.set_upstream(&[&write]).unwrap();

  let run = WorkflowRunner::execute(&fold, InitialData::single("spell it".to_string()))
    .await
    .unwrap();
  assert_eq!(as_string(&run), "flowloom");
  assert_eq!(generations.load(Ordering::SeqCst), 1);

  // Second run hits the store: the generator body never executes again and
  // the cached scalar flows to the terminal.
  let g2 = flowloom::Graph::new("generation-again");
  let _guard2 = g2.enter();
  let prompt = input("prompt");
  let lookup = cache_lookup("lookup", store.clone(), "generation", |v| {
    let prompt = v.downcast_ref::<String>().ok_or("prompt must be a string")?;
    CacheKey::derive(&Params {
      prompt,
      model: "tiny-8b",
    })
  });
  let generate = cached(
    "generate",
    "generation",
    CountingTokens {
      tokens: vec!["fl", "ow", "lo", "om"],
      calls: Arc::clone(&generations),
    },
  );
  let write = cache_write("write", store.clone(), "generation");
  lookup.set_upstream(&[&prompt]).unwrap();
  generate.set_upstream(&[&lookup]).unwrap();
  write.set_upstream(&[&generate]).unwrap();

  let run = WorkflowRunner::execute(&write, InitialData::single("spell it".to_string()))
    .await
    .unwrap();
  assert_eq!(as_string(&run), "flowloom");
  assert_eq!(generations.load(Ordering::SeqCst), 1);
}

struct CountingTokens {
  tokens: Vec<&'static str>,
  calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Operator for CountingTokens {
  async fn run(
    &self,
    _run: &RunContext,
    _task: &mut TaskContext,
  ) -> Result<TaskOutput, EngineError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let items: Vec<TaskValue> = self
      .tokens
      .iter()
      .map(|t| Arc::new(t.to_string()) as TaskValue)
      .collect();
    Ok(TaskOutput::stream(Box::pin(stream::iter(items))))
  }
}

#[tokio::test]
async fn graphs_in_parallel_tasks_stay_isolated() {
  init_tracing();
  let build_and_run = |label: &'static str, seed: i64| {
    flowloom::scope(async move {
      let g = flowloom::Graph::new(label);
      let _guard = g.enter();
      let start = input("start");
      let bump = map("bump", |v: TaskValue| {
        Ok(Arc::new(v.downcast_ref::<i64>().unwrap() + 1) as TaskValue)
      });
      bump.set_upstream(&[&start]).unwrap();
      let run = WorkflowRunner::execute(&bump, InitialData::single(seed))
        .await
        .unwrap();
      as_i64(&run)
    })
  };

  let (a, b) = tokio::join!(build_and_run("left", 10), build_and_run("right", 100));
  assert_eq!(a, 11);
  assert_eq!(b, 101);
}

#[tokio::test]
async fn run_options_bound_the_run() {
  init_tracing();
  struct Stall;

  #[async_trait]
  impl Operator for Stall {
    async fn run(
      &self,
      _run: &RunContext,
      _task: &mut TaskContext,
    ) -> Result<TaskOutput, EngineError> {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(TaskOutput::value(()))
    }
  }

  let g = flowloom::Graph::new("bounded");
  let _guard = g.enter();
  let slow = flowloom::Node::new("slow", Stall);

  let err = WorkflowRunner::execute_with(
    &slow,
    InitialData::None,
    RunOptions::default().with_timeout(Duration::from_millis(25)),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, EngineError::Timeout { .. }));

  let cancel = CancelSignal::new();
  cancel.cancel();
  let err = WorkflowRunner::execute_with(
    &slow,
    InitialData::None,
    RunOptions::default().with_cancel(cancel),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, EngineError::Cancelled { .. }));
}
