//! Per-run context: the shared board, cancellation, the skip set, and the
//! trace of finished task contexts.

use crate::graph::NodeId;
use crate::types::{TaskContext, TaskOutput, TaskValue};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::trace;

/// Key→value side channel visible to every node of one run.
///
/// Keys are namespaced per producer/consumer pair, so unrelated operators
/// exchanging data out-of-band cannot collide. This is the engine's general
/// mechanism for passing data between two operators with no direct edge.
#[derive(Clone, Default)]
pub struct SharedBoard {
  slots: Arc<Mutex<HashMap<(String, String), TaskValue>>>,
}

impl SharedBoard {
  pub fn new() -> Self {
    Self::default()
  }

  /// A view of the board restricted to one namespace.
  pub fn scoped(&self, namespace: impl Into<String>) -> BoardScope {
    BoardScope {
      namespace: namespace.into(),
      board: self.clone(),
    }
  }
}

/// A namespaced view of the [SharedBoard].
#[derive(Clone)]
pub struct BoardScope {
  namespace: String,
  board: SharedBoard,
}

impl BoardScope {
  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
    self.put_value(key, Arc::new(value));
  }

  pub fn put_value(&self, key: &str, value: TaskValue) {
    trace!(namespace = %self.namespace, key, "board write");
    self
      .board
      .slots
      .lock()
      .unwrap()
      .insert((self.namespace.clone(), key.to_string()), value);
  }

  /// Typed read; `None` if the slot is empty or holds a different type.
  pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
    self.get_value(key).and_then(|v| v.downcast::<T>().ok())
  }

  pub fn get_value(&self, key: &str) -> Option<TaskValue> {
    self
      .board
      .slots
      .lock()
      .unwrap()
      .get(&(self.namespace.clone(), key.to_string()))
      .cloned()
  }

  pub fn remove(&self, key: &str) -> Option<TaskValue> {
    self
      .board
      .slots
      .lock()
      .unwrap()
      .remove(&(self.namespace.clone(), key.to_string()))
  }
}

/// Externally-triggerable cancellation for one run.
///
/// Clone the signal before starting the run; calling [CancelSignal::cancel]
/// from anywhere reaches a node body currently suspended inside the runner.
#[derive(Clone)]
pub struct CancelSignal {
  tx: Arc<watch::Sender<bool>>,
  rx: watch::Receiver<bool>,
}

impl Default for CancelSignal {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelSignal {
  pub fn new() -> Self {
    let (tx, rx) = watch::channel(false);
    Self {
      tx: Arc::new(tx),
      rx,
    }
  }

  pub fn cancel(&self) {
    let _ = self.tx.send(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once the signal is cancelled.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}

/// One execution invocation: created fresh per `execute` call.
///
/// Holds the shared board, the run's cancel signal, the branch skip set, and
/// the memoized task contexts of finished nodes. After a successful run the
/// current task context is the terminal node's.
#[derive(Clone)]
pub struct RunContext {
  board: SharedBoard,
  cancel: CancelSignal,
  skips: Arc<Mutex<HashSet<NodeId>>>,
  tasks: Arc<Mutex<HashMap<NodeId, TaskContext>>>,
  current: Arc<Mutex<Option<NodeId>>>,
}

impl std::fmt::Debug for RunContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RunContext").finish_non_exhaustive()
  }
}

impl RunContext {
  pub(crate) fn new(board: SharedBoard, cancel: CancelSignal) -> Self {
    Self {
      board,
      cancel,
      skips: Arc::new(Mutex::new(HashSet::new())),
      tasks: Arc::new(Mutex::new(HashMap::new())),
      current: Arc::new(Mutex::new(None)),
    }
  }

  pub fn board(&self) -> &SharedBoard {
    &self.board
  }

  pub fn cancel_signal(&self) -> &CancelSignal {
    &self.cancel
  }

  /// Marks a node as branch-pruned for this run. The runner will record a
  /// `Skip` task context for it instead of executing it.
  pub fn mark_skipped(&self, node: NodeId) {
    trace!(node = %node, "marking node skipped");
    self.skips.lock().unwrap().insert(node);
  }

  pub fn is_skipped(&self, node: NodeId) -> bool {
    self.skips.lock().unwrap().contains(&node)
  }

  /// The finished task context of a node, if it has completed in this run.
  pub fn task(&self, node: NodeId) -> Option<TaskContext> {
    self.tasks.lock().unwrap().get(&node).cloned()
  }

  /// The output of a completed node, if any (skipped nodes have none).
  pub fn task_output(&self, node: NodeId) -> Option<TaskOutput> {
    self
      .tasks
      .lock()
      .unwrap()
      .get(&node)
      .and_then(|t| t.output().cloned())
  }

  pub(crate) fn finish(&self, task: TaskContext) {
    self.tasks.lock().unwrap().insert(task.node(), task);
  }

  pub(crate) fn set_current(&self, node: NodeId) {
    *self.current.lock().unwrap() = Some(node);
  }

  /// The terminal node's task context after a successful run.
  pub fn current_task(&self) -> Option<TaskContext> {
    let id = (*self.current.lock().unwrap())?;
    self.task(id)
  }

  /// The terminal node's output after a successful run.
  pub fn output(&self) -> Option<TaskOutput> {
    self.current_task().and_then(|t| t.output().cloned())
  }
}
