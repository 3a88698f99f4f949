//! Ambient "current graph" resolution.
//!
//! Node-construction code may omit the graph argument; it then resolves from
//! the innermost open graph of the caller's execution context. Two worlds are
//! supported simultaneously without cross-talk: plain call stacks get one
//! stack per OS thread, cooperatively-scheduled code gets one stack per task
//! (set up with [scope]). Inside a task scope the task-local stack is
//! authoritative and never falls through to the thread-local one; that is
//! what keeps sibling tasks on a single-threaded runtime isolated.

use crate::graph::Graph;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;

thread_local! {
  static THREAD_STACK: RefCell<Vec<Graph>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
  static TASK_STACK: RefCell<Vec<Graph>>;
}

/// The innermost open graph for the calling execution context, if any.
pub fn current_graph() -> Option<Graph> {
  match TASK_STACK.try_with(|stack| stack.borrow().last().cloned()) {
    Ok(top) => top,
    Err(_) => THREAD_STACK.with(|stack| stack.borrow().last().cloned()),
  }
}

/// Which stack a guard pushed onto; its drop pops that exact stack.
#[derive(Clone, Copy)]
enum StackWorld {
  Task,
  Thread,
}

fn push(graph: Graph) -> StackWorld {
  if TASK_STACK
    .try_with(|stack| stack.borrow_mut().push(graph.clone()))
    .is_ok()
  {
    return StackWorld::Task;
  }
  THREAD_STACK.with(|stack| stack.borrow_mut().push(graph));
  StackWorld::Thread
}

fn pop(world: StackWorld) {
  match world {
    StackWorld::Task => {
      let _ = TASK_STACK.try_with(|stack| {
        stack.borrow_mut().pop();
      });
    }
    StackWorld::Thread => THREAD_STACK.with(|stack| {
      stack.borrow_mut().pop();
    }),
  }
}

/// Runs a future with its own task-local graph stack.
///
/// Graph-building code inside the future resolves and pushes against that
/// stack instead of the thread's, so concurrent builders on one thread do
/// not pollute each other.
pub async fn scope<F: Future>(fut: F) -> F::Output {
  TASK_STACK.scope(RefCell::new(Vec::new()), fut).await
}

/// RAII handle for an open graph scope; pops on drop, on every exit path.
///
/// Obtained from [Graph::enter]. Guards must be dropped in reverse order of
/// acquisition within one context, which falls out of normal scoping. The
/// guard remembers which stack it pushed onto and pops only that one, and it
/// is not `Send`: a guard cannot migrate to another thread and pop a stack
/// it never pushed.
#[must_use = "the graph scope closes when this guard is dropped"]
pub struct ScopeGuard {
  graph: Graph,
  world: StackWorld,
  _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
  pub(crate) fn push(graph: Graph) -> Self {
    let world = push(graph.clone());
    Self {
      graph,
      world,
      _not_send: PhantomData,
    }
  }

  /// The graph this guard holds open.
  pub fn graph(&self) -> &Graph {
    &self.graph
  }
}

impl Drop for ScopeGuard {
  fn drop(&mut self) {
    pop(self.world);
  }
}
