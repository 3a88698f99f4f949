//! Cache-augmented composition over the shared board.
//!
//! Caching is a pattern assembled from three cooperating operators rather
//! than an engine feature: a lookup node derives a key and records a hit on
//! the board, a `cached` wrapper short-circuits the expensive body when a hit
//! is present, and a write node taps the produced value back into the store.
//! All three coordinate through one board namespace, so several independent
//! cache chains can share a run without colliding.

use crate::error::{EngineError, NodeError};
use crate::node::Node;
use crate::operators::Operator;
use crate::types::{RunContext, TaskContext, TaskOutput, TaskValue};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Async key→value store backing the cache operators.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<TaskValue>, NodeError>;
  async fn put(&self, key: &str, value: TaskValue) -> Result<(), NodeError>;
}

/// In-memory [CacheStore]; clones share one map.
#[derive(Clone, Default)]
pub struct MemoryCache {
  slots: Arc<Mutex<HashMap<String, TaskValue>>>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.slots.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.lock().unwrap().is_empty()
  }
}

#[async_trait]
impl CacheStore for MemoryCache {
  async fn get(&self, key: &str) -> Result<Option<TaskValue>, NodeError> {
    Ok(self.slots.lock().unwrap().get(key).cloned())
  }

  async fn put(&self, key: &str, value: TaskValue) -> Result<(), NodeError> {
    self.slots.lock().unwrap().insert(key.to_string(), value);
    Ok(())
  }
}

/// Stable cache key derived from a serializable parameter struct.
pub struct CacheKey;

impl CacheKey {
  /// Hashes the JSON form of `params`. Field order follows the struct
  /// declaration, so equal parameter sets always produce the same key.
  pub fn derive<P: Serialize>(params: &P) -> Result<String, NodeError> {
    let json = serde_json::to_string(params)?;
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
  }
}

type KeyFn = Arc<dyn Fn(&TaskValue) -> Result<String, NodeError> + Send + Sync>;

/// Pre-stage: derives the cache key from its input, probes the store, and
/// leaves `key` (and `hit`, when present) on the board under its namespace.
/// The input passes through untouched.
pub struct CacheLookupOperator {
  store: Arc<dyn CacheStore>,
  namespace: String,
  key_fn: KeyFn,
}

#[async_trait]
impl Operator for CacheLookupOperator {
  async fn run(&self, run: &RunContext, task: &mut TaskContext) -> Result<TaskOutput, EngineError> {
    let value = task.inputs().single_value()?;
    let key = (self.key_fn)(&value).map_err(|e| EngineError::node_failed(task.label(), e))?;
    let hit = self
      .store
      .get(&key)
      .await
      .map_err(|e| EngineError::node_failed(task.label(), e))?;

    let board = run.board().scoped(self.namespace.as_str());
    board.put("key", key.clone());
    match hit {
      Some(cached) => {
        debug!(node = %task.label(), key = %key, "cache hit");
        board.put_value("hit", cached);
      }
      None => trace!(node = %task.label(), key = %key, "cache miss"),
    }
    Ok(TaskOutput::Value(value))
  }
}

/// Wraps an expensive operator: a recorded hit in the namespace short-circuits
/// to the cached value, otherwise the inner operator runs.
pub struct CachedOperator {
  inner: Arc<dyn Operator>,
  namespace: String,
}

#[async_trait]
impl Operator for CachedOperator {
  async fn run(&self, run: &RunContext, task: &mut TaskContext) -> Result<TaskOutput, EngineError> {
    if let Some(hit) = run.board().scoped(self.namespace.as_str()).get_value("hit") {
      debug!(node = %task.label(), "serving cached value");
      return Ok(TaskOutput::Value(hit));
    }
    self.inner.run(run, task).await
  }
}

/// Post-stage: forwards its input and writes the fully observed value back to
/// the store under the key recorded by the lookup stage.
///
/// Scalars are written immediately. A stream is tapped element by element via
/// an `async-stream` wrapper and written once exhausted; consumers see the
/// original elements unchanged.
pub struct CacheWriteOperator {
  store: Arc<dyn CacheStore>,
  namespace: String,
}

#[async_trait]
impl Operator for CacheWriteOperator {
  async fn run(&self, run: &RunContext, task: &mut TaskContext) -> Result<TaskOutput, EngineError> {
    let board = run.board().scoped(self.namespace.as_str());
    let Some(key) = board.get::<String>("key") else {
      // No lookup stage ran in this namespace; nothing to write back.
      trace!(node = %task.label(), "no cache key recorded, forwarding");
      return forward(task);
    };
    let key = key.as_ref().clone();
    if board.get_value("hit").is_some() {
      // Value came from the store already; rewriting it is pointless.
      return forward(task);
    }

    let parent = task.inputs().check_single_parent()?;
    match parent {
      TaskOutput::Value(value) => {
        self
          .store
          .put(&key, Arc::clone(value))
          .await
          .map_err(|e| EngineError::node_failed(task.label(), e))?;
        debug!(node = %task.label(), key = %key, "cached scalar");
        Ok(TaskOutput::Value(Arc::clone(value)))
      }
      TaskOutput::Stream(_) => {
        let mut upstream = task.inputs().check_stream()?;
        let store = Arc::clone(&self.store);
        let label = task.label().to_string();
        let tapped = stream! {
          let mut observed: Vec<TaskValue> = Vec::new();
          while let Some(item) = upstream.next().await {
            observed.push(Arc::clone(&item));
            yield item;
          }
          let finished = assemble(observed);
          if let Err(error) = store.put(&key, finished).await {
            warn!(node = %label, key = %key, %error, "cache write failed");
          } else {
            debug!(node = %label, key = %key, "cached stream");
          }
        };
        Ok(TaskOutput::stream(Box::pin(tapped)))
      }
    }
  }
}

/// Forwards the single parent output unchanged, scalar or stream.
fn forward(task: &TaskContext) -> Result<TaskOutput, EngineError> {
  match task.inputs().check_single_parent()? {
    TaskOutput::Value(value) => Ok(TaskOutput::Value(Arc::clone(value))),
    TaskOutput::Stream(_) => Ok(TaskOutput::stream(task.inputs().check_stream()?)),
  }
}

/// Collapses observed stream elements into one storable value: all-string
/// streams concatenate, anything else is kept as the element vector.
fn assemble(observed: Vec<TaskValue>) -> TaskValue {
  if observed.iter().all(|v| v.downcast_ref::<String>().is_some()) {
    let text: String = observed
      .iter()
      .filter_map(|v| v.downcast_ref::<String>())
      .map(String::as_str)
      .collect();
    Arc::new(text)
  } else {
    Arc::new(observed)
  }
}

/// Builds a lookup node for `namespace` backed by `store`.
pub fn cache_lookup<F>(
  name: impl Into<String>,
  store: Arc<dyn CacheStore>,
  namespace: impl Into<String>,
  key_fn: F,
) -> Node
where
  F: Fn(&TaskValue) -> Result<String, NodeError> + Send + Sync + 'static,
{
  Node::new(
    name,
    CacheLookupOperator {
      store,
      namespace: namespace.into(),
      key_fn: Arc::new(key_fn),
    },
  )
}

/// Wraps `inner` so a hit in `namespace` bypasses it.
pub fn cached(
  name: impl Into<String>,
  namespace: impl Into<String>,
  inner: impl Operator + 'static,
) -> Node {
  Node::new(
    name,
    CachedOperator {
      inner: Arc::new(inner),
      namespace: namespace.into(),
    },
  )
}

/// Builds a write-back node for `namespace` backed by `store`.
pub fn cache_write(
  name: impl Into<String>,
  store: Arc<dyn CacheStore>,
  namespace: impl Into<String>,
) -> Node {
  Node::new(
    name,
    CacheWriteOperator {
      store,
      namespace: namespace.into(),
    },
  )
}
