//! A node's produced value: a single scalar or a lazy single-pass stream.
//!
//! Values flow through the engine as `Arc<dyn Any + Send + Sync>`; operators
//! downcast to their expected types at the point of use.

use crate::error::EngineError;
use futures::Stream;
use std::any::Any;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// The payload type that flows between nodes.
pub type TaskValue = Arc<dyn Any + Send + Sync>;

/// A lazy, time-ordered, potentially unbounded sequence of values.
/// Single-pass: once taken, it cannot be taken again.
pub type ValueStream = Pin<Box<dyn Stream<Item = TaskValue> + Send>>;

/// A node's output for one run: one value, or a stream consumed at most once.
///
/// Cloning a stream output shares the underlying take-once slot, so fan-out
/// does not duplicate the stream; whichever consumer takes it first wins and
/// later takers get [EngineError::StreamConsumed].
#[derive(Clone)]
pub enum TaskOutput {
  Value(TaskValue),
  Stream(Arc<Mutex<Option<ValueStream>>>),
}

impl TaskOutput {
  /// Wraps a concrete value.
  pub fn value<T: Any + Send + Sync>(value: T) -> Self {
    TaskOutput::Value(Arc::new(value))
  }

  /// Wraps an already type-erased value.
  pub fn from_value(value: TaskValue) -> Self {
    TaskOutput::Value(value)
  }

  /// Wraps a stream in a take-once slot.
  pub fn stream(stream: ValueStream) -> Self {
    TaskOutput::Stream(Arc::new(Mutex::new(Some(stream))))
  }

  pub fn is_stream(&self) -> bool {
    matches!(self, TaskOutput::Stream(_))
  }

  /// Returns the scalar value, or [EngineError::UnexpectedStream] for a
  /// stream output. `node` labels the error.
  pub fn scalar(&self, node: &str) -> Result<TaskValue, EngineError> {
    match self {
      TaskOutput::Value(v) => Ok(Arc::clone(v)),
      TaskOutput::Stream(_) => Err(EngineError::UnexpectedStream {
        node: node.to_string(),
      }),
    }
  }

  /// Takes the stream out of its slot. Fails with [EngineError::NotAStream]
  /// for a scalar output and [EngineError::StreamConsumed] if the stream was
  /// already taken in this run.
  pub fn take_stream(&self, node: &str) -> Result<ValueStream, EngineError> {
    match self {
      TaskOutput::Value(_) => Err(EngineError::NotAStream {
        node: node.to_string(),
      }),
      TaskOutput::Stream(slot) => {
        let mut guard = slot.lock().expect("stream slot poisoned");
        guard.take().ok_or_else(|| EngineError::StreamConsumed {
          node: node.to_string(),
        })
      }
    }
  }
}

impl fmt::Debug for TaskOutput {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskOutput::Value(_) => f.write_str("TaskOutput::Value(..)"),
      TaskOutput::Stream(slot) => {
        let consumed = slot
          .lock()
          .map(|guard| guard.is_none())
          .unwrap_or(true);
        write!(f, "TaskOutput::Stream {{ consumed: {consumed} }}")
      }
    }
  }
}
