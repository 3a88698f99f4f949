//! Operators: the node bodies the engine ships with, plus the trait custom
//! bodies implement.
//!
//! Every operator exposes one entry point, [Operator::run], which reads the
//! node's aggregated input from its task context and returns the computed
//! output; the runner writes it back and advances the state machine.

use crate::error::EngineError;
use crate::types::{RunContext, TaskContext, TaskOutput};
use async_trait::async_trait;

pub mod branch;
pub mod input;
pub mod join;
pub mod map;
pub mod reduce_stream;

pub use branch::branch;
pub use input::{channel_input, input, input_source, InputSource};
pub use join::join;
pub use map::map;
pub use reduce_stream::reduce_stream;

/// One unit of computation. Implement this directly for custom async bodies
/// (model calls, IO); the provided operators cover the common shapes.
#[async_trait]
pub trait Operator: Send + Sync {
  /// Computes this node's output from its task context. The body may
  /// suspend; the runner awaits it and owns all state bookkeeping.
  async fn run(&self, run: &RunContext, task: &mut TaskContext)
  -> Result<TaskOutput, EngineError>;
}
