//! Task execution contracts: per-node state, output wrapping, input
//! aggregation, and the per-run context shared by every node of one run.

mod input_context;
mod run_context;
mod task_context;
mod task_output;
mod task_state;

pub use input_context::InputContext;
pub use run_context::{BoardScope, CancelSignal, RunContext, SharedBoard};
pub use task_context::TaskContext;
pub use task_output::{TaskOutput, TaskValue, ValueStream};
pub use task_state::TaskState;
