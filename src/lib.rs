//! # flowloom
//!
//! Dataflow graph execution engine: wire operators into a directed acyclic
//! graph, compile an execution plan from a terminal node, and run every
//! reachable node exactly once, upstream-first.
//!
//! ## Architecture
//!
//! Nodes carry type-erased payloads ([types::TaskValue]) between operators
//! (see `operators` module): Input, Map, Join, Branch, ReduceStream, plus
//! the cache chain in `cache`. Graph membership is resolved lazily from an
//! ambient scope (`scope`), the plan compiler (`plan`) topologically sorts
//! the reachable subgraph, and the runner (`runner`) executes it with
//! cancellation and deadline support. Out-of-band data travels on the
//! namespaced shared board ([types::SharedBoard]).

pub mod cache;
pub mod error;
pub mod graph;
pub mod node;
pub mod operators;
pub mod plan;
pub mod runner;
#[cfg(test)]
mod runner_test;
pub mod scope;
pub mod types;

pub use error::{EngineError, NodeError};
pub use graph::{Graph, NodeId};
pub use node::Node;
pub use plan::{ExecutionPlan, InitialData};
pub use runner::{RunOptions, WorkflowRunner};
pub use scope::scope;
pub use types::{
  BoardScope, CancelSignal, InputContext, RunContext, SharedBoard, TaskContext, TaskOutput,
  TaskState, TaskValue, ValueStream,
};
