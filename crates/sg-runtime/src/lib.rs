//! `sg-runtime` - graph execution for stepgraph.
//!
//! This crate provides:
//! - `Session`, which orders a graph once, resolves a kernel for every node
//!   and runs the result any number of times
//! - Release of intermediate values after their last use, and in-place
//!   reuse of input buffers where no later node can observe it
//! - Symbolic shape inference over the whole graph
//! - DOT and JSON export of a loaded graph

pub mod error;
mod exec;
pub mod export;
mod inplace;
pub mod options;
pub mod order;
mod program;
pub mod session;
mod shapes;

pub use error::{ErrorKind, Result, RuntimeError};
pub use export::{graph_record, model_record, to_dot, to_json, DotOptions, GraphRecord, ModelRecord};
pub use options::SessionOptions;
pub use order::topological_order;
pub use session::{ModelInfo, Phase, RunTrace, Session};
