//! `sg-tensor` - Tensors, symbolic shapes and compute backends for stepgraph.
//!
//! This crate provides:
//! - A `Tensor` type backed by typed CPU storage, and the `Value` enum bound
//!   to names during graph execution
//! - A `ComputeBackend` trait with the `CpuBackend` and `RowwiseBackend`
//!   implementations
//! - Concrete `Shape` utilities and broadcasting
//! - The symbolic `Dimension` algebra and `ShapeObject` used by shape
//!   inference

pub mod backend;
pub mod cpu;
pub mod dim;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod symbolic;
pub mod tensor;
pub mod value;

// Re-export primary types at the crate root for convenience.
pub use backend::{ArgOp, BinaryOp, ComputeBackend, ReduceOp, UnaryOp};
pub use cpu::{CpuBackend, RowwiseBackend};
pub use dim::{Bindings, DimEvaluator, DimOp, Dimension};
pub use dtype::{DType, Numeric};
pub use error::{Result, TensorError};
pub use shape::{normalize_axis, Shape};
pub use storage::{CpuStorage, Element};
pub use symbolic::ShapeObject;
pub use tensor::Tensor;
pub use value::{Label, Record, Value};
