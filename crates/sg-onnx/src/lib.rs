//! `sg-onnx` - ONNX graph model and loader for stepgraph.
//!
//! This crate provides:
//! - The immutable `Graph`/`Node`/`Attribute` model and `Model` metadata
//! - A `GraphBuilder` enforcing unique node names and single assignment
//! - A protobuf decoder reading `ModelProto` files via `Model::open` and
//!   `Model::from_bytes`

pub mod builder;
pub mod error;
pub mod graph;
pub mod proto;

pub use builder::{GraphBuilder, DEFAULT_ML_OPSET, DEFAULT_OPSET};
pub use error::{LoadError, Result};
pub use graph::{
    canonical_domain, Attribute, AttributeKind, DimSpec, Graph, Model, Node, Opsets, ValueInfo,
    ValueType, DEFAULT_DOMAIN, ML_DOMAIN,
};
