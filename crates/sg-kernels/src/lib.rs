//! `sg-kernels` - operator kernels and kernel registries for stepgraph.
//!
//! This crate provides:
//! - The `Kernel` trait: validated, immutable per-node operators
//! - Attribute schemas (`AttributeSpec`) and the `AttrReader` that applies them
//! - The built-in kernels under [`ops`]
//! - `Registry`, mapping (domain, operator, opset) to kernel constructors and
//!   binding them to a `ComputeBackend`

pub mod attrs;
pub mod error;
pub mod kernel;
pub mod ops;
pub mod registry;

pub use attrs::{AttrDefault, AttrReader, AttributeSpec};
pub use error::{KernelError, Result};
pub use kernel::{Kernel, KernelContext, SubgraphRunner};
pub use registry::{KernelCtor, Registry, RUNTIMES};
