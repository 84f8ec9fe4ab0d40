//! Kernel registries ("runtimes").
//!
//! A registry maps `(domain, op_type)` to constructors keyed by the opset
//! version that introduced them. A node resolves to the constructor with the
//! highest `since` version not above the opset its domain imports.

use std::collections::HashMap;
use std::sync::Arc;

use sg_onnx::{canonical_domain, Node, Opsets};
use sg_tensor::{ComputeBackend, CpuBackend, RowwiseBackend};
use tracing::{debug, trace};

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::ops;

/// Builds a kernel from a node, validating its attributes.
pub type KernelCtor = fn(&Node) -> Result<Box<dyn Kernel>>;

/// Names accepted by [`Registry::by_name`].
pub const RUNTIMES: &[&str] = &["cpu", "cpu-rowwise"];

/// A named set of kernel constructors bound to a compute backend.
#[derive(Debug, Clone)]
pub struct Registry {
    name: String,
    backend: Arc<dyn ComputeBackend>,
    entries: HashMap<(String, String), Vec<(i64, KernelCtor)>>,
}

impl Registry {
    /// An empty registry.
    pub fn new(name: impl Into<String>, backend: Arc<dyn ComputeBackend>) -> Self {
        Registry {
            name: name.into(),
            backend,
            entries: HashMap::new(),
        }
    }

    /// A registry holding every built-in kernel.
    pub fn with_builtins(name: impl Into<String>, backend: Arc<dyn ComputeBackend>) -> Self {
        let mut registry = Registry::new(name, backend);
        ops::register_builtins(&mut registry);
        debug!(
            runtime = %registry.name,
            backend = registry.backend.name(),
            operators = registry.entries.len(),
            "kernel registry ready"
        );
        registry
    }

    /// Reference loops.
    pub fn cpu() -> Self {
        Registry::with_builtins("cpu", Arc::new(CpuBackend::new()))
    }

    /// Row-at-a-time products, for single-sample inference.
    pub fn cpu_rowwise() -> Self {
        Registry::with_builtins("cpu-rowwise", Arc::new(RowwiseBackend::new()))
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "cpu" => Ok(Registry::cpu()),
            "cpu-rowwise" => Ok(Registry::cpu_rowwise()),
            other => Err(KernelError::UnknownRuntime(other.to_string())),
        }
    }

    /// Register `ctor` for `op_type` in `domain` from opset `since` on.
    /// A second registration with the same `since` replaces the first.
    pub fn register(&mut self, domain: &str, op_type: &str, since: i64, ctor: KernelCtor) -> &mut Self {
        let key = (canonical_domain(domain).to_string(), op_type.to_string());
        let versions = self.entries.entry(key).or_default();
        match versions.binary_search_by_key(&since, |(v, _)| *v) {
            Ok(i) => versions[i].1 = ctor,
            Err(i) => versions.insert(i, (since, ctor)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    /// The constructor for `op_type` at `version` of `domain`. `None` means
    /// the graph does not import the domain at all.
    pub fn resolve(&self, domain: &str, op_type: &str, version: Option<i64>) -> Result<KernelCtor> {
        let domain = canonical_domain(domain);
        let unsupported = || KernelError::UnsupportedOperator {
            op_type: op_type.to_string(),
            domain: domain.to_string(),
            version,
        };
        let version = version.ok_or_else(unsupported)?;
        let versions = self
            .entries
            .get(&(domain.to_string(), op_type.to_string()))
            .ok_or_else(unsupported)?;
        versions
            .iter()
            .rev()
            .find(|(since, _)| *since <= version)
            .map(|(_, ctor)| *ctor)
            .ok_or_else(unsupported)
    }

    /// Build the kernel for `node` under the graph's opset imports.
    pub fn create(&self, node: &Node, opsets: &Opsets) -> Result<Box<dyn Kernel>> {
        let version = opsets.version(&node.domain);
        let ctor = self.resolve(&node.domain, &node.op_type, version)?;
        trace!(node = %node.name, op_type = %node.op_type, ?version, "creating kernel");
        ctor(node)
    }

    /// Every registered `(domain, op_type, since)`, sorted.
    pub fn operators(&self) -> Vec<(String, String, i64)> {
        let mut ops: Vec<_> = self
            .entries
            .iter()
            .flat_map(|((domain, op), versions)| {
                versions
                    .iter()
                    .map(move |(since, _)| (domain.clone(), op.clone(), *since))
            })
            .collect();
        ops.sort();
        ops
    }
}
