use std::fmt::Debug;

use sg_tensor::{ComputeBackend, ShapeObject, Tensor, Value};

use crate::error::{KernelError, Result};

/// Runs the nested graphs of the node currently being executed.
///
/// Provided by the executor; a kernel names the sub-graph by the attribute
/// that carries it and passes body inputs positionally.
pub trait SubgraphRunner {
    fn run_subgraph(&self, attribute: &str, inputs: Vec<Value>) -> Result<Vec<Value>>;
}

/// Everything a kernel may use while computing.
#[derive(Clone, Copy)]
pub struct KernelContext<'a> {
    pub backend: &'a dyn ComputeBackend,
    subgraphs: Option<&'a dyn SubgraphRunner>,
}

impl<'a> KernelContext<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        KernelContext {
            backend,
            subgraphs: None,
        }
    }

    pub fn with_subgraphs(mut self, runner: &'a dyn SubgraphRunner) -> Self {
        self.subgraphs = Some(runner);
        self
    }

    pub fn run_subgraph(&self, attribute: &str, inputs: Vec<Value>) -> Result<Vec<Value>> {
        match self.subgraphs {
            Some(runner) => runner.run_subgraph(attribute, inputs),
            None => Err(KernelError::Unimplemented(format!(
                "no executor available for sub-graph '{}'",
                attribute
            ))),
        }
    }
}

/// A node's operator, bound to its validated attributes.
///
/// Kernels are built once per session and shared across concurrent runs, so
/// they hold no mutable state. `compute` never mutates its inputs and never
/// keeps references to them.
pub trait Kernel: Send + Sync + Debug {
    fn op_type(&self) -> &str;

    /// Produce the node outputs, in declaration order.
    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>>;

    /// Output shapes for the given input shapes, when the kernel can tell.
    fn infer_shapes(&self, _inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        None
    }

    /// Input slot whose buffer may be overwritten by the output.
    fn inplace_input(&self) -> Option<usize> {
        None
    }

    /// Compute while owning the value at [`Kernel::inplace_input`].
    ///
    /// `others` holds the remaining inputs in order, with the owned slot
    /// removed. Returns the outputs and whether the owned buffer was reused.
    fn compute_inplace(
        &self,
        owned: Value,
        others: &[&Value],
        ctx: &KernelContext,
    ) -> Result<(Vec<Value>, bool)> {
        let slot = self.inplace_input().unwrap_or(0).min(others.len());
        let mut inputs: Vec<&Value> = others.to_vec();
        inputs.insert(slot, &owned);
        Ok((self.compute(&inputs, ctx)?, false))
    }
}

/// Check the number of supplied inputs.
pub(crate) fn check_arity(op: &str, inputs: &[&Value], min: usize, max: usize) -> Result<()> {
    if inputs.len() < min || inputs.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(KernelError::InvalidInput(format!(
            "{} expects {} inputs, got {}",
            op,
            expected,
            inputs.len()
        )));
    }
    Ok(())
}

/// The tensor at `index`; record sequences are rejected.
pub(crate) fn tensor_at<'v>(inputs: &[&'v Value], index: usize) -> Result<&'v Tensor> {
    let value = inputs
        .get(index)
        .ok_or_else(|| KernelError::InvalidInput(format!("missing input {}", index)))?;
    Ok(value.as_tensor()?)
}

/// Integer list carried by a 1-D int64 tensor input (shape, axes).
pub(crate) fn int_list(tensor: &Tensor) -> Result<Vec<i64>> {
    if tensor.shape().ndim() > 1 {
        return Err(KernelError::ShapeMismatch(format!(
            "expected a 1-D int64 tensor, got {}",
            tensor.shape()
        )));
    }
    Ok(tensor.data::<i64>()?.to_vec())
}
