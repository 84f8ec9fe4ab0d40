use crate::backend::{ArgOp, BinaryOp, ComputeBackend, ReduceOp, UnaryOp};
use crate::cpu::{matmul, CpuBackend};
use crate::error::Result;
use crate::tensor::Tensor;

/// Backend tuned for single-sample inference.
///
/// Matrix products are computed as one dot product per output cell, reading
/// columns of the right operand in place instead of materializing a
/// transposed copy. Everything else is delegated to [`CpuBackend`].
#[derive(Debug, Clone, Default)]
pub struct RowwiseBackend {
    inner: CpuBackend,
}

impl RowwiseBackend {
    pub fn new() -> Self {
        RowwiseBackend {
            inner: CpuBackend::new(),
        }
    }
}

impl ComputeBackend for RowwiseBackend {
    fn name(&self) -> &str {
        "cpu-rowwise"
    }

    fn matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        matmul::check_operands(a, b)?;
        with_numeric!(a.dtype(), T => matmul::matmul_rowwise::<T>(a, b))
    }

    fn unary(&self, op: UnaryOp, x: &Tensor) -> Result<Tensor> {
        self.inner.unary(op, x)
    }

    fn unary_inplace(&self, op: UnaryOp, x: &mut Tensor) -> Result<()> {
        self.inner.unary_inplace(op, x)
    }

    fn binary(&self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.inner.binary(op, a, b)
    }

    fn binary_inplace(&self, op: BinaryOp, a: &mut Tensor, b: &Tensor) -> Result<()> {
        self.inner.binary_inplace(op, a, b)
    }

    fn reduce(
        &self,
        op: ReduceOp,
        x: &Tensor,
        axes: &[usize],
        keep_dims: bool,
    ) -> Result<Tensor> {
        self.inner.reduce(op, x, axes, keep_dims)
    }

    fn arg_reduce(&self, op: ArgOp, x: &Tensor, axis: usize, keep_dims: bool) -> Result<Tensor> {
        self.inner.arg_reduce(op, x, axis, keep_dims)
    }

    fn softmax(&self, x: &Tensor, axis: usize) -> Result<Tensor> {
        self.inner.softmax(x, axis)
    }
}
