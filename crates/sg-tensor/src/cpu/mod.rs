// Runs `$body` with `$T` aliased to the Rust element type of a numeric dtype.
macro_rules! with_numeric {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::I64 => {
                type $T = i64;
                $body
            }
            other => Err($crate::error::TensorError::UnsupportedDType(format!(
                "{} is not numeric",
                other
            ))),
        }
    };
}

pub mod binary;
pub mod matmul;
pub mod reduce;
pub mod rowwise;
pub mod unary;

use crate::backend::{ArgOp, BinaryOp, ComputeBackend, ReduceOp, UnaryOp};
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::tensor::Tensor;

pub use rowwise::RowwiseBackend;

/// Pure-Rust CPU compute backend.
///
/// Implements all operations with straightforward loops optimized for
/// correctness rather than peak performance. Intended as a reference
/// implementation and fallback.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        matmul::check_operands(a, b)?;
        with_numeric!(a.dtype(), T => matmul::matmul_accumulate::<T>(a, b))
    }

    fn unary(&self, op: UnaryOp, x: &Tensor) -> Result<Tensor> {
        unary::check(op, x)?;
        with_numeric!(x.dtype(), T => unary::unary::<T>(op, x))
    }

    fn unary_inplace(&self, op: UnaryOp, x: &mut Tensor) -> Result<()> {
        unary::check(op, x)?;
        with_numeric!(x.dtype(), T => unary::unary_inplace::<T>(op, x))
    }

    fn binary(&self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary::check_dtypes(a, b)?;
        with_numeric!(a.dtype(), T => binary::binary::<T>(op, a, b))
    }

    fn binary_inplace(&self, op: BinaryOp, a: &mut Tensor, b: &Tensor) -> Result<()> {
        binary::check_dtypes(a, b)?;
        with_numeric!(a.dtype(), T => binary::binary_inplace::<T>(op, a, b))
    }

    fn reduce(
        &self,
        op: ReduceOp,
        x: &Tensor,
        axes: &[usize],
        keep_dims: bool,
    ) -> Result<Tensor> {
        with_numeric!(x.dtype(), T => reduce::reduce::<T>(op, x, axes, keep_dims))
    }

    fn arg_reduce(&self, op: ArgOp, x: &Tensor, axis: usize, keep_dims: bool) -> Result<Tensor> {
        with_numeric!(x.dtype(), T => reduce::arg_reduce::<T>(op, x, axis, keep_dims))
    }

    fn softmax(&self, x: &Tensor, axis: usize) -> Result<Tensor> {
        match x.dtype() {
            DType::F32 => reduce::softmax::<f32>(x, axis),
            DType::F64 => reduce::softmax::<f64>(x, axis),
            other => Err(TensorError::UnsupportedDType(format!(
                "softmax on {}",
                other
            ))),
        }
    }
}
