use std::fmt::{self, Debug};

use crate::dtype::DType;
use crate::error::Result;
use crate::tensor::Tensor;

/// Element-wise single-input operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Abs,
    Neg,
    Exp,
    Log,
    Sqrt,
    Reciprocal,
    Relu,
    Sigmoid,
    Tanh,
    Floor,
    Ceil,
}

impl UnaryOp {
    /// Whether the operation is defined for `dtype`. Integers only support the
    /// sign-related operations.
    pub fn accepts(self, dtype: DType) -> bool {
        match dtype {
            DType::F32 | DType::F64 => true,
            DType::I64 => matches!(self, UnaryOp::Abs | UnaryOp::Neg | UnaryOp::Relu),
            DType::Bool | DType::Str => false,
        }
    }
}

/// Element-wise two-input operations with numpy broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Reductions over one or more axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

/// Index-of-extremum reductions along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgOp {
    Max,
    Min,
}

macro_rules! impl_display_lower {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", format!("{:?}", self).to_lowercase())
            }
        })*
    };
}

impl_display_lower!(UnaryOp, BinaryOp, ReduceOp, ArgOp);

/// Trait for pluggable compute backends.
///
/// Backends receive whole tensors and return freshly allocated results,
/// except for the `_inplace` variants which overwrite their first operand.
/// Layout-only operations (reshape, transpose, concat) live on `Tensor`
/// itself and do not go through a backend.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu", "cpu-rowwise").
    fn name(&self) -> &str;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: shape [m, k]
    /// - `b`: shape [k, n]
    /// - Returns: shape [m, n], same dtype as the operands
    fn matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;

    /// Element-wise unary operation, dtype preserved.
    fn unary(&self, op: UnaryOp, x: &Tensor) -> Result<Tensor>;

    /// Element-wise unary operation written into `x`.
    fn unary_inplace(&self, op: UnaryOp, x: &mut Tensor) -> Result<()>;

    /// Element-wise binary operation with broadcasting. Both operands must
    /// share a dtype.
    fn binary(&self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor>;

    /// Binary operation written into `a`. The broadcast of `a` and `b` must
    /// have `a`'s shape.
    fn binary_inplace(&self, op: BinaryOp, a: &mut Tensor, b: &Tensor) -> Result<()>;

    /// Reduce over `axes` (all axes when empty). Reduced axes are kept with
    /// extent 1 when `keep_dims`.
    fn reduce(&self, op: ReduceOp, x: &Tensor, axes: &[usize], keep_dims: bool)
        -> Result<Tensor>;

    /// Index of the first extremum along `axis`, as int64.
    fn arg_reduce(&self, op: ArgOp, x: &Tensor, axis: usize, keep_dims: bool) -> Result<Tensor>;

    /// Softmax along one axis: exp(x - max) / sum(exp(x - max)).
    fn softmax(&self, x: &Tensor, axis: usize) -> Result<Tensor>;
}
