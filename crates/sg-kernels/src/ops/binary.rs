use sg_onnx::Node;
use sg_tensor::{BinaryOp, Shape, ShapeObject, Tensor, Value};

use crate::attrs::{AttrReader, AttributeSpec};
use crate::error::{KernelError, Result};
use crate::kernel::{check_arity, tensor_at, Kernel, KernelContext};

/// Element-wise binary operator with numpy broadcasting.
///
/// Both operands must share a dtype, except for `Pow`, whose exponent is
/// cast to the base's dtype.
#[derive(Debug)]
pub struct Binary {
    op_type: String,
    op: BinaryOp,
}

impl Binary {
    pub fn new(node: &Node, op: BinaryOp) -> Result<Self> {
        const SCHEMA: &[AttributeSpec] = &[];
        AttrReader::new(node, SCHEMA)?;
        Ok(Binary {
            op_type: node.op_type.clone(),
            op,
        })
    }

    fn rhs(&self, a: &Tensor, b: &Tensor) -> Result<Option<Tensor>> {
        if self.op == BinaryOp::Pow && a.dtype() != b.dtype() {
            return Ok(Some(b.cast(a.dtype())?));
        }
        Ok(None)
    }
}

impl Kernel for Binary {
    fn op_type(&self) -> &str {
        &self.op_type
    }

    fn compute(&self, inputs: &[&Value], ctx: &KernelContext) -> Result<Vec<Value>> {
        check_arity(&self.op_type, inputs, 2, 2)?;
        let a = tensor_at(inputs, 0)?;
        let b = tensor_at(inputs, 1)?;
        let cast = self.rhs(a, b)?;
        let b = cast.as_ref().unwrap_or(b);
        Ok(vec![ctx.backend.binary(self.op, a, b)?.into()])
    }

    fn infer_shapes(&self, inputs: &[ShapeObject]) -> Option<Vec<ShapeObject>> {
        let [a, b] = inputs else {
            return None;
        };
        let out = ShapeObject::broadcast(a, b).ok()?;
        Some(vec![out.with_dtype(a.dtype())])
    }

    fn inplace_input(&self) -> Option<usize> {
        Some(0)
    }

    fn compute_inplace(
        &self,
        owned: Value,
        others: &[&Value],
        ctx: &KernelContext,
    ) -> Result<(Vec<Value>, bool)> {
        let [b] = others else {
            return Err(KernelError::InvalidInput(format!(
                "{} expects 2 inputs, got {}",
                self.op_type,
                others.len() + 1
            )));
        };
        let b = b.as_tensor()?;
        let mut a = owned.into_tensor()?;
        let cast = self.rhs(&a, b)?;
        let b = cast.as_ref().unwrap_or(b);

        // The buffer is reused only when the result has the first operand's
        // shape and dtype.
        let out_shape = Shape::broadcast_shape(a.shape(), b.shape())?;
        if out_shape != *a.shape() || a.dtype() != b.dtype() {
            let out = ctx.backend.binary(self.op, &a, b)?;
            return Ok((vec![out.into()], false));
        }
        ctx.backend.binary_inplace(self.op, &mut a, b)?;
        Ok((vec![a.into()], true))
    }
}
